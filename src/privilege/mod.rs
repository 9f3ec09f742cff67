//! Privilege Set Validation
//!
//! Users are granted a subset of a fixed privilege vocabulary:
//! `select`, `insert`, `update`, `delete`. Anything else invalidates the
//! whole set before any SQL is built.
//!
//! # Rendering
//! Rendering preserves input order and joins with `", "`. Two sets holding the
//! same names in a different order render differently; no canonical sort is
//! applied.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, Result};

/// A privilege that may be granted on tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivilegeName {
    Select,
    Insert,
    Update,
    Delete,
}

impl PrivilegeName {
    /// Every accepted privilege, in vocabulary order
    pub const ALL: [Self; 4] = [Self::Select, Self::Insert, Self::Update, Self::Delete];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for PrivilegeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrivilegeName {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ProviderError::validation(s))
    }
}

/// An ordered, validated list of privileges
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrivilegeSet(Vec<PrivilegeName>);

impl PrivilegeSet {
    /// Validate requested privilege names, failing on the first unrecognized one
    pub fn validate<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        names.iter().map(|n| n.as_ref().parse()).collect::<Result<Vec<_>>>().map(Self)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Render into SQL list syntax, preserving input order
    #[must_use]
    pub fn render(&self) -> String {
        self.0.iter().map(PrivilegeName::as_str).collect::<Vec<_>>().join(", ")
    }
}

/// Validate privilege names without keeping the parsed set
pub fn validate<S: AsRef<str>>(names: &[S]) -> Result<()> {
    PrivilegeSet::validate(names).map(|_| ())
}

/// Validate and render privilege names in one step
pub fn render<S: AsRef<str>>(names: &[S]) -> Result<String> {
    PrivilegeSet::validate(names).map(|set| set.render())
}
