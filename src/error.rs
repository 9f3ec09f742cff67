//! Error Handling Infrastructure
//!
//! This module defines all error types used throughout the provider.
//! All errors are structured and map to specific error codes for JSON output
//! and to host diagnostics.
//!
//! # Error Categories
//! - `Configuration`: Missing or unresolved provider fields (no I/O attempted)
//! - `Connection`: The cluster could not be reached or authenticated against
//! - `Validation`: A privilege name outside the allowed vocabulary (no SQL issued)
//! - `SqlExecution`: Any failure returned by a statement, reported verbatim
//! - `InvalidInput`: Malformed resource attributes or broken records
//! - `RebuildFailed`: An update failed after its destructive half completed
//!
//! Absent rows on read are not errors; see [`crate::reconcile::ReadOutcome`].

use std::fmt;

use thiserror::Error;

use crate::output::Diagnostic;

/// A single problem found while validating the provider configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    /// Attribute the issue refers to (`host`, `username`, `password`, `certpath`)
    pub attribute: String,

    /// Whether the value is absent or could not be resolved
    pub kind: ConfigIssueKind,
}

/// Why a configuration attribute was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigIssueKind {
    /// The value was not supplied, or supplied empty
    Missing,
    /// The value refers to something that could not be resolved (e.g. an unset env var)
    Unknown,
    /// The value (or the file holding it) could not be used
    Invalid(String),
}

impl ConfigIssue {
    pub fn missing(attribute: impl Into<String>) -> Self {
        Self { attribute: attribute.into(), kind: ConfigIssueKind::Missing }
    }

    pub fn unknown(attribute: impl Into<String>) -> Self {
        Self { attribute: attribute.into(), kind: ConfigIssueKind::Unknown }
    }

    pub fn invalid(attribute: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { attribute: attribute.into(), kind: ConfigIssueKind::Invalid(reason.into()) }
    }

    /// Human-readable label for the attribute, as used in diagnostics
    fn label(&self) -> &str {
        match self.attribute.as_str() {
            "host" => "Cockroach database host",
            "username" => "Cockroach database username",
            "password" => "Cockroach database password",
            "certpath" => "Cockroach database cert path",
            "config_file" => "provider configuration file",
            other => other,
        }
    }

    /// Convert the issue into a host diagnostic attached to its attribute
    pub fn to_diagnostic(&self) -> Diagnostic {
        let (summary, detail) = match &self.kind {
            ConfigIssueKind::Missing => (
                format!("Missing {}", self.label()),
                format!(
                    "The provider cannot create a Cockroach database connection because there is a missing configuration value for the {}.",
                    self.label()
                ),
            ),
            ConfigIssueKind::Unknown => (
                format!("Unknown {}", self.label()),
                format!(
                    "The provider cannot create a Cockroach database connection because there is an unknown configuration value for the {}.",
                    self.label()
                ),
            ),
            ConfigIssueKind::Invalid(reason) => (format!("Invalid {}", self.label()), reason.clone()),
        };
        Diagnostic::error(summary, detail).with_attribute(self.attribute.clone())
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ConfigIssueKind::Missing => write!(f, "missing {}", self.attribute),
            ConfigIssueKind::Unknown => write!(f, "unknown {}", self.attribute),
            ConfigIssueKind::Invalid(reason) => write!(f, "invalid {}: {reason}", self.attribute),
        }
    }
}

/// Main error type for provider operations
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Required provider configuration is missing or unresolved
    #[error("Configuration error: {}", join_issues(.0))]
    Configuration(Vec<ConfigIssue>),

    /// The cluster could not be reached or authenticated against
    #[error("Connection failed: {0}")]
    Connection(String),

    /// A privilege name outside the allowed vocabulary
    #[error("Unable to set invalid privilege: {privilege}")]
    Validation { privilege: String },

    /// A statement returned an error
    #[error("{action}, got error: {detail}")]
    SqlExecution { action: String, detail: String },

    /// Malformed resource attributes or a record that breaks an invariant
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An update tore down the previous object and then failed to rebuild it
    #[error("{0} (the previous object had already been removed)")]
    RebuildFailed(Box<ProviderError>),
}

fn join_issues(issues: &[ConfigIssue]) -> String {
    issues.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

impl ProviderError {
    /// Convert error to error code string for JSON output
    ///
    /// Error codes are stable and suitable for programmatic handling.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Connection(_) => "CONNECTION_ERROR",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::SqlExecution { .. } => "SQL_EXECUTION_ERROR",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::RebuildFailed(_) => "REBUILD_FAILED",
        }
    }

    /// Get human-readable error message
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// The innermost error, looking through `RebuildFailed`
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::RebuildFailed(inner) => inner.root(),
            other => other,
        }
    }

    /// Whether the object this error refers to is known to be gone
    #[must_use]
    pub const fn object_removed(&self) -> bool {
        matches!(self, Self::RebuildFailed(_))
    }

    /// Convert into host diagnostics
    ///
    /// `summary` is used for every kind except configuration issues, which
    /// carry their own per-attribute summaries.
    pub fn to_diagnostics(&self, summary: &str) -> Vec<Diagnostic> {
        match self.root() {
            Self::Configuration(issues) => issues.iter().map(ConfigIssue::to_diagnostic).collect(),
            Self::Connection(detail) => {
                vec![Diagnostic::error("Failed to connect to cockroach", detail.clone())]
            }
            Self::Validation { .. } => vec![Diagnostic::error("Invalid privilege", self.message())],
            _ => vec![Diagnostic::error(summary, self.message())],
        }
    }

    /// Create a configuration error from the collected issues
    pub fn configuration(issues: Vec<ConfigIssue>) -> Self {
        Self::Configuration(issues)
    }

    /// Create a configuration error for an unusable config file
    pub fn config_file(reason: impl Into<String>) -> Self {
        Self::Configuration(vec![ConfigIssue::invalid("config_file", reason)])
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a privilege validation error naming the offending token
    pub fn validation(privilege: impl Into<String>) -> Self {
        Self::Validation { privilege: privilege.into() }
    }

    /// Create a statement execution error
    pub fn sql_execution(action: impl Into<String>, detail: impl fmt::Display) -> Self {
        Self::SqlExecution { action: action.into(), detail: detail.to_string() }
    }

    /// Replace the action of a statement error; other kinds pass through
    #[must_use]
    pub fn with_action(self, action: impl Into<String>) -> Self {
        match self {
            Self::SqlExecution { detail, .. } => Self::SqlExecution { action: action.into(), detail },
            other => other,
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Mark an error as having happened after an update's teardown half
    pub fn rebuild_failed(inner: Self) -> Self {
        match inner {
            already @ Self::RebuildFailed(_) => already,
            other => Self::RebuildFailed(Box::new(other)),
        }
    }
}

/// Result type alias for provider operations
pub type Result<T> = std::result::Result<T, ProviderError>;
