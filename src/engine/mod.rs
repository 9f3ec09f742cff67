//! SQL Session Traits and Core Types
//!
//! This module defines the seam between the reconcilers and the cluster.
//! Reconcilers only ever see a [`SqlSession`]; the concrete CockroachDB
//! connection lives in [`cockroach`].
//!
//! # Scoped Sessions
//! Every reconciliation call acquires a fresh session from a
//! [`SessionFactory`] and hands it back when done. Sessions are never pooled
//! or shared across calls.
//!
//! # Text Results
//! Statements go over the simple query protocol, so every value comes back
//! as text. Callers parse what they need (e.g. job identifiers).

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub mod cockroach;

/// A single result row with text values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRow {
    /// Column names, in result order
    pub columns: Vec<String>,

    /// Column values (`None` for SQL NULL)
    pub values: Vec<Option<String>>,
}

impl TextRow {
    pub fn new(columns: Vec<String>, values: Vec<Option<String>>) -> Self {
        Self { columns, values }
    }

    /// Value at a column index
    pub fn get(&self, idx: usize) -> Option<&str> {
        self.values.get(idx).and_then(Option::as_deref)
    }

    /// Value of a named column
    pub fn get_named(&self, column: &str) -> Option<&str> {
        self.columns.iter().position(|c| c == column).and_then(|idx| self.get(idx))
    }
}

/// Connection information returned by a connection check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Database server version string (e.g. "v23.2.4")
    pub database_version: String,

    /// Full `version()` output
    pub server_info: String,

    /// User the session is authenticated as
    pub user: String,

    /// Connection URI with the password masked
    pub uri: String,
}

/// An open session against the cluster
///
/// Each statement is sent on its own round trip. Implementations report every
/// driver failure as `ProviderError::SqlExecution`.
pub trait SqlSession: Send {
    /// Execute a statement, returning the number of rows affected
    fn execute(&mut self, sql: &str) -> impl std::future::Future<Output = Result<u64>> + Send;

    /// Execute a statement and collect every row it returns
    fn query(&mut self, sql: &str)
        -> impl std::future::Future<Output = Result<Vec<TextRow>>> + Send;
}

/// Opens and closes sessions for a single reconciliation call
pub trait SessionFactory {
    type Session: SqlSession;

    /// Open a fresh session, failing with `ProviderError::Connection`
    fn open(&self) -> impl std::future::Future<Output = Result<Self::Session>> + Send;

    /// Release a session; never fails
    fn close(&self, session: Self::Session) -> impl std::future::Future<Output = ()> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grants_row() -> TextRow {
        TextRow::new(
            vec!["database_name".into(), "grantee".into(), "privilege_type".into()],
            vec![Some("app".into()), Some("nate".into()), None],
        )
    }

    #[test]
    fn test_text_row_get_by_index() {
        let row = grants_row();
        assert_eq!(row.get(0), Some("app"));
        assert_eq!(row.get(2), None);
        assert_eq!(row.get(9), None);
    }

    #[test]
    fn test_text_row_get_named() {
        let row = grants_row();
        assert_eq!(row.get_named("grantee"), Some("nate"));
        assert_eq!(row.get_named("privilege_type"), None);
        assert_eq!(row.get_named("missing"), None);
    }
}
