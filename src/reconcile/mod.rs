//! Resource Reconciliation
//!
//! Each submodule maps one resource kind onto the SQL statements that move the
//! cluster from its prior state to the desired one:
//! - [`database`] - `CREATE DATABASE` / catalog lookup / `DROP DATABASE`
//! - [`user`] - `CREATE USER` plus grants, teardown via revoke and `DROP USER`
//! - [`changefeed`] - `CREATE CHANGEFEED` and `CANCEL JOB`
//!
//! # Statement Construction
//! Values are never interpolated raw. Identifiers go through [`quote_ident`],
//! string literals through [`quote_literal`], and numeric job ids are parsed
//! before use. Statements are issued one per round trip.
//!
//! # Sessions
//! Reconcilers borrow a [`SqlSession`] for the duration of one call. Opening
//! and closing it is the caller's job (see [`crate::bridge`]).

use crate::engine::{SqlSession, TextRow};
use crate::error::Result;

pub mod changefeed;
pub mod database;
pub mod user;

pub use changefeed::ChangefeedRecord;
pub use database::DatabaseRecord;
pub use user::UserRecord;

/// Result of reading a resource back from the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome<T> {
    /// The object exists; the record reflects what the cluster reported
    Present(T),
    /// The object is gone and should be dropped from persisted state
    NotFound,
}

/// Quote an SQL identifier, doubling embedded double quotes
#[must_use]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a dotted name (`schema.table`) one segment at a time
#[must_use]
pub fn quote_qualified(name: &str) -> String {
    name.split('.').map(quote_ident).collect::<Vec<_>>().join(".")
}

/// Quote an SQL string literal, doubling embedded single quotes
#[must_use]
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Run a statement, labelling any failure with `action`
pub(crate) async fn execute<S: SqlSession>(session: &mut S, sql: &str, action: &str) -> Result<u64> {
    session.execute(sql).await.map_err(|e| e.with_action(action))
}

/// Run a query, labelling any failure with `action`
pub(crate) async fn query<S: SqlSession>(
    session: &mut S,
    sql: &str,
    action: &str,
) -> Result<Vec<TextRow>> {
    session.query(sql).await.map_err(|e| e.with_action(action))
}

/// Switch the session's current database
pub async fn use_database<S: SqlSession>(session: &mut S, database: &str) -> Result<()> {
    let sql = format!("SET DATABASE = {}", quote_ident(database));
    execute(session, &sql, &format!("Unable to use database {database}")).await?;
    Ok(())
}

/// Whether the session's current database holds at least one table
///
/// A database without tables cannot receive a direct `GRANT ... ON *`, so
/// grant and revoke paths branch on this.
pub async fn has_tables<S: SqlSession>(session: &mut S) -> Result<bool> {
    let rows = query(session, "SHOW TABLES", "Unable to list tables").await?;
    tracing::debug!(tables = rows.len(), "probed for tables");
    Ok(!rows.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("nate_db"), r#""nate_db""#);
        assert_eq!(quote_ident(r#"we"ird"#), r#""we""ird""#);
        assert_eq!(quote_ident("Mixed Case"), r#""Mixed Case""#);
    }

    #[test]
    fn test_quote_qualified() {
        assert_eq!(quote_qualified("orders"), r#""orders""#);
        assert_eq!(quote_qualified("public.orders"), r#""public"."orders""#);
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("hunter2"), "'hunter2'");
        assert_eq!(quote_literal("it's'; DROP USER root; --"), "'it''s''; DROP USER root; --'");
    }
}
