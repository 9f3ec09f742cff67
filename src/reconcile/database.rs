//! Database resources
//!
//! Identity is the database name. Names are immutable after create: update
//! only carries `cascade_on_delete` forward, and a changed name is refused.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{execute, query, quote_ident, quote_literal, ReadOutcome};
use crate::engine::SqlSession;
use crate::error::{ProviderError, Result};

/// Declared state of a database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseRecord {
    pub name: String,

    /// Drop dependent objects on delete (`CASCADE`) instead of refusing (`RESTRICT`)
    #[serde(default)]
    pub cascade_on_delete: bool,
}

impl DatabaseRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), cascade_on_delete: false }
    }
}

/// `CREATE DATABASE`; an existing database is an error
pub async fn create<S: SqlSession>(session: &mut S, record: &DatabaseRecord) -> Result<DatabaseRecord> {
    let sql = format!("CREATE DATABASE {}", quote_ident(&record.name));
    execute(session, &sql, "Unable to create database").await?;

    info!(database = %record.name, "created database");
    Ok(record.clone())
}

/// Look the database up in the cluster catalog
///
/// The catalog's spelling of the name wins over the held one.
pub async fn read<S: SqlSession>(
    session: &mut S,
    record: &DatabaseRecord,
) -> Result<ReadOutcome<DatabaseRecord>> {
    let sql = format!(
        "SELECT name FROM crdb_internal.databases WHERE name = {}",
        quote_literal(&record.name)
    );
    let rows = query(session, &sql, "Unable to read database").await?;

    match rows.first().and_then(|row| row.get(0)) {
        Some(name) => Ok(ReadOutcome::Present(DatabaseRecord {
            name: name.to_string(),
            cascade_on_delete: record.cascade_on_delete,
        })),
        None => {
            info!(database = %record.name, "database no longer exists");
            Ok(ReadOutcome::NotFound)
        }
    }
}

/// No statements are issued; the desired record becomes the new state
///
/// A different name would point state at a database that was never created,
/// so renames are rejected and the resource has to be replaced instead.
pub fn update(desired: &DatabaseRecord, prior: &DatabaseRecord) -> Result<DatabaseRecord> {
    if desired.name != prior.name {
        return Err(ProviderError::invalid_input(format!(
            "Database name cannot change from '{}' to '{}'; replace the resource",
            prior.name, desired.name
        )));
    }
    Ok(desired.clone())
}

/// `DROP DATABASE ... CASCADE` or `... RESTRICT`
pub async fn delete<S: SqlSession>(session: &mut S, record: &DatabaseRecord) -> Result<()> {
    let mode = if record.cascade_on_delete { "CASCADE" } else { "RESTRICT" };
    let sql = format!("DROP DATABASE {} {mode}", quote_ident(&record.name));
    execute(session, &sql, "Unable to delete database").await?;

    info!(database = %record.name, cascade = record.cascade_on_delete, "dropped database");
    Ok(())
}

/// Adopt an existing database into state by name
pub async fn import<S: SqlSession>(session: &mut S, name: &str) -> Result<DatabaseRecord> {
    match read(session, &DatabaseRecord::new(name)).await? {
        ReadOutcome::Present(record) => Ok(record),
        ReadOutcome::NotFound => Err(ProviderError::invalid_input(format!(
            "Cannot import database '{name}': it does not exist"
        ))),
    }
}
