//! User resources
//!
//! Identity is `(username, database)`. Users are never altered in place:
//! update tears the prior identity down and runs the full create sequence for
//! the desired one.
//!
//! # Grants
//! Privileges are granted twice over: as default privileges for tables created
//! later, and, when the database already holds tables, directly on those
//! tables. A database with no tables cannot take `GRANT ... ON *`.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{execute, has_tables, query, quote_ident, quote_literal, use_database, ReadOutcome};
use crate::engine::{SqlSession, TextRow};
use crate::error::{ProviderError, Result};
use crate::privilege::PrivilegeSet;

/// Declared state of a database user
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserRecord {
    pub username: String,

    /// WARNING: Sensitive data, do not log
    pub password: String,

    /// Database the user's privileges apply to
    pub database: String,

    /// Privilege names, kept in declared order
    #[serde(default)]
    pub privileges: Vec<String>,
}

impl fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserRecord")
            .field("username", &self.username)
            .field("password", &"****")
            .field("database", &self.database)
            .field("privileges", &self.privileges)
            .finish()
    }
}

/// Create the user and grant its privileges
///
/// Privileges are validated before any statement is sent.
pub async fn create<S: SqlSession>(session: &mut S, record: &UserRecord) -> Result<UserRecord> {
    let privileges = PrivilegeSet::validate(&record.privileges)?;
    create_validated(session, record, &privileges).await?;
    Ok(record.clone())
}

async fn create_validated<S: SqlSession>(
    session: &mut S,
    record: &UserRecord,
    privileges: &PrivilegeSet,
) -> Result<()> {
    use_database(session, &record.database).await?;

    let sql = format!(
        "CREATE USER {} WITH PASSWORD {}",
        quote_ident(&record.username),
        quote_literal(&record.password)
    );
    execute(session, &sql, "Unable to create user").await?;
    info!(user = %record.username, database = %record.database, "created user");

    grant(session, &record.username, privileges).await
}

async fn grant<S: SqlSession>(session: &mut S, username: &str, privileges: &PrivilegeSet) -> Result<()> {
    if privileges.is_empty() {
        return Ok(());
    }

    let rendered = privileges.render();
    let grantee = quote_ident(username);

    if has_tables(session).await? {
        let sql = format!("GRANT {rendered} ON * TO {grantee}");
        execute(session, &sql, "Unable to grant privileges").await?;
    }

    let sql = format!("ALTER DEFAULT PRIVILEGES FOR ALL ROLES GRANT {rendered} ON TABLES TO {grantee}");
    execute(session, &sql, "Unable to grant default privileges").await?;

    info!(user = %username, privileges = %rendered, "granted privileges");
    Ok(())
}

/// Check that the user still exists by listing its grants
///
/// Any failure of the grants query is taken to mean the user is gone. The
/// record is returned unchanged: default privileges do not show up in
/// `SHOW GRANTS FOR`, so the observed set cannot stand in for the declared one.
pub async fn read<S: SqlSession>(session: &mut S, record: &UserRecord) -> Result<ReadOutcome<UserRecord>> {
    let rows = match show_grants(session, record).await {
        Ok(rows) => rows,
        Err(e) => {
            info!(user = %record.username, error = %e.message(), "grants query failed, treating user as removed");
            return Ok(ReadOutcome::NotFound);
        }
    };

    debug!(
        user = %record.username,
        observed = ?observed_privileges(&rows),
        "read user grants"
    );
    Ok(ReadOutcome::Present(record.clone()))
}

async fn show_grants<S: SqlSession>(session: &mut S, record: &UserRecord) -> Result<Vec<TextRow>> {
    use_database(session, &record.database).await?;
    let sql = format!("SHOW GRANTS FOR {}", quote_ident(&record.username));
    query(session, &sql, "Unable to read user").await
}

/// Distinct privilege names in a `SHOW GRANTS` result, lowercased, first-seen order
pub fn observed_privileges(rows: &[TextRow]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for row in rows {
        let privilege = row.get_named("privilege_type").or_else(|| row.get(4));
        if let Some(name) = privilege.map(str::to_lowercase) {
            if !seen.contains(&name) {
                seen.push(name);
            }
        }
    }
    seen
}

/// Replace `prior` with `desired`
///
/// The prior identity is torn down inside the prior database, then the desired
/// user is created from scratch. Failures after the teardown are reported as
/// [`ProviderError::RebuildFailed`] since the prior user no longer exists.
pub async fn update<S: SqlSession>(
    session: &mut S,
    desired: &UserRecord,
    prior: &UserRecord,
) -> Result<UserRecord> {
    let privileges = PrivilegeSet::validate(&desired.privileges)?;

    teardown(session, &prior.username, &prior.database).await?;

    create_validated(session, desired, &privileges)
        .await
        .map_err(ProviderError::rebuild_failed)?;
    Ok(desired.clone())
}

/// Revoke the user's privileges and drop it
pub async fn delete<S: SqlSession>(session: &mut S, record: &UserRecord) -> Result<()> {
    teardown(session, &record.username, &record.database).await
}

async fn teardown<S: SqlSession>(session: &mut S, username: &str, database: &str) -> Result<()> {
    use_database(session, database).await?;
    let tables = has_tables(session).await?;
    let grantee = quote_ident(username);

    let sql = format!("ALTER DEFAULT PRIVILEGES FOR ALL ROLES REVOKE ALL ON TABLES FROM {grantee}");
    execute(session, &sql, "Unable to delete user").await?;

    if tables {
        let sql = format!("REVOKE ALL ON * FROM {grantee}");
        execute(session, &sql, "Unable to delete user").await?;
    }

    execute(session, &format!("DROP USER {grantee}"), "Unable to delete user").await?;

    info!(user = %username, database = %database, "dropped user");
    Ok(())
}
