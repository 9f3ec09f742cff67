//! CockroachDB Session Implementation
//!
//! This module implements [`SessionFactory`] and [`SqlSession`] for
//! CockroachDB clusters.
//!
//! # Implementation Notes
//! - Uses `tokio-postgres` (CockroachDB speaks the PostgreSQL wire protocol)
//! - TLS via `postgres-native-tls`; the only trust root is the configured CA,
//!   and `native-tls` checks both chain and hostname (`verify-full`)
//! - Port and TLS mode are fixed, not configurable
//! - Statements use the simple query protocol, one statement per round trip
//! - Dropping a session drops the client, which terminates the connection task

use std::fmt;
use std::path::{Path, PathBuf};

use native_tls::{Certificate, TlsConnector};
use postgres_native_tls::MakeTlsConnector;
use tokio::task::JoinHandle;
use tokio_postgres::config::SslMode;
use tokio_postgres::{Client, Config, SimpleQueryMessage};
use tracing::debug;
use url::Url;

use crate::engine::{ConnectionInfo, SessionFactory, SqlSession, TextRow};
use crate::error::{ProviderError, Result};

/// SQL port every CockroachDB node listens on
pub const COCKROACH_PORT: u16 = 26257;

/// TLS verification mode advertised in connection URIs
pub const TLS_MODE: &str = "verify-full";

/// Database a session starts in; statements switch with `SET DATABASE`
pub const DEFAULT_DATABASE: &str = "defaultdb";

const APPLICATION_NAME: &str = "cockroach-provider";

/// Everything needed to reach the cluster as the admin user
///
/// Built once by [`crate::config::ProviderConfig::validate`] and shared
/// read-only for the rest of the run.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    host: String,
    admin_username: String,
    admin_password: String,
    ca_cert_path: PathBuf,
}

impl ConnectionDescriptor {
    pub fn new(
        host: impl Into<String>,
        admin_username: impl Into<String>,
        admin_password: impl Into<String>,
        ca_cert_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            host: host.into(),
            admin_username: admin_username.into(),
            admin_password: admin_password.into(),
            ca_cert_path: ca_cert_path.into(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn admin_username(&self) -> &str {
        &self.admin_username
    }

    pub fn ca_cert_path(&self) -> &Path {
        &self.ca_cert_path
    }

    /// Connection URI with the password masked, for reports and logs
    ///
    /// Sessions are opened from [`Self::pg_config`], so the real password
    /// never appears in a URI.
    pub fn redacted_uri(&self) -> Result<String> {
        let base = format!("postgresql://{}:{COCKROACH_PORT}/{DEFAULT_DATABASE}", self.host);
        let mut url = Url::parse(&base)
            .map_err(|e| ProviderError::invalid_input(format!("Invalid host '{}': {e}", self.host)))?;

        url.set_username(&self.admin_username)
            .map_err(|()| ProviderError::invalid_input("Host does not accept credentials"))?;
        url.set_password(Some("****"))
            .map_err(|()| ProviderError::invalid_input("Host does not accept credentials"))?;
        url.query_pairs_mut()
            .append_pair("sslmode", TLS_MODE)
            .append_pair("sslrootcert", &self.ca_cert_path.to_string_lossy());

        Ok(url.into())
    }

    /// Build the driver configuration (fixed port, TLS required)
    pub(crate) fn pg_config(&self) -> Config {
        let mut config = Config::new();
        config
            .host(&self.host)
            .port(COCKROACH_PORT)
            .user(&self.admin_username)
            .password(&self.admin_password)
            .dbname(DEFAULT_DATABASE)
            .application_name(APPLICATION_NAME)
            .ssl_mode(SslMode::Require);
        config
    }
}

// Hand-written so the admin password never reaches logs
impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("host", &self.host)
            .field("admin_username", &self.admin_username)
            .field("admin_password", &"****")
            .field("ca_cert_path", &self.ca_cert_path)
            .finish()
    }
}

/// Load the CA certificate and build a connector that trusts only it
async fn tls_connector(ca_cert_path: &Path) -> Result<MakeTlsConnector> {
    let pem = tokio::fs::read(ca_cert_path).await.map_err(|e| {
        ProviderError::connection(format!(
            "Could not read CA certificate '{}': {e}",
            ca_cert_path.display()
        ))
    })?;

    Ok(MakeTlsConnector::new(connector_from_pem(&pem, ca_cert_path)?))
}

/// The system trust store is switched off; `pem` is the only root
fn connector_from_pem(pem: &[u8], source: &Path) -> Result<TlsConnector> {
    let cert = Certificate::from_pem(pem).map_err(|e| {
        ProviderError::connection(format!(
            "Could not parse CA certificate '{}': {e}",
            source.display()
        ))
    })?;

    TlsConnector::builder()
        .disable_built_in_roots(true)
        .add_root_certificate(cert)
        .build()
        .map_err(|e| ProviderError::connection(format!("Could not build TLS connector: {e}")))
}

/// Opens one CockroachDB session per reconciliation call
#[derive(Debug, Clone)]
pub struct ConnectionFactory {
    descriptor: ConnectionDescriptor,
}

impl ConnectionFactory {
    pub fn new(descriptor: ConnectionDescriptor) -> Self {
        Self { descriptor }
    }

    /// Open a session, read server metadata, and close it again
    pub async fn validate_connection(&self) -> Result<ConnectionInfo> {
        let mut session = self.open().await?;
        let info = read_connection_info(&mut session).await;
        self.close(session).await;

        let (server_info, user) = info?;
        let database_version = server_info
            .split_whitespace()
            .find(|token| token.starts_with('v'))
            .unwrap_or("unknown")
            .to_string();

        Ok(ConnectionInfo {
            database_version,
            server_info,
            user,
            uri: self.descriptor.redacted_uri()?,
        })
    }
}

async fn read_connection_info(session: &mut CockroachSession) -> Result<(String, String)> {
    let version = session.query("SELECT version()").await?;
    let server_info = version.first().and_then(|row| row.get(0)).unwrap_or_default().to_string();

    let user = session.query("SELECT current_user").await?;
    let user = user.first().and_then(|row| row.get(0)).unwrap_or_default().to_string();

    Ok((server_info, user))
}

impl SessionFactory for ConnectionFactory {
    type Session = CockroachSession;

    async fn open(&self) -> Result<CockroachSession> {
        let tls = tls_connector(&self.descriptor.ca_cert_path).await?;

        let (client, connection) = self.descriptor.pg_config().connect(tls).await.map_err(|e| {
            ProviderError::connection(format!("Failed to connect to CockroachDB: {e}"))
        })?;

        // Connection errors are not logged to prevent credential leakage
        let connection = tokio::spawn(async move {
            let _ = connection.await;
        });

        debug!(host = %self.descriptor.host, "session opened");
        Ok(CockroachSession { client, connection })
    }

    async fn close(&self, session: CockroachSession) {
        session.close().await;
        debug!("session closed");
    }
}

/// An open CockroachDB session, owned by exactly one reconciliation call
pub struct CockroachSession {
    client: Client,
    connection: JoinHandle<()>,
}

impl CockroachSession {
    /// Terminate the session and wait for the connection task to finish
    pub async fn close(self) {
        let Self { client, connection } = self;
        drop(client);
        let _ = connection.await;
    }

    async fn simple_query(&self, sql: &str) -> Result<Vec<SimpleQueryMessage>> {
        self.client
            .simple_query(sql)
            .await
            .map_err(|e| ProviderError::sql_execution("Statement failed", describe_db_error(&e)))
    }
}

/// Prefer the server's message over the driver's generic "db error"
fn describe_db_error(err: &tokio_postgres::Error) -> String {
    match err.as_db_error() {
        Some(db) => format!("{}: {}", db.severity(), db.message()),
        None => err.to_string(),
    }
}

impl SqlSession for CockroachSession {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        let messages = self.simple_query(sql).await?;
        Ok(messages
            .iter()
            .map(|m| match m {
                SimpleQueryMessage::CommandComplete(n) => *n,
                _ => 0,
            })
            .sum())
    }

    async fn query(&mut self, sql: &str) -> Result<Vec<TextRow>> {
        let messages = self.simple_query(sql).await?;

        let mut rows = Vec::new();
        for message in messages {
            if let SimpleQueryMessage::Row(row) = message {
                let columns = row.columns().iter().map(|c| c.name().to_string()).collect();
                let values = (0..row.len())
                    .map(|idx| row.try_get(idx).ok().flatten().map(str::to_string))
                    .collect();
                rows.push(TextRow::new(columns, values));
            }
        }
        Ok(rows)
    }
}
