//! Cockroach Provider CLI Entry Point
//!
//! Subcommands:
//! - `serve` - JSON-RPC server over stdio (for host tooling)
//! - `check` - Validate configuration and connectivity
//! - `create` / `read` / `update` / `delete` / `import` - One-shot resource operations
//! - `save-profile` - Store the given connection settings as a named profile
//!
//! All output to stdout is JSON-only. Logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::Value;

use cockroach_provider::commands::{run_check, run_operation, Envelope};
use cockroach_provider::config::{self, ConfigLocation, ProviderConfig};
use cockroach_provider::serve::{serve, ServerState};
use cockroach_provider::{logging, ErrorEnvelope, ErrorInfo, Operation, ProviderError, ResourceRequest};

/// Cockroach Provider - declarative CockroachDB databases, users, and changefeeds
#[derive(Parser)]
#[command(name = "cockroach-provider")]
#[command(about = "Reconcile CockroachDB databases, users, and changefeeds from declarative records")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Enable debug logging on stderr (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Provider configuration flags; unset flags fall back to config files
#[derive(Args)]
struct ConnectionArgs {
    /// Cluster host
    #[arg(long, env = "COCKROACH_HOST", global = true)]
    host: Option<String>,

    /// Admin username
    #[arg(long, env = "COCKROACH_USERNAME", global = true)]
    username: Option<String>,

    /// Admin password
    #[arg(long, env = "COCKROACH_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    /// Environment variable holding the admin password
    #[arg(long, global = true)]
    password_env: Option<String>,

    /// Path to the cluster CA certificate
    #[arg(long, env = "COCKROACH_CERTPATH", global = true)]
    certpath: Option<PathBuf>,

    /// Named profile from the config files
    #[arg(long, global = true)]
    profile: Option<String>,
}

impl ConnectionArgs {
    fn explicit(&self) -> ProviderConfig {
        ProviderConfig {
            host: self.host.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            password_env: self.password_env.clone(),
            certpath: self.certpath.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Serve JSON-RPC requests on stdin/stdout
    Serve,

    /// Validate configuration and connect to the cluster
    Check,

    /// Create a resource from its desired attributes
    Create {
        /// Resource type (database, user, changefeed)
        resource: String,
        /// Desired attributes as a JSON object
        #[arg(long)]
        config: String,
    },

    /// Refresh a resource's persisted attributes from the cluster
    Read {
        resource: String,
        /// Persisted attributes as a JSON object
        #[arg(long)]
        state: String,
    },

    /// Move a resource from its persisted to its desired attributes
    Update {
        resource: String,
        #[arg(long)]
        config: String,
        #[arg(long)]
        state: String,
    },

    /// Delete a resource
    Delete {
        resource: String,
        #[arg(long)]
        state: String,
    },

    /// Adopt an existing object (databases only)
    Import {
        resource: String,
        /// Identifier of the existing object (the database name)
        id: String,
    },

    /// Save the given connection flags as a named profile
    SaveProfile {
        name: String,
        #[arg(long, value_enum, default_value_t = SaveLocation::Local)]
        location: SaveLocation,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SaveLocation {
    Local,
    Global,
}

impl From<SaveLocation> for ConfigLocation {
    fn from(location: SaveLocation) -> Self {
        match location {
            SaveLocation::Local => Self::Local,
            SaveLocation::Global => Self::Global,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let explicit = cli.connection.explicit();
    let profile = cli.connection.profile.as_deref();

    match cli.command {
        Commands::Serve => {
            let state = match config::load_with_precedence()
                .and_then(|files| ServerState::new(files, explicit, profile))
            {
                Ok(state) => state,
                Err(err) => return emit::<()>(Err(ErrorEnvelope::from_error("", "serve", &err))),
            };

            match serve(state).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => emit::<()>(Err(ErrorEnvelope::new(
                    "",
                    "serve",
                    ErrorInfo::new("IO_ERROR", e.to_string()),
                ))),
            }
        }
        Commands::Check => match config::resolve(explicit, profile) {
            Ok(config) => emit(run_check(&config).await),
            Err(err) => emit::<()>(Err(ErrorEnvelope::from_error("", "check", &err))),
        },
        Commands::Create { resource, config } => {
            let request = attributes(&resource, "create", Some(&config), None);
            operation(explicit, profile, Operation::Create, request).await
        }
        Commands::Read { resource, state } => {
            let request = attributes(&resource, "read", None, Some(&state));
            operation(explicit, profile, Operation::Read, request).await
        }
        Commands::Update { resource, config, state } => {
            let request = attributes(&resource, "update", Some(&config), Some(&state));
            operation(explicit, profile, Operation::Update, request).await
        }
        Commands::Delete { resource, state } => {
            let request = attributes(&resource, "delete", None, Some(&state));
            operation(explicit, profile, Operation::Delete, request).await
        }
        Commands::Import { resource, id } => {
            let request = ResourceRequest { resource, id: Some(id), ..Default::default() };
            operation(explicit, profile, Operation::Import, Ok(request)).await
        }
        Commands::SaveProfile { name, location } => {
            match config::save_profile(&name, explicit, location.into()) {
                Ok(path) => {
                    println!(
                        "{}",
                        serde_json::json!({
                            "ok": true,
                            "operation": "save-profile",
                            "profile": name,
                            "saved_to": path.display().to_string()
                        })
                    );
                    ExitCode::SUCCESS
                }
                Err(err) => emit::<()>(Err(ErrorEnvelope::from_error("", "save-profile", &err))),
            }
        }
    }
}

/// Build a request from JSON attribute arguments
fn attributes(
    resource: &str,
    operation: &str,
    config: Option<&str>,
    state: Option<&str>,
) -> Result<ResourceRequest, ErrorEnvelope> {
    let parse = |field: &str, raw: Option<&str>| -> Result<Option<Value>, ErrorEnvelope> {
        raw.map(|raw| {
            serde_json::from_str(raw).map_err(|e| {
                let err = ProviderError::invalid_input(format!("--{field} is not valid JSON: {e}"));
                ErrorEnvelope::from_error(resource, operation, &err)
            })
        })
        .transpose()
    };

    let request = ResourceRequest {
        resource: resource.to_string(),
        config: parse("config", config)?,
        state: parse("state", state)?,
        id: None,
    };
    Ok(request)
}

async fn operation(
    explicit: ProviderConfig,
    profile: Option<&str>,
    operation: Operation,
    request: Result<ResourceRequest, ErrorEnvelope>,
) -> ExitCode {
    let request = match request {
        Ok(request) => request,
        Err(envelope) => return emit::<()>(Err(envelope)),
    };

    match config::resolve(explicit, profile) {
        Ok(config) => emit(run_operation(&config, operation, request).await),
        Err(err) => {
            emit::<()>(Err(ErrorEnvelope::from_error(request.resource, operation.as_str(), &err)))
        }
    }
}

/// Print an envelope as JSON on stdout
fn emit<T: Serialize>(envelope: Envelope<T>) -> ExitCode {
    let (json, code) = match &envelope {
        Ok(success) => (serde_json::to_string(success), ExitCode::SUCCESS),
        Err(error) => (serde_json::to_string(error), ExitCode::FAILURE),
    };

    match json {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("failed to serialize output: {e}"),
    }
    code
}
