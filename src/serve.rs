//! Stdio Server
//!
//! JSON-RPC 2.0 over stdio, one request per line, one response per line.
//! Lets a host process drive the provider without spawning a process per
//! operation.
//!
//! # Methods
//! - `initialize` - server metadata and supported resources
//! - `configure` - set provider configuration (`{"provider": {...}, "profile": "..."}`)
//! - `check` - open a session and report server metadata
//! - `create` / `read` / `update` / `delete` / `import` - resource operations,
//!   params are a [`ResourceRequest`]
//!
//! # Results
//! Operation outcomes, failed ones included, come back as the `result` of the
//! JSON-RPC response in the envelope format (`"ok": true|false`). JSON-RPC
//! errors are reserved for protocol problems: unparsable lines, unknown
//! methods, malformed params.
//!
//! # Usage
//!
//! ```json
//! {"jsonrpc":"2.0","id":1,"method":"create","params":{"resource":"database","config":{"name":"nate_db"}}}
//! ```

use std::io::{BufRead, Write};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::bridge::{Operation, ResourceRequest};
use crate::commands::{run_check, run_configure, run_operation, Envelope};
use crate::config::{ConfigFile, ProviderConfig};

// ============================================================================
// JSON-RPC 2.0 Structures
// ============================================================================

/// JSON-RPC 2.0 Request
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    fn result(id: Option<Value>, result: Value) -> Self {
        Self { jsonrpc: "2.0".to_string(), id, result: Some(result), error: None }
    }

    fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError { code, message }),
        }
    }
}

/// JSON-RPC 2.0 Error
#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

const PARSE_ERROR: i32 = -32700;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const INTERNAL_ERROR: i32 = -32603;

/// Params of the `configure` method
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigureParams {
    #[serde(default)]
    provider: ProviderConfig,
    #[serde(default)]
    profile: Option<String>,
}

// ============================================================================
// Server State
// ============================================================================

/// Provider configuration for the lifetime of the server
///
/// Config files are read once at startup; `configure` layers explicit values
/// over them.
#[derive(Debug, Clone)]
pub struct ServerState {
    files: ConfigFile,
    config: ProviderConfig,
}

impl ServerState {
    /// Start from explicit values (CLI flags) over the named or default profile
    pub fn new(files: ConfigFile, explicit: ProviderConfig, profile: Option<&str>) -> crate::Result<Self> {
        let config = explicit.or(files.profile(profile)?);
        Ok(Self { files, config })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn configure(&mut self, params: ConfigureParams) -> Envelope<crate::commands::ConfiguredProvider> {
        let profile = self
            .files
            .profile(params.profile.as_deref())
            .map_err(|err| crate::ErrorEnvelope::from_error("", "configure", &err))?;

        self.config = params.provider.or(profile);
        run_configure(&self.config)
    }
}

// ============================================================================
// Server Loop
// ============================================================================

/// Serve requests from stdin until it closes
///
/// # Errors
///
/// Returns an error if stdio communication fails.
#[allow(clippy::future_not_send)]
pub async fn serve(state: ServerState) -> Result<()> {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    serve_io(stdin.lock(), stdout.lock(), state).await
}

/// Serve requests from any line reader, writing responses to `writer`
#[allow(clippy::future_not_send)]
pub async fn serve_io<R: BufRead, W: Write>(reader: R, mut writer: W, mut state: ServerState) -> Result<()> {
    for line in reader.lines() {
        let line = line?;

        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<JsonRpcRequest>(&line) {
            Ok(request) => handle_request(&mut state, request).await,
            Err(e) => {
                warn!(error = %e, "unparsable request line");
                JsonRpcResponse::error(None, PARSE_ERROR, format!("Parse error: {e}"))
            }
        };

        let response_json = serde_json::to_string(&response)?;
        writeln!(writer, "{response_json}")?;
        writer.flush()?;
    }

    debug!("input closed, server exiting");
    Ok(())
}

/// Route a request to its handler
async fn handle_request(state: &mut ServerState, request: JsonRpcRequest) -> JsonRpcResponse {
    debug!(method = %request.method, "request received");
    let id = request.id;

    let result = match request.method.as_str() {
        "initialize" => Ok(handle_initialize()),
        "configure" => match parse_params::<ConfigureParams>(request.params) {
            Ok(params) => envelope_value(state.configure(params)),
            Err(e) => return JsonRpcResponse::error(id, INVALID_PARAMS, e.to_string()),
        },
        "check" => envelope_value(run_check(state.config()).await),
        method => match method.parse::<Operation>() {
            Ok(operation) => match parse_params::<ResourceRequest>(request.params) {
                Ok(params) => envelope_value(run_operation(state.config(), operation, params).await),
                Err(e) => return JsonRpcResponse::error(id, INVALID_PARAMS, e.to_string()),
            },
            Err(_) => {
                return JsonRpcResponse::error(id, METHOD_NOT_FOUND, format!("Unknown method: {method}"))
            }
        },
    };

    match result {
        Ok(value) => JsonRpcResponse::result(id, value),
        Err(e) => JsonRpcResponse::error(id, INTERNAL_ERROR, e.to_string()),
    }
}

fn handle_initialize() -> Value {
    serde_json::json!({
        "serverInfo": {
            "name": "cockroach-provider",
            "version": env!("CARGO_PKG_VERSION")
        },
        "resources": ["database", "user", "changefeed"],
        "operations": ["create", "read", "update", "delete", "import"]
    })
}

fn parse_params<T: serde::de::DeserializeOwned + Default>(params: Option<Value>) -> Result<T> {
    match params {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value).map_err(|e| anyhow!("Invalid params: {e}")),
    }
}

fn envelope_value<T: Serialize>(envelope: Envelope<T>) -> Result<Value> {
    let value = match envelope {
        Ok(success) => serde_json::to_value(success)?,
        Err(error) => serde_json::to_value(error)?,
    };
    Ok(value)
}
