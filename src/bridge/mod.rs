//! State Bridge
//!
//! Marshals between the host tool's attribute records (plain JSON objects) and
//! the typed records the reconcilers work with, and is the single place a
//! session is opened and closed.
//!
//! # Request Flow
//! 1. Resolve the resource kind and decode `config` / `state` into typed
//!    records (unknown or missing attributes fail here, before any I/O)
//! 2. Open a session, unless the operation issues no SQL
//! 3. Run the reconciler
//! 4. Close the session on every path
//! 5. Encode the resulting record, reporting drifted attributes on read
//!
//! # Attributes
//! | Resource     | Attributes                                          |
//! |--------------|-----------------------------------------------------|
//! | `database`   | `name`, `cascade_on_delete`                         |
//! | `user`       | `username`, `password`, `database`, `privileges`    |
//! | `changefeed` | `table`, `bucket`, `token`, `database`, `job_id`    |
//!
//! Resource names may carry a `cockroach_` prefix (`cockroach_database`).
//!
//! # Removed Records
//! `new_state: None` means the record must be dropped from persisted state.
//! An error whose [`ProviderError::object_removed`] is true means the same.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::engine::{SessionFactory, SqlSession};
use crate::error::{ProviderError, Result};
use crate::output::Diagnostic;
use crate::reconcile::{changefeed, database, user, ReadOutcome};
use crate::reconcile::{ChangefeedRecord, DatabaseRecord, UserRecord};

/// Kind of object a request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Database,
    User,
    Changefeed,
}

impl ResourceKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::User => "user",
            Self::Changefeed => "changefeed",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.strip_prefix("cockroach_").unwrap_or(s) {
            "database" => Ok(Self::Database),
            "user" => Ok(Self::User),
            "changefeed" => Ok(Self::Changefeed),
            _ => Err(ProviderError::invalid_input(format!(
                "Unknown resource type '{s}'. Must be database, user, or changefeed"
            ))),
        }
    }
}

/// Lifecycle operation requested by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    Import,
}

impl Operation {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Import => "import",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(Self::Create),
            "read" => Ok(Self::Read),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "import" => Ok(Self::Import),
            _ => Err(ProviderError::invalid_input(format!("Unknown operation '{s}'"))),
        }
    }
}

/// A request from the host tool
///
/// Which fields are required depends on the operation:
/// create `config`; read and delete `state`; update both; import `id`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceRequest {
    /// Resource type name (`database`, `cockroach_user`, ...)
    pub resource: String,

    /// Desired attributes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,

    /// Last persisted attributes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,

    /// Identifier of an existing object to import
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Outcome handed back to the host tool
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceResponse {
    /// Record to persist; `None` removes the record from state
    pub new_state: Option<Value>,

    /// Attributes that changed on read
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drifted: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

impl ResourceResponse {
    fn state(value: Value) -> Self {
        Self { new_state: Some(value), ..Self::default() }
    }

    fn removed() -> Self {
        Self::default()
    }

    fn refreshed(before: &Value, after: Value) -> Self {
        let drifted = changed_attributes(before, &after);
        let diagnostics = drifted
            .iter()
            .map(|attribute| {
                Diagnostic::warning(
                    "Drift detected",
                    format!("'{attribute}' was changed outside of this provider"),
                )
                .with_attribute(attribute.clone())
            })
            .collect();
        Self { new_state: Some(after), drifted, diagnostics }
    }
}

/// Top-level attributes whose values differ between two records
pub fn changed_attributes(before: &Value, after: &Value) -> Vec<String> {
    let empty = Map::new();
    let before = before.as_object().unwrap_or(&empty);
    let after = after.as_object().unwrap_or(&empty);

    let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    keys.into_iter()
        .filter(|key| before.get(*key) != after.get(*key))
        .cloned()
        .collect()
}

/// A decoded, typed reconciliation call
#[derive(Debug)]
enum Call {
    /// Answered from the records alone; no session is opened
    Local(LocalCall),
    Remote(RemoteCall),
}

#[derive(Debug)]
enum LocalCall {
    UpdateDatabase { desired: DatabaseRecord, prior: DatabaseRecord },
    ReadChangefeed(ChangefeedRecord),
}

#[derive(Debug)]
enum RemoteCall {
    CreateDatabase(DatabaseRecord),
    ReadDatabase(DatabaseRecord),
    DeleteDatabase(DatabaseRecord),
    ImportDatabase(String),
    CreateUser(UserRecord),
    ReadUser(UserRecord),
    UpdateUser { desired: UserRecord, prior: UserRecord },
    DeleteUser(UserRecord),
    CreateChangefeed(ChangefeedRecord),
    UpdateChangefeed { desired: ChangefeedRecord, prior: ChangefeedRecord },
    DeleteChangefeed(ChangefeedRecord),
}

impl Call {
    fn decode(kind: ResourceKind, operation: Operation, request: ResourceRequest) -> Result<Self> {
        use Operation::{Create, Delete, Import, Read, Update};
        use ResourceKind::{Changefeed, Database, User};

        let ResourceRequest { config, state, id, .. } = request;
        let config = Attributes { kind, operation, field: "config", value: config };
        let state = Attributes { kind, operation, field: "state", value: state };

        let remote = match (kind, operation) {
            (Database, Update) => {
                return Ok(Self::Local(LocalCall::UpdateDatabase {
                    desired: config.decode()?,
                    prior: state.decode()?,
                }))
            }
            (Changefeed, Read) => return Ok(Self::Local(LocalCall::ReadChangefeed(state.decode()?))),
            (Database, Create) => RemoteCall::CreateDatabase(config.decode()?),
            (Database, Read) => RemoteCall::ReadDatabase(state.decode()?),
            (Database, Delete) => RemoteCall::DeleteDatabase(state.decode()?),
            (Database, Import) => match id.filter(|id| !id.trim().is_empty()) {
                Some(id) => RemoteCall::ImportDatabase(id),
                None => return Err(ProviderError::invalid_input("Missing 'id' for database import")),
            },
            (User, Create) => RemoteCall::CreateUser(config.decode()?),
            (User, Read) => RemoteCall::ReadUser(state.decode()?),
            (User, Update) => RemoteCall::UpdateUser { desired: config.decode()?, prior: state.decode()? },
            (User, Delete) => RemoteCall::DeleteUser(state.decode()?),
            (Changefeed, Create) => RemoteCall::CreateChangefeed(config.decode()?),
            (Changefeed, Update) => {
                RemoteCall::UpdateChangefeed { desired: config.decode()?, prior: state.decode()? }
            }
            (Changefeed, Delete) => RemoteCall::DeleteChangefeed(state.decode()?),
            (User | Changefeed, Import) => {
                return Err(ProviderError::invalid_input(format!(
                    "Import is only supported for databases, not {kind}"
                )))
            }
        };
        Ok(Self::Remote(remote))
    }
}

impl LocalCall {
    fn run(self) -> Result<ResourceResponse> {
        match self {
            Self::UpdateDatabase { desired, prior } => {
                encode(&database::update(&desired, &prior)?).map(ResourceResponse::state)
            }
            Self::ReadChangefeed(record) => refresh(&record, changefeed::read(&record)),
        }
    }
}

impl RemoteCall {
    async fn run<S: SqlSession>(self, session: &mut S) -> Result<ResourceResponse> {
        match self {
            Self::CreateDatabase(record) => {
                encode(&database::create(session, &record).await?).map(ResourceResponse::state)
            }
            Self::ReadDatabase(record) => refresh(&record, database::read(session, &record).await?),
            Self::DeleteDatabase(record) => {
                database::delete(session, &record).await?;
                Ok(ResourceResponse::removed())
            }
            Self::ImportDatabase(name) => {
                encode(&database::import(session, &name).await?).map(ResourceResponse::state)
            }
            Self::CreateUser(record) => {
                encode(&user::create(session, &record).await?).map(ResourceResponse::state)
            }
            Self::ReadUser(record) => refresh(&record, user::read(session, &record).await?),
            Self::UpdateUser { desired, prior } => {
                encode(&user::update(session, &desired, &prior).await?).map(ResourceResponse::state)
            }
            Self::DeleteUser(record) => {
                user::delete(session, &record).await?;
                Ok(ResourceResponse::removed())
            }
            Self::CreateChangefeed(record) => {
                encode(&changefeed::create(session, &record).await?).map(ResourceResponse::state)
            }
            Self::UpdateChangefeed { desired, prior } => {
                encode(&changefeed::update(session, &desired, &prior).await?)
                    .map(ResourceResponse::state)
            }
            Self::DeleteChangefeed(record) => {
                changefeed::delete(session, &record).await?;
                Ok(ResourceResponse::removed())
            }
        }
    }
}

/// One of the request's attribute objects, with enough context for errors
struct Attributes {
    kind: ResourceKind,
    operation: Operation,
    field: &'static str,
    value: Option<Value>,
}

impl Attributes {
    fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let value = self.value.clone().ok_or_else(|| {
            ProviderError::invalid_input(format!(
                "Missing '{}' for {} {}",
                self.field, self.kind, self.operation
            ))
        })?;

        serde_json::from_value(value).map_err(|e| {
            ProviderError::invalid_input(format!("Invalid {} {}: {e}", self.kind, self.field))
        })
    }
}

fn encode<T: Serialize>(record: &T) -> Result<Value> {
    serde_json::to_value(record)
        .map_err(|e| ProviderError::invalid_input(format!("Could not encode state: {e}")))
}

fn refresh<T: Serialize>(held: &T, outcome: ReadOutcome<T>) -> Result<ResourceResponse> {
    match outcome {
        ReadOutcome::Present(record) => Ok(ResourceResponse::refreshed(&encode(held)?, encode(&record)?)),
        ReadOutcome::NotFound => Ok(ResourceResponse::removed()),
    }
}

/// Entry point for all resource operations
#[derive(Debug, Clone)]
pub struct Provider<F> {
    factory: F,
}

impl<F: SessionFactory> Provider<F> {
    pub fn new(factory: F) -> Self {
        Self { factory }
    }

    /// Decode, reconcile, and encode one request
    ///
    /// The session (if any) is closed before this returns, on success and on
    /// error alike.
    pub async fn handle(&self, operation: Operation, request: ResourceRequest) -> Result<ResourceResponse> {
        let kind: ResourceKind = request.resource.parse()?;
        let call = Call::decode(kind, operation, request)?;
        debug!(resource = %kind, operation = %operation, "handling request");

        let call = match call {
            Call::Local(call) => return call.run(),
            Call::Remote(call) => call,
        };

        let mut session = self.factory.open().await?;
        let result = call.run(&mut session).await;
        self.factory.close(session).await;

        if let Ok(response) = &result {
            if !response.drifted.is_empty() {
                debug!(resource = %kind, drifted = ?response.drifted, "drift detected");
            }
        }
        result
    }
}
