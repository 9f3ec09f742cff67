//! Cockroach Provider - Declarative CockroachDB Resources
//!
//! Reconciles databases, users, and changefeeds inside a CockroachDB cluster
//! from declarative records, for use by infrastructure-as-code tooling.
//!
//! # Core Principles
//! - Every operation decodes a typed record, opens one session, issues its
//!   statements, closes the session, and encodes the resulting record
//! - Configuration is validated at one boundary, before any connection
//! - User-supplied values are quoted or encoded, never interpolated raw
//! - No retries and no pooling; sessions belong to exactly one call
//! - JSON-only output on stdout, logs on stderr
//!
//! # Module Organization
//! - [`error`] - Error types and diagnostics mapping
//! - [`output`] - Diagnostics and JSON output envelopes
//! - [`config`] - Provider configuration and config files
//! - [`engine`] - Session traits and the CockroachDB connection factory
//! - [`privilege`] - Privilege name validation and rendering
//! - [`reconcile`] - Per-resource statement sequences
//! - [`bridge`] - Attribute decoding, drift detection, dispatch
//! - [`commands`] - Operation runners shared by CLI and server
//! - [`serve`] - JSON-RPC 2.0 server over stdio
//! - [`logging`] - tracing subscriber setup

pub mod bridge;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod output;
pub mod privilege;
pub mod reconcile;
pub mod serve;

pub use bridge::{Operation, Provider, ResourceKind, ResourceRequest, ResourceResponse};
pub use config::{ConfigFile, ConfigLocation, ProviderConfig};
pub use engine::cockroach::{ConnectionDescriptor, ConnectionFactory};
pub use engine::{ConnectionInfo, SessionFactory, SqlSession, TextRow};
pub use error::{ConfigIssue, ProviderError, Result};
pub use output::{Diagnostic, ErrorEnvelope, ErrorInfo, Metadata, Severity, SuccessEnvelope};
pub use privilege::{PrivilegeName, PrivilegeSet};
pub use reconcile::{ChangefeedRecord, DatabaseRecord, ReadOutcome, UserRecord};
