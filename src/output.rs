//! JSON Output Envelope Types
//!
//! This module defines the structured output handed back to the host tool:
//! diagnostics for every operation and the envelopes printed by the CLI.
//!
//! # Output Contract
//! - Success: `{"ok": true, "resource": "...", "operation": "...", "data": {...}, "diagnostics": [...], "meta": {...}}`
//! - Error: `{"ok": false, "resource": "...", "operation": "...", "error": {"code": "...", "message": "..."}, "diagnostics": [...]}`

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A structured message for the host tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,

    /// Short title
    pub summary: String,

    /// Long message
    pub detail: String,

    /// Attribute the diagnostic is attached to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self { severity: Severity::Error, summary: summary.into(), detail: detail.into(), attribute: None }
    }

    pub fn warning(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            summary: summary.into(),
            detail: detail.into(),
            attribute: None,
        }
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Success envelope for operation results
///
/// Generic over the data type to support different operation return values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessEnvelope<T> {
    /// Always true for success envelopes
    pub ok: bool,

    /// Resource type the operation targeted (database, user, changefeed)
    pub resource: String,

    /// Operation that was executed (create, read, update, delete, import, check)
    pub operation: String,

    /// Operation-specific data
    pub data: T,

    /// Warnings raised along the way
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,

    /// Execution metadata
    pub meta: Metadata,
}

impl<T> SuccessEnvelope<T> {
    /// Create a new success envelope
    pub fn new(
        resource: impl Into<String>,
        operation: impl Into<String>,
        data: T,
        meta: Metadata,
    ) -> Self {
        Self {
            ok: true,
            resource: resource.into(),
            operation: operation.into(),
            data,
            diagnostics: Vec::new(),
            meta,
        }
    }
}

/// Error envelope for operation failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Always false for error envelopes
    pub ok: bool,

    /// Resource type (empty string if not resource-specific)
    pub resource: String,

    /// Operation that was attempted
    pub operation: String,

    /// Error information
    pub error: ErrorInfo,

    /// Diagnostics describing the failure
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,

    /// The object no longer exists and its record must be dropped from state
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub state_removed: bool,
}

impl ErrorEnvelope {
    /// Create a new error envelope
    pub fn new(resource: impl Into<String>, operation: impl Into<String>, error: ErrorInfo) -> Self {
        Self {
            ok: false,
            resource: resource.into(),
            operation: operation.into(),
            error,
            diagnostics: Vec::new(),
            state_removed: false,
        }
    }

    /// Create error envelope from `ProviderError`
    pub fn from_error(
        resource: impl Into<String>,
        operation: impl Into<String>,
        err: &ProviderError,
    ) -> Self {
        let resource = resource.into();
        let operation = operation.into();
        let summary = if resource.is_empty() {
            format!("{} error", capitalize(&operation))
        } else {
            format!("{} {} error", capitalize(&operation), resource)
        };
        let diagnostics = err.to_diagnostics(&summary);
        Self {
            ok: false,
            resource,
            operation,
            error: ErrorInfo { code: err.error_code().to_string(), message: err.message() },
            diagnostics,
            state_removed: err.object_removed(),
        }
    }
}

/// Error information structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable error code (e.g., "SQL_EXECUTION_ERROR", "CONNECTION_ERROR")
    pub code: String,

    /// Human-readable error message
    pub message: String,
}

impl ErrorInfo {
    /// Create a new error info
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into() }
    }
}

/// Execution metadata included in all success responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// Execution time in milliseconds
    pub execution_ms: u64,

    /// Attributes whose value changed on read (drift), omitted when empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drifted: Vec<String>,
}

impl Metadata {
    /// Create new metadata with just execution time
    pub fn new(execution_ms: u64) -> Self {
        Self { execution_ms, drifted: Vec::new() }
    }

    /// Create new metadata with execution time and drifted attributes
    pub fn with_drift(execution_ms: u64, drifted: Vec<String>) -> Self {
        Self { execution_ms, drifted }
    }
}

/// Uppercase the first character ("create" -> "Create")
pub(crate) fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
