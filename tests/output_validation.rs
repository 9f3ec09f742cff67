//! Output Validation Tests
//!
//! Validates the JSON handed back to the host tool:
//! - Success envelopes carry exactly the documented fields
//! - Error envelopes carry a stable code and per-failure diagnostics
//! - Secrets never appear in serialized output
//!
//! Uses `insta` inline snapshots to detect unintended output changes.

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use cockroach_provider::{
    ConfigIssue, ErrorEnvelope, ErrorInfo, Metadata, ProviderError, ResourceResponse, SuccessEnvelope,
    UserRecord,
};

fn keys(value: &Value) -> Vec<&str> {
    value.as_object().unwrap().keys().map(String::as_str).collect()
}

// ============================================================================
// Envelope Structure
// ============================================================================

#[test]
fn test_success_envelope_structure() {
    let response = ResourceResponse {
        new_state: Some(json!({"name": "nate_db", "cascade_on_delete": false})),
        ..Default::default()
    };
    let envelope = SuccessEnvelope::new("database", "create", response, Metadata::new(42));

    let value = serde_json::to_value(&envelope).unwrap();
    let mut top_level = keys(&value);
    top_level.sort_unstable();

    assert_eq!(top_level, vec!["data", "meta", "ok", "operation", "resource"]);
    assert_eq!(value["ok"], true);
    assert_eq!(value["meta"]["execution_ms"], 42);
    assert_eq!(value["data"]["new_state"]["name"], "nate_db");
}

#[test]
fn test_error_envelope_structure() {
    let envelope = ErrorEnvelope::new("", "serve", ErrorInfo::new("IO_ERROR", "broken pipe"));

    let value = serde_json::to_value(&envelope).unwrap();
    let mut top_level = keys(&value);
    top_level.sort_unstable();

    assert_eq!(top_level, vec!["error", "ok", "operation", "resource"]);
    assert_eq!(value["ok"], false);
    assert_eq!(value["error"]["code"], "IO_ERROR");
}

#[test]
fn test_removed_record_serializes_null_state() {
    let envelope = SuccessEnvelope::new("user", "read", ResourceResponse::default(), Metadata::new(3));
    let value = serde_json::to_value(&envelope).unwrap();

    assert!(value["data"]["new_state"].is_null());
    assert!(value["data"].get("drifted").is_none());
}

#[test]
fn test_all_error_codes_are_consistent() {
    let errors = vec![
        (ProviderError::configuration(vec![ConfigIssue::missing("host")]), "CONFIGURATION_ERROR"),
        (ProviderError::connection("refused"), "CONNECTION_ERROR"),
        (ProviderError::validation("truncate"), "VALIDATION_ERROR"),
        (ProviderError::sql_execution("Unable to create user", "boom"), "SQL_EXECUTION_ERROR"),
        (ProviderError::invalid_input("bad"), "INVALID_INPUT"),
        (ProviderError::rebuild_failed(ProviderError::connection("x")), "REBUILD_FAILED"),
    ];

    for (err, expected) in errors {
        let envelope = ErrorEnvelope::from_error("user", "create", &err);
        assert_eq!(envelope.error.code, expected);
        assert!(!envelope.diagnostics.is_empty(), "{expected} should carry diagnostics");
        assert!(envelope.diagnostics.iter().all(|d| d.is_error()));
    }
}

#[test]
fn test_user_password_not_in_debug_output() {
    let record = UserRecord {
        username: "nate".into(),
        password: "correct horse battery staple".into(),
        database: "app".into(),
        privileges: vec!["select".into()],
    };
    let envelope = ErrorEnvelope::from_error(
        "user",
        "create",
        &ProviderError::invalid_input(format!("bad record {record:?}")),
    );

    let json = serde_json::to_string(&envelope).unwrap();
    assert!(!json.contains("correct horse"));
}

// ============================================================================
// Snapshot Tests (using insta)
// ============================================================================

#[test]
fn test_success_envelope_snapshot() {
    let response = ResourceResponse {
        new_state: Some(json!({"name": "Renamed", "cascade_on_delete": false})),
        drifted: vec!["name".to_string()],
        diagnostics: Vec::new(),
    };
    let envelope =
        SuccessEnvelope::new("database", "read", response, Metadata::with_drift(0, vec!["name".to_string()]));

    insta::assert_snapshot!(serde_json::to_string(&envelope).unwrap(), @r#"{"ok":true,"resource":"database","operation":"read","data":{"new_state":{"cascade_on_delete":false,"name":"Renamed"},"drifted":["name"]},"meta":{"execution_ms":0,"drifted":["name"]}}"#);
}

#[test]
fn test_configuration_error_snapshot() {
    let err = ProviderError::configuration(vec![ConfigIssue::unknown("password")]);
    let envelope = ErrorEnvelope::from_error("", "configure", &err);

    insta::assert_snapshot!(serde_json::to_string(&envelope).unwrap(), @r#"{"ok":false,"resource":"","operation":"configure","error":{"code":"CONFIGURATION_ERROR","message":"Configuration error: unknown password"},"diagnostics":[{"severity":"error","summary":"Unknown Cockroach database password","detail":"The provider cannot create a Cockroach database connection because there is an unknown configuration value for the Cockroach database password.","attribute":"password"}]}"#);
}

#[test]
fn test_rebuild_failed_snapshot() {
    let err = ProviderError::rebuild_failed(ProviderError::sql_execution(
        "Unable to create changefeed",
        "ERROR: table \"orders\" does not exist",
    ));
    let envelope = ErrorEnvelope::from_error("changefeed", "update", &err);

    insta::assert_snapshot!(serde_json::to_string(&envelope).unwrap(), @r#"{"ok":false,"resource":"changefeed","operation":"update","error":{"code":"REBUILD_FAILED","message":"Unable to create changefeed, got error: ERROR: table \"orders\" does not exist (the previous object had already been removed)"},"diagnostics":[{"severity":"error","summary":"Update changefeed error","detail":"Unable to create changefeed, got error: ERROR: table \"orders\" does not exist (the previous object had already been removed)"}],"state_removed":true}"#);
}
