//! Changefeed resources
//!
//! A changefeed streams a table's mutations into a Google Cloud Storage
//! bucket. Its identity is the job id the cluster assigns on create; job ids
//! change on every update because update cancels the job and starts a new one.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use super::{execute, query, quote_literal, quote_qualified, use_database, ReadOutcome};
use crate::engine::SqlSession;
use crate::error::{ProviderError, Result};

/// Declared state of a changefeed
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangefeedRecord {
    /// Table to watch, optionally schema-qualified
    pub table: String,

    /// Target bucket name
    pub bucket: String,

    /// Access token for the bucket
    /// WARNING: Sensitive data, do not log
    pub token: String,

    /// Database holding the table
    pub database: String,

    /// Server-assigned job id; absent until created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

impl ChangefeedRecord {
    /// Parsed job id, failing when the record was never created
    pub fn parsed_job_id(&self) -> Result<i64> {
        match &self.job_id {
            Some(id) => parse_job_id(id),
            None => Err(ProviderError::invalid_input(format!(
                "Changefeed on table '{}' has no job_id",
                self.table
            ))),
        }
    }
}

impl fmt::Debug for ChangefeedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangefeedRecord")
            .field("table", &self.table)
            .field("bucket", &self.bucket)
            .field("token", &"****")
            .field("database", &self.database)
            .field("job_id", &self.job_id)
            .finish()
    }
}

/// Build the `gs://` sink URI with the token as a percent-encoded credential
pub fn sink_uri(bucket: &str, token: &str) -> Result<String> {
    let valid_bucket = !bucket.is_empty()
        && bucket
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.'));
    if !valid_bucket {
        return Err(ProviderError::invalid_input(format!("Invalid bucket name '{bucket}'")));
    }

    let mut url = Url::parse(&format!("gs://{bucket}"))
        .map_err(|e| ProviderError::invalid_input(format!("Invalid bucket name '{bucket}': {e}")))?;
    url.query_pairs_mut()
        .append_pair("AUTH", "specified")
        .append_pair("CREDENTIALS", token);

    Ok(url.into())
}

/// Job ids are decimal integers
pub fn parse_job_id(raw: &str) -> Result<i64> {
    raw.trim()
        .parse()
        .map_err(|_| ProviderError::invalid_input(format!("Invalid changefeed job id '{raw}'")))
}

/// Start the changefeed and capture its job id
pub async fn create<S: SqlSession>(session: &mut S, record: &ChangefeedRecord) -> Result<ChangefeedRecord> {
    let sink = sink_uri(&record.bucket, &record.token)?;

    use_database(session, &record.database).await?;

    let sql = format!(
        "CREATE CHANGEFEED FOR TABLE {} INTO {}",
        quote_qualified(&record.table),
        quote_literal(&sink)
    );
    let rows = query(session, &sql, "Unable to create changefeed").await?;

    let raw = rows.first().and_then(|row| row.get(0)).ok_or_else(|| {
        ProviderError::sql_execution("Unable to create changefeed", "no job id was returned")
    })?;
    // the job is already running here, so this is a statement failure
    let job_id = parse_job_id(raw).map_err(|_| {
        ProviderError::sql_execution(
            "Unable to create changefeed",
            format!("the changefeed was started but returned a non-numeric job id '{raw}'"),
        )
    })?;

    info!(table = %record.table, bucket = %record.bucket, job_id, "created changefeed");
    Ok(ChangefeedRecord { job_id: Some(job_id.to_string()), ..record.clone() })
}

/// No drift detection against the live job; the record is kept as is
pub fn read(record: &ChangefeedRecord) -> ReadOutcome<ChangefeedRecord> {
    ReadOutcome::Present(record.clone())
}

/// Cancel the prior job, then start a new one for `desired`
///
/// A failed cancel aborts before anything is created. Failures after the
/// cancel are reported as [`ProviderError::RebuildFailed`].
pub async fn update<S: SqlSession>(
    session: &mut S,
    desired: &ChangefeedRecord,
    prior: &ChangefeedRecord,
) -> Result<ChangefeedRecord> {
    let prior_job = prior.parsed_job_id()?;
    sink_uri(&desired.bucket, &desired.token)?;

    cancel(session, prior_job, "Unable to update changefeed").await?;

    create(session, &ChangefeedRecord { job_id: None, ..desired.clone() })
        .await
        .map_err(ProviderError::rebuild_failed)
}

/// `CANCEL JOB`
pub async fn delete<S: SqlSession>(session: &mut S, record: &ChangefeedRecord) -> Result<()> {
    let job_id = record.parsed_job_id()?;
    cancel(session, job_id, "Unable to delete changefeed").await
}

async fn cancel<S: SqlSession>(session: &mut S, job_id: i64, action: &str) -> Result<()> {
    execute(session, &format!("CANCEL JOB {job_id}"), action).await?;
    info!(job_id, "cancelled changefeed job");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_uri_encodes_token() {
        let uri = sink_uri("cdc-events", "a+b/c=").unwrap();
        assert_eq!(uri, "gs://cdc-events?AUTH=specified&CREDENTIALS=a%2Bb%2Fc%3D");
    }

    #[test]
    fn test_sink_uri_neutralises_quotes_and_parameters() {
        let uri = sink_uri("cdc", "x'&AUTH=implicit").unwrap();
        assert!(!uri.contains('\''));
        assert!(uri.ends_with("CREDENTIALS=x%27%26AUTH%3Dimplicit"));
    }

    #[test]
    fn test_sink_uri_rejects_bad_bucket() {
        for bucket in ["", "Upper", "bucket/path", "b?x=1", "bucket' --"] {
            let err = sink_uri(bucket, "tok").unwrap_err();
            assert_eq!(err.error_code(), "INVALID_INPUT", "bucket {bucket:?}");
        }
    }

    #[test]
    fn test_parse_job_id() {
        assert_eq!(parse_job_id("123").unwrap(), 123);
        assert_eq!(parse_job_id(" 940587139286106113 ").unwrap(), 940_587_139_286_106_113);
        assert!(parse_job_id("123; DROP DATABASE app").is_err());
        assert!(parse_job_id("").is_err());
    }

    #[test]
    fn test_missing_job_id_is_invalid_input() {
        let record = ChangefeedRecord {
            table: "orders".into(),
            bucket: "cdc".into(),
            token: "tok".into(),
            database: "app".into(),
            job_id: None,
        };
        assert_eq!(record.parsed_job_id().unwrap_err().error_code(), "INVALID_INPUT");
        assert_eq!(read(&record), ReadOutcome::Present(record.clone()));
    }

    #[test]
    fn test_debug_masks_token() {
        let record = ChangefeedRecord {
            table: "orders".into(),
            bucket: "cdc".into(),
            token: "very-secret".into(),
            database: "app".into(),
            job_id: Some("7".into()),
        };
        assert!(!format!("{record:?}").contains("very-secret"));
    }
}
