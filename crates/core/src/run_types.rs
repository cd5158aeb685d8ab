//! Run types
//!
//! A run is one uploaded raw JSON performance-test result. The payload is
//! immutable after upload; only the trashed flag and description change.

use crate::types::{RunId, TestId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An uploaded run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    /// Run id
    pub id: RunId,
    /// Owning test
    pub test_id: TestId,
    /// Raw payload, with schema hints already stamped in
    pub data: Value,
    /// When the measured run started
    pub start: DateTime<Utc>,
    /// When the measured run stopped
    pub stop: DateTime<Utc>,
    /// When the run was uploaded
    pub uploaded: DateTime<Utc>,
    /// Free-form description
    pub description: Option<String>,
    /// Trashed runs produce no datasets and are skipped by recalculation
    pub trashed: bool,
}

/// Upload parameters beyond the payload itself
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadOptions {
    /// Schema URI stamped on documents lacking `$schema`
    pub schema_uri: Option<String>,
    /// Run start; defaults to upload time
    pub start: Option<DateTime<Utc>>,
    /// Run stop; defaults to `start`
    pub stop: Option<DateTime<Utc>>,
    /// Description
    pub description: Option<String>,
}

impl UploadOptions {
    /// Options carrying only a schema hint
    pub fn with_schema(uri: impl Into<String>) -> Self {
        UploadOptions {
            schema_uri: Some(uri.into()),
            ..Default::default()
        }
    }
}

/// Run counts for one test
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCount {
    /// Runs not trashed
    pub active: u64,
    /// Trashed runs
    pub trashed: u64,
    /// All runs
    pub total: u64,
}

/// Result of an ad-hoc path query against a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Whether the query could be evaluated
    pub valid: bool,
    /// Query result; null when invalid
    pub value: Value,
    /// Why the query is invalid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl QueryResult {
    /// Successful query
    pub fn ok(value: Value) -> Self {
        QueryResult {
            valid: true,
            value,
            reason: None,
        }
    }

    /// Failed query
    pub fn invalid(reason: impl Into<String>) -> Self {
        QueryResult {
            valid: false,
            value: Value::Null,
            reason: Some(reason.into()),
        }
    }
}

/// Stamp an upload's schema URI onto its documents
///
/// An object gets `$schema` at the root, replacing any declaration it had.
/// For a top-level array every object element without a `$schema` gets it.
/// Other payloads are left untouched.
pub fn stamp_schema(data: &mut Value, uri: &str) {
    use crate::schema::SCHEMA_KEY;
    match data {
        Value::Object(obj) => {
            obj.insert(SCHEMA_KEY.to_string(), Value::String(uri.to_string()));
        }
        Value::Array(items) => {
            for item in items {
                if let Value::Object(obj) = item {
                    obj.entry(SCHEMA_KEY.to_string())
                        .or_insert_with(|| Value::String(uri.to_string()));
                }
            }
        }
        _ => {}
    }
}
