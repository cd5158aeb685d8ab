//! Dataset types
//!
//! A dataset is one normalized, schema-derived view of a run. Its body is
//! always a JSON array; each element is one transformer contribution.

use crate::types::{DatasetId, RunId, TestId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A dataset produced from exactly one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Dataset id, never reused
    pub id: DatasetId,
    /// Source run
    pub run_id: RunId,
    /// Owning test
    pub test_id: TestId,
    /// 0-based position among the datasets of one build of the run
    pub ordinal: u32,
    /// Always a JSON array
    pub data: Value,
    /// Start of the source run
    pub start: DateTime<Utc>,
    /// Stop of the source run
    pub stop: DateTime<Utc>,
    /// Built by a recalculation rather than the first computation
    pub is_recalculation: bool,
}

impl Dataset {
    /// Number of fragments in the body
    pub fn fragment_count(&self) -> usize {
        self.data.as_array().map_or(0, Vec::len)
    }

    /// Fragments of the body
    pub fn fragments(&self) -> &[Value] {
        self.data.as_array().map_or(&[], Vec::as_slice)
    }
}

/// Dataset listing entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    /// Dataset id
    pub id: DatasetId,
    /// Source run
    pub run_id: RunId,
    /// Ordinal within the run
    pub ordinal: u32,
    /// Owning test
    pub test_id: TestId,
    /// Run start
    pub start: DateTime<Utc>,
    /// Run stop
    pub stop: DateTime<Utc>,
    /// Fingerprint, when the test declares fingerprint labels
    pub fingerprint: Option<Value>,
}
