//! Event payloads published by the pipeline
//!
//! Payloads are immutable values; subscribers receive their own copy.

use crate::types::{DatasetId, RunId, TestId};
use serde::{Deserialize, Serialize};

/// A run was uploaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunCreated {
    /// Run
    pub run_id: RunId,
    /// Owning test
    pub test_id: TestId,
}

/// A run was trashed, directly or because its test was deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunTrashed {
    /// Run
    pub run_id: RunId,
    /// Owning test
    pub test_id: TestId,
}

/// A dataset was committed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetCreated {
    /// Dataset
    pub dataset_id: DatasetId,
    /// Run
    pub run_id: RunId,
    /// Owning test
    pub test_id: TestId,
    /// Ordinal within the build
    pub ordinal: u32,
    /// Produced by a recalculation
    pub is_recalculation: bool,
}

/// Label values of a dataset were (re)computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelsUpdated {
    /// Dataset
    pub dataset_id: DatasetId,
    /// Owning test
    pub test_id: TestId,
}

/// One more run of a recalculation finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecalculationProgress {
    /// Owning test
    pub test_id: TestId,
    /// Runs finished so far
    pub finished: u64,
    /// Runs in this recalculation
    pub total: u64,
}

/// A test and its configuration were removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDeleted {
    /// Owning test
    pub test_id: TestId,
}

/// Kind of event, one channel per kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum EventKind {
    RunCreated,
    RunTrashed,
    DatasetCreated,
    LabelsUpdated,
    RecalculationProgress,
    TestDeleted,
}

/// Any event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
#[allow(missing_docs)]
pub enum Event {
    RunCreated(RunCreated),
    RunTrashed(RunTrashed),
    DatasetCreated(DatasetCreated),
    LabelsUpdated(LabelsUpdated),
    RecalculationProgress(RecalculationProgress),
    TestDeleted(TestDeleted),
}

impl Event {
    /// Kind of this event
    pub fn kind(&self) -> EventKind {
        match self {
            Event::RunCreated(_) => EventKind::RunCreated,
            Event::RunTrashed(_) => EventKind::RunTrashed,
            Event::DatasetCreated(_) => EventKind::DatasetCreated,
            Event::LabelsUpdated(_) => EventKind::LabelsUpdated,
            Event::RecalculationProgress(_) => EventKind::RecalculationProgress,
            Event::TestDeleted(_) => EventKind::TestDeleted,
        }
    }

    /// Run the event concerns, when it concerns exactly one run
    pub fn run_id(&self) -> Option<RunId> {
        match self {
            Event::RunCreated(e) => Some(e.run_id),
            Event::RunTrashed(e) => Some(e.run_id),
            Event::DatasetCreated(e) => Some(e.run_id),
            Event::LabelsUpdated(_) | Event::RecalculationProgress(_) | Event::TestDeleted(_) => None,
        }
    }

    /// Owning test
    pub fn test_id(&self) -> TestId {
        match self {
            Event::RunCreated(e) => e.test_id,
            Event::RunTrashed(e) => e.test_id,
            Event::DatasetCreated(e) => e.test_id,
            Event::LabelsUpdated(e) => e.test_id,
            Event::RecalculationProgress(e) => e.test_id,
            Event::TestDeleted(e) => e.test_id,
        }
    }
}

macro_rules! event_from {
    ($($name:ident),*) => {
        $(
            impl From<$name> for Event {
                fn from(e: $name) -> Self {
                    Event::$name(e)
                }
            }
        )*
    };
}

event_from!(
    RunCreated,
    RunTrashed,
    DatasetCreated,
    LabelsUpdated,
    RecalculationProgress,
    TestDeleted
);
