//! Core types for Datamill
//!
//! This crate defines the I/O-free building blocks of the run to dataset
//! pipeline:
//! - Ids: TestId, RunId, DatasetId, SchemaId, TransformerId, LabelId
//! - Error: Error type hierarchy and FunctionError for user functions
//! - JSON: path expression AST, parser and interpreter; document limits
//! - Model types: Test, Run, Schema, Extractor, Transformer, Label, Dataset
//! - Fingerprints: structural trees of typed values
//! - Label values: filter, projection and ordering semantics
//! - Pagination, event payloads and persistent log entries

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dataset;
pub mod error;
pub mod events;
pub mod fingerprint;
pub mod json;
pub mod label_values;
pub mod log;
pub mod pagination;
pub mod run_types;
pub mod schema;
pub mod test_types;
pub mod types;

pub use dataset::{Dataset, DatasetSummary};
pub use error::{Error, FunctionError, Result};
pub use events::{
    DatasetCreated, Event, EventKind, LabelsUpdated, RecalculationProgress, RunCreated, RunTrashed,
    TestDeleted,
};
pub use fingerprint::{FingerprintValue, Fingerprints, ScalarValue};
pub use json::{
    LimitError, PathExpr, PathParseError, PathStep, MAX_ARRAY_SIZE, MAX_DOCUMENT_SIZE,
    MAX_NESTING_DEPTH, MAX_PATH_LENGTH,
};
pub use label_values::{ExportedLabelValues, LabelFilter, LabelValueRow, LabelValuesQuery};
pub use log::{LogLevel, PersistentLogEntry};
pub use pagination::{Page, Pagination, SortDirection};
pub use run_types::{QueryResult, Run, RunCount, UploadOptions};
pub use schema::{
    Extractor, JsonFunction, Label, LabelDef, Schema, SharedFunction, Transformer, TransformerDef,
    SCHEMA_KEY,
};
pub use test_types::{ConfigItem, ConfigKind, FolderFilter, Test, TestDef, TestListQuery};
pub use types::{DatasetId, LabelId, RunId, SchemaId, TestId, TestRef, TransformerId};
