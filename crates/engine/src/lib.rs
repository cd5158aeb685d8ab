//! Pipeline engine for Datamill
//!
//! This crate orchestrates the run to dataset pipeline:
//! - Datamill: main struct with open/close and the external operations
//! - Catalog: tests, schemas, transformers, labels, runs, datasets, log
//! - Extraction and transformation of schema-matched documents
//! - Dataset building with per-run ordering
//! - Label value computation and queries
//! - Recalculation coordination
//! - Background worker pool and event bus
//!
//! Everything below the facade is public so collaborators can reuse the
//! evaluator and transformer engine on their own documents.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod background;
pub mod builder;
pub mod bus;
pub mod catalog;
pub mod database;
pub mod extract;
pub mod labels;
pub mod recalc;
pub mod transform;

pub use background::{PoolStats, WorkPriority, WorkerPool};
pub use builder::{BuildMetrics, BuildMode, BuildOutcome, DatasetBuilder};
pub use bus::EventBus;
pub use catalog::Catalog;
pub use database::{Datamill, DatamillConfig, CONFIG_FILE_NAME};
pub use extract::{Extracted, SchemaDocument};
pub use labels::{LabelStore, TestLabels};
pub use recalc::{RecalculationStatus, RecalculationTrigger};
pub use transform::{Contribution, Note, RunPlan, TransformError};
