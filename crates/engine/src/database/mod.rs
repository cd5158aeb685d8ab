//! Datamill struct and open/close logic
//!
//! This module provides the main [`Datamill`] struct that orchestrates:
//! - Configuration loading
//! - The catalog of tests, schemas, transformers, labels, runs and datasets
//! - Run ingestion on the background worker pool
//! - Label value queries against committed snapshots
//! - Recalculation of every run of a test
//! - Event delivery to subscribers
//!
//! ## Processing model
//!
//! `upload_run` validates and stores the run synchronously, then queues its
//! processing. Datasets and label values appear asynchronously; subscribe
//! to [`EventKind::DatasetCreated`] or call [`Datamill::wait_idle`] to observe
//! them.

pub mod config;

pub use config::{DatamillConfig, CONFIG_FILE_NAME};

use crate::background::{PoolStats, WorkPriority, WorkerPool};
use crate::builder::{BuildMetrics, BuildMode, BuildOutcome, DatasetBuilder};
use crate::bus::EventBus;
use crate::catalog::Catalog;
use crate::extract::find_schema_document;
use crate::labels::{fingerprint_value, LabelStore};
use crate::recalc::{Recalculation, RecalculationCoordinator, RecalculationStatus, RecalculationTrigger};
use chrono::Utc;
use datamill_core::json::validate_document;
use datamill_core::run_types::stamp_schema;
use datamill_core::{
    ConfigItem, Dataset, DatasetId, DatasetSummary, Error, Event, EventKind, ExportedLabelValues,
    Fingerprints, LabelDef, LabelId, LabelValuesQuery, LogLevel, Page, Pagination, PathExpr, PersistentLogEntry,
    QueryResult, RecalculationProgress, Result, Run, RunCount, RunCreated, RunId, Schema, Test,
    TestDef, TestDeleted, TestListQuery, TestRef, TransformerDef, TransformerId,
    UploadOptions,
};
use serde_json::Value;
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tracing::{error, info, warn};

// ============================================================================
// Pipeline
// ============================================================================

/// State shared with work units on the pool
///
/// Work units hold this, never the pool itself.
struct Pipeline {
    catalog: Arc<Catalog>,
    labels: Arc<LabelStore>,
    bus: Arc<EventBus>,
    builder: DatasetBuilder,
    recalc: RecalculationCoordinator,
}

impl Pipeline {
    fn ingest(&self, run: RunId) {
        if let Err(e) = self.builder.build(run, BuildMode::Initial) {
            error!(target: "datamill::ingest", run_id = %run, error = %e, "Run processing failed");
        }
    }

    fn recalculate(&self, state: &Recalculation, run: RunId) {
        if state.is_cancelled() {
            state.skip_run(run);
            return;
        }
        match self.builder.build(run, BuildMode::Recalculation) {
            Ok(BuildOutcome::Built(ids)) => {
                if let Some(finished) = state.finish_run(run, ids.len()) {
                    self.bus.publish(RecalculationProgress {
                        test_id: state.test_id(),
                        finished,
                        total: state.total(),
                    });
                }
            }
            Ok(BuildOutcome::Skipped) => state.skip_run(run),
            Err(e) => {
                error!(target: "datamill::recalc", run_id = %run, error = %e, "Run recalculation failed");
                state.skip_run(run);
            }
        }
    }
}

// ============================================================================
// Datamill Struct
// ============================================================================

/// The run to dataset pipeline
///
/// Create one with [`Datamill::open`]. Dropping it stops the worker pool
/// after the queued work has run.
///
/// # Example
///
/// ```text
/// use datamill_engine::Datamill;
///
/// let mill = Datamill::open_default()?;
/// mill.create_schema("urn:acme:1.0", "acme")?;
/// let test = mill.create_test(TestDef::new("acme"))?;
/// let run = mill.upload_run(test.id, r#"{"$schema": "urn:acme:1.0"}"#, UploadOptions::default())?;
/// mill.wait_idle();
/// ```
pub struct Datamill {
    pipeline: Arc<Pipeline>,
    pool: WorkerPool,
    config: DatamillConfig,
}

impl Datamill {
    /// Open with an explicit configuration
    pub fn open(config: DatamillConfig) -> Result<Self> {
        config.validate()?;
        let catalog = Arc::new(Catalog::new(config.min_log_level()?));
        let labels = Arc::new(LabelStore::new());
        let bus = Arc::new(EventBus::new());
        let builder = DatasetBuilder::new(Arc::clone(&catalog), Arc::clone(&labels), Arc::clone(&bus));
        let pool = WorkerPool::new(config.worker_threads, config.max_queue_depth)?;

        info!(
            target: "datamill::config",
            worker_threads = config.worker_threads,
            max_queue_depth = config.max_queue_depth,
            max_document_bytes = config.max_document_bytes,
            log_level = %config.log_level,
            "Datamill opened"
        );
        Ok(Datamill {
            pipeline: Arc::new(Pipeline {
                catalog,
                labels,
                bus,
                builder,
                recalc: RecalculationCoordinator::new(),
            }),
            pool,
            config,
        })
    }

    /// Open with the default configuration
    pub fn open_default() -> Result<Self> {
        Self::open(DatamillConfig::default())
    }

    /// Open with the configuration at `path`, writing the default file first
    /// if there is none
    pub fn open_with_config_file(path: &Path) -> Result<Self> {
        Self::open(DatamillConfig::load_or_init(path)?)
    }

    /// Active configuration
    pub fn config(&self) -> &DatamillConfig {
        &self.config
    }

    fn catalog(&self) -> &Catalog {
        &self.pipeline.catalog
    }

    fn resolve(&self, test: impl Into<TestRef>) -> Result<Test> {
        self.catalog().resolve(&test.into())
    }

    // ========================================================================
    // Schemas, transformers, labels
    // ========================================================================

    /// Register a schema
    pub fn create_schema(&self, uri: &str, name: &str) -> Result<Schema> {
        self.catalog().add_schema(uri, name)
    }

    /// Register a transformer on an existing schema
    pub fn add_transformer(&self, def: TransformerDef) -> Result<TransformerId> {
        self.catalog().add_transformer(def)
    }

    /// Select the transformers a test applies, replacing earlier bindings
    pub fn bind_transformers(&self, test: impl Into<TestRef>, ids: &[TransformerId]) -> Result<()> {
        let test = self.resolve(test)?;
        self.catalog().bind_transformers(test.id, ids)
    }

    /// Register a label on an existing schema
    pub fn add_label(&self, schema_uri: &str, def: LabelDef) -> Result<LabelId> {
        self.catalog().add_label(schema_uri, def)
    }

    // ========================================================================
    // Tests
    // ========================================================================

    /// Create a test
    pub fn create_test(&self, def: TestDef) -> Result<Test> {
        let test = self.catalog().create_test(def)?;
        self.catalog().log(test.id, None, LogLevel::Debug, format!("Test '{}' created", test.name));
        info!(target: "datamill::ingest", test_id = %test.id, name = %test.name, "Test created");
        Ok(test)
    }

    /// Test by id or name
    pub fn get_test(&self, test: impl Into<TestRef>) -> Result<Test> {
        self.resolve(test)
    }

    /// Tests of a folder, sorted by name
    pub fn list_tests(&self, query: &TestListQuery) -> Page<Test> {
        self.catalog().list_tests(query)
    }

    /// Delete a test and its configuration
    ///
    /// Runs and datasets stay; every run of the test is marked trashed.
    pub fn delete_test(&self, test: impl Into<TestRef>) -> Result<Test> {
        let test = self.resolve(test)?;
        let removed = self.catalog().remove_test(test.id)?;
        let mut trashed = 0usize;
        for run in self.catalog().runs_of(test.id) {
            if self.pipeline.builder.retire(run.id)? {
                trashed += 1;
            }
        }
        self.pipeline.recalc.cancel(test.id);
        self.pipeline.recalc.forget(test.id);
        self.pipeline.bus.publish(TestDeleted { test_id: test.id });
        info!(target: "datamill::ingest", test_id = %test.id, name = %test.name, trashed_runs = trashed, "Test deleted");
        Ok(removed)
    }

    /// Store a configuration item of a test
    pub fn put_config_item(&self, test: impl Into<TestRef>, item: ConfigItem) -> Result<()> {
        let test = self.resolve(test)?;
        self.catalog().put_config_item(test.id, item)
    }

    /// Configuration items of a test
    pub fn config_items(&self, test: impl Into<TestRef>) -> Result<Vec<ConfigItem>> {
        let test = self.resolve(test)?;
        Ok(self.catalog().config_items(test.id))
    }

    // ========================================================================
    // Runs
    // ========================================================================

    /// Upload a run from JSON text
    ///
    /// Fails with `TestNotFound` for an unknown test and `InvalidInput` for a
    /// payload that is not JSON. Processing happens on the worker pool.
    pub fn upload_run(&self, test: impl Into<TestRef>, payload: &str, options: UploadOptions) -> Result<RunId> {
        let test = self.resolve(test)?;
        let data: Value = serde_json::from_str(payload)
            .map_err(|e| Error::invalid_input(format!("run payload is not valid JSON: {}", e)))?;
        self.ingest(test, data, payload.len(), options)
    }

    /// Upload an already parsed run
    pub fn upload_json(&self, test: impl Into<TestRef>, data: Value, options: UploadOptions) -> Result<RunId> {
        let test = self.resolve(test)?;
        let encoded_len = serde_json::to_vec(&data)?.len();
        self.ingest(test, data, encoded_len, options)
    }

    fn ingest(&self, test: Test, mut data: Value, encoded_len: usize, options: UploadOptions) -> Result<RunId> {
        validate_document(&data, encoded_len, self.config.max_document_bytes)?;
        if let Some(uri) = options.schema_uri.as_deref() {
            stamp_schema(&mut data, uri);
        }

        let now = Utc::now();
        let start = options.start.unwrap_or(now);
        let run = Run {
            id: self.catalog().next_run_id(),
            test_id: test.id,
            data,
            start,
            stop: options.stop.unwrap_or(start),
            uploaded: now,
            description: options.description,
            trashed: false,
        };
        let run_id = run.id;

        // Held until RunCreated is out, so no dataset event of this run precedes it
        let lock = self.pipeline.builder.run_lock(run_id);
        let _guard = lock.lock();
        self.catalog().insert_run(run);

        let pipeline = Arc::clone(&self.pipeline);
        if let Err(e) = self
            .pool
            .submit(WorkPriority::Ingest, format!("ingest run {}", run_id), move || pipeline.ingest(run_id))
        {
            self.catalog().remove_run(run_id);
            self.pipeline.builder.release_run_lock(run_id, &lock);
            warn!(target: "datamill::ingest", run_id = %run_id, test_id = %test.id, "Upload rejected, worker queue full");
            return Err(e);
        }
        self.pipeline.bus.publish(RunCreated {
            run_id,
            test_id: test.id,
        });
        info!(target: "datamill::ingest", run_id = %run_id, test_id = %test.id, bytes = encoded_len, "Run uploaded");
        Ok(run_id)
    }

    /// Run by id
    pub fn get_run(&self, run: RunId) -> Result<Run> {
        self.catalog().run(run).ok_or(Error::RunNotFound(run))
    }

    /// Trash or restore a run
    ///
    /// Trashing drops the run's datasets and label values. Restoring queues
    /// the run for processing again. Setting the current state is a no-op.
    pub fn trash_run(&self, run: RunId, trashed: bool) -> Result<()> {
        let Some(changed) = self.pipeline.builder.set_trashed(run, trashed)? else {
            return Ok(());
        };
        info!(target: "datamill::ingest", run_id = %run, test_id = %changed.test_id, trashed, "Run trash flag changed");
        if !trashed {
            let pipeline = Arc::clone(&self.pipeline);
            self.pool
                .submit(WorkPriority::Ingest, format!("ingest run {}", run), move || pipeline.ingest(run))?;
        }
        Ok(())
    }

    /// Evaluate an ad-hoc path against a run
    ///
    /// With `schema_uri`, the path is evaluated against the first document
    /// declaring that schema. An unparsable path or an absent schema gives an
    /// invalid result rather than an error.
    pub fn query_run(&self, run: RunId, path: &str, array: bool, schema_uri: Option<&str>) -> Result<QueryResult> {
        let run = self.get_run(run)?;
        let expr: PathExpr = match path.parse() {
            Ok(expr) => expr,
            Err(e) => return Ok(QueryResult::invalid(format!("{}", e))),
        };
        let doc = match schema_uri {
            Some(uri) => match find_schema_document(&run.data, uri) {
                Some(doc) => doc,
                None => return Ok(QueryResult::invalid(format!("no document declares schema '{}'", uri))),
            },
            None => &run.data,
        };
        let value = if array {
            expr.query_array(doc)
        } else {
            expr.first(doc).cloned().unwrap_or(Value::Null)
        };
        Ok(QueryResult::ok(value))
    }

    /// Run counts of a test
    pub fn run_count(&self, test: impl Into<TestRef>) -> Result<RunCount> {
        let test = self.resolve(test)?;
        let runs = self.catalog().runs_of(test.id);
        let trashed = runs.iter().filter(|r| r.trashed).count() as u64;
        Ok(RunCount {
            active: runs.len() as u64 - trashed,
            trashed,
            total: runs.len() as u64,
        })
    }

    /// Runs of a test by id; trashed runs only when `trashed` is set
    pub fn list_runs(&self, test: impl Into<TestRef>, trashed: bool, pagination: Pagination) -> Result<Page<Run>> {
        let test = self.resolve(test)?;
        let runs = self
            .catalog()
            .runs_of(test.id)
            .into_iter()
            .filter(|r| trashed || !r.trashed)
            .collect();
        Ok(Page::paginate(runs, pagination))
    }

    // ========================================================================
    // Datasets
    // ========================================================================

    /// Dataset by id
    pub fn get_dataset(&self, id: DatasetId) -> Option<Dataset> {
        self.catalog().dataset(id)
    }

    /// Current datasets of a run, by ordinal
    pub fn datasets_of_run(&self, run: RunId) -> Result<Vec<Dataset>> {
        self.get_run(run)?;
        Ok(self.catalog().datasets_of_run(run))
    }

    /// Datasets of a test by id, with their fingerprints
    pub fn list_datasets(&self, test: impl Into<TestRef>, pagination: Pagination) -> Result<Page<DatasetSummary>> {
        let test = self.resolve(test)?;
        let snapshot = self.pipeline.labels.snapshot(test.id);
        let summaries = self
            .catalog()
            .datasets_of_test(test.id)
            .into_iter()
            .map(|d| DatasetSummary {
                fingerprint: snapshot
                    .get(d.id)
                    .and_then(|row| fingerprint_value(&row.values, &test.fingerprint_labels)),
                id: d.id,
                run_id: d.run_id,
                ordinal: d.ordinal,
                test_id: d.test_id,
                start: d.start,
                stop: d.stop,
            })
            .collect();
        Ok(Page::paginate(summaries, pagination))
    }

    /// Datasets of a test whose fingerprint equals `fingerprint`
    pub fn datasets_by_fingerprint(&self, test: impl Into<TestRef>, fingerprint: &Value) -> Result<Vec<DatasetId>> {
        let test = self.resolve(test)?;
        Ok(self
            .pipeline
            .labels
            .datasets_by_fingerprint(test.id, &test.fingerprint_labels, fingerprint))
    }

    // ========================================================================
    // Labels and fingerprints
    // ========================================================================

    /// Filtered, projected, paginated label values of a test
    pub fn label_values(&self, test: impl Into<TestRef>, query: &LabelValuesQuery) -> Result<Page<ExportedLabelValues>> {
        let test = self.resolve(test)?;
        Ok(self.pipeline.labels.query(test.id, query))
    }

    /// Distinct fingerprints of a test
    pub fn fingerprints(&self, test: impl Into<TestRef>) -> Result<Vec<Fingerprints>> {
        let test = self.resolve(test)?;
        Ok(self.pipeline.labels.fingerprints(test.id, &test.fingerprint_labels))
    }

    // ========================================================================
    // Recalculation
    // ========================================================================

    /// Reprocess every active run of a test
    ///
    /// Returns [`RecalculationTrigger::AlreadyRunning`] while an earlier
    /// recalculation of the test is in flight.
    pub fn trigger_recalculation(&self, test: impl Into<TestRef>) -> Result<RecalculationTrigger> {
        let test = self.resolve(test)?;
        let runs: Vec<RunId> = self
            .catalog()
            .runs_of(test.id)
            .into_iter()
            .filter(|r| !r.trashed)
            .map(|r| r.id)
            .collect();

        let state = match self.pipeline.recalc.begin(test.id, runs.len() as u64) {
            Ok(state) => state,
            Err(answer) => return Ok(answer),
        };
        for (queued, run) in runs.iter().copied().enumerate() {
            let pipeline = Arc::clone(&self.pipeline);
            let unit_state = Arc::clone(&state);
            let submitted = self.pool.submit(
                WorkPriority::Recalculation,
                format!("recalculate run {}", run),
                move || pipeline.recalculate(&unit_state, run),
            );
            if let Err(e) = submitted {
                self.pipeline.recalc.cancel(test.id);
                state.abandon((runs.len() - queued) as u64);
                warn!(target: "datamill::recalc", test_id = %test.id, queued, total = runs.len(), "Recalculation aborted, worker queue full");
                return Err(e);
            }
        }
        Ok(RecalculationTrigger::Accepted)
    }

    /// Progress of the latest recalculation of a test
    pub fn recalculation_status(&self, test: impl Into<TestRef>) -> Result<RecalculationStatus> {
        let test = self.resolve(test)?;
        Ok(self.pipeline.recalc.status(test.id))
    }

    /// Stop dispatching runs of a test's recalculation; returns whether one
    /// was running
    pub fn cancel_recalculation(&self, test: impl Into<TestRef>) -> Result<bool> {
        let test = self.resolve(test)?;
        Ok(self.pipeline.recalc.cancel(test.id))
    }

    // ========================================================================
    // Log and events
    // ========================================================================

    /// Persistent log of a test, newest first
    pub fn log(&self, test: impl Into<TestRef>, min_level: LogLevel, pagination: Pagination) -> Result<Page<PersistentLogEntry>> {
        let test = self.resolve(test)?;
        Ok(Page::paginate(self.catalog().log_entries(test.id, min_level), pagination))
    }

    /// Subscribe to one event kind
    pub fn subscribe(&self, kind: EventKind) -> Receiver<Event> {
        self.pipeline.bus.subscribe(kind)
    }

    /// Subscribe to several event kinds on one channel
    pub fn subscribe_many(&self, kinds: &[EventKind]) -> Receiver<Event> {
        self.pipeline.bus.subscribe_many(kinds)
    }

    /// Subscribe to every event
    pub fn subscribe_all(&self) -> Receiver<Event> {
        self.pipeline.bus.subscribe_all()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Block until every queued run has been processed
    pub fn wait_idle(&self) {
        self.pool.drain();
    }

    /// Worker pool metrics
    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Dataset build counters
    pub fn build_metrics(&self) -> &BuildMetrics {
        self.pipeline.builder.metrics()
    }

    /// Finish queued work and stop the workers; later uploads are rejected
    pub fn shutdown(&self) {
        self.pool.shutdown();
        info!(target: "datamill::config", "Datamill shut down");
    }
}
