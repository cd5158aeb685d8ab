//! Shared test utilities for the integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

pub use datamill::*;
pub use serde_json::{json, Value};
use std::sync::mpsc::Receiver;
use std::sync::{Mutex, Once};
use std::time::Duration;

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Route engine logs to the test harness output.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
            .try_init();
    });
}

pub const ACME: &str = "urn:acme:1.0";
pub const HYPERFOIL: &str = "urn:hyperfoil:benchmark:0.1";

/// A pipeline with a small worker pool.
pub fn open_mill() -> Datamill {
    init_tracing();
    Datamill::open(DatamillConfig {
        worker_threads: 2,
        ..DatamillConfig::default()
    })
    .unwrap()
}

// ============================================================================
// TestMill - pipeline with one registered schema and test
// ============================================================================

/// Pipeline with schema [`ACME`] and one test.
pub struct TestMill {
    pub mill: Datamill,
    pub test: Test,
    bound: Mutex<Vec<TransformerId>>,
}

impl TestMill {
    pub fn new(name: &str) -> Self {
        Self::with_def(TestDef::new(name))
    }

    pub fn with_def(def: TestDef) -> Self {
        let mill = open_mill();
        mill.create_schema(ACME, "acme").unwrap();
        let test = mill.create_test(def).unwrap();
        TestMill {
            mill,
            test,
            bound: Mutex::new(Vec::new()),
        }
    }

    /// Register a label on [`ACME`] reading `$.<name>`.
    pub fn label(&self, name: &str) -> LabelId {
        self.mill
            .add_label(ACME, LabelDef::new(name, Extractor::new(name, format!("$.{}", name), false)))
            .unwrap()
    }

    /// Register a transformer and add it to the test's bindings.
    pub fn transformer(&self, def: TransformerDef) -> TransformerId {
        let id = self.mill.add_transformer(def).unwrap();
        let mut bound = self.bound.lock().unwrap();
        bound.push(id);
        self.mill.bind_transformers(self.test.id, &bound).unwrap();
        id
    }

    /// Upload a payload and wait until it is processed.
    pub fn upload(&self, data: Value) -> RunId {
        let run = self
            .mill
            .upload_json(self.test.id, data, UploadOptions::default())
            .unwrap();
        self.mill.wait_idle();
        run
    }

    pub fn datasets(&self, run: RunId) -> Vec<Dataset> {
        self.mill.datasets_of_run(run).unwrap()
    }

    pub fn label_values(&self, query: LabelValuesQuery) -> Page<ExportedLabelValues> {
        self.mill.label_values(self.test.id, &query).unwrap()
    }

    pub fn log(&self, min_level: LogLevel) -> Vec<PersistentLogEntry> {
        self.mill
            .log(self.test.id, min_level, Pagination::unlimited())
            .unwrap()
            .items
    }
}

// ============================================================================
// Events
// ============================================================================

/// Everything delivered so far.
pub fn drain(rx: &Receiver<Event>) -> Vec<Event> {
    rx.try_iter().collect()
}

/// Wait for the next event, failing the test after a few seconds.
pub fn next_event(rx: &Receiver<Event>) -> Event {
    rx.recv_timeout(Duration::from_secs(5)).unwrap()
}

pub fn dataset_created(events: &[Event]) -> Vec<DatasetCreated> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::DatasetCreated(created) => Some(*created),
            _ => None,
        })
        .collect()
}
