//! Recalculation Tests
//!
//! Reprocessing every run of a test: new dataset identities, the
//! recalculation flag, progress reporting, rejection of overlapping
//! triggers and cooperative cancellation.

use crate::common::*;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Blocks transformer calls while closed.
#[derive(Default)]
struct Gate {
    closed: Mutex<bool>,
    opened: Condvar,
    entered: AtomicUsize,
}

impl Gate {
    fn close(&self) {
        *self.closed.lock().unwrap() = true;
        self.entered.store(0, Ordering::SeqCst);
    }

    fn open(&self) {
        *self.closed.lock().unwrap() = false;
        self.opened.notify_all();
    }

    fn pass(&self) {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let mut closed = self.closed.lock().unwrap();
        while *closed {
            closed = self.opened.wait(closed).unwrap();
        }
    }

    fn wait_entered(&self, n: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.entered.load(Ordering::SeqCst) < n {
            assert!(Instant::now() < deadline, "gate never reached");
            thread::sleep(Duration::from_millis(1));
        }
    }
}

/// Test whose ACME documents pass through a gated transformer.
fn gated(name: &str) -> (TestMill, Arc<Gate>) {
    let t = TestMill::new(name);
    let gate = Arc::new(Gate::default());
    let g = Arc::clone(&gate);
    t.transformer(
        TransformerDef::new("gated", ACME)
            .target(ACME)
            .function(move |doc: &Value| -> std::result::Result<Value, FunctionError> {
                g.pass();
                Ok(doc.clone())
            }),
    );
    (t, gate)
}

#[test]
fn recalculation_replaces_datasets_with_new_identities() {
    let t = TestMill::new("recalc");
    t.label("n");
    let first = t.upload(json!({"$schema": ACME, "n": 1}));
    let second = t.upload(json!([{"$schema": ACME, "n": 2}, {"$schema": ACME, "n": 3}]));
    let old: Vec<Dataset> = [first, second].iter().flat_map(|r| t.datasets(*r)).collect();
    let old_max = old.iter().map(|d| d.id).max().unwrap();

    let rx = t.mill.subscribe_many(&[EventKind::DatasetCreated, EventKind::RecalculationProgress]);
    assert_eq!(t.mill.trigger_recalculation(t.test.id).unwrap(), RecalculationTrigger::Accepted);
    t.mill.wait_idle();

    let fresh = t.datasets(second);
    assert_eq!(fresh.iter().map(|d| d.ordinal).collect::<Vec<_>>(), vec![0, 1]);
    assert!(fresh.iter().all(|d| d.id > old_max && d.is_recalculation));
    assert_eq!(t.datasets(first).len(), 1);
    assert!(old.iter().all(|d| t.mill.get_dataset(d.id).is_none()));

    let events = drain(&rx);
    let created = dataset_created(&events);
    assert_eq!(created.len(), 3);
    assert!(created.iter().all(|e| e.is_recalculation));
    let progress: BTreeSet<u64> = events
        .iter()
        .filter_map(|e| match e {
            Event::RecalculationProgress(p) => {
                assert_eq!(p.total, 2);
                Some(p.finished)
            }
            _ => None,
        })
        .collect();
    assert_eq!(progress, BTreeSet::from([1, 2]));

    let status = t.mill.recalculation_status(t.test.id).unwrap();
    assert_eq!((status.total_runs, status.finished, status.datasets), (2, 2, 3));
    assert!(!status.running);

    let labels = t.label_values(LabelValuesQuery::new());
    assert_eq!(labels.count, 3);
    assert!(labels.items.iter().all(|r| r.dataset_id > old_max));
}

#[test]
fn trashed_runs_are_not_recalculated() {
    let t = TestMill::new("trashed");
    let keep = t.upload(json!({"$schema": ACME}));
    let trash = t.upload(json!({"$schema": ACME}));
    t.mill.trash_run(trash, true).unwrap();

    t.mill.trigger_recalculation(t.test.id).unwrap();
    t.mill.wait_idle();

    assert_eq!(t.mill.recalculation_status(t.test.id).unwrap().total_runs, 1);
    assert!(t.datasets(keep)[0].is_recalculation);
    assert!(t.datasets(trash).is_empty());
}

#[test]
fn zero_runs_complete_immediately() {
    let t = TestMill::new("empty");
    let rx = t.mill.subscribe(EventKind::RecalculationProgress);

    assert_eq!(t.mill.trigger_recalculation("empty").unwrap(), RecalculationTrigger::Accepted);
    let status = t.mill.recalculation_status(t.test.id).unwrap();
    assert_eq!((status.total_runs, status.finished), (0, 0));
    assert!(!status.running);
    t.mill.wait_idle();
    assert!(drain(&rx).is_empty());
}

#[test]
fn overlapping_trigger_is_rejected() {
    let (t, gate) = gated("overlap");
    t.upload(json!({"$schema": ACME}));

    gate.close();
    assert_eq!(t.mill.trigger_recalculation(t.test.id).unwrap(), RecalculationTrigger::Accepted);
    gate.wait_entered(1);
    assert_eq!(
        t.mill.trigger_recalculation(t.test.id).unwrap(),
        RecalculationTrigger::AlreadyRunning
    );
    assert!(t.mill.recalculation_status(t.test.id).unwrap().running);

    gate.open();
    t.mill.wait_idle();
    let status = t.mill.recalculation_status(t.test.id).unwrap();
    assert_eq!((status.total_runs, status.finished), (1, 1));
    assert!(!status.running);
    assert_eq!(t.mill.trigger_recalculation(t.test.id).unwrap(), RecalculationTrigger::Accepted);
    t.mill.wait_idle();
}

#[test]
fn cancellation_stops_at_run_boundary() {
    let (t, gate) = gated("cancel");
    for _ in 0..4 {
        t.upload(json!({"$schema": ACME}));
    }

    gate.close();
    t.mill.trigger_recalculation(t.test.id).unwrap();
    // Both workers hold a run; the other two are still queued
    gate.wait_entered(2);
    assert!(t.mill.cancel_recalculation(t.test.id).unwrap());
    gate.open();
    t.mill.wait_idle();

    let status = t.mill.recalculation_status(t.test.id).unwrap();
    assert!(status.cancelled);
    assert!(!status.running);
    assert_eq!((status.total_runs, status.finished), (4, 2));
    assert!(!t.mill.cancel_recalculation(t.test.id).unwrap());

    // Runs committed before cancellation keep their recalculated datasets
    let recalculated = t
        .mill
        .list_runs(t.test.id, false, Pagination::unlimited())
        .unwrap()
        .items
        .iter()
        .filter(|r| t.datasets(r.id)[0].is_recalculation)
        .count();
    assert_eq!(recalculated, 2);
}
