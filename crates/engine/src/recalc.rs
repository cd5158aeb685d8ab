//! Recalculation coordinator
//!
//! Owns one state record per test: created when a recalculation is
//! triggered, updated as each run finishes, and kept after completion so a
//! later status query still reports the final counts. A trigger while a
//! recalculation of the same test is in flight is rejected.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use datamill_core::{RunId, TestId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// Answer to a recalculation trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecalculationTrigger {
    /// Every active run was queued
    Accepted,
    /// A recalculation of this test is still running
    AlreadyRunning,
}

/// Progress of the latest recalculation of a test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecalculationStatus {
    /// Test
    pub test_id: TestId,
    /// Runs queued by the trigger
    pub total_runs: u64,
    /// Runs reprocessed so far
    pub finished: u64,
    /// Datasets produced so far
    pub datasets: u64,
    /// Still in flight
    pub running: bool,
    /// Cancellation was requested
    pub cancelled: bool,
}

/// State of one recalculation
pub struct Recalculation {
    test_id: TestId,
    total: u64,
    finished_runs: Mutex<HashSet<RunId>>,
    // Runs finished or skipped; completion when this reaches `total`
    settled: AtomicU64,
    datasets: AtomicU64,
    running: AtomicBool,
    cancelled: AtomicBool,
}

impl Recalculation {
    fn new(test_id: TestId, total: u64) -> Self {
        Recalculation {
            test_id,
            total,
            finished_runs: Mutex::new(HashSet::new()),
            settled: AtomicU64::new(0),
            datasets: AtomicU64::new(0),
            running: AtomicBool::new(total > 0),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Test being recalculated
    pub fn test_id(&self) -> TestId {
        self.test_id
    }

    /// Runs queued by the trigger
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Record a reprocessed run; returns the finished count, or `None` if the
    /// run was already counted
    pub fn finish_run(&self, run: RunId, datasets: usize) -> Option<u64> {
        let finished = {
            let mut runs = self.finished_runs.lock();
            if !runs.insert(run) {
                return None;
            }
            runs.len() as u64
        };
        self.datasets.fetch_add(datasets as u64, Ordering::Relaxed);
        self.settle();
        Some(finished)
    }

    /// Record a run that was not reprocessed (cancelled, trashed or gone)
    pub fn skip_run(&self, run: RunId) {
        if self.finished_runs.lock().contains(&run) {
            return;
        }
        self.settle();
    }

    fn settle(&self) {
        let settled = self.settled.fetch_add(1, Ordering::AcqRel) + 1;
        if settled >= self.total && self.running.swap(false, Ordering::AcqRel) {
            info!(
                target: "datamill::recalc",
                test_id = %self.test_id,
                finished = self.finished_runs.lock().len(),
                total = self.total,
                cancelled = self.is_cancelled(),
                "Recalculation finished"
            );
        }
    }

    /// Abandon every run not yet settled
    pub fn abandon(&self, unsettled: u64) {
        for _ in 0..unsettled {
            self.settle();
        }
    }

    /// Current status
    pub fn status(&self) -> RecalculationStatus {
        RecalculationStatus {
            test_id: self.test_id,
            total_runs: self.total,
            finished: self.finished_runs.lock().len() as u64,
            datasets: self.datasets.load(Ordering::Relaxed),
            running: self.running.load(Ordering::Acquire),
            cancelled: self.is_cancelled(),
        }
    }
}

/// Per-test recalculation state
#[derive(Default)]
pub struct RecalculationCoordinator {
    states: DashMap<TestId, Arc<Recalculation>>,
}

impl RecalculationCoordinator {
    /// Coordinator with no recalculation history
    pub fn new() -> Self {
        RecalculationCoordinator::default()
    }

    /// Start a recalculation over `total` runs, unless one is in flight
    pub fn begin(&self, test: TestId, total: u64) -> Result<Arc<Recalculation>, RecalculationTrigger> {
        let fresh = Arc::new(Recalculation::new(test, total));
        match self.states.entry(test) {
            Entry::Occupied(mut slot) => {
                if slot.get().running.load(Ordering::Acquire) {
                    return Err(RecalculationTrigger::AlreadyRunning);
                }
                slot.insert(Arc::clone(&fresh));
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&fresh));
            }
        }
        info!(target: "datamill::recalc", test_id = %test, total, "Recalculation started");
        Ok(fresh)
    }

    /// Status of the latest recalculation; zeros when there was none
    pub fn status(&self, test: TestId) -> RecalculationStatus {
        self.states
            .get(&test)
            .map(|s| s.status())
            .unwrap_or(RecalculationStatus {
                test_id: test,
                total_runs: 0,
                finished: 0,
                datasets: 0,
                running: false,
                cancelled: false,
            })
    }

    /// Request cancellation; returns whether a recalculation was running
    pub fn cancel(&self, test: TestId) -> bool {
        match self.states.get(&test) {
            Some(state) if state.running.load(Ordering::Acquire) => {
                state.cancelled.store(true, Ordering::Release);
                info!(target: "datamill::recalc", test_id = %test, "Recalculation cancellation requested");
                true
            }
            _ => false,
        }
    }

    /// Drop a test's record
    ///
    /// Units still queued hold their own `Arc` and settle against it.
    pub fn forget(&self, test: TestId) {
        self.states.remove(&test);
    }
}
