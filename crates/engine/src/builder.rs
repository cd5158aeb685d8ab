//! Dataset builder
//!
//! The write path of the pipeline. One build of a run:
//! 1. plans fragment lists with the transformer engine
//! 2. supersedes the run's previous datasets and label values
//! 3. commits the new datasets with fresh ids and ordinals from 0
//! 4. computes and commits label values
//! 5. publishes `DatasetCreated` and `LabelsUpdated`
//!
//! Builds of the same run are serialized by a per-run lock held for the
//! whole build, so ordinals never interleave and events of one run are
//! published in order.

use crate::bus::EventBus;
use crate::catalog::Catalog;
use crate::labels::{compute_label_values, LabelStore};
use crate::transform::{plan_run, Note};
use dashmap::DashMap;
use datamill_core::{
    Dataset, DatasetCreated, DatasetId, ExportedLabelValues, LabelsUpdated, Result, Run, RunId,
    RunTrashed, TestId,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Why a run is being built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    /// First computation after upload or untrash
    Initial,
    /// Part of a recalculation
    Recalculation,
}

/// Result of one build
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Datasets committed, possibly none
    Built(Vec<DatasetId>),
    /// The run is trashed or its test is gone; nothing was built
    Skipped,
}

/// Build counters
#[derive(Debug, Default)]
pub struct BuildMetrics {
    /// Builds completed
    pub builds: AtomicU64,
    /// Datasets committed
    pub datasets: AtomicU64,
    /// Builds skipped
    pub skipped: AtomicU64,
}

/// Shared state of the write path
pub struct DatasetBuilder {
    catalog: Arc<Catalog>,
    labels: Arc<LabelStore>,
    bus: Arc<EventBus>,
    run_locks: DashMap<RunId, Arc<Mutex<()>>>,
    metrics: BuildMetrics,
}

impl DatasetBuilder {
    /// Builder over the given stores
    pub fn new(catalog: Arc<Catalog>, labels: Arc<LabelStore>, bus: Arc<EventBus>) -> Self {
        DatasetBuilder {
            catalog,
            labels,
            bus,
            run_locks: DashMap::new(),
            metrics: BuildMetrics::default(),
        }
    }

    /// Lock serializing every change to one run's datasets
    pub fn run_lock(&self, run: RunId) -> Arc<Mutex<()>> {
        self.run_locks.entry(run).or_default().value().clone()
    }

    /// Drop the lock of a run that needs no further builds
    ///
    /// Call while holding `lock` and as the last step under it. The entry is
    /// kept while anyone else holds or waits on the lock.
    pub fn release_run_lock(&self, run: RunId, lock: &Arc<Mutex<()>>) {
        self.run_locks
            .remove_if(&run, |_, held| Arc::ptr_eq(held, lock) && Arc::strong_count(held) <= 2);
    }

    #[cfg(test)]
    pub(crate) fn tracked_run_locks(&self) -> usize {
        self.run_locks.len()
    }

    /// Build counters
    pub fn metrics(&self) -> &BuildMetrics {
        &self.metrics
    }

    fn record(&self, test: TestId, run: RunId, notes: Vec<Note>) {
        for note in notes {
            self.catalog.log(test, Some(run), note.level, note.message);
        }
    }

    /// Build the datasets of a run, replacing any earlier ones
    pub fn build(&self, run_id: RunId, mode: BuildMode) -> Result<BuildOutcome> {
        let lock = self.run_lock(run_id);
        let _guard = lock.lock();
        let started = Instant::now();

        let Some(run) = self.catalog.run(run_id) else {
            self.release_run_lock(run_id, &lock);
            return Err(datamill_core::Error::RunNotFound(run_id));
        };
        let test = match self.catalog.test(run.test_id) {
            Some(test) if !run.trashed => test,
            _ => {
                self.metrics.skipped.fetch_add(1, Ordering::Relaxed);
                debug!(target: "datamill::ingest", run_id = %run_id, trashed = run.trashed, "Skipped build");
                self.release_run_lock(run_id, &lock);
                return Ok(BuildOutcome::Skipped);
            }
        };

        let plan = plan_run(&run.data, |uri| {
            self.catalog
                .has_schema(uri)
                .then(|| self.catalog.transformers_for(test.id, uri))
        });
        if plan.notes.iter().any(|n| n.level >= datamill_core::LogLevel::Error) {
            warn!(target: "datamill::transform", run_id = %run_id, test_id = %test.id, "Transformer failures recorded in the test log");
        }
        self.record(test.id, run_id, plan.notes);

        let datasets: Vec<Dataset> = plan
            .datasets
            .into_iter()
            .enumerate()
            .map(|(ordinal, fragments)| Dataset {
                id: self.catalog.next_dataset_id(),
                run_id,
                test_id: test.id,
                ordinal: ordinal as u32,
                data: serde_json::Value::Array(fragments),
                start: run.start,
                stop: run.stop,
                is_recalculation: mode == BuildMode::Recalculation,
            })
            .collect();

        let mut rows = Vec::with_capacity(datasets.len());
        for dataset in &datasets {
            let (values, notes) = compute_label_values(dataset, |uri| self.catalog.labels_for(uri));
            self.record(test.id, run_id, notes);
            rows.push(ExportedLabelValues {
                values,
                run_id,
                dataset_id: dataset.id,
                start: run.start,
                stop: run.stop,
            });
        }

        let ids: Vec<DatasetId> = datasets.iter().map(|d| d.id).collect();
        let events: Vec<DatasetCreated> = datasets
            .iter()
            .map(|d| DatasetCreated {
                dataset_id: d.id,
                run_id,
                test_id: test.id,
                ordinal: d.ordinal,
                is_recalculation: d.is_recalculation,
            })
            .collect();

        let removed = self.catalog.replace_datasets(run_id, datasets);
        self.labels.commit(test.id, &removed, rows);

        for event in events {
            self.bus.publish(event);
        }
        for id in &ids {
            self.bus.publish(LabelsUpdated {
                dataset_id: *id,
                test_id: test.id,
            });
        }

        self.metrics.builds.fetch_add(1, Ordering::Relaxed);
        self.metrics.datasets.fetch_add(ids.len() as u64, Ordering::Relaxed);
        debug!(
            target: "datamill::ingest",
            run_id = %run_id,
            test_id = %test.id,
            datasets = ids.len(),
            superseded = removed.len(),
            ?mode,
            elapsed_us = started.elapsed().as_micros() as u64,
            "Built datasets"
        );
        Ok(BuildOutcome::Built(ids))
    }

    /// Trash or restore a run; returns the run when the flag changed
    ///
    /// Trashing removes the run's datasets and label values and publishes
    /// `RunTrashed`. Restoring leaves rebuilding to the caller.
    pub fn set_trashed(&self, run_id: RunId, trashed: bool) -> Result<Option<Run>> {
        let lock = self.run_lock(run_id);
        let _guard = lock.lock();

        let Some(run) = self.catalog.set_trashed(run_id, trashed)? else {
            if trashed {
                self.release_run_lock(run_id, &lock);
            }
            return Ok(None);
        };
        if trashed {
            let removed = self.catalog.remove_datasets_of(run_id);
            self.labels.commit(run.test_id, &removed, Vec::new());
            self.bus.publish(RunTrashed {
                run_id,
                test_id: run.test_id,
            });
            self.release_run_lock(run_id, &lock);
        }
        Ok(Some(run))
    }

    /// Trash a run of a deleted test, keeping its datasets and label values
    pub fn retire(&self, run_id: RunId) -> Result<bool> {
        let lock = self.run_lock(run_id);
        let _guard = lock.lock();

        let Some(run) = self.catalog.set_trashed(run_id, true)? else {
            self.release_run_lock(run_id, &lock);
            return Ok(false);
        };
        self.bus.publish(RunTrashed {
            run_id,
            test_id: run.test_id,
        });
        self.release_run_lock(run_id, &lock);
        Ok(true)
    }
}
