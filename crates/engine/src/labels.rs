//! Label values: computation, committed snapshot and queries
//!
//! Label values are computed from the fragments of a built dataset and
//! committed per run. Readers clone an `Arc` to the committed values of a
//! test and work on that snapshot; a commit swaps in a new version, so a
//! query never waits for a build in progress.

use crate::extract::gather;
use crate::transform::Note;
use datamill_core::schema::{declared_schema, function_input};
use datamill_core::{
    Dataset, DatasetId, ExportedLabelValues, Fingerprints, Label, LabelValuesQuery, LogLevel,
    Page, TestId,
};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Compute the label values of a dataset
///
/// Every fragment declaring a schema is a source for that schema's labels.
/// When two sources define the same label name, the earlier fragment wins.
/// Failing label functions are reported as notes and the label is omitted.
pub fn compute_label_values<F>(dataset: &Dataset, labels_for: F) -> (Map<String, Value>, Vec<Note>)
where
    F: Fn(&str) -> Vec<Label>,
{
    let mut values = Map::new();
    let mut notes = Vec::new();

    for fragment in dataset.fragments() {
        let Some(uri) = declared_schema(fragment) else {
            continue;
        };
        for label in labels_for(uri) {
            if values.contains_key(&label.name) {
                continue;
            }
            let args = match gather(fragment, &label.extractors) {
                Ok(args) => args,
                Err(e) => {
                    notes.push(Note {
                        level: LogLevel::Error,
                        message: format!("Label '{}' has an invalid extractor: {}", label.name, e),
                    });
                    continue;
                }
            };
            let mut named: Vec<(String, Value)> = args
                .values
                .into_iter()
                .map(|(name, v)| (name, v.into_json()))
                .collect();

            let value = match &label.function {
                None if named.len() == 1 => named.pop().map(|(_, v)| v).unwrap_or(Value::Null),
                None => Value::Object(named.into_iter().collect()),
                Some(function) => match function.call(&function_input(named)) {
                    Ok(v) => v,
                    Err(e) => {
                        notes.push(Note {
                            level: LogLevel::Error,
                            message: format!(
                                "Label '{}' failed on dataset {}: {}",
                                label.name, dataset.id, e
                            ),
                        });
                        continue;
                    }
                },
            };
            values.insert(label.name, value);
        }
    }
    (values, notes)
}

/// Fingerprint of a dataset: the fingerprint labels present, in declared order
pub fn fingerprint_value(values: &Map<String, Value>, fingerprint_labels: &[String]) -> Option<Value> {
    let fp: Map<String, Value> = fingerprint_labels
        .iter()
        .filter_map(|name| values.get(name).map(|v| (name.clone(), v.clone())))
        .collect();
    if fp.is_empty() {
        None
    } else {
        Some(Value::Object(fp))
    }
}

/// Committed label values of one test
#[derive(Debug, Clone, Default)]
pub struct TestLabels {
    rows: BTreeMap<DatasetId, ExportedLabelValues>,
}

impl TestLabels {
    /// Rows ordered by dataset id
    pub fn rows(&self) -> impl Iterator<Item = &ExportedLabelValues> {
        self.rows.values()
    }

    /// Row of one dataset
    pub fn get(&self, dataset: DatasetId) -> Option<&ExportedLabelValues> {
        self.rows.get(&dataset)
    }

    /// Number of datasets with label values
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when no dataset has label values
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Store of committed label values
///
/// The map lock is only held to clone or replace an `Arc`. New versions are
/// built outside it, one writer per test at a time.
#[derive(Default)]
pub struct LabelStore {
    tests: RwLock<HashMap<TestId, Arc<TestLabels>>>,
    writers: DashMap<TestId, Arc<Mutex<()>>>,
}

impl LabelStore {
    /// Empty store
    pub fn new() -> Self {
        LabelStore::default()
    }

    /// Stable snapshot of a test's label values
    pub fn snapshot(&self, test: TestId) -> Arc<TestLabels> {
        self.tests.read().get(&test).cloned().unwrap_or_default()
    }

    /// Drop rows of `removed` datasets and add `rows`, as one version
    pub fn commit(&self, test: TestId, removed: &[DatasetId], rows: Vec<ExportedLabelValues>) {
        if removed.is_empty() && rows.is_empty() {
            return;
        }
        let writer = self.writers.entry(test).or_default().value().clone();
        let _guard = writer.lock();

        let mut next = TestLabels::clone(&self.snapshot(test));
        for id in removed {
            next.rows.remove(id);
        }
        for row in rows {
            next.rows.insert(row.dataset_id, row);
        }
        let count = next.rows.len();
        self.tests.write().insert(test, Arc::new(next));
        debug!(target: "datamill::labels", test_id = %test, rows = count, "Committed label values");
    }

    /// Paged, filtered projection of a test's label values
    pub fn query(&self, test: TestId, query: &LabelValuesQuery) -> Page<ExportedLabelValues> {
        let snapshot = self.snapshot(test);
        let rows: Vec<&ExportedLabelValues> = snapshot.rows().collect();

        let mut matched: Vec<&ExportedLabelValues> = rows
            .par_iter()
            .copied()
            .filter(|row| query.filter.matches(&row.values))
            .collect();
        matched.sort_by(|a, b| query.compare(a, b));

        let page = Page::paginate(matched, query.pagination);
        Page {
            count: page.count,
            items: page
                .items
                .into_iter()
                .map(|row| ExportedLabelValues {
                    values: query.project(&row.values),
                    ..row.clone()
                })
                .collect(),
        }
    }

    /// Distinct fingerprints of a test in first-seen order
    pub fn fingerprints(&self, test: TestId, fingerprint_labels: &[String]) -> Vec<Fingerprints> {
        let snapshot = self.snapshot(test);
        let mut seen: Vec<Fingerprints> = Vec::new();
        for row in snapshot.rows() {
            if let Some(fp) = fingerprint_value(&row.values, fingerprint_labels) {
                let fp = Fingerprints::from_json(&fp);
                if !seen.contains(&fp) {
                    seen.push(fp);
                }
            }
        }
        seen
    }

    /// Datasets whose fingerprint structurally equals `fingerprint`
    pub fn datasets_by_fingerprint(
        &self,
        test: TestId,
        fingerprint_labels: &[String],
        fingerprint: &Value,
    ) -> Vec<DatasetId> {
        let wanted = Fingerprints::from_json(fingerprint);
        self.snapshot(test)
            .rows()
            .filter(|row| {
                fingerprint_value(&row.values, fingerprint_labels)
                    .is_some_and(|fp| Fingerprints::from_json(&fp) == wanted)
            })
            .map(|row| row.dataset_id)
            .collect()
    }
}
