//! In-memory catalog of tests, schemas, runs and datasets
//!
//! Stands in for the persistence collaborator: every entity the pipeline
//! reads or writes goes through here. Maps are sharded (`DashMap`) so that
//! workers processing different runs do not contend. Ids are allocated from
//! monotonic counters and never reused.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use datamill_core::{
    ConfigItem, Dataset, DatasetId, Error, Label, LabelDef, LabelId, LogLevel, Page, Pagination,
    PersistentLogEntry, Result, Run, RunId, Schema, SchemaId, SortDirection, Test, TestDef,
    TestId, TestListQuery, TestRef, Transformer, TransformerDef, TransformerId,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

fn next(counter: &AtomicU64) -> u64 {
    counter.fetch_add(1, Ordering::Relaxed) + 1
}

/// Entity store
pub struct Catalog {
    next_test: AtomicU64,
    next_run: AtomicU64,
    next_dataset: AtomicU64,
    next_schema: AtomicU64,
    next_transformer: AtomicU64,
    next_label: AtomicU64,

    tests: DashMap<TestId, Test>,
    test_names: DashMap<String, TestId>,
    config: DashMap<TestId, Vec<ConfigItem>>,
    bindings: DashMap<TestId, Vec<TransformerId>>,

    schemas: DashMap<String, Schema>,
    transformers: DashMap<TransformerId, Transformer>,
    // Registration order decides label order
    labels: RwLock<Vec<Label>>,

    runs: DashMap<RunId, Run>,
    datasets: DashMap<DatasetId, Dataset>,
    run_datasets: DashMap<RunId, Vec<DatasetId>>,

    log: DashMap<TestId, Vec<PersistentLogEntry>>,
    min_log_level: LogLevel,
}

impl Catalog {
    /// Empty catalog keeping log entries at or above `min_log_level`
    pub fn new(min_log_level: LogLevel) -> Self {
        Catalog {
            next_test: AtomicU64::new(0),
            next_run: AtomicU64::new(0),
            next_dataset: AtomicU64::new(0),
            next_schema: AtomicU64::new(0),
            next_transformer: AtomicU64::new(0),
            next_label: AtomicU64::new(0),
            tests: DashMap::new(),
            test_names: DashMap::new(),
            config: DashMap::new(),
            bindings: DashMap::new(),
            schemas: DashMap::new(),
            transformers: DashMap::new(),
            labels: RwLock::new(Vec::new()),
            runs: DashMap::new(),
            datasets: DashMap::new(),
            run_datasets: DashMap::new(),
            log: DashMap::new(),
            min_log_level,
        }
    }

    // =========================================================================
    // Tests
    // =========================================================================

    /// Register a test; names are unique
    pub fn create_test(&self, def: TestDef) -> Result<Test> {
        let name = def.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::invalid_input("test name must not be empty"));
        }
        match self.test_names.entry(name.clone()) {
            Entry::Occupied(_) => Err(Error::invalid_input(format!(
                "test with name '{}' already exists",
                name
            ))),
            Entry::Vacant(slot) => {
                let test = Test {
                    id: TestId::new(next(&self.next_test)),
                    name,
                    folder: def.folder.filter(|f| !f.is_empty()),
                    description: def.description,
                    owner: def.owner,
                    fingerprint_labels: def.fingerprint_labels,
                };
                slot.insert(test.id);
                self.tests.insert(test.id, test.clone());
                Ok(test)
            }
        }
    }

    /// Test by id
    pub fn test(&self, id: TestId) -> Option<Test> {
        self.tests.get(&id).map(|t| t.clone())
    }

    /// Test by id or name
    pub fn resolve(&self, test: &TestRef) -> Result<Test> {
        let id = match test {
            TestRef::Id(id) => Some(*id),
            TestRef::Name(name) => self.test_names.get(name.trim()).map(|id| *id),
        };
        id.and_then(|id| self.test(id))
            .ok_or_else(|| Error::TestNotFound(test.to_string()))
    }

    /// Tests in the selected folder, sorted by name, paginated
    pub fn list_tests(&self, query: &TestListQuery) -> Page<Test> {
        let mut tests: Vec<Test> = self
            .tests
            .iter()
            .filter(|t| query.folder.matches(t.folder.as_deref()))
            .map(|t| t.clone())
            .collect();
        tests.sort_by(|a, b| a.name.cmp(&b.name));
        if query.direction == SortDirection::Descending {
            tests.reverse();
        }
        Page::paginate(
            tests,
            Pagination {
                limit: query.limit,
                page: query.page,
            },
        )
    }

    /// Remove a test with its configuration, bindings and log
    pub fn remove_test(&self, id: TestId) -> Result<Test> {
        let (_, test) = self
            .tests
            .remove(&id)
            .ok_or_else(|| Error::TestNotFound(id.to_string()))?;
        self.test_names.remove(&test.name);
        self.config.remove(&id);
        self.bindings.remove(&id);
        self.log.remove(&id);
        Ok(test)
    }

    /// Store a configuration item, replacing one of the same kind and name
    pub fn put_config_item(&self, test: TestId, item: ConfigItem) -> Result<()> {
        self.require_test(test)?;
        let mut items = self.config.entry(test).or_default();
        items.retain(|i| !(i.kind == item.kind && i.name == item.name));
        items.push(item);
        Ok(())
    }

    /// Configuration items of a test
    pub fn config_items(&self, test: TestId) -> Vec<ConfigItem> {
        self.config.get(&test).map(|c| c.clone()).unwrap_or_default()
    }

    fn require_test(&self, test: TestId) -> Result<()> {
        if self.tests.contains_key(&test) {
            Ok(())
        } else {
            Err(Error::TestNotFound(test.to_string()))
        }
    }

    // =========================================================================
    // Schemas, transformers, labels
    // =========================================================================

    /// Register a schema; URIs are unique
    pub fn add_schema(&self, uri: &str, name: &str) -> Result<Schema> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(Error::invalid_input("schema URI must not be empty"));
        }
        match self.schemas.entry(uri.to_string()) {
            Entry::Occupied(_) => Err(Error::invalid_input(format!(
                "schema '{}' already exists",
                uri
            ))),
            Entry::Vacant(slot) => {
                let schema = Schema {
                    id: SchemaId::new(next(&self.next_schema)),
                    uri: uri.to_string(),
                    name: name.to_string(),
                };
                slot.insert(schema.clone());
                Ok(schema)
            }
        }
    }

    /// True when a schema with this URI is registered
    pub fn has_schema(&self, uri: &str) -> bool {
        self.schemas.contains_key(uri)
    }

    /// Register a transformer of an existing schema
    pub fn add_transformer(&self, def: TransformerDef) -> Result<TransformerId> {
        if !self.has_schema(&def.schema_uri) {
            return Err(Error::SchemaNotFound(def.schema_uri));
        }
        for extractor in &def.extractors {
            extractor.parse_path()?;
        }
        let id = TransformerId::new(next(&self.next_transformer));
        self.transformers.insert(
            id,
            Transformer {
                id,
                name: def.name,
                schema_uri: def.schema_uri,
                target_schema_uri: def.target_schema_uri,
                extractors: def.extractors,
                function: def.function,
            },
        );
        Ok(id)
    }

    /// Transformer by id
    pub fn transformer(&self, id: TransformerId) -> Option<Transformer> {
        self.transformers.get(&id).map(|t| t.clone())
    }

    /// Bind transformers to a test, replacing earlier bindings
    pub fn bind_transformers(&self, test: TestId, ids: &[TransformerId]) -> Result<()> {
        self.require_test(test)?;
        if let Some(missing) = ids.iter().find(|id| !self.transformers.contains_key(id)) {
            return Err(Error::invalid_input(format!("unknown transformer {}", missing)));
        }
        self.bindings.insert(test, ids.to_vec());
        Ok(())
    }

    /// Transformers bound to a test that read documents of `schema_uri`, in binding order
    pub fn transformers_for(&self, test: TestId, schema_uri: &str) -> Vec<Transformer> {
        let ids = self.bindings.get(&test).map(|b| b.clone()).unwrap_or_default();
        ids.into_iter()
            .filter_map(|id| self.transformer(id))
            .filter(|t| t.schema_uri == schema_uri)
            .collect()
    }

    /// Register a label of an existing schema; names are unique per schema
    pub fn add_label(&self, schema_uri: &str, def: LabelDef) -> Result<LabelId> {
        if !self.has_schema(schema_uri) {
            return Err(Error::SchemaNotFound(schema_uri.to_string()));
        }
        if def.extractors.is_empty() {
            return Err(Error::invalid_input(format!(
                "label '{}' needs at least one extractor",
                def.name
            )));
        }
        for extractor in &def.extractors {
            extractor.parse_path()?;
        }
        let mut labels = self.labels.write();
        if labels
            .iter()
            .any(|l| l.schema_uri == schema_uri && l.name == def.name)
        {
            return Err(Error::invalid_input(format!(
                "label '{}' already exists in schema '{}'",
                def.name, schema_uri
            )));
        }
        let id = LabelId::new(next(&self.next_label));
        labels.push(Label {
            id,
            name: def.name,
            schema_uri: schema_uri.to_string(),
            extractors: def.extractors,
            function: def.function,
            filtering: def.filtering,
            metrics: def.metrics,
        });
        Ok(id)
    }

    /// Labels of a schema, in registration order
    pub fn labels_for(&self, schema_uri: &str) -> Vec<Label> {
        self.labels
            .read()
            .iter()
            .filter(|l| l.schema_uri == schema_uri)
            .cloned()
            .collect()
    }

    // =========================================================================
    // Runs
    // =========================================================================

    /// Allocate a run id
    pub fn next_run_id(&self) -> RunId {
        RunId::new(next(&self.next_run))
    }

    /// Store a run
    pub fn insert_run(&self, run: Run) {
        self.runs.insert(run.id, run);
    }

    /// Drop a run that never got processed
    pub fn remove_run(&self, id: RunId) {
        self.runs.remove(&id);
    }

    /// Run by id
    pub fn run(&self, id: RunId) -> Option<Run> {
        self.runs.get(&id).map(|r| r.clone())
    }

    /// Set the trashed flag; returns the run when the flag changed
    pub fn set_trashed(&self, id: RunId, trashed: bool) -> Result<Option<Run>> {
        let mut run = self.runs.get_mut(&id).ok_or(Error::RunNotFound(id))?;
        if run.trashed == trashed {
            return Ok(None);
        }
        run.trashed = trashed;
        Ok(Some(run.clone()))
    }

    /// Runs of a test ordered by id
    pub fn runs_of(&self, test: TestId) -> Vec<Run> {
        let mut runs: Vec<Run> = self
            .runs
            .iter()
            .filter(|r| r.test_id == test)
            .map(|r| r.clone())
            .collect();
        runs.sort_by_key(|r| r.id);
        runs
    }

    // =========================================================================
    // Datasets
    // =========================================================================

    /// Allocate a dataset id strictly greater than every earlier one
    pub fn next_dataset_id(&self) -> DatasetId {
        DatasetId::new(next(&self.next_dataset))
    }

    /// Replace every dataset of a run; returns the ids removed
    ///
    /// Callers serialize builds of one run.
    pub fn replace_datasets(&self, run: RunId, datasets: Vec<Dataset>) -> Vec<DatasetId> {
        let removed = self.remove_datasets_of(run);
        let ids: Vec<DatasetId> = datasets.iter().map(|d| d.id).collect();
        for dataset in datasets {
            self.datasets.insert(dataset.id, dataset);
        }
        if !ids.is_empty() {
            self.run_datasets.insert(run, ids);
        }
        removed
    }

    /// Remove every dataset of a run; returns the ids removed
    pub fn remove_datasets_of(&self, run: RunId) -> Vec<DatasetId> {
        let removed = self
            .run_datasets
            .remove(&run)
            .map(|(_, ids)| ids)
            .unwrap_or_default();
        for id in &removed {
            self.datasets.remove(id);
        }
        if !removed.is_empty() {
            debug!(target: "datamill::ingest", run_id = %run, count = removed.len(), "Superseded datasets");
        }
        removed
    }

    /// Dataset by id
    pub fn dataset(&self, id: DatasetId) -> Option<Dataset> {
        self.datasets.get(&id).map(|d| d.clone())
    }

    /// Current datasets of a run, by ordinal
    pub fn datasets_of_run(&self, run: RunId) -> Vec<Dataset> {
        let ids = self.run_datasets.get(&run).map(|i| i.clone()).unwrap_or_default();
        ids.into_iter().filter_map(|id| self.dataset(id)).collect()
    }

    /// Current datasets of a test ordered by id
    pub fn datasets_of_test(&self, test: TestId) -> Vec<Dataset> {
        let mut datasets: Vec<Dataset> = self
            .datasets
            .iter()
            .filter(|d| d.test_id == test)
            .map(|d| d.clone())
            .collect();
        datasets.sort_by_key(|d| d.id);
        datasets
    }

    // =========================================================================
    // Persistent log
    // =========================================================================

    /// Append a log entry if its level is kept
    pub fn log(&self, test: TestId, run: Option<RunId>, level: LogLevel, message: impl Into<String>) {
        if level < self.min_log_level {
            return;
        }
        let entry = PersistentLogEntry::new(test, run, level, message);
        self.log.entry(test).or_default().push(entry);
    }

    /// Log entries of a test at or above `min_level`, newest first
    pub fn log_entries(&self, test: TestId, min_level: LogLevel) -> Vec<PersistentLogEntry> {
        let mut entries: Vec<PersistentLogEntry> = self
            .log
            .get(&test)
            .map(|l| l.iter().filter(|e| e.level >= min_level).cloned().collect())
            .unwrap_or_default();
        entries.reverse();
        entries
    }
}
