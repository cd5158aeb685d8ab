//! Ingest Tests
//!
//! Upload to datasets: schema matching, transformer application, ordinal
//! assignment, failure logging and event ordering.

use crate::common::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

// ============================================================================
// Schema matching
// ============================================================================

#[test]
fn hyphenated_key_extracted_by_identity_transformer() {
    let t = TestMill::new("datasource");
    t.transformer(
        TransformerDef::new("build", ACME).extractor(Extractor::new("value", "$.\"build-id\"", false)),
    );

    let run = t.upload(json!({"$schema": ACME, "build-id": 1047}));
    let datasets = t.datasets(run);
    assert_eq!(datasets.len(), 1);
    assert_eq!(datasets[0].data, json!([{"value": 1047}]));
    assert_eq!(datasets[0].ordinal, 0);
    assert!(!datasets[0].is_recalculation);
}

#[test]
fn run_without_known_schema_creates_no_dataset() {
    let t = TestMill::new("plain");
    let rx = t.mill.subscribe_many(&[EventKind::RunCreated, EventKind::DatasetCreated]);

    let plain = t.upload(json!({"foo": "bar"}));
    let unknown = t.upload(json!({"$schema": "urn:unregistered", "x": 1}));

    assert!(t.datasets(plain).is_empty());
    assert!(t.datasets(unknown).is_empty());
    let events = drain(&rx);
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.kind() == EventKind::RunCreated));
}

#[test]
fn multi_document_run_yields_contiguous_ordinals() {
    let t = TestMill::new("multi");
    let rx = t.mill.subscribe(EventKind::DatasetCreated);

    let run = t.upload(json!([
        {"$schema": ACME, "n": 0},
        {"$schema": ACME, "n": 1},
        {"$schema": ACME, "n": 2}
    ]));

    let datasets = t.datasets(run);
    assert_eq!(datasets.iter().map(|d| d.ordinal).collect::<Vec<_>>(), vec![0, 1, 2]);
    for d in &datasets {
        assert_eq!(d.data[0]["n"], json!(d.ordinal));
        assert_eq!(d.run_id, run);
    }

    let created = dataset_created(&drain(&rx));
    assert_eq!(created.len(), 3);
    assert_eq!(created.iter().map(|e| e.ordinal).collect::<Vec<_>>(), vec![0, 1, 2]);
    assert!(created.windows(2).all(|w| w[0].dataset_id < w[1].dataset_id));
}

#[test]
fn nested_documents_of_one_unit_share_a_dataset() {
    let t = TestMill::new("nested");
    t.mill.create_schema(HYPERFOIL, "hyperfoil").unwrap();

    let run = t.upload(json!({
        "info": {"$schema": ACME, "build": 7},
        "bench": {"$schema": HYPERFOIL, "rps": 120.5},
        "ignored": {"k": 1}
    }));

    let datasets = t.datasets(run);
    assert_eq!(datasets.len(), 1);
    assert_eq!(datasets[0].fragment_count(), 2);
    assert_eq!(datasets[0].fragments()[0]["build"], json!(7));
    assert_eq!(datasets[0].fragments()[1]["rps"], json!(120.5));
}

#[test]
fn upload_schema_hint_is_stamped() {
    let t = TestMill::new("hint");
    let run = t
        .mill
        .upload_run(t.test.id, r#"[{"a": 1}, {"a": 2}]"#, UploadOptions::with_schema(ACME))
        .unwrap();
    t.mill.wait_idle();
    assert_eq!(t.datasets(run).len(), 2);
}

#[test]
fn schema_hint_replaces_root_declaration() {
    let t = TestMill::new("override");
    let run = t
        .mill
        .upload_run(t.test.id, r#"{"$schema": "urn:unknown", "a": 1}"#, UploadOptions::with_schema(ACME))
        .unwrap();
    t.mill.wait_idle();

    assert_eq!(t.mill.get_run(run).unwrap().data["$schema"], json!(ACME));
    assert_eq!(t.datasets(run).len(), 1);
}

// ============================================================================
// Transformers
// ============================================================================

#[test]
fn failing_transformer_is_logged_and_others_still_contribute() {
    let t = TestMill::new("failing");
    t.transformer(
        TransformerDef::new("broken", ACME)
            .extractor(Extractor::new("x", "$.x", false))
            .function(|_: &Value| -> std::result::Result<Value, FunctionError> {
                Err(FunctionError::new("boom"))
            }),
    );
    t.transformer(TransformerDef::new("ok", ACME).extractor(Extractor::new("x", "$.x", false)));

    let run = t.upload(json!({"$schema": ACME, "x": 5}));

    let datasets = t.datasets(run);
    assert_eq!(datasets.len(), 1);
    assert_eq!(datasets[0].data, json!([{"x": 5}]));

    let errors = t.log(LogLevel::Error);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].run_id, Some(run));
    assert!(errors[0].message.contains("broken"));
    assert!(errors[0].message.contains("boom"));
}

#[test]
fn missing_required_extractor_skips_schema() {
    let t = TestMill::new("required");
    t.transformer(
        TransformerDef::new("needs-id", ACME).extractor(Extractor::new("id", "$.id", false).required()),
    );

    let run = t.upload(json!({"$schema": ACME, "other": 1}));
    assert!(t.datasets(run).is_empty());
    assert!(t.log(LogLevel::Warning).is_empty());
    assert!(t
        .log(LogLevel::Debug)
        .iter()
        .any(|e| e.message.contains("required extractor 'id'")));
}

#[test]
fn array_result_expands_into_datasets() {
    let t = TestMill::new("expand");
    t.transformer(
        TransformerDef::new("per-phase", ACME)
            .extractor(Extractor::new("phases", "$.phases[*]", true))
            .target(HYPERFOIL)
            .function(|input: &Value| -> std::result::Result<Value, FunctionError> {
                let phases = input.as_array().ok_or_else(|| FunctionError::new("expected array"))?;
                Ok(Value::Array(phases.iter().map(|p| json!({"phase": p})).collect()))
            }),
    );
    t.transformer(TransformerDef::new("build", ACME).extractor(Extractor::new("build", "$.build", false)));

    let run = t.upload(json!({"$schema": ACME, "build": 9, "phases": ["warmup", "steady", "ramp"]}));

    let datasets = t.datasets(run);
    assert_eq!(datasets.len(), 3);
    for (i, phase) in ["warmup", "steady", "ramp"].iter().enumerate() {
        assert_eq!(datasets[i].ordinal as usize, i);
        assert_eq!(
            datasets[i].data,
            json!([{"phase": phase, "$schema": HYPERFOIL}, {"build": 9}])
        );
    }
}

#[test]
fn uneven_expansion_logs_warning() {
    let t = TestMill::new("uneven");
    let split = |input: &Value| -> std::result::Result<Value, FunctionError> { Ok(input.clone()) };
    t.transformer(
        TransformerDef::new("a", ACME)
            .extractor(Extractor::new("a", "$.a[*]", true))
            .function(split),
    );
    t.transformer(
        TransformerDef::new("b", ACME)
            .extractor(Extractor::new("b", "$.b[*]", true))
            .function(split),
    );

    let run = t.upload(json!({"$schema": ACME, "a": [1, 2, 3], "b": [10]}));

    let datasets = t.datasets(run);
    assert_eq!(datasets.len(), 3);
    assert_eq!(datasets[0].data, json!([1, 10]));
    assert_eq!(datasets[2].data, json!([3]));
    assert_eq!(t.log(LogLevel::Warning).len(), 1);
}

// ============================================================================
// Events and concurrency
// ============================================================================

#[test]
fn events_of_one_run_are_ordered() {
    let t = TestMill::new("ordered");
    t.label("n");
    let rx = t.mill.subscribe_all();

    let run = t.upload(json!([{"$schema": ACME, "n": 1}, {"$schema": ACME, "n": 2}]));

    let kinds: Vec<EventKind> = drain(&rx)
        .into_iter()
        .filter(|e| e.run_id() == Some(run) || e.kind() == EventKind::LabelsUpdated)
        .map(|e| e.kind())
        .collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::RunCreated,
            EventKind::DatasetCreated,
            EventKind::DatasetCreated,
            EventKind::LabelsUpdated,
            EventKind::LabelsUpdated,
        ]
    );
}

#[test]
fn concurrent_uploads_keep_ordinals_per_run() {
    let t = Arc::new(TestMill::new("concurrent"));
    let payload = json!([{"$schema": ACME, "i": 0}, {"$schema": ACME, "i": 1}]);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let t = Arc::clone(&t);
            let payload = payload.clone();
            thread::spawn(move || {
                (0..10)
                    .map(|_| {
                        t.mill
                            .upload_json(t.test.id, payload.clone(), UploadOptions::default())
                            .unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let runs: Vec<RunId> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
    t.mill.wait_idle();

    let mut ids = HashSet::new();
    for run in &runs {
        let datasets = t.datasets(*run);
        assert_eq!(datasets.iter().map(|d| d.ordinal).collect::<Vec<_>>(), vec![0, 1]);
        ids.extend(datasets.iter().map(|d| d.id));
    }
    assert_eq!(runs.len(), 40);
    assert_eq!(ids.len(), 80);
}
