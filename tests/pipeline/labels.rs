//! Label Value Tests
//!
//! Label values computed from datasets, and the query surface over them:
//! include/exclude projection, single and multi-select filters, ordering,
//! pagination and fingerprints.

use crate::common::*;

/// Test with labels `labelFoo` (`$.foo`) and `labelBar` (`$.bar`) on [`ACME`].
fn setup(def: TestDef) -> TestMill {
    let t = TestMill::with_def(def);
    t.mill
        .add_label(ACME, LabelDef::new("labelFoo", Extractor::new("foo", "$.foo", false)))
        .unwrap();
    t.mill
        .add_label(ACME, LabelDef::new("labelBar", Extractor::new("bar", "$.bar", false)))
        .unwrap();
    t
}

fn upload(t: &TestMill, payload: &str) -> RunId {
    let run = t
        .mill
        .upload_run(t.test.name.as_str(), payload, UploadOptions::with_schema(ACME))
        .unwrap();
    t.mill.wait_idle();
    run
}

fn multi(label: &str, candidates: Value) -> LabelValuesQuery {
    let mut filter = LabelFilter::new().eq(label, candidates);
    filter.multi = true;
    LabelValuesQuery::new().filter(filter)
}

// ============================================================================
// Projection
// ============================================================================

#[test]
fn exclude_dominates_include() {
    let t = setup(TestDef::new("my-test"));
    upload(&t, r#"{"foo": "uno", "bar": "dox"}"#);

    let page = t.label_values(LabelValuesQuery::new().include("labelFoo").exclude("labelFoo"));
    assert_eq!(page.count, 1);
    let values = &page.items[0].values;
    assert!(!values.contains_key("labelFoo"));
    assert_eq!(values["labelBar"], json!("dox"));
}

#[test]
fn include_accepts_repeated_and_comma_separated() {
    let t = setup(TestDef::new("my-test"));
    upload(&t, r#"{"foo": "uno", "bar": "dox"}"#);

    for query in [
        LabelValuesQuery::new().include("labelFoo").include("labelBar"),
        LabelValuesQuery::new().include("labelFoo,labelBar"),
    ] {
        let page = t.label_values(query);
        let values = &page.items[0].values;
        assert!(values.contains_key("labelFoo"));
        assert!(values.contains_key("labelBar"));
    }

    let only_foo = t.label_values(LabelValuesQuery::new().include("labelFoo"));
    assert_eq!(only_foo.items[0].values.len(), 1);

    let no_foo = t.label_values(LabelValuesQuery::new().exclude("labelFoo"));
    assert!(!no_foo.items[0].values.contains_key("labelFoo"));
    assert!(no_foo.items[0].values.contains_key("labelBar"));
}

#[test]
fn rows_carry_run_and_dataset() {
    let t = setup(TestDef::new("my-test"));
    let run = upload(&t, r#"{"foo": 1, "bar": null}"#);

    let page = t.label_values(LabelValuesQuery::new());
    let row = &page.items[0];
    assert_eq!(row.run_id, run);
    assert_eq!(row.dataset_id, t.datasets(run)[0].id);
    assert_eq!(row.values["labelBar"], Value::Null);
}

// ============================================================================
// Filters
// ============================================================================

#[test]
fn multi_select_strings_ignore_other_types() {
    let t = setup(TestDef::new("my-test"));
    upload(&t, r#"{"foo": 1, "bar": "uno"}"#);
    upload(&t, r#"{"foo": 2, "bar": "dos"}"#);

    let page = t.label_values(multi("labelBar", json!(["uno", 30])));
    assert_eq!(page.count, 1);
    assert_eq!(page.items[0].values["labelBar"], json!("uno"));
}

#[test]
fn multi_select_numbers() {
    let t = setup(TestDef::new("my-test"));
    upload(&t, r#"{"foo": 1, "bar": 10}"#);
    upload(&t, r#"{"foo": 2, "bar": 20}"#);

    let page = t.label_values(multi("labelBar", json!([10, 30])));
    assert_eq!(page.count, 1);
    assert_eq!(page.items[0].values["labelBar"], json!(10));

    let mixed = t.label_values(multi("labelBar", json!(["uno", 30])));
    assert_eq!(mixed.count, 0);
}

#[test]
fn multi_select_booleans() {
    let t = setup(TestDef::new("my-test"));
    upload(&t, r#"{"foo": 1, "bar": true}"#);
    upload(&t, r#"{"foo": 2, "bar": 20}"#);

    let page = t.label_values(multi("labelBar", json!([true, 30])));
    assert_eq!(page.count, 1);
    assert_eq!(page.items[0].values["labelBar"], json!(true));
}

#[test]
fn single_filter_from_text_and_unknown_label() {
    let t = setup(TestDef::new("my-test"));
    upload(&t, r#"{"foo": 1.0, "bar": "a"}"#);
    upload(&t, r#"{"foo": 2, "bar": "b"}"#);

    let filter = LabelFilter::from_json_str(r#"{"labelFoo": 1}"#, false).unwrap();
    let page = t.label_values(LabelValuesQuery::new().filter(filter));
    assert_eq!(page.count, 1);
    assert_eq!(page.items[0].values["labelBar"], json!("a"));

    let unknown = t.label_values(LabelValuesQuery::new().filter(LabelFilter::new().eq("nope", 1)));
    assert_eq!(unknown.count, 0);
    assert!(LabelFilter::from_json_str("[1]", false).is_err());
}

// ============================================================================
// Ordering and paging
// ============================================================================

#[test]
fn sort_and_paginate() {
    let t = setup(TestDef::new("my-test"));
    for foo in [3, 1, 2] {
        upload(&t, &format!(r#"{{"foo": {}, "bar": "x"}}"#, foo));
    }
    upload(&t, r#"{"bar": "no foo"}"#);

    let ascending = t.label_values(LabelValuesQuery::new().sort_by("labelFoo", SortDirection::Ascending));
    let foos: Vec<Value> = ascending.items.iter().map(|r| r.values["labelFoo"].clone()).collect();
    assert_eq!(foos, vec![json!(1), json!(2), json!(3), Value::Null]);

    let page = t.label_values(
        LabelValuesQuery::new()
            .sort_by("labelFoo", SortDirection::Descending)
            .paginate(2, 1),
    );
    assert_eq!(page.count, 4);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].values["labelFoo"], json!(3));

    let by_id = t.label_values(LabelValuesQuery::new());
    assert!(by_id.items.windows(2).all(|w| w[0].dataset_id < w[1].dataset_id));
}

// ============================================================================
// Fingerprints
// ============================================================================

#[test]
fn fingerprints_group_datasets() {
    let t = setup(TestDef::new("fp").fingerprint_labels(["labelFoo", "labelBar"]));
    let a = upload(&t, r#"{"foo": {"cpu": 4, "arch": "x86"}, "bar": true}"#);
    upload(&t, r#"{"foo": {"cpu": 8, "arch": "x86"}, "bar": true}"#);
    let c = upload(&t, r#"{"foo": {"cpu": 4, "arch": "x86"}, "bar": true}"#);

    let fingerprints = t.mill.fingerprints(t.test.id).unwrap();
    assert_eq!(fingerprints.len(), 2);
    assert_eq!(fingerprints[0].values[0].name(), "labelFoo");
    assert!(!fingerprints[0].values[0].is_leaf());
    assert_eq!(fingerprints[0].values[1].value(), Some(&ScalarValue::Bool(true)));

    let wanted = json!({"labelFoo": {"cpu": 4, "arch": "x86"}, "labelBar": true});
    let ids = t.mill.datasets_by_fingerprint(t.test.id, &wanted).unwrap();
    let expected: Vec<DatasetId> = [a, c].iter().map(|r| t.datasets(*r)[0].id).collect();
    assert_eq!(ids, expected);

    let summaries = t.mill.list_datasets(t.test.id, Pagination::unlimited()).unwrap();
    assert_eq!(summaries.count, 3);
    assert_eq!(summaries.items[0].fingerprint, Some(wanted));
}

#[test]
fn fingerprint_parsing_preserves_structure() {
    let parsed = Fingerprints::parse(&[
        json!({"Mode": "library", "buildType": "jvm", "config": {"threads": 4, "fast": false}}),
        json!({"number": 0.5, "missing": null}),
    ]);
    assert_eq!(parsed.len(), 2);
    let first = &parsed[0];
    assert_eq!(first.values.len(), 3);
    assert_eq!(first.values[0].name(), "Mode");
    assert_eq!(first.values[0].value(), Some(&ScalarValue::String("library".into())));
    assert_eq!(first.values[2].children().len(), 2);
    assert_eq!(first.values[2].children()[1].value(), Some(&ScalarValue::Bool(false)));
    assert_eq!(parsed[1].values[1].value(), Some(&ScalarValue::Null));
}

// ============================================================================
// Snapshots
// ============================================================================

fn rows(ids: std::ops::Range<u64>) -> Vec<ExportedLabelValues> {
    let now = chrono::Utc::now();
    ids.map(|id| ExportedLabelValues {
        values: json!({"n": id}).as_object().unwrap().clone(),
        run_id: RunId::new(id),
        dataset_id: DatasetId::new(id),
        start: now,
        stop: now,
    })
    .collect()
}

#[test]
fn held_snapshot_is_stable_across_commits() {
    let store = std::sync::Arc::new(LabelStore::new());
    let (busy, quiet) = (TestId::new(1), TestId::new(2));
    store.commit(busy, &[], rows(1..5001));
    store.commit(quiet, &[], rows(1..3));
    let held = store.snapshot(busy);

    let writer = {
        let store = std::sync::Arc::clone(&store);
        let old: Vec<DatasetId> = (1..5001).map(DatasetId::new).collect();
        std::thread::spawn(move || store.commit(busy, &old, rows(5001..10001)))
    };
    // Readers of other tests keep going while the commit is built
    while !writer.is_finished() {
        assert_eq!(store.snapshot(quiet).len(), 2);
    }
    writer.join().unwrap();

    assert_eq!(held.len(), 5000);
    assert!(held.get(DatasetId::new(1)).is_some());
    assert!(held.get(DatasetId::new(5001)).is_none());

    let fresh = store.snapshot(busy);
    assert_eq!(fresh.len(), 5000);
    assert!(fresh.get(DatasetId::new(1)).is_none());
    assert!(fresh.get(DatasetId::new(5001)).is_some());
}

#[test]
fn concurrent_commits_to_one_test_are_not_lost() {
    let store = std::sync::Arc::new(LabelStore::new());
    let test = TestId::new(1);
    let handles: Vec<_> = (0..8u64)
        .map(|i| {
            let store = std::sync::Arc::clone(&store);
            std::thread::spawn(move || {
                for chunk in 0..10u64 {
                    let base = 1 + i * 1000 + chunk * 10;
                    store.commit(test, &[], rows(base..base + 10));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(store.snapshot(test).len(), 800);
}

// ============================================================================
// Properties
// ============================================================================

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        /// Pages of a sorted query concatenate to the unpaged result, and a
        /// multi filter keeps exactly the rows whose value is a candidate.
        #[test]
        fn pages_partition_and_filter_matches(
            foos in prop::collection::vec(0i64..20, 1..12),
            candidates in prop::collection::vec(0i64..20, 1..4),
            limit in 1usize..5,
        ) {
            let t = setup(TestDef::new("prop"));
            for foo in &foos {
                upload(&t, &format!(r#"{{"foo": {}, "bar": "x"}}"#, foo));
            }

            let sorted = || LabelValuesQuery::new().sort_by("labelFoo", SortDirection::Ascending);
            let all = t.label_values(sorted());
            prop_assert_eq!(all.count, foos.len());

            let mut paged = Vec::new();
            let pages = (foos.len() + limit - 1) / limit;
            for page in 1..=pages {
                let p = t.label_values(sorted().paginate(limit, page));
                prop_assert_eq!(p.count, foos.len());
                paged.extend(p.items.into_iter().map(|r| r.dataset_id));
            }
            prop_assert_eq!(paged, all.items.iter().map(|r| r.dataset_id).collect::<Vec<_>>());

            let expected = foos.iter().filter(|f| candidates.contains(f)).count();
            let filtered = t.label_values(multi("labelFoo", json!(candidates)));
            prop_assert_eq!(filtered.count, expected);
        }
    }
}
