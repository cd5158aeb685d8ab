//! Test Registry Tests
//!
//! Creating, listing and deleting tests. Deleting a test removes its
//! configuration but never its runs or datasets.

use crate::common::*;

fn listing(folder: Option<&str>, limit: usize, page: usize) -> TestListQuery {
    TestListQuery {
        folder: FolderFilter::parse(folder),
        limit: Some(limit),
        page: Some(page),
        direction: SortDirection::Ascending,
    }
}

fn names(page: &Page<Test>) -> Vec<String> {
    page.items.iter().map(|t| t.name.clone()).collect()
}

#[test]
fn listing_paginates_by_name() {
    let mill = open_mill();
    // Created out of order on purpose
    for i in (0..50).rev() {
        mill.create_test(TestDef::new(format!("acme_{:02}", i))).unwrap();
    }

    for folder in [None, Some("*"), Some("")] {
        let first = mill.list_tests(&listing(folder, 20, 1));
        assert_eq!(first.count, 50);
        assert_eq!(first.items.len(), 20);
        assert_eq!(first.items[0].name, "acme_00");
        assert_eq!(first.items[19].name, "acme_19");
    }

    let second = mill.list_tests(&listing(Some("*"), 20, 2));
    assert_eq!(names(&second).first().map(String::as_str), Some("acme_20"));
    assert_eq!(names(&second).last().map(String::as_str), Some("acme_39"));

    let third = mill.list_tests(&listing(Some("*"), 20, 3));
    assert_eq!(third.count, 50);
    assert_eq!(third.items.len(), 10);
    assert_eq!(third.items[0].name, "acme_40");
    assert_eq!(third.items[9].name, "acme_49");

    assert_eq!(mill.list_tests(&listing(Some("foo"), 20, 1)).count, 0);
}

#[test]
fn listing_by_folder_and_direction() {
    let mill = open_mill();
    mill.create_test(TestDef::new("root-test")).unwrap();
    mill.create_test(TestDef::new("b").folder("perf")).unwrap();
    mill.create_test(TestDef::new("a").folder("perf")).unwrap();

    let perf = mill.list_tests(&TestListQuery {
        folder: FolderFilter::parse(Some("perf")),
        direction: SortDirection::Descending,
        ..TestListQuery::default()
    });
    assert_eq!(names(&perf), vec!["b", "a"]);

    let root = mill.list_tests(&TestListQuery {
        folder: FolderFilter::parse(Some("")),
        ..TestListQuery::default()
    });
    assert_eq!(names(&root), vec!["root-test"]);
}

#[test]
fn duplicate_names_are_rejected() {
    let mill = open_mill();
    mill.create_test(TestDef::new("acme")).unwrap();
    assert!(mill.create_test(TestDef::new("acme")).unwrap_err().is_validation());
    assert!(mill.create_test(TestDef::new("  ")).is_err());
}

#[test]
fn lookup_by_id_or_name() {
    let mill = open_mill();
    let test = mill.create_test(TestDef::new("acme").folder("perf")).unwrap();
    assert_eq!(mill.get_test("acme").unwrap(), test);
    assert_eq!(mill.get_test(test.id).unwrap().folder.as_deref(), Some("perf"));
    assert!(matches!(mill.get_test("nope"), Err(Error::TestNotFound(_))));
}

#[test]
fn delete_keeps_runs_and_datasets() {
    let t = TestMill::new("doomed");
    t.label("n");
    t.mill
        .put_config_item(
            t.test.id,
            ConfigItem {
                kind: ConfigKind::View,
                name: "default".into(),
                body: json!({"components": []}),
            },
        )
        .unwrap();
    let a = t.upload(json!({"$schema": ACME, "n": 1}));
    let b = t.upload(json!([{"$schema": ACME, "n": 2}, {"$schema": ACME, "n": 3}]));
    let rx = t.mill.subscribe_many(&[EventKind::RunTrashed, EventKind::TestDeleted]);

    t.mill.delete_test(t.test.id).unwrap();

    for (run, datasets) in [(a, 1), (b, 2)] {
        let stored = t.mill.get_run(run).unwrap();
        assert!(stored.trashed);
        assert_eq!(t.mill.datasets_of_run(run).unwrap().len(), datasets);
    }
    let events = drain(&rx);
    assert_eq!(events.len(), 3);
    assert_eq!(events.iter().filter(|e| e.kind() == EventKind::RunTrashed).count(), 2);
    assert_eq!(events.last().map(Event::kind), Some(EventKind::TestDeleted));

    assert!(t.mill.get_test(t.test.id).is_err());
    assert!(t.mill.config_items(t.test.id).is_err());
    assert!(t.mill.upload_run(t.test.id, "{}", UploadOptions::default()).is_err());
    // The name is free again and the new test starts with no configuration
    let again = t.mill.create_test(TestDef::new("doomed")).unwrap();
    assert_ne!(again.id, t.test.id);
    assert!(t.mill.config_items(again.id).unwrap().is_empty());
}
