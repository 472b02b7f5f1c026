#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use sitecatalog::{CatalogSnapshot, Category, CategoryService, ChangeKind, RecordingNotifier};

mod util;

use util::{capture_logs, electronics_service, electronics_stores, events_named, ids};

fn stored(service: &CategoryService, id: i64) -> Category {
    service.get_category_by_id(id).unwrap().expect("stored category")
}

#[test]
fn keeping_children_moves_them_to_the_root() {
    let service = electronics_service();
    let electronics = stored(&service, 1);

    let report = service.delete_category(electronics, false).unwrap();
    assert_eq!(report.deleted, Vec::<i64>::new());
    assert_eq!(report.reparented, vec![2, 4, 3]);

    assert!(stored(&service, 1).deleted);
    for id in [2, 3, 4] {
        let category = stored(&service, id);
        assert!(!category.deleted, "{id} should survive");
        assert_eq!(category.parent_category_id, 0);
    }
    assert_eq!(
        ids(&service.get_all_categories_by_parent_id(0, false).unwrap()),
        vec![2, 3, 4]
    );
}

#[test]
fn deleting_children_soft_deletes_the_subtree() {
    let service = electronics_service();
    let report = service.delete_category(stored(&service, 1), true).unwrap();
    assert_eq!(report.deleted, vec![2, 4, 3]);
    assert_eq!(report.touched(), 3);

    for id in [1, 2, 3, 4] {
        assert!(stored(&service, id).deleted, "{id} should be deleted");
    }
    assert!(service.get_all_categories_by_parent_id(0, true).unwrap().is_empty());
    assert_eq!(service.stores().categories.all().unwrap().len(), 4);
}

#[test]
fn hidden_children_are_cascaded_too() {
    let mut snapshot = util::electronics();
    snapshot.categories[2].published = false;
    let service = CategoryService::builder(snapshot.into_stores().unwrap()).build();
    let report = service.delete_category(stored(&service, 1), true).unwrap();
    assert!(report.deleted.contains(&3));
}

#[test]
fn deleting_a_leaf_touches_nothing_else() {
    let notifier = Arc::new(RecordingNotifier::new());
    let service = CategoryService::builder(electronics_stores())
        .notifier(notifier.clone())
        .build();
    let report = service.delete_category(stored(&service, 4), true).unwrap();
    assert_eq!(report.touched(), 0);

    let changes = notifier.changes();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].kind, ChangeKind::Updated);
    assert_eq!(changes[0].record.id(), 4);
}

#[test]
fn corrupted_subtree_terminates() {
    let snapshot = CatalogSnapshot {
        categories: vec![
            Category::new(1, 0, "Root"),
            Category::new(2, 1, "A"),
            Category::new(3, 2, "B"),
            Category::new(4, 3, "C"),
        ],
        ..CatalogSnapshot::default()
    };
    let stores = snapshot.into_stores().unwrap();
    // 2 -> 4 -> 3 -> 2
    let mut a = stores.categories.by_id(2).unwrap().unwrap();
    a.parent_category_id = 4;
    stores.categories.update(&a).unwrap();
    let mut extra = Category::new(5, 4, "D");
    stores.categories.insert(&mut extra).unwrap();

    let service = CategoryService::builder(stores).build();
    let report = service.delete_category(stored(&service, 4), true).unwrap();
    let mut touched = report.deleted.clone();
    touched.sort_unstable();
    assert_eq!(touched, vec![2, 3, 5]);
}

#[test]
fn cascade_runs_are_logged_with_a_run_id() {
    let (logs, _guard) = capture_logs();
    let service = electronics_service();
    let report = service.delete_category(stored(&service, 1), false).unwrap();

    let started = events_named(&logs, "cascade_started");
    let finished = events_named(&logs, "cascade_finished");
    assert_eq!(started.len(), 1);
    assert_eq!(finished.len(), 1);
    assert_eq!(started[0]["fields"]["run_id"], report.run_id.to_string());
    assert_eq!(finished[0]["fields"]["reparented"], 3);
}
