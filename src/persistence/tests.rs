use std::time::Duration;

use chrono::Utc;
use tempfile::tempdir;

use super::*;
use crate::bus::Dispatcher;
use crate::bus::dispatcher;

const DAY: Duration = Duration::from_secs(86_400);

#[test]
fn test_store_keeps_latest_per_topic() {
    let dir = tempdir().unwrap();
    let store = SnapshotStore::open(dir.path(), DAY).unwrap();

    store.store("a", "1").unwrap();
    store.store("a", "2").unwrap();
    store.store("b", "3").unwrap();

    assert_eq!(store.len(), 2);
    assert_eq!(store.get("a").unwrap().unwrap().payload, "2");
    assert!(store.get("missing").unwrap().is_none());
}

#[test]
fn test_snapshot_survives_reopen() {
    let dir = tempdir().unwrap();
    {
        let store = SnapshotStore::open(dir.path(), DAY).unwrap();
        store.store("dashboard/response", r#"{"weather":null}"#).unwrap();
        store.flush().unwrap();
    }

    let store = SnapshotStore::open(dir.path(), DAY).unwrap();
    let entries = store.load_all().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].topic, "dashboard/response");
}

#[test]
fn test_expired_entries_are_removed_on_load() {
    let dir = tempdir().unwrap();
    let store = SnapshotStore::open(dir.path(), Duration::from_secs(60)).unwrap();
    let now = Utc::now().timestamp();

    store.store_at("old", "x", now - 3600).unwrap();
    store.store_at("new", "y", now).unwrap();

    let entries = store.load_all().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].topic, "new");
    assert_eq!(store.len(), 1);
}

#[test]
fn test_restore_and_record_through_dispatcher() {
    let dir = tempdir().unwrap();
    let store = SnapshotStore::open(dir.path(), DAY).unwrap();
    let now = Utc::now().timestamp();
    store.store_at("a", "first", now - 10).unwrap();
    store.store_at("b", "second", now).unwrap();

    let shared = Dispatcher::shared(20);
    assert_eq!(store.restore_into(&shared).unwrap(), 2);
    assert_eq!(dispatcher::lock(&shared).latest("a"), Some("first"));
    assert_eq!(dispatcher::lock(&shared).recent().count(), 0);

    record_into(store.clone(), &shared);
    dispatcher::lock(&shared).on_message("a", "updated".into());
    assert_eq!(store.get("a").unwrap().unwrap().payload, "updated");
}
