use etch_history::HistoryStore;
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_entry(store: &HistoryStore, relative: &str, content: &str) {
    let path = store.entry_path(Path::new(relative)).unwrap();
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[test]
fn test_store_lives_inside_working_tree() {
    let temp = TempDir::new().unwrap();
    HistoryStore::open(temp.path()).unwrap();

    assert!(temp.path().join("RCS").join("HEAD").exists());
}

#[test]
fn test_revisions_are_listed_newest_first() {
    let temp = TempDir::new().unwrap();
    let store = HistoryStore::open(temp.path()).unwrap();

    write_entry(&store, "etc/motd", "old\n");
    store.record(Path::new("etc/motd"), "original").unwrap();
    write_entry(&store, "etc/motd", "hello\n");
    store.record(Path::new("etc/motd"), "after update").unwrap();

    let revisions = store.revisions(Path::new("etc/motd"), 10).unwrap();
    let messages: Vec<_> = revisions.iter().map(|r| r.message.as_str()).collect();
    assert_eq!(messages, vec!["after update", "original"]);
    assert_eq!(
        store.latest(Path::new("etc/motd")).unwrap(),
        Some(b"hello\n".to_vec())
    );
}

#[test]
fn test_revisions_are_scoped_to_one_entry() {
    let temp = TempDir::new().unwrap();
    let store = HistoryStore::open(temp.path()).unwrap();

    write_entry(&store, "etc/a", "a");
    store.record(Path::new("etc/a"), "a").unwrap();
    write_entry(&store, "etc/b", "b");
    store.record(Path::new("etc/b"), "b").unwrap();

    let revisions = store.revisions(Path::new("etc/a"), 10).unwrap();
    assert_eq!(revisions.len(), 1);
    assert_eq!(revisions[0].message, "a");
}

#[test]
fn test_removed_entry_is_recorded() {
    let temp = TempDir::new().unwrap();
    let store = HistoryStore::open(temp.path()).unwrap();

    write_entry(&store, "etc/gone", "x");
    store.record(Path::new("etc/gone"), "add").unwrap();
    fs::remove_file(store.entry_path(Path::new("etc/gone")).unwrap()).unwrap();

    assert!(store.record(Path::new("etc/gone"), "remove").unwrap().is_some());
    assert_eq!(store.latest(Path::new("etc/gone")).unwrap(), None);
}

#[test]
fn test_unborn_store_has_no_history() {
    let temp = TempDir::new().unwrap();
    let store = HistoryStore::open(temp.path()).unwrap();
    assert!(store.revisions(Path::new("etc/motd"), 5).unwrap().is_empty());
    assert_eq!(store.latest(Path::new("etc/motd")).unwrap(), None);
}
