//! Tests for spill stores.

use std::fs;

use rstest::{fixture, rstest};
use tempfile::{TempDir, tempdir};

use super::*;

#[fixture]
fn spill_dir() -> TempDir {
    tempdir().expect("create temp dir")
}

fn file_store(dir: &TempDir, cap: u64) -> FileSpillStore {
    FileSpillStore::new(dir.path().join("spill").join("backlog.log"), cap)
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

#[rstest]
fn file_store_preserves_append_order(spill_dir: TempDir) {
    let mut store = file_store(&spill_dir, DEFAULT_SPILL_CAP);
    for record in ["a", "b", "c"] {
        store.append(record).expect("append");
    }
    assert_eq!(store.drain_all(false).expect("drain"), owned(&["a", "b", "c"]));
    assert_eq!(store.size(), 6);
}

#[rstest]
fn missing_file_drains_to_nothing(spill_dir: TempDir) {
    let mut store = file_store(&spill_dir, DEFAULT_SPILL_CAP);
    assert!(store.drain_all(true).expect("drain").is_empty());
    assert_eq!(store.size(), 0);
}

#[rstest]
fn drain_with_removal_deletes_file(spill_dir: TempDir) {
    let mut store = file_store(&spill_dir, DEFAULT_SPILL_CAP);
    store.append("gone").expect("append");
    assert_eq!(store.drain_all(true).expect("drain"), owned(&["gone"]));
    assert!(!store.path().exists());
    assert!(store.drain_all(false).expect("drain").is_empty());
}

#[rstest]
fn exceeding_cap_truncates_before_append(spill_dir: TempDir) {
    let mut store = file_store(&spill_dir, 10);
    store.append("1234").expect("append");
    store.append("5678").expect("append");
    store.append("newest").expect("append");
    assert_eq!(store.drain_all(false).expect("drain"), owned(&["newest"]));
    assert!(store.size() <= 10);
}

#[rstest]
fn replace_all_rewrites_content(spill_dir: TempDir) {
    let mut store = file_store(&spill_dir, DEFAULT_SPILL_CAP);
    for record in ["a", "b", "c"] {
        store.append(record).expect("append");
    }
    store.replace_all(&owned(&["c"])).expect("replace");
    assert_eq!(store.drain_all(false).expect("drain"), owned(&["c"]));
    store.recreate().expect("recreate");
    assert_eq!(store.size(), 0);
    assert!(store.path().exists());
}

#[rstest]
fn file_store_survives_reopen(spill_dir: TempDir) {
    let mut first = file_store(&spill_dir, DEFAULT_SPILL_CAP);
    first.append("persisted").expect("append");
    let mut second = file_store(&spill_dir, DEFAULT_SPILL_CAP);
    assert_eq!(second.drain_all(false).expect("drain"), owned(&["persisted"]));
}

#[rstest]
fn invalid_utf8_is_read_lossily(spill_dir: TempDir) {
    let mut store = file_store(&spill_dir, DEFAULT_SPILL_CAP);
    store.append("ok").expect("append");
    let mut bytes = fs::read(store.path()).expect("read");
    bytes.extend_from_slice(b"bad\xff\n");
    fs::write(store.path(), bytes).expect("write");
    let records = store.drain_all(false).expect("drain");
    assert_eq!(records.len(), 2);
    assert_eq!(records[1], "bad\u{fffd}");
}

#[rstest]
fn memory_store_shares_state_between_clones() {
    let store = MemorySpillStore::default();
    let mut writer = store.clone();
    writer.append("x").expect("append");
    writer.append("y").expect("append");
    assert_eq!(store.records(), owned(&["x", "y"]));
    assert_eq!(store.size(), 4);
}

#[rstest]
fn memory_store_honours_cap_and_replace() {
    let mut store = MemorySpillStore::new(6);
    store.append("aa").expect("append");
    store.append("bb").expect("append");
    store.append("cc").expect("append");
    assert_eq!(store.records(), owned(&["cc"]));
    store.replace_all(&owned(&["p", "q"])).expect("replace");
    assert_eq!(store.drain_all(true).expect("drain"), owned(&["p", "q"]));
    assert!(store.is_empty());
}

fn append_with_empty_records(store: &mut impl SpillStore) -> Vec<String> {
    for record in ["a", "", "b", ""] {
        store.append(record).expect("append");
    }
    store.drain_all(false).expect("drain")
}

#[rstest]
fn empty_records_survive_a_drain(spill_dir: TempDir) {
    let expected = owned(&["a", "", "b", ""]);
    let mut file = file_store(&spill_dir, DEFAULT_SPILL_CAP);
    assert_eq!(append_with_empty_records(&mut file), expected);
    assert_eq!(append_with_empty_records(&mut MemorySpillStore::default()), expected);
}

#[rstest]
fn unterminated_tail_is_still_a_record(spill_dir: TempDir) {
    let mut store = file_store(&spill_dir, DEFAULT_SPILL_CAP);
    store.append("whole").expect("append");
    let mut bytes = fs::read(store.path()).expect("read");
    bytes.extend_from_slice(b"torn");
    fs::write(store.path(), bytes).expect("write");
    assert_eq!(store.drain_all(false).expect("drain"), owned(&["whole", "torn"]));
}
