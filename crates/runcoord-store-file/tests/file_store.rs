// crates/runcoord-store-file/tests/file_store.rs
// ============================================================================
// Module: File Store Tests
// Description: Durability, atomicity, and locking of the file-backed store.
// Purpose: Ensure several instances and processes sharing one file never
//          lose updates or observe partial writes.
// Dependencies: runcoord-store-file, runcoord-core, proptest, tempfile
// ============================================================================

//! ## Overview
//! Every instance opened on a path behaves like a separate process: it has
//! its own lock file descriptor and its own in-process writer gate. The
//! cross-process test additionally races real OS processes through the
//! `runcoord_cas_contender` binary.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use std::sync::Barrier;
use std::thread;
use std::time::Duration;

use proptest::prelude::*;
use runcoord_core::StatusStore;
use runcoord_core::StoreError;
use runcoord_store_file::FileLockGuard;
use runcoord_store_file::FileStatusStore;
use runcoord_store_file::FileStoreConfig;
use runcoord_store_file::FileStoreError;
use runcoord_store_file::KeyValueFile;
use runcoord_store_file::WatchPollConfig;
use runcoord_store_file::lock_path_for;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn config(path: &Path) -> FileStoreConfig {
    let mut config = FileStoreConfig::new(path);
    config.sync_writes = false;
    config
}

fn open_file(path: &Path) -> KeyValueFile {
    KeyValueFile::open(config(path)).unwrap()
}

fn open_store(path: &Path) -> FileStatusStore {
    FileStatusStore::open(config(path), WatchPollConfig::manual()).unwrap()
}

fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
}

// ============================================================================
// SECTION: Persistence
// ============================================================================

#[test]
fn missing_file_loads_as_empty_snapshot() {
    let dir = TempDir::new().unwrap();
    let file = open_file(&dir.path().join("nested").join("status.properties"));
    let snapshot = file.load().unwrap();
    assert!(snapshot.is_empty());
    assert!(!file.path().exists());
}

#[test]
fn values_persist_across_instances() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("status.properties");
    {
        let store = open_store(&path);
        store.put_all(&map(&[("framework.run.R1.status", "queued"), ("cps.a", "1")])).unwrap();
    }
    let reopened = open_store(&path);
    assert_eq!(reopened.get("framework.run.R1.status").unwrap().as_deref(), Some("queued"));
    assert_eq!(reopened.get_prefix("cps.").unwrap(), map(&[("cps.a", "1")]));
}

#[test]
fn file_is_written_sorted_and_human_readable() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("status.properties");
    let file = open_file(&path);
    file.set_many(&map(&[("b", "2"), ("a", "x=y")])).unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "a=x=y\nb=2\n");
}

#[test]
fn unchanged_write_does_not_rewrite_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("status.properties");
    let file = open_file(&path);
    file.set("a", "1").unwrap();
    let before = file.load().unwrap().fingerprint;
    fs::write(&path, "# hand edited\na=1\n").unwrap();
    file.set("a", "1").unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "# hand edited\na=1\n");
    assert_ne!(file.load().unwrap().fingerprint, before);
}

#[test]
fn corrupt_file_fails_reads_and_is_never_rewritten() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("status.properties");
    fs::write(&path, "a=1\nthis line has no separator\n").unwrap();
    let store = open_store(&path);

    assert!(matches!(store.get("a"), Err(StoreError::Corrupt(_))));
    assert!(matches!(store.put("b", "2"), Err(StoreError::Corrupt(_))));
    assert!(matches!(store.ensure_available(), Err(StoreError::Corrupt(_))));
    assert_eq!(fs::read_to_string(&path).unwrap(), "a=1\nthis line has no separator\n");
}

#[test]
fn directory_path_is_rejected() {
    let dir = TempDir::new().unwrap();
    let result = KeyValueFile::open(config(dir.path()));
    assert!(matches!(result, Err(FileStoreError::Invalid(_))));
}

#[test]
fn delete_prefix_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir.path().join("status.properties"));
    let run = map(&[("run.R1.status", "queued"), ("run.R1.heartbeat", "2026-01-01T00:00:00Z")]);
    store.put_all(&run).unwrap();
    store.put("run.R11.status", "running").unwrap();
    assert_eq!(store.get_prefix("run.R1.").unwrap(), run);

    store.delete_prefix("run.R1.").unwrap();
    assert!(store.get_prefix("run.R1.").unwrap().is_empty());
    assert_eq!(store.get("run.R11.status").unwrap().as_deref(), Some("running"));
}

// ============================================================================
// SECTION: Locking
// ============================================================================

#[test]
fn held_lock_surfaces_as_unavailable() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("status.properties");
    let mut short = config(&path);
    short.lock_timeout_ms = 50;
    short.lock_retry_interval_ms = 5;
    let store = FileStatusStore::open(short, WatchPollConfig::manual()).unwrap();
    store.put("a", "1").unwrap();

    let held = FileLockGuard::acquire(
        &lock_path_for(&path),
        Duration::from_secs(1),
        Duration::from_millis(5),
    )
    .unwrap();
    assert!(matches!(store.put("a", "2"), Err(StoreError::Unavailable(_))));
    assert!(matches!(store.put_swap("a", Some("1"), "2"), Err(StoreError::Unavailable(_))));
    assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));

    drop(held);
    store.put("a", "2").unwrap();
    assert_eq!(store.get("a").unwrap().as_deref(), Some("2"));
}

#[test]
fn interleaved_writers_on_separate_instances_lose_nothing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("status.properties");
    let writers = 4;
    let per_writer = 25;
    let handles: Vec<_> = (0..writers)
        .map(|writer| {
            let path = path.clone();
            thread::spawn(move || {
                let file = open_file(&path);
                for index in 0..per_writer {
                    file.set(&format!("w{writer}.k{index}"), "v").unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(open_file(&path).load().unwrap().len(), writers * per_writer);
}

// ============================================================================
// SECTION: Compare And Swap
// ============================================================================

#[test]
fn racing_swaps_from_same_value_have_exactly_one_winner() {
    for round in 0..10 {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("status.properties");
        open_file(&path).set("run.R3.status", "waiting").unwrap();
        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = ["queued-by-a", "queued-by-b"]
            .into_iter()
            .map(|target| {
                let path = path.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let file = open_file(&path);
                    barrier.wait();
                    let others = BTreeMap::new();
                    file.compare_and_swap("run.R3.status", Some("waiting"), target, &others)
                        .unwrap()
                })
            })
            .collect();
        let wins: Vec<bool> = handles.into_iter().map(|handle| handle.join().unwrap()).collect();
        assert_eq!(wins.iter().filter(|won| **won).count(), 1, "round {round}");
        let value = open_file(&path).load().unwrap().get("run.R3.status").unwrap().to_string();
        assert!(value == "queued-by-a" || value == "queued-by-b", "round {round}: {value}");
    }
}

#[test]
fn swap_applies_bundled_writes_only_on_success() {
    let dir = TempDir::new().unwrap();
    let file = open_file(&dir.path().join("status.properties"));
    file.set("run.R1.status", "waiting").unwrap();
    let extra = map(&[("run.R1.queued", "2026-03-01T10:00:00Z"), ("run.R1.status", "ignored")]);

    assert!(!file.compare_and_swap("run.R1.status", Some("running"), "queued", &extra).unwrap());
    assert_eq!(file.load().unwrap().get("run.R1.queued"), None);

    assert!(file.compare_and_swap("run.R1.status", Some("waiting"), "queued", &extra).unwrap());
    let snapshot = file.load().unwrap();
    assert_eq!(snapshot.get("run.R1.status"), Some("queued"));
    assert_eq!(snapshot.get("run.R1.queued"), Some("2026-03-01T10:00:00Z"));
}

#[test]
fn swap_with_absent_expectation_creates_once() {
    let dir = TempDir::new().unwrap();
    let file = open_file(&dir.path().join("status.properties"));
    assert!(file.compare_and_swap("owner", None, "a", &BTreeMap::new()).unwrap());
    assert!(!file.compare_and_swap("owner", None, "b", &BTreeMap::new()).unwrap());
    assert_eq!(file.load().unwrap().get("owner"), Some("a"));
}

#[test]
fn readers_never_observe_partial_bundled_writes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("status.properties");
    let generations = 60_u32;
    open_file(&path)
        .set_many(&map(&[("k", "gen-0"), ("a", "0"), ("b", "0")]))
        .unwrap();

    let writer_path = path.clone();
    let writer = thread::spawn(move || {
        let file = open_file(&writer_path);
        for generation in 1..=generations {
            let previous = format!("gen-{}", generation - 1);
            let stamp = generation.to_string();
            let extra =
                BTreeMap::from([("a".to_string(), stamp.clone()), ("b".to_string(), stamp)]);
            assert!(
                file.compare_and_swap("k", Some(&previous), &format!("gen-{generation}"), &extra)
                    .unwrap()
            );
        }
    });
    let reader = open_file(&path);
    loop {
        let snapshot = reader.load().unwrap();
        let key = snapshot.get("k").unwrap().to_string();
        let a = snapshot.get("a").unwrap();
        let b = snapshot.get("b").unwrap();
        assert_eq!(key, format!("gen-{a}"));
        assert_eq!(a, b);
        if key == format!("gen-{generations}") {
            break;
        }
    }
    writer.join().unwrap();
}

#[test]
fn separate_processes_increment_without_lost_updates() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("status.properties");
    let processes = 4;
    let increments = 15;
    let children: Vec<_> = (0..processes)
        .map(|_| {
            Command::new(env!("CARGO_BIN_EXE_runcoord_cas_contender"))
                .arg(&path)
                .arg("counter")
                .arg(increments.to_string())
                .spawn()
                .unwrap()
        })
        .collect();
    for mut child in children {
        assert!(child.wait().unwrap().success());
    }
    let total = open_file(&path).load().unwrap().get("counter").unwrap().to_string();
    assert_eq!(total, (processes * increments).to_string());
}

// ============================================================================
// SECTION: Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn arbitrary_entries_survive_save_and_load(
        entries in proptest::collection::btree_map(
            "[A-Za-z0-9_=:#! -][A-Za-z0-9_.=:#! -]{0,10}[A-Za-z0-9_=:#! -]",
            any::<String>().prop_filter("value size", |value| value.len() <= 256),
            0..8,
        )
    ) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("status.properties");
        open_file(&path).save(&entries).unwrap();
        prop_assert_eq!(open_file(&path).load().unwrap().entries, entries);
    }
}
