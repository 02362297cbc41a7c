// crates/runcoord-core/tests/watch_diff.rs
// ============================================================================
// Module: Watch Diff Tests
// Description: Snapshot diffing and watch registry delivery behavior.
// Purpose: Ensure exactly one event per key transition and isolated callbacks.
// Dependencies: runcoord-core
// ============================================================================

//! ## Overview
//! Covers classification of key transitions, predicate matching, and
//! delivery when sibling callbacks fail or panic.

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

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::mpsc;
use std::time::Duration;

use runcoord_core::WatchCallback;
use runcoord_core::WatchDeliveryError;
use runcoord_core::WatchEvent;
use runcoord_core::WatchNotification;
use runcoord_core::WatchPredicate;
use runcoord_core::WatchRegistry;
use runcoord_core::diff_entries;

fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
}

#[test]
fn diff_classifies_each_key_once() {
    let old = map(&[("a", "1"), ("b", "2"), ("c", "3")]);
    let new = map(&[("b", "2"), ("c", "30"), ("d", "4")]);
    let changes = diff_entries(&old, &new);
    let summary: Vec<(&str, WatchEvent)> =
        changes.iter().map(|change| (change.key.as_str(), change.event)).collect();
    assert_eq!(
        summary,
        vec![("a", WatchEvent::Delete), ("c", WatchEvent::Modified), ("d", WatchEvent::New)]
    );
    assert_eq!(changes[1].old_value.as_deref(), Some("3"));
    assert_eq!(changes[1].new_value.as_deref(), Some("30"));
}

#[test]
fn diff_of_identical_maps_is_empty() {
    let entries = map(&[("a", "1")]);
    assert!(diff_entries(&entries, &entries).is_empty());
}

#[test]
fn prefix_predicate_matches_only_prefixed_keys() {
    let predicate = WatchPredicate::Prefix("run.".to_string());
    assert!(predicate.matches("run.R1.status"));
    assert!(!predicate.matches("runs.R1.status"));
    let exact = WatchPredicate::Key("run.R1.status".to_string());
    assert!(exact.matches("run.R1.status"));
    assert!(!exact.matches("run.R1.status.extra"));
}

#[test]
fn failing_and_panicking_callbacks_do_not_block_others() {
    let registry = WatchRegistry::new(16);
    let failing: WatchCallback =
        Arc::new(|_: &WatchNotification| -> Result<(), WatchDeliveryError> {
            Err(WatchDeliveryError::Callback("boom".to_string()))
        });
    let panicking: WatchCallback =
        Arc::new(|_: &WatchNotification| -> Result<(), WatchDeliveryError> {
            panic!("callback panic")
        });
    let (sender, receiver) = mpsc::channel();
    let sender = Mutex::new(sender);
    let healthy: WatchCallback = Arc::new(move |notification: &WatchNotification| {
        sender.lock().unwrap().send(notification.key.clone()).unwrap();
        Ok(())
    });
    registry.register(WatchPredicate::Prefix("run.".to_string()), failing).unwrap();
    registry.register(WatchPredicate::Prefix("run.".to_string()), panicking).unwrap();
    registry.register(WatchPredicate::Prefix("run.".to_string()), healthy).unwrap();

    for round in 0..2 {
        let changes = diff_entries(&map(&[]), &map(&[("run.R1.status", "queued")]));
        assert_eq!(registry.dispatch(&changes).unwrap(), 3, "round {round}");
        assert_eq!(receiver.recv_timeout(Duration::from_secs(5)).unwrap(), "run.R1.status");
    }
    assert_eq!(registry.len().unwrap(), 3);
}

#[test]
fn unregister_unknown_watch_reports_false() {
    let registry = WatchRegistry::default();
    let callback: WatchCallback = Arc::new(|_: &WatchNotification| Ok(()));
    let id = registry.register(WatchPredicate::Key("a".to_string()), callback).unwrap();
    assert!(registry.unregister(id).unwrap());
    assert!(!registry.unregister(id).unwrap());
    assert!(registry.is_empty().unwrap());
}
