//! Run watch integration tests for runcoord-scheduler.
// crates/runcoord-scheduler/tests/run_watch.rs
// ============================================================================
// Module: Run Watch Tests
// Description: Completion notices derived from run status transitions.
// Purpose: Ensure only finished or deleted runs reach listeners.
// Dependencies: runcoord-scheduler, runcoord-core
// ============================================================================

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

mod common;

use std::time::Duration;

use runcoord_core::StatusStore;
use runcoord_core::WatchEvent;
use runcoord_core::WatchNotification;
use runcoord_scheduler::RunWatch;
use runcoord_scheduler::run_watch::completed_run;

use crate::common::ChannelListener;
use crate::common::memory_runs;
use crate::common::seed;

const WAIT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(200);

fn notification(key: &str, event: WatchEvent, new_value: Option<&str>) -> WatchNotification {
    WatchNotification {
        key: key.to_string(),
        event,
        old_value: None,
        new_value: new_value.map(str::to_string),
    }
}

#[test]
fn classification_only_accepts_status_keys() {
    let finished = notification("run.R1.status", WatchEvent::Modified, Some("FINISHED"));
    let running = notification("run.R1.status", WatchEvent::Modified, Some("running"));
    let deleted = notification("run.R1.status", WatchEvent::Delete, None);
    let heartbeat = notification("run.R1.heartbeat", WatchEvent::Delete, None);
    let shared = notification("run.R1.shared.environment", WatchEvent::New, Some("finished"));

    assert_eq!(completed_run(&finished), Some("R1"));
    assert_eq!(completed_run(&running), None);
    assert_eq!(completed_run(&deleted), Some("R1"));
    assert_eq!(completed_run(&heartbeat), None);
    assert_eq!(completed_run(&shared), None);
}

#[test]
fn finishing_and_deleting_runs_reach_the_listener() {
    let (store, _) = memory_runs();
    seed(&store, &[("run.R1.status", "running"), ("run.R2.status", "queued")]);
    let (listener, receiver) = ChannelListener::new();
    let watch = RunWatch::start(store.clone(), listener).unwrap();
    assert!(watch.is_active());

    store.put("run.R1.heartbeat", "2026-10-16T12:00:00Z").unwrap();
    store.put("run.R1.status", "Finished").unwrap();
    assert_eq!(receiver.recv_timeout(WAIT).unwrap(), "R1");

    store.delete_prefix("run.R2.").unwrap();
    assert_eq!(receiver.recv_timeout(WAIT).unwrap(), "R2");
    assert!(receiver.recv_timeout(QUIET).is_err());
}

#[test]
fn stopped_watch_is_silent() {
    let (store, _) = memory_runs();
    let (listener, receiver) = ChannelListener::new();
    let watch = RunWatch::start(store.clone(), listener).unwrap();

    watch.stop().unwrap();
    watch.stop().unwrap();
    assert!(!watch.is_active());

    store.put("run.R1.status", "finished").unwrap();
    assert!(receiver.recv_timeout(QUIET).is_err());
}

#[test]
fn other_namespaces_do_not_trigger_the_watch() {
    let (store, _) = memory_runs();
    let (listener, receiver) = ChannelListener::new();
    let _watch = RunWatch::start(store.clone(), listener).unwrap();

    store.inner().put("other.run.R1.status", "finished").unwrap();
    assert!(receiver.recv_timeout(QUIET).is_err());
}
