// crates/runcoord-scheduler/tests/monitors.rs
// ============================================================================
// Module: Monitor Tests
// Description: Single passes of each lifecycle monitor.
// Purpose: Pin down which runs each monitor touches and what it writes.
// Dependencies: runcoord-scheduler, runcoord-core
// ============================================================================

//! ## Overview
//! Every test seeds an in-memory `framework` namespace, pins the clock at
//! [`common::NOW`], and runs exactly one pass.

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
use runcoord_scheduler::DeadHeartbeatMonitor;
use runcoord_scheduler::ExpiredSharedEnvironmentMonitor;
use runcoord_scheduler::FinishedRunReaper;
use runcoord_scheduler::FrameworkRuns;
use runcoord_scheduler::Monitor;
use runcoord_scheduler::MonitorError;
use runcoord_scheduler::ResetPolicy;
use runcoord_scheduler::WaitingRunRequeuer;

use crate::common::FailingDeletes;
use crate::common::fixed_clock;
use crate::common::framework_store;
use crate::common::memory_runs;
use crate::common::seed;

const FIVE_MINUTES: Duration = Duration::from_secs(300);

// ============================================================================
// SECTION: Dead Heartbeat
// ============================================================================

#[test]
fn dead_local_run_is_deleted() {
    let (store, runs) = memory_runs();
    let (_, clock) = fixed_clock();
    seed(&store, &[
        ("run.R2.heartbeat", "2026-10-16T11:50:00Z"),
        ("run.R2.local", "true"),
        ("run.R2.test", "SimpleTest"),
    ]);

    let monitor = DeadHeartbeatMonitor::new(runs, clock, FIVE_MINUTES, ResetPolicy::Queued);
    let report = monitor.run_pass().unwrap();

    assert_eq!(report.acted, 1);
    assert!(store.get_prefix("run.R2.").unwrap().is_empty());
}

#[test]
fn dead_automated_run_is_reset_to_queued() {
    let (store, runs) = memory_runs();
    let (_, clock) = fixed_clock();
    seed(&store, &[
        ("run.R4.status", "running"),
        ("run.R4.heartbeat", "2026-10-16T11:55:00Z"),
        ("run.R4.requestor", "alice"),
    ]);

    let monitor = DeadHeartbeatMonitor::new(runs, clock, FIVE_MINUTES, ResetPolicy::Queued);
    assert_eq!(monitor.run_pass().unwrap().acted, 1);

    assert_eq!(store.get("run.R4.status").unwrap().as_deref(), Some("queued"));
    assert_eq!(store.get("run.R4.queued").unwrap().as_deref(), Some("2026-10-16T12:00:00Z"));
    assert_eq!(store.get("run.R4.heartbeat").unwrap(), None);
    assert_eq!(store.get("run.R4.requestor").unwrap().as_deref(), Some("alice"));

    assert_eq!(monitor.run_pass().unwrap().acted, 0);
}

#[test]
fn pending_policy_parks_dead_runs() {
    let (store, runs) = memory_runs();
    let (_, clock) = fixed_clock();
    seed(&store, &[("run.R4.status", "running"), ("run.R4.heartbeat", "2026-10-16T11:00:00Z")]);

    DeadHeartbeatMonitor::new(runs, clock, FIVE_MINUTES, ResetPolicy::Pending).run_pass().unwrap();

    assert_eq!(store.get("run.R4.status").unwrap().as_deref(), Some("pending"));
}

#[test]
fn live_shared_finished_and_silent_runs_are_left_alone() {
    let (store, runs) = memory_runs();
    let (_, clock) = fixed_clock();
    seed(&store, &[
        ("run.FRESH.status", "running"),
        ("run.FRESH.heartbeat", "2026-10-16T11:58:00Z"),
        ("run.SHARED.status", "up"),
        ("run.SHARED.heartbeat", "2026-10-16T10:00:00Z"),
        ("run.SHARED.shared.environment", "true"),
        ("run.DONE.status", "finished"),
        ("run.DONE.heartbeat", "2026-10-16T10:00:00Z"),
        ("run.SILENT.status", "queued"),
    ]);
    let before = store.get_prefix("run.").unwrap();

    let monitor = DeadHeartbeatMonitor::new(runs, clock, FIVE_MINUTES, ResetPolicy::Queued);
    let report = monitor.run_pass().unwrap();

    assert_eq!(report.examined, 3);
    assert_eq!(report.acted, 0);
    assert_eq!(store.get_prefix("run.").unwrap(), before);
}

#[test]
fn heartbeat_exactly_at_timeout_is_dead() {
    let (store, runs) = memory_runs();
    let (_, clock) = fixed_clock();
    seed(&store, &[("run.EDGE.heartbeat", "2026-10-16T11:55:00Z"), ("run.EDGE.local", "true")]);

    DeadHeartbeatMonitor::new(runs, clock, FIVE_MINUTES, ResetPolicy::Queued).run_pass().unwrap();

    assert!(store.get_prefix("run.EDGE.").unwrap().is_empty());
}

#[test]
fn reset_loses_to_a_concurrent_status_change() {
    let (store, runs) = memory_runs();
    seed(&store, &[("run.R6.status", "running"), ("run.R6.heartbeat", "2026-10-16T11:00:00Z")]);
    let record = runs.get_run("R6").unwrap().unwrap();

    store.put("run.R6.status", "finished").unwrap();
    let reset = runs.reset_run(&record, ResetPolicy::Queued, common::at(common::NOW)).unwrap();

    assert!(!reset);
    assert_eq!(store.get("run.R6.status").unwrap().as_deref(), Some("finished"));
    assert!(store.get("run.R6.heartbeat").unwrap().is_some());
}

#[test]
fn failed_action_does_not_stop_the_rest_of_the_pass() {
    let store = framework_store(FailingDeletes::new("run.BAD."));
    let runs = FrameworkRuns::new(store.clone());
    let (_, clock) = fixed_clock();
    seed(&store, &[
        ("run.BAD.heartbeat", "2026-10-16T11:00:00Z"),
        ("run.BAD.local", "true"),
        ("run.GOOD.heartbeat", "2026-10-16T11:00:00Z"),
        ("run.GOOD.local", "true"),
    ]);

    let result =
        DeadHeartbeatMonitor::new(runs, clock, FIVE_MINUTES, ResetPolicy::Queued).run_pass();

    match result {
        Err(MonitorError::ActionsFailed {
            planned,
            failed,
            ..
        }) => {
            assert_eq!(planned, 2);
            assert_eq!(failed, 1);
        }
        other => panic!("expected partial failure, got {other:?}"),
    }
    assert!(store.get_prefix("run.GOOD.").unwrap().is_empty());
    assert!(!store.get_prefix("run.BAD.").unwrap().is_empty());
}

// ============================================================================
// SECTION: Shared Environments
// ============================================================================

#[test]
fn expired_shared_environments_are_deleted() {
    let (store, runs) = memory_runs();
    let (_, clock) = fixed_clock();
    seed(&store, &[
        ("run.OLD.shared.environment", "true"),
        ("run.OLD.shared.environment.expire", "2026-10-16T11:00:00Z"),
        ("run.NEW.shared.environment", "true"),
        ("run.NEW.shared.environment.expire", "2026-10-17T11:00:00Z"),
        ("run.PLAIN.shared.environment.expire", "2026-10-16T11:00:00Z"),
        ("run.PLAIN.status", "running"),
    ]);

    let report = ExpiredSharedEnvironmentMonitor::new(runs, clock).run_pass().unwrap();

    assert_eq!(report.acted, 1);
    assert!(store.get_prefix("run.OLD.").unwrap().is_empty());
    assert!(!store.get_prefix("run.NEW.").unwrap().is_empty());
    assert!(!store.get_prefix("run.PLAIN.").unwrap().is_empty());
}

// ============================================================================
// SECTION: Finished Runs
// ============================================================================

#[test]
fn reaping_twice_deletes_once_and_second_pass_is_a_no_op() {
    let (store, runs) = memory_runs();
    let (_, clock) = fixed_clock();
    seed(&store, &[
        ("run.R1.status", "finished"),
        ("run.R1.finished", "2026-10-16T11:00:00Z"),
        ("run.R1.result", "Passed"),
    ]);
    let reaper = FinishedRunReaper::new(runs, clock, FIVE_MINUTES);

    let first = reaper.run_pass().unwrap();
    let second = reaper.run_pass().unwrap();

    assert_eq!(first.acted, 1);
    assert_eq!(second.acted, 0);
    assert_eq!(second.examined, 0);
    assert!(store.get_prefix("run.R1.").unwrap().is_empty());
}

#[test]
fn finished_runs_are_kept_until_retention_elapses() {
    let (store, runs) = memory_runs();
    let (clock, handle) = fixed_clock();
    seed(&store, &[
        ("run.R1.status", "Finished"),
        ("run.R1.finished", "2026-10-16T11:58:00Z"),
        ("run.NOSTAMP.status", "finished"),
    ]);
    let reaper = FinishedRunReaper::new(runs, handle, FIVE_MINUTES);

    assert_eq!(reaper.run_pass().unwrap().acted, 0);
    clock.advance(Duration::from_secs(180));
    assert_eq!(reaper.run_pass().unwrap().acted, 1);

    assert!(store.get_prefix("run.R1.").unwrap().is_empty());
    assert_eq!(store.get("run.NOSTAMP.status").unwrap().as_deref(), Some("finished"));
}

// ============================================================================
// SECTION: Waiting Runs
// ============================================================================

#[test]
fn due_waiting_run_is_requeued_and_wait_cleared() {
    let (store, runs) = memory_runs();
    let (_, clock) = fixed_clock();
    seed(&store, &[("run.R1.status", "waiting"), ("run.R1.wait.until", "2026-10-16T11:59:00Z")]);

    let report = WaitingRunRequeuer::new(runs, clock).run_pass().unwrap();

    assert_eq!(report.acted, 1);
    assert_eq!(store.get("run.R1.status").unwrap().as_deref(), Some("queued"));
    assert_eq!(store.get("run.R1.wait.until").unwrap(), None);
    assert_eq!(store.get("run.R1.queued").unwrap().as_deref(), Some("2026-10-16T12:00:00Z"));
}

#[test]
fn waiting_runs_not_yet_due_stay_waiting() {
    let (store, runs) = memory_runs();
    let (clock, handle) = fixed_clock();
    seed(&store, &[
        ("run.R1.status", "waiting"),
        ("run.R1.wait.until", "2026-10-16T12:01:00Z"),
        ("run.R2.status", "waiting"),
    ]);
    let requeuer = WaitingRunRequeuer::new(runs, handle);

    assert_eq!(requeuer.run_pass().unwrap().acted, 0);
    assert_eq!(store.get("run.R1.status").unwrap().as_deref(), Some("waiting"));

    clock.advance(Duration::from_secs(60));
    assert_eq!(requeuer.run_pass().unwrap().acted, 1);
    assert_eq!(store.get("run.R1.status").unwrap().as_deref(), Some("queued"));
    assert_eq!(store.get("run.R2.status").unwrap().as_deref(), Some("waiting"));
}

#[test]
fn plans_are_pure_over_records() {
    let (store, runs) = memory_runs();
    seed(&store, &[("run.A.status", "waiting"), ("run.A.wait.until", "2026-10-16T11:00:00Z")]);
    let records = runs.all_runs().unwrap();

    let planned = WaitingRunRequeuer::plan(&records, common::at(common::NOW));

    assert_eq!(planned.len(), 1);
    assert_eq!(store.get("run.A.status").unwrap().as_deref(), Some("waiting"));
}
