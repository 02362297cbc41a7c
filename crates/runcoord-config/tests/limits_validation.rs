//! Range and cross-field validation tests for runcoord-config.
// crates/runcoord-config/tests/limits_validation.rs
// =============================================================================
// Module: Config Limits Validation Tests
// Description: Validate numeric ranges, paths, and namespaces.
// Purpose: Ensure out-of-range settings fail closed instead of clamping.
// =============================================================================

use std::path::PathBuf;

use runcoord_core::NamespacePolicy;

mod common;

use common::assert_invalid;

type TestResult = Result<(), String>;

#[test]
fn store_path_must_be_set() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.store.path = PathBuf::new();
    assert_invalid(config.validate(), "store.path must be set")
}

#[test]
fn lock_timeout_out_of_range_is_rejected() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.store.lock_timeout_ms = 5;
    assert_invalid(config.validate(), "store.lock_timeout_ms must be between")?;
    config.store.lock_timeout_ms = 120_000;
    assert_invalid(config.validate(), "store.lock_timeout_ms must be between")
}

#[test]
fn retry_interval_longer_than_timeout_is_rejected() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.store.lock_timeout_ms = 100;
    config.store.lock_retry_interval_ms = 500;
    assert_invalid(config.validate(), "must not exceed store.lock_timeout_ms")
}

#[test]
fn zero_max_value_bytes_is_rejected() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.store.max_value_bytes = 0;
    assert_invalid(config.validate(), "store.max_value_bytes")
}

#[test]
fn poll_interval_below_minimum_is_rejected() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.watch.poll_interval_ms = 10;
    assert_invalid(config.validate(), "watch.poll_interval_ms must be between")
}

#[test]
fn zero_delivery_queue_is_rejected() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.watch.delivery_queue_depth = 0;
    assert_invalid(config.validate(), "watch.delivery_queue_depth")
}

#[test]
fn worker_threads_out_of_range_is_rejected() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.scheduler.worker_threads = 0;
    assert_invalid(config.validate(), "scheduler.worker_threads")?;
    config.scheduler.worker_threads = 65;
    assert_invalid(config.validate(), "scheduler.worker_threads")
}

#[test]
fn malformed_run_namespace_is_rejected() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.scheduler.run_namespace = "frame.work".to_string();
    assert_invalid(config.validate(), "scheduler.run_namespace is invalid")?;
    config.scheduler.run_namespace = "Framework".to_string();
    config.store.namespace_policy = NamespacePolicy::Strict;
    assert_invalid(config.validate(), "scheduler.run_namespace is invalid")
}

#[test]
fn monitor_interval_out_of_range_is_rejected() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.scheduler.waiting_runs.interval_ms = 10;
    assert_invalid(config.validate(), "scheduler.waiting_runs.interval_ms")
}

#[test]
fn zero_heartbeat_timeout_is_rejected() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.scheduler.dead_heartbeat.timeout_secs = 0;
    assert_invalid(config.validate(), "timeout_secs must be greater than zero")
}

#[test]
fn retention_beyond_one_week_is_rejected() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.scheduler.finished_runs.retention_secs = 604_801;
    assert_invalid(config.validate(), "scheduler.finished_runs.retention_secs")
}

#[test]
fn zero_retention_is_allowed() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.scheduler.finished_runs.retention_secs = 0;
    config.validate().map_err(|err| err.to_string())
}
