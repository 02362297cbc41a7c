// crates/runcoord-scheduler/src/monitors/mod.rs
// ============================================================================
// Module: Lifecycle Monitors
// Description: Periodic passes over run records.
// Purpose: Share the monitor contract, pass report, and action execution.
// Dependencies: runcoord-core, time, tracing
// ============================================================================

//! ## Overview
//! Every monitor splits its pass in two: a pure `plan` over the current run
//! records and an injected `now`, then an execution step that applies the
//! planned actions through [`crate::FrameworkRuns`]. Plans are recomputed
//! from the store on every pass, so a pass that finds nothing to do is a
//! no-op and a repeated pass never repeats work that already landed.
//!
//! A failing action is logged and does not stop the remaining actions of
//! the same pass; the pass as a whole then reports failure so health
//! counters only count clean passes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use runcoord_core::StoreError;
use thiserror::Error;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Modules
// ============================================================================

mod dead_heartbeat;
mod finished_runs;
mod shared_environment;
mod waiting_runs;

pub use dead_heartbeat::DeadHeartbeatMonitor;
pub use dead_heartbeat::DeadRunAction;
pub use finished_runs::FinishedRunReaper;
pub use shared_environment::ExpiredSharedEnvironmentMonitor;
pub use waiting_runs::WaitingRunRequeuer;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Monitor pass errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MonitorError {
    /// Run records could not be read.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Monitor was configured or invoked with invalid input.
    #[error("monitor invalid: {0}")]
    Invalid(String),
    /// Pass panicked; caught by the scheduler.
    #[error("monitor pass panicked: {0}")]
    Panicked(String),
    /// Some planned actions failed; the rest were applied.
    #[error("{failed} of {planned} actions failed; first: {first}")]
    ActionsFailed {
        /// Actions attempted.
        planned: usize,
        /// Actions that returned an error.
        failed: usize,
        /// First error message.
        first: String,
    },
}

// ============================================================================
// SECTION: Monitor Contract
// ============================================================================

/// Outcome of one successful pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PassReport {
    /// Runs the pass looked at.
    pub examined: usize,
    /// Runs the pass changed.
    pub acted: usize,
}

/// Periodic task making an idempotent pass over run records.
pub trait Monitor: Send + Sync {
    /// Stable monitor name used for logs, health, and metrics.
    fn name(&self) -> &'static str;

    /// Performs one pass.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError`] when the runs cannot be read or an action
    /// fails.
    fn run_pass(&self) -> Result<PassReport, MonitorError>;
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns true once `window` has fully elapsed since `since`.
pub(crate) fn window_elapsed(
    since: OffsetDateTime,
    window: Duration,
    now: OffsetDateTime,
) -> bool {
    now - since >= window
}

/// Applies every planned action, counting those that changed the store.
///
/// `apply` returns `Ok(false)` when the action lost a race and changed
/// nothing.
pub(crate) fn apply_actions<T>(
    monitor: &'static str,
    planned: &[T],
    run_name: impl Fn(&T) -> &str,
    apply: impl Fn(&T) -> Result<bool, StoreError>,
) -> Result<usize, MonitorError> {
    let total = planned.len();
    let mut acted = 0;
    let mut failed = 0;
    let mut first = None;
    for action in planned {
        match apply(action) {
            Ok(true) => acted += 1,
            Ok(false) => {
                tracing::debug!(
                    monitor,
                    run = run_name(action),
                    "run changed concurrently; skipped"
                );
            }
            Err(err) => {
                tracing::warn!(monitor, run = run_name(action), error = %err, "run action failed");
                failed += 1;
                if first.is_none() {
                    first = Some(err.to_string());
                }
            }
        }
    }
    match first {
        None => Ok(acted),
        Some(first) => Err(MonitorError::ActionsFailed {
            planned: total,
            failed,
            first,
        }),
    }
}
