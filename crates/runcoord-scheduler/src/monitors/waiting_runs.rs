// crates/runcoord-scheduler/src/monitors/waiting_runs.rs
// ============================================================================
// Module: Waiting Run Requeuer
// Description: Requeues waiting runs whose wait has elapsed.
// Purpose: Move runs from waiting to queued exactly once across schedulers.
// Dependencies: runcoord-core, time, tracing
// ============================================================================

//! ## Overview
//! A waiting run becomes due once `wait.until <= now`. The requeue is a
//! compare-and-swap from the observed status to `queued`, bundled with a
//! fresh `queued` stamp, so when two schedulers race only one moves the run.
//! `wait.until` is cleared only by the winner.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use time::OffsetDateTime;

use super::Monitor;
use super::MonitorError;
use super::PassReport;
use super::apply_actions;
use crate::clock::Clock;
use crate::runs::FrameworkRuns;
use crate::runs::RunRecord;
use crate::runs::status;

// ============================================================================
// SECTION: Monitor
// ============================================================================

/// Requeues waiting runs once `wait.until <= now`.
pub struct WaitingRunRequeuer {
    /// Run view.
    runs: FrameworkRuns,
    /// Time source.
    clock: Arc<dyn Clock>,
}

impl WaitingRunRequeuer {
    /// Monitor name.
    pub const NAME: &'static str = "waiting_runs";

    /// Creates the requeuer.
    #[must_use]
    pub fn new(runs: FrameworkRuns, clock: Arc<dyn Clock>) -> Self {
        Self {
            runs,
            clock,
        }
    }

    /// Returns the waiting runs that are due.
    #[must_use]
    pub fn plan(runs: &[RunRecord], now: OffsetDateTime) -> Vec<RunRecord> {
        runs.iter()
            .filter(|run| run.has_status(status::WAITING))
            .filter(|run| run.wait_until.is_some_and(|until| until <= now))
            .cloned()
            .collect()
    }
}

// ============================================================================
// SECTION: Pass
// ============================================================================

impl Monitor for WaitingRunRequeuer {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn run_pass(&self) -> Result<PassReport, MonitorError> {
        let now = self.clock.now();
        let runs = self.runs.active_runs()?;
        let planned = Self::plan(&runs, now);
        let acted = apply_actions(
            Self::NAME,
            &planned,
            |run| run.name.as_str(),
            |run| {
                let requeued = self.runs.requeue_waiting_run(run, now)?;
                if requeued {
                    tracing::info!(run = %run.name, "requeued waiting run");
                }
                Ok(requeued)
            },
        )?;
        Ok(PassReport {
            examined: runs.len(),
            acted,
        })
    }
}
