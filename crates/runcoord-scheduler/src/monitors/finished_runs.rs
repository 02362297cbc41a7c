// crates/runcoord-scheduler/src/monitors/finished_runs.rs
// ============================================================================
// Module: Finished Run Reaper
// Description: Deletes finished runs after a retention window.
// Purpose: Keep results visible long enough for callers, then reclaim keys.
// Dependencies: runcoord-core, time, tracing
// ============================================================================

//! ## Overview
//! A finished run is reaped once `finished + retention <= now`. A finished
//! run without a parsable `finished` timestamp is left alone, since there
//! is no way to tell whether its retention has elapsed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;

use super::Monitor;
use super::MonitorError;
use super::PassReport;
use super::apply_actions;
use super::window_elapsed;
use crate::clock::Clock;
use crate::runs::FrameworkRuns;
use crate::runs::RunRecord;

// ============================================================================
// SECTION: Monitor
// ============================================================================

/// Deletes finished runs whose retention window elapsed.
pub struct FinishedRunReaper {
    /// Run view.
    runs: FrameworkRuns,
    /// Time source.
    clock: Arc<dyn Clock>,
    /// How long finished runs stay readable.
    retention: Duration,
}

impl FinishedRunReaper {
    /// Monitor name.
    pub const NAME: &'static str = "finished_runs";

    /// Creates the reaper.
    #[must_use]
    pub fn new(runs: FrameworkRuns, clock: Arc<dyn Clock>, retention: Duration) -> Self {
        Self {
            runs,
            clock,
            retention,
        }
    }

    /// Returns the names of runs ready to reap.
    #[must_use]
    pub fn plan(runs: &[RunRecord], retention: Duration, now: OffsetDateTime) -> Vec<String> {
        runs.iter()
            .filter(|run| run.is_finished())
            .filter(|run| run.finished.is_some_and(|at| window_elapsed(at, retention, now)))
            .map(|run| run.name.clone())
            .collect()
    }
}

// ============================================================================
// SECTION: Pass
// ============================================================================

impl Monitor for FinishedRunReaper {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn run_pass(&self) -> Result<PassReport, MonitorError> {
        let runs = self.runs.all_runs()?;
        let planned = Self::plan(&runs, self.retention, self.clock.now());
        let acted = apply_actions(Self::NAME, &planned, String::as_str, |name| {
            tracing::info!(run = %name, "reaping finished run");
            self.runs.delete_run(name).map(|()| true)
        })?;
        Ok(PassReport {
            examined: runs.len(),
            acted,
        })
    }
}
