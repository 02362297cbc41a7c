// crates/runcoord-scheduler/src/monitors/shared_environment.rs
// ============================================================================
// Module: Expired Shared Environment Monitor
// Description: Deletes shared-environment runs past their expiry.
// Purpose: Release long-lived environments nobody renewed.
// Dependencies: runcoord-core, time, tracing
// ============================================================================

//! ## Overview
//! A shared environment outlives the run that provisioned it and is kept
//! alive by renewing `shared.environment.expire`. Once that time is in the
//! past the whole run is deleted. Finished runs are left to the reaper.

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

// ============================================================================
// SECTION: Monitor
// ============================================================================

/// Deletes active shared-environment runs whose expiry has passed.
pub struct ExpiredSharedEnvironmentMonitor {
    /// Run view.
    runs: FrameworkRuns,
    /// Time source.
    clock: Arc<dyn Clock>,
}

impl ExpiredSharedEnvironmentMonitor {
    /// Monitor name.
    pub const NAME: &'static str = "shared_environment";

    /// Creates the monitor.
    #[must_use]
    pub fn new(runs: FrameworkRuns, clock: Arc<dyn Clock>) -> Self {
        Self {
            runs,
            clock,
        }
    }

    /// Returns the names of expired shared-environment runs.
    #[must_use]
    pub fn plan(runs: &[RunRecord], now: OffsetDateTime) -> Vec<String> {
        runs.iter()
            .filter(|run| run.shared_environment && !run.is_finished())
            .filter(|run| run.shared_environment_expire.is_some_and(|expire| expire < now))
            .map(|run| run.name.clone())
            .collect()
    }
}

// ============================================================================
// SECTION: Pass
// ============================================================================

impl Monitor for ExpiredSharedEnvironmentMonitor {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn run_pass(&self) -> Result<PassReport, MonitorError> {
        let runs = self.runs.active_runs()?;
        let planned = Self::plan(&runs, self.clock.now());
        let acted = apply_actions(Self::NAME, &planned, String::as_str, |name| {
            tracing::info!(run = %name, "deleting expired shared environment run");
            self.runs.delete_run(name).map(|()| true)
        })?;
        Ok(PassReport {
            examined: runs.len(),
            acted,
        })
    }
}
