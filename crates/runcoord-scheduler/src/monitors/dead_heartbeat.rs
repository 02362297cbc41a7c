// crates/runcoord-scheduler/src/monitors/dead_heartbeat.rs
// ============================================================================
// Module: Dead Heartbeat Monitor
// Description: Detects runs whose worker stopped heartbeating.
// Purpose: Delete dead local runs and reset dead automated runs.
// Dependencies: runcoord-core, time, tracing
// ============================================================================

//! ## Overview
//! An active run is dead once `heartbeat + timeout <= now`. Local runs were
//! started from a developer workstation and have nobody to rerun them, so
//! they are deleted. Automated runs are reset through compare-and-swap on
//! their status, which loses cleanly if the worker revived in the meantime.
//! Shared-environment runs and runs that never heartbeated are skipped.

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
use crate::runs::ResetPolicy;
use crate::runs::RunRecord;

// ============================================================================
// SECTION: Monitor
// ============================================================================

/// Action taken for a dead run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadRunAction {
    /// Remove every key of the run.
    Delete,
    /// Return the run to the reset policy's status.
    Reset,
}

/// Finds and handles runs with expired heartbeats.
pub struct DeadHeartbeatMonitor {
    /// Run view.
    runs: FrameworkRuns,
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Heartbeat age at which a run is dead.
    timeout: Duration,
    /// Status written to reset runs.
    reset_policy: ResetPolicy,
}

impl DeadHeartbeatMonitor {
    /// Monitor name.
    pub const NAME: &'static str = "dead_heartbeat";

    /// Creates the monitor.
    #[must_use]
    pub fn new(
        runs: FrameworkRuns,
        clock: Arc<dyn Clock>,
        timeout: Duration,
        reset_policy: ResetPolicy,
    ) -> Self {
        Self {
            runs,
            clock,
            timeout,
            reset_policy,
        }
    }

    /// Decides what to do with each active run.
    #[must_use]
    pub fn plan(
        runs: &[RunRecord],
        timeout: Duration,
        now: OffsetDateTime,
    ) -> Vec<(RunRecord, DeadRunAction)> {
        runs.iter()
            .filter(|run| !run.is_finished() && !run.shared_environment)
            .filter(|run| run.heartbeat.is_some_and(|beat| window_elapsed(beat, timeout, now)))
            .map(|run| {
                let action = if run.local { DeadRunAction::Delete } else { DeadRunAction::Reset };
                (run.clone(), action)
            })
            .collect()
    }
}

// ============================================================================
// SECTION: Pass
// ============================================================================

impl Monitor for DeadHeartbeatMonitor {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn run_pass(&self) -> Result<PassReport, MonitorError> {
        let now = self.clock.now();
        let runs = self.runs.active_runs()?;
        let planned = Self::plan(&runs, self.timeout, now);
        let acted = apply_actions(
            Self::NAME,
            &planned,
            |(run, _)| run.name.as_str(),
            |(run, action)| match action {
                DeadRunAction::Delete => {
                    tracing::info!(run = %run.name, "deleting dead local run");
                    self.runs.delete_run(&run.name).map(|()| true)
                }
                DeadRunAction::Reset => {
                    let reset = self.runs.reset_run(run, self.reset_policy, now)?;
                    if reset {
                        tracing::info!(
                            run = %run.name,
                            status = self.reset_policy.target_status(),
                            "reset dead run"
                        );
                    }
                    Ok(reset)
                }
            },
        )?;
        Ok(PassReport {
            examined: runs.len(),
            acted,
        })
    }
}
