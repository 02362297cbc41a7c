// crates/runcoord-scheduler/src/lib.rs
// ============================================================================
// Module: Runcoord Scheduler Library
// Description: Resource lifecycle monitors over the shared status store.
// Purpose: Detect dead workers, reap finished and expired runs, requeue
//          waiting runs, and surface run completion to listeners.
// Dependencies: runcoord-core, runcoord-config, runcoord-store-file
// ============================================================================

//! ## Overview
//! Runs are never stored as structs. Each one is the set of keys under
//! `run.<name>.` in the scheduler's namespace, and [`FrameworkRuns`]
//! reconstructs them on every read. Monitors make idempotent passes over
//! those records on a fixed delay, driven by the
//! [`ResourceLifecycleScheduler`] worker pool. [`RunWatch`] turns store
//! notifications on the run key space into listener callbacks, and
//! [`Coordinator`] wires the whole stack from a [`runcoord_config::RuncoordConfig`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod bootstrap;
pub mod clock;
pub mod health;
pub mod monitors;
pub mod run_watch;
pub mod runs;
pub mod scheduler;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use bootstrap::BootstrapError;
pub use bootstrap::Coordinator;
pub use clock::Clock;
pub use clock::FixedClock;
pub use clock::SystemClock;
pub use health::MonitorHealth;
pub use health::MonitorPassEvent;
pub use health::NoopSchedulerMetrics;
pub use health::PassOutcome;
pub use health::SchedulerMetrics;
pub use monitors::DeadHeartbeatMonitor;
pub use monitors::ExpiredSharedEnvironmentMonitor;
pub use monitors::FinishedRunReaper;
pub use monitors::Monitor;
pub use monitors::MonitorError;
pub use monitors::PassReport;
pub use monitors::WaitingRunRequeuer;
pub use run_watch::RunLifecycleListener;
pub use run_watch::RunWatch;
pub use runs::FrameworkRuns;
pub use runs::ResetPolicy;
pub use runs::RunRecord;
pub use scheduler::ResourceLifecycleScheduler;
pub use scheduler::SchedulerError;
pub use scheduler::SchedulerOptions;
