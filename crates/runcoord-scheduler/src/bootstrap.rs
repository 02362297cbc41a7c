// crates/runcoord-scheduler/src/bootstrap.rs
// ============================================================================
// Module: Coordinator Bootstrap
// Description: Builds the store, facades, scheduler, and run watch.
// Purpose: Wire the coordination stack from configuration by explicit
//          constructor injection.
// Dependencies: runcoord-config, runcoord-core, runcoord-store-file
// ============================================================================

//! ## Overview
//! [`Coordinator::bootstrap`] opens the file store, wraps it in the shared
//! store handle, builds the run facade for the configured namespace,
//! registers the enabled monitors, attaches the run watch to the
//! scheduler's listener fan-out, and starts the worker pool. Other
//! subsystems obtain their own facades through [`Coordinator::namespace`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use runcoord_config::ResetPolicyConfig;
use runcoord_config::RuncoordConfig;
use runcoord_config::SchedulerConfig;
use runcoord_core::NamespacePolicy;
use runcoord_core::NamespacedStore;
use runcoord_core::SharedStatusStore;
use runcoord_core::StatusStore;
use runcoord_core::StoreError;
use runcoord_store_file::FileStatusStore;
use thiserror::Error;

use crate::clock::Clock;
use crate::clock::SystemClock;
use crate::health::NoopSchedulerMetrics;
use crate::health::SchedulerMetrics;
use crate::monitors::DeadHeartbeatMonitor;
use crate::monitors::ExpiredSharedEnvironmentMonitor;
use crate::monitors::FinishedRunReaper;
use crate::monitors::WaitingRunRequeuer;
use crate::run_watch::RunWatch;
use crate::runs::FrameworkRuns;
use crate::runs::ResetPolicy;
use crate::scheduler::ResourceLifecycleScheduler;
use crate::scheduler::SchedulerError;
use crate::scheduler::SchedulerOptions;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Bootstrap and shutdown errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BootstrapError {
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// File store could not be opened.
    #[error("status store open failed: {0}")]
    StoreOpen(String),
    /// Facade or watch setup failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Scheduler setup or shutdown failed.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

// ============================================================================
// SECTION: Coordinator
// ============================================================================

/// Running coordination stack.
pub struct Coordinator {
    /// File backend, kept for shutdown.
    file_store: Arc<FileStatusStore>,
    /// Shared handle to the backend.
    store: SharedStatusStore,
    /// Namespace policy applied to new facades.
    namespace_policy: NamespacePolicy,
    /// Run view used by the monitors.
    runs: FrameworkRuns,
    /// Lifecycle scheduler.
    scheduler: ResourceLifecycleScheduler,
    /// Watch forwarding run completion to the scheduler.
    run_watch: RunWatch,
}

impl Coordinator {
    /// Builds and starts the stack with the system clock and no metrics.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError`] when any component fails to start.
    pub fn bootstrap(config: &RuncoordConfig) -> Result<Self, BootstrapError> {
        Self::bootstrap_with(config, Arc::new(SystemClock), Arc::new(NoopSchedulerMetrics))
    }

    /// Builds and starts the stack with an explicit clock and metrics sink.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError`] when any component fails to start.
    pub fn bootstrap_with(
        config: &RuncoordConfig,
        clock: Arc<dyn Clock>,
        metrics: Arc<dyn SchedulerMetrics>,
    ) -> Result<Self, BootstrapError> {
        config.validate().map_err(|err| BootstrapError::Config(err.to_string()))?;
        let file_store = Arc::new(
            FileStatusStore::open(config.store.file_store_config(), config.watch.poll_config())
                .map_err(|err| BootstrapError::StoreOpen(err.to_string()))?,
        );
        let store = SharedStatusStore::new(Arc::clone(&file_store) as Arc<dyn StatusStore>);
        let namespace_policy = config.store.namespace_policy;
        let run_store = NamespacedStore::new(
            &config.scheduler.run_namespace,
            namespace_policy,
            store.clone(),
        )?;
        let runs = FrameworkRuns::new(run_store.clone());
        let scheduler = ResourceLifecycleScheduler::new(
            scheduler_options(&config.scheduler),
            Arc::clone(&clock),
            metrics,
        )?;
        register_monitors(&scheduler, &config.scheduler, &runs, &clock)?;
        let run_watch = RunWatch::start(run_store, scheduler.lifecycle_listener())?;
        scheduler.start()?;
        tracing::info!(
            path = %config.store.path.display(),
            namespace = %config.scheduler.run_namespace,
            monitors = scheduler.monitor_names().len(),
            "coordinator started"
        );
        Ok(Self {
            file_store,
            store,
            namespace_policy,
            runs,
            scheduler,
            run_watch,
        })
    }

    /// Returns the shared store handle.
    #[must_use]
    pub const fn store(&self) -> &SharedStatusStore {
        &self.store
    }

    /// Returns the file backend.
    #[must_use]
    pub fn file_store(&self) -> &FileStatusStore {
        &self.file_store
    }

    /// Returns the run view.
    #[must_use]
    pub const fn runs(&self) -> &FrameworkRuns {
        &self.runs
    }

    /// Returns the scheduler.
    #[must_use]
    pub const fn scheduler(&self) -> &ResourceLifecycleScheduler {
        &self.scheduler
    }

    /// Builds a facade for another subsystem's namespace.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidNamespace`] for a malformed namespace.
    pub fn namespace(&self, namespace: &str) -> Result<NamespacedStore, StoreError> {
        NamespacedStore::new(namespace, self.namespace_policy, self.store.clone())
    }

    /// Stops the run watch, the scheduler, and store polling. Idempotent.
    ///
    /// Every step runs even when an earlier one fails.
    ///
    /// # Errors
    ///
    /// Returns the first [`BootstrapError`] encountered.
    pub fn shutdown(&self) -> Result<(), BootstrapError> {
        let watch = self.run_watch.stop().map_err(BootstrapError::from);
        let scheduler = self.scheduler.shutdown().map_err(BootstrapError::from);
        self.file_store.close();
        watch.and(scheduler)
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            tracing::warn!(error = %err, "coordinator shutdown on drop failed");
        }
    }
}

// ============================================================================
// SECTION: Wiring
// ============================================================================

/// Maps the configured reset policy.
const fn reset_policy(config: ResetPolicyConfig) -> ResetPolicy {
    match config {
        ResetPolicyConfig::Queued => ResetPolicy::Queued,
        ResetPolicyConfig::Pending => ResetPolicy::Pending,
    }
}

/// Builds worker pool options from configuration.
const fn scheduler_options(config: &SchedulerConfig) -> SchedulerOptions {
    SchedulerOptions {
        worker_threads: config.worker_threads,
        initial_jitter: Duration::from_millis(config.initial_jitter_ms),
        shutdown_timeout: Duration::from_millis(config.shutdown_timeout_ms),
    }
}

/// Registers every enabled monitor.
fn register_monitors(
    scheduler: &ResourceLifecycleScheduler,
    config: &SchedulerConfig,
    runs: &FrameworkRuns,
    clock: &Arc<dyn Clock>,
) -> Result<(), SchedulerError> {
    let heartbeat = &config.dead_heartbeat;
    if heartbeat.enabled {
        scheduler.register_monitor(
            Arc::new(DeadHeartbeatMonitor::new(
                runs.clone(),
                Arc::clone(clock),
                Duration::from_secs(heartbeat.timeout_secs),
                reset_policy(heartbeat.reset_policy),
            )),
            Duration::from_millis(heartbeat.interval_ms),
        )?;
    }
    if config.shared_environment.enabled {
        scheduler.register_monitor(
            Arc::new(ExpiredSharedEnvironmentMonitor::new(runs.clone(), Arc::clone(clock))),
            Duration::from_millis(config.shared_environment.interval_ms),
        )?;
    }
    let finished = &config.finished_runs;
    if finished.enabled {
        scheduler.register_monitor(
            Arc::new(FinishedRunReaper::new(
                runs.clone(),
                Arc::clone(clock),
                Duration::from_secs(finished.retention_secs),
            )),
            Duration::from_millis(finished.interval_ms),
        )?;
    }
    if config.waiting_runs.enabled {
        scheduler.register_monitor(
            Arc::new(WaitingRunRequeuer::new(runs.clone(), Arc::clone(clock))),
            Duration::from_millis(config.waiting_runs.interval_ms),
        )?;
    }
    Ok(())
}
