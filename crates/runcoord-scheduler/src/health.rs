// crates/runcoord-scheduler/src/health.rs
// ============================================================================
// Module: Scheduler Health
// Description: Per-monitor pass counters and metrics hooks.
// Purpose: Back the health check and success counter of the scheduler.
// Dependencies: time
// ============================================================================

//! ## Overview
//! Each registered monitor owns a [`MonitorHealth`]. The health check asks
//! how many passes succeeded since it last asked (zero means unhealthy);
//! the success counter itself only ever grows. [`SchedulerMetrics`] is a
//! dependency-free sink so hosts can forward pass events to whatever
//! metrics system they run.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use time::OffsetDateTime;

// ============================================================================
// SECTION: Monitor Health
// ============================================================================

/// Pass counters for one monitor.
#[derive(Debug)]
pub struct MonitorHealth {
    /// Monitor name.
    name: String,
    /// Completed passes, monotonic.
    successes: AtomicU64,
    /// Failed passes, monotonic.
    failures: AtomicU64,
    /// Success count observed by the previous health check.
    checked: AtomicU64,
    /// Completion time of the last successful pass.
    last_success: Mutex<Option<OffsetDateTime>>,
}

impl MonitorHealth {
    /// Creates zeroed counters for `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            checked: AtomicU64::new(0),
            last_success: Mutex::new(None),
        }
    }

    /// Returns the monitor name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Records a completed pass.
    pub fn record_success(&self, at: OffsetDateTime) {
        self.successes.fetch_add(1, Ordering::SeqCst);
        *self.lock_last_success() = Some(at);
    }

    /// Records a failed pass.
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::SeqCst);
    }

    /// Returns the total number of successful passes.
    #[must_use]
    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::SeqCst)
    }

    /// Returns the total number of failed passes.
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }

    /// Returns when the last successful pass completed.
    #[must_use]
    pub fn last_success(&self) -> Option<OffsetDateTime> {
        *self.lock_last_success()
    }

    /// Returns successes since the previous call and resets the window.
    pub fn take_successes_since_last_check(&self) -> u64 {
        let current = self.successes();
        let previous = self.checked.swap(current, Ordering::SeqCst);
        current.saturating_sub(previous)
    }

    /// Locks the last-success slot, recovering from poisoning.
    fn lock_last_success(&self) -> std::sync::MutexGuard<'_, Option<OffsetDateTime>> {
        match self.last_success.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

// ============================================================================
// SECTION: Metric Labels
// ============================================================================

/// Monitor pass outcome classification.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Pass completed.
    Ok,
    /// Pass failed or panicked.
    Error,
}

impl PassOutcome {
    /// Returns a stable label for the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
        }
    }
}

/// Monitor pass metric event payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorPassEvent {
    /// Monitor name.
    pub monitor: String,
    /// Pass outcome.
    pub outcome: PassOutcome,
    /// Runs examined; zero on failure.
    pub examined: usize,
    /// Runs acted on; zero on failure.
    pub acted: usize,
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Metrics sink for monitor passes.
pub trait SchedulerMetrics: Send + Sync {
    /// Records a pass counter event.
    fn record_pass(&self, event: &MonitorPassEvent);
    /// Records how long the pass took.
    fn record_latency(&self, event: &MonitorPassEvent, latency: Duration);
}

/// No-op metrics sink.
///
/// # Invariants
/// - Metrics are intentionally discarded.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSchedulerMetrics;

impl SchedulerMetrics for NoopSchedulerMetrics {
    fn record_pass(&self, _event: &MonitorPassEvent) {}

    fn record_latency(&self, _event: &MonitorPassEvent, _latency: Duration) {}
}
