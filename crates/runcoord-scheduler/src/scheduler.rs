// crates/runcoord-scheduler/src/scheduler.rs
// ============================================================================
// Module: Resource Lifecycle Scheduler
// Description: Fixed worker pool running monitors on a fixed delay.
// Purpose: Keep every monitor ticking independently, contain pass failures,
//          and fan run completion out to lifecycle listeners.
// Dependencies: rand, runcoord-core, thiserror, tracing
// ============================================================================

//! ## Overview
//! Each registered monitor owns one schedule slot. Worker threads claim the
//! earliest due slot, run the pass without holding any lock, then push the
//! slot's next due time `interval` past the pass completion (fixed delay).
//! A slot is never claimed twice at once, so a slow pass delays only its
//! own monitor. First due times are spread by a random jitter so processes
//! started together do not hit the store in lockstep.
//!
//! Pass failures and panics are caught per pass, logged, and counted in the
//! monitor's [`MonitorHealth`]; the slot is rescheduled regardless.
//!
//! Shutdown raises a [`ShutdownSignal`], stops new claims, and waits up to
//! the configured timeout for in-flight passes before joining workers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::any::Any;
use std::mem;
use std::panic;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::RwLock;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;
use std::time::Instant;

use rand::Rng;
use runcoord_core::ShutdownSignal;
use thiserror::Error;

use crate::clock::Clock;
use crate::health::MonitorHealth;
use crate::health::MonitorPassEvent;
use crate::health::PassOutcome;
use crate::health::SchedulerMetrics;
use crate::monitors::Monitor;
use crate::monitors::MonitorError;
use crate::monitors::PassReport;
use crate::run_watch::RunLifecycleListener;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Longest a worker sleeps before re-checking the schedule.
const IDLE_WAIT: Duration = Duration::from_millis(250);
/// Default worker thread count.
const DEFAULT_WORKER_THREADS: usize = 4;
/// Default maximum initial jitter.
const DEFAULT_INITIAL_JITTER: Duration = Duration::from_secs(5);
/// Default bound on the shutdown wait.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// SECTION: Options and Errors
// ============================================================================

/// Worker pool settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// Worker thread count.
    pub worker_threads: usize,
    /// Upper bound of the random delay before each monitor's first pass.
    pub initial_jitter: Duration,
    /// How long shutdown waits for in-flight passes.
    pub shutdown_timeout: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            worker_threads: DEFAULT_WORKER_THREADS,
            initial_jitter: DEFAULT_INITIAL_JITTER,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

/// Scheduler errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// Options or registration rejected.
    #[error("scheduler invalid: {0}")]
    Invalid(String),
    /// Operation requires a scheduler that has not started.
    #[error("scheduler already started")]
    AlreadyStarted,
    /// No monitor registered under the name.
    #[error("unknown monitor: {0}")]
    UnknownMonitor(String),
    /// Worker thread could not be spawned.
    #[error("failed to spawn scheduler worker: {0}")]
    Spawn(String),
    /// A pass run on demand failed.
    #[error(transparent)]
    Pass(#[from] MonitorError),
    /// Passes were still running when the shutdown wait expired.
    #[error("scheduler shutdown timed out with {in_flight} passes in flight")]
    ShutdownTimedOut {
        /// Passes still running.
        in_flight: usize,
    },
}

// ============================================================================
// SECTION: Listeners
// ============================================================================

/// Registered run lifecycle listeners.
#[derive(Default)]
struct RunListeners {
    /// Listeners in registration order.
    listeners: RwLock<Vec<Arc<dyn RunLifecycleListener>>>,
}

impl RunListeners {
    /// Adds a listener.
    fn add(&self, listener: Arc<dyn RunLifecycleListener>) {
        match self.listeners.write() {
            Ok(mut guard) => guard.push(listener),
            Err(poisoned) => poisoned.into_inner().push(listener),
        }
    }

    /// Returns a copy of the listener list.
    fn snapshot(&self) -> Vec<Arc<dyn RunLifecycleListener>> {
        match self.listeners.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl RunLifecycleListener for RunListeners {
    fn run_finished_or_deleted(&self, run_name: &str) {
        for listener in self.snapshot() {
            let notify = AssertUnwindSafe(|| listener.run_finished_or_deleted(run_name));
            if let Err(payload) = panic::catch_unwind(notify) {
                tracing::warn!(
                    run = run_name,
                    panic = %panic_message(&*payload),
                    "run lifecycle listener panicked"
                );
            }
        }
    }
}

// ============================================================================
// SECTION: Worker Pool
// ============================================================================

/// Monitor registration.
struct MonitorTask {
    /// Monitor to run.
    monitor: Arc<dyn Monitor>,
    /// Delay between the end of one pass and the start of the next.
    interval: Duration,
    /// Pass counters.
    health: Arc<MonitorHealth>,
}

/// Schedule slot for one monitor.
struct Slot {
    /// Earliest start of the next pass.
    due: Instant,
    /// True while a worker runs the pass.
    running: bool,
}

/// Mutable pool state.
struct PoolState {
    /// One slot per task, same order.
    slots: Vec<Slot>,
    /// Passes currently executing.
    in_flight: usize,
}

/// State shared by the workers of a running pool.
struct PoolShared {
    /// Registered monitors.
    tasks: Vec<Arc<MonitorTask>>,
    /// Schedule.
    state: Mutex<PoolState>,
    /// Signalled whenever a pass completes.
    idle: Condvar,
    /// Stops the workers.
    signal: ShutdownSignal,
    /// Time source for health timestamps.
    clock: Arc<dyn Clock>,
    /// Metrics sink.
    metrics: Arc<dyn SchedulerMetrics>,
}

impl PoolShared {
    /// Locks the schedule, recovering from poisoning.
    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        lock_or_recover(&self.state)
    }
}

/// Handles of a started pool.
struct RunningPool {
    /// Shared worker state.
    shared: Arc<PoolShared>,
    /// Worker threads.
    workers: Vec<JoinHandle<()>>,
}

/// Scheduler lifecycle.
enum Lifecycle {
    /// Accepting registrations.
    Idle,
    /// Workers running.
    Running(RunningPool),
    /// Shut down; cannot restart.
    Stopped,
}

// ============================================================================
// SECTION: Scheduler
// ============================================================================

/// Periodic runner for lifecycle monitors.
pub struct ResourceLifecycleScheduler {
    /// Pool settings.
    options: SchedulerOptions,
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Metrics sink.
    metrics: Arc<dyn SchedulerMetrics>,
    /// Registered monitors.
    tasks: Mutex<Vec<Arc<MonitorTask>>>,
    /// Run lifecycle listeners.
    listeners: Arc<RunListeners>,
    /// Pool lifecycle.
    lifecycle: Mutex<Lifecycle>,
}

impl ResourceLifecycleScheduler {
    /// Creates an idle scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Invalid`] when the pool has no workers or
    /// the shutdown timeout is zero.
    pub fn new(
        options: SchedulerOptions,
        clock: Arc<dyn Clock>,
        metrics: Arc<dyn SchedulerMetrics>,
    ) -> Result<Self, SchedulerError> {
        if options.worker_threads == 0 {
            return Err(SchedulerError::Invalid("worker_threads must be positive".to_string()));
        }
        if options.shutdown_timeout.is_zero() {
            return Err(SchedulerError::Invalid("shutdown_timeout must be positive".to_string()));
        }
        Ok(Self {
            options,
            clock,
            metrics,
            tasks: Mutex::new(Vec::new()),
            listeners: Arc::new(RunListeners::default()),
            lifecycle: Mutex::new(Lifecycle::Idle),
        })
    }

    /// Registers a monitor to run every `interval` after its previous pass.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::AlreadyStarted`] after [`Self::start`], and
    /// [`SchedulerError::Invalid`] for a zero interval or a duplicate name.
    pub fn register_monitor(
        &self,
        monitor: Arc<dyn Monitor>,
        interval: Duration,
    ) -> Result<Arc<MonitorHealth>, SchedulerError> {
        let lifecycle = lock_or_recover(&self.lifecycle);
        if !matches!(*lifecycle, Lifecycle::Idle) {
            return Err(SchedulerError::AlreadyStarted);
        }
        if interval.is_zero() {
            return Err(SchedulerError::Invalid(format!(
                "monitor {} interval must be positive",
                monitor.name()
            )));
        }
        let mut tasks = lock_or_recover(&self.tasks);
        if tasks.iter().any(|task| task.monitor.name() == monitor.name()) {
            return Err(SchedulerError::Invalid(format!(
                "monitor {} already registered",
                monitor.name()
            )));
        }
        let health = Arc::new(MonitorHealth::new(monitor.name()));
        tasks.push(Arc::new(MonitorTask {
            monitor,
            interval,
            health: Arc::clone(&health),
        }));
        drop(tasks);
        drop(lifecycle);
        Ok(health)
    }

    /// Adds a listener for runs that finish or disappear.
    pub fn add_listener(&self, listener: Arc<dyn RunLifecycleListener>) {
        self.listeners.add(listener);
    }

    /// Returns the listener fan-out, for wiring into a run watch.
    #[must_use]
    pub fn lifecycle_listener(&self) -> Arc<dyn RunLifecycleListener> {
        Arc::clone(&self.listeners) as Arc<dyn RunLifecycleListener>
    }

    /// Notifies every listener that `run_name` finished or was deleted.
    pub fn run_finished_or_deleted(&self, run_name: &str) {
        self.listeners.run_finished_or_deleted(run_name);
    }

    /// Returns the registered monitor names in registration order.
    #[must_use]
    pub fn monitor_names(&self) -> Vec<&'static str> {
        lock_or_recover(&self.tasks).iter().map(|task| task.monitor.name()).collect()
    }

    /// Returns the health counters of a monitor.
    #[must_use]
    pub fn health(&self, name: &str) -> Option<Arc<MonitorHealth>> {
        lock_or_recover(&self.tasks)
            .iter()
            .find(|task| task.monitor.name() == name)
            .map(|task| Arc::clone(&task.health))
    }

    /// Returns successful passes across all monitors since the previous
    /// call. Zero means the scheduler is unhealthy.
    pub fn take_successes_since_last_check(&self) -> u64 {
        lock_or_recover(&self.tasks)
            .iter()
            .map(|task| task.health.take_successes_since_last_check())
            .sum()
    }

    /// Returns true while the worker pool is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(*lock_or_recover(&self.lifecycle), Lifecycle::Running(_))
    }

    /// Runs one pass of a monitor on the calling thread.
    ///
    /// The pass is recorded in health and metrics exactly like a scheduled
    /// one. It may overlap a scheduled pass of the same monitor; monitors
    /// tolerate that because their transitions are idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::UnknownMonitor`] for an unregistered name
    /// and [`SchedulerError::Pass`] when the pass fails.
    pub fn run_pass_now(&self, name: &str) -> Result<PassReport, SchedulerError> {
        let task = lock_or_recover(&self.tasks)
            .iter()
            .find(|task| task.monitor.name() == name)
            .map(Arc::clone)
            .ok_or_else(|| SchedulerError::UnknownMonitor(name.to_string()))?;
        Ok(execute_pass(&task, self.clock.as_ref(), self.metrics.as_ref())?)
    }

    /// Starts the worker pool.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::AlreadyStarted`] when started or stopped
    /// before, and [`SchedulerError::Spawn`] when a worker cannot start.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut lifecycle = lock_or_recover(&self.lifecycle);
        if !matches!(*lifecycle, Lifecycle::Idle) {
            return Err(SchedulerError::AlreadyStarted);
        }
        let tasks = lock_or_recover(&self.tasks).clone();
        let now = Instant::now();
        let slots = tasks
            .iter()
            .map(|_| Slot {
                due: now + initial_delay(self.options.initial_jitter),
                running: false,
            })
            .collect();
        let monitor_count = tasks.len();
        let shared = Arc::new(PoolShared {
            tasks,
            state: Mutex::new(PoolState {
                slots,
                in_flight: 0,
            }),
            idle: Condvar::new(),
            signal: ShutdownSignal::new(),
            clock: Arc::clone(&self.clock),
            metrics: Arc::clone(&self.metrics),
        });
        let mut workers = Vec::with_capacity(self.options.worker_threads);
        for index in 0..self.options.worker_threads {
            let worker_shared = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(format!("runcoord-monitor-{index}"))
                .spawn(move || worker_loop(&worker_shared));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    shared.signal.request();
                    join_workers(workers);
                    return Err(SchedulerError::Spawn(err.to_string()));
                }
            }
        }
        tracing::info!(
            monitors = monitor_count,
            workers = workers.len(),
            "resource lifecycle scheduler started"
        );
        *lifecycle = Lifecycle::Running(RunningPool {
            shared,
            workers,
        });
        drop(lifecycle);
        Ok(())
    }

    /// Stops scheduling and waits for in-flight passes. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::ShutdownTimedOut`] when passes are still
    /// running after the shutdown timeout; their workers are detached.
    pub fn shutdown(&self) -> Result<(), SchedulerError> {
        let previous = mem::replace(&mut *lock_or_recover(&self.lifecycle), Lifecycle::Stopped);
        let Lifecycle::Running(pool) = previous else {
            return Ok(());
        };
        pool.shared.signal.request();
        let deadline = Instant::now() + self.options.shutdown_timeout;
        let mut state = pool.shared.lock_state();
        while state.in_flight > 0 {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            state = match pool.shared.idle.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        let in_flight = state.in_flight;
        drop(state);
        if in_flight > 0 {
            tracing::warn!(in_flight, "scheduler shutdown timed out; detaching workers");
            return Err(SchedulerError::ShutdownTimedOut {
                in_flight,
            });
        }
        join_workers(pool.workers);
        tracing::info!("resource lifecycle scheduler stopped");
        Ok(())
    }
}

impl Drop for ResourceLifecycleScheduler {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            tracing::warn!(error = %err, "scheduler shutdown on drop failed");
        }
    }
}

// ============================================================================
// SECTION: Worker Loop
// ============================================================================

/// Claims due slots until shutdown.
fn worker_loop(shared: &PoolShared) {
    while !shared.signal.is_requested() {
        match claim_due_slot(shared) {
            Ok(index) => run_slot(shared, index),
            Err(wait) => {
                if shared.signal.wait_timeout(wait) {
                    break;
                }
            }
        }
    }
}

/// Marks the earliest due slot as running, or returns how long to sleep.
fn claim_due_slot(shared: &PoolShared) -> Result<usize, Duration> {
    let mut state = shared.lock_state();
    let now = Instant::now();
    let next = state
        .slots
        .iter()
        .enumerate()
        .filter(|(_, slot)| !slot.running)
        .min_by_key(|(_, slot)| slot.due)
        .map(|(index, slot)| (index, slot.due));
    match next {
        Some((index, due)) if due <= now => {
            if let Some(slot) = state.slots.get_mut(index) {
                slot.running = true;
            }
            state.in_flight += 1;
            Ok(index)
        }
        Some((_, due)) => Err(due.saturating_duration_since(now).min(IDLE_WAIT)),
        None => Err(IDLE_WAIT),
    }
}

/// Runs a claimed slot and reschedules it.
fn run_slot(shared: &PoolShared, index: usize) {
    let interval = shared.tasks.get(index).map_or(IDLE_WAIT, |task| {
        // Failures are already logged and counted.
        let _report = execute_pass(task, shared.clock.as_ref(), shared.metrics.as_ref());
        task.interval
    });
    let mut state = shared.lock_state();
    if let Some(slot) = state.slots.get_mut(index) {
        slot.running = false;
        slot.due = Instant::now() + interval;
    }
    state.in_flight = state.in_flight.saturating_sub(1);
    drop(state);
    shared.idle.notify_all();
    shared.signal.notify();
}

/// Runs one pass, containing panics, and records health and metrics.
fn execute_pass(
    task: &MonitorTask,
    clock: &dyn Clock,
    metrics: &dyn SchedulerMetrics,
) -> Result<PassReport, MonitorError> {
    let name = task.monitor.name();
    let started = Instant::now();
    let result = match panic::catch_unwind(AssertUnwindSafe(|| task.monitor.run_pass())) {
        Ok(result) => result,
        Err(payload) => Err(MonitorError::Panicked(panic_message(&*payload))),
    };
    let latency = started.elapsed();
    let event = match &result {
        Ok(report) => {
            task.health.record_success(clock.now());
            tracing::debug!(
                monitor = name,
                examined = report.examined,
                acted = report.acted,
                "monitor pass completed"
            );
            MonitorPassEvent {
                monitor: name.to_string(),
                outcome: PassOutcome::Ok,
                examined: report.examined,
                acted: report.acted,
            }
        }
        Err(err) => {
            task.health.record_failure();
            tracing::warn!(monitor = name, error = %err, "monitor pass failed");
            MonitorPassEvent {
                monitor: name.to_string(),
                outcome: PassOutcome::Error,
                examined: 0,
                acted: 0,
            }
        }
    };
    metrics.record_pass(&event);
    metrics.record_latency(&event, latency);
    result
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Picks a random delay in `0..=max`.
fn initial_delay(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

/// Joins worker threads, logging panics.
fn join_workers(workers: Vec<JoinHandle<()>>) {
    for handle in workers {
        if handle.join().is_err() {
            tracing::warn!("scheduler worker panicked");
        }
    }
}

/// Extracts a readable message from a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|text| (*text).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

/// Locks a mutex, recovering the guard from poisoning.
fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
