// crates/runcoord-scheduler/tests/common/mod.rs
// =============================================================================
// Module: Scheduler Test Helpers
// Description: Shared fixtures for scheduler integration tests.
// Purpose: Build run facades, fixed clocks, and scripted monitors/listeners.
// =============================================================================

#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test helpers are selectively used across suites."
)]

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::mpsc;

use runcoord_core::InMemoryStatusStore;
use runcoord_core::NamespacePolicy;
use runcoord_core::NamespacedStore;
use runcoord_core::SharedStatusStore;
use runcoord_core::StatusStore;
use runcoord_core::StoreError;
use runcoord_core::WatchCallback;
use runcoord_core::WatchId;
use runcoord_core::WatchPredicate;
use runcoord_scheduler::Clock;
use runcoord_scheduler::FixedClock;
use runcoord_scheduler::FrameworkRuns;
use runcoord_scheduler::Monitor;
use runcoord_scheduler::MonitorError;
use runcoord_scheduler::PassReport;
use runcoord_scheduler::RunLifecycleListener;
use runcoord_scheduler::runs::parse_timestamp;
use time::OffsetDateTime;

/// Reference "now" used by fixed clocks.
pub const NOW: &str = "2026-10-16T12:00:00Z";

/// Parses an RFC 3339 literal.
pub fn at(raw: &str) -> OffsetDateTime {
    parse_timestamp(raw).unwrap()
}

/// Returns a clock pinned at [`NOW`] plus a trait-object handle to it.
pub fn fixed_clock() -> (Arc<FixedClock>, Arc<dyn Clock>) {
    let clock = Arc::new(FixedClock::new(at(NOW)));
    let handle: Arc<dyn Clock> = clock.clone();
    (clock, handle)
}

/// Wraps a store in the `framework` namespace.
pub fn framework_store(store: impl StatusStore + 'static) -> NamespacedStore {
    let shared = SharedStatusStore::from_store(store);
    NamespacedStore::new("framework", NamespacePolicy::Relaxed, shared).unwrap()
}

/// Returns an in-memory run facade and the run view over it.
pub fn memory_runs() -> (NamespacedStore, FrameworkRuns) {
    let store = framework_store(InMemoryStatusStore::new());
    (store.clone(), FrameworkRuns::new(store))
}

/// Writes every `(key, value)` pair.
pub fn seed(store: &NamespacedStore, pairs: &[(&str, &str)]) {
    let entries: BTreeMap<String, String> =
        pairs.iter().map(|(key, value)| ((*key).to_string(), (*value).to_string())).collect();
    store.put_all(&entries).unwrap();
}

// ============================================================================
// SECTION: Failing Store
// ============================================================================

/// In-memory store whose prefix deletes fail for prefixes containing a marker.
pub struct FailingDeletes {
    /// Backing store.
    inner: InMemoryStatusStore,
    /// Substring that makes `delete_prefix` fail.
    marker: String,
}

impl FailingDeletes {
    /// Creates the store.
    pub fn new(marker: &str) -> Self {
        Self {
            inner: InMemoryStatusStore::new(),
            marker: marker.to_string(),
        }
    }
}

impl StatusStore for FailingDeletes {
    fn ensure_available(&self) -> Result<(), StoreError> {
        self.inner.ensure_available()
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key)
    }

    fn get_prefix(&self, prefix: &str) -> Result<BTreeMap<String, String>, StoreError> {
        self.inner.get_prefix(prefix)
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner.put(key, value)
    }

    fn put_all(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        self.inner.put_all(entries)
    }

    fn put_swap_with(
        &self,
        key: &str,
        expected: Option<&str>,
        value: &str,
        others: &BTreeMap<String, String>,
    ) -> Result<bool, StoreError> {
        self.inner.put_swap_with(key, expected, value, others)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete(key)
    }

    fn delete_all(&self, keys: &BTreeSet<String>) -> Result<(), StoreError> {
        self.inner.delete_all(keys)
    }

    fn delete_prefix(&self, prefix: &str) -> Result<(), StoreError> {
        if prefix.contains(&self.marker) {
            return Err(StoreError::Unavailable(format!("injected failure for {prefix}")));
        }
        self.inner.delete_prefix(prefix)
    }

    fn watch(
        &self,
        predicate: WatchPredicate,
        callback: WatchCallback,
    ) -> Result<WatchId, StoreError> {
        self.inner.watch(predicate, callback)
    }

    fn unwatch(&self, id: WatchId) -> Result<(), StoreError> {
        self.inner.unwatch(id)
    }
}

// ============================================================================
// SECTION: Scripted Monitors
// ============================================================================

/// Behavior of a [`ScriptedMonitor`] pass.
#[derive(Clone, Copy)]
pub enum Script {
    /// Succeeds with one examined run.
    Succeed,
    /// Returns an error.
    Fail,
    /// Panics.
    Panic,
}

/// Monitor that counts passes and follows a script.
pub struct ScriptedMonitor {
    /// Monitor name.
    name: &'static str,
    /// Pass behavior.
    script: Script,
    /// Passes started.
    pub passes: AtomicUsize,
}

impl ScriptedMonitor {
    /// Creates the monitor.
    pub fn new(name: &'static str, script: Script) -> Arc<Self> {
        Arc::new(Self {
            name,
            script,
            passes: AtomicUsize::new(0),
        })
    }

    /// Returns the number of passes started.
    pub fn passes(&self) -> usize {
        self.passes.load(Ordering::SeqCst)
    }
}

impl Monitor for ScriptedMonitor {
    fn name(&self) -> &'static str {
        self.name
    }

    fn run_pass(&self) -> Result<PassReport, MonitorError> {
        self.passes.fetch_add(1, Ordering::SeqCst);
        match self.script {
            Script::Succeed => Ok(PassReport {
                examined: 1,
                acted: 0,
            }),
            Script::Fail => Err(MonitorError::Invalid("scripted failure".to_string())),
            Script::Panic => panic!("scripted panic"),
        }
    }
}

// ============================================================================
// SECTION: Listeners
// ============================================================================

/// Listener forwarding run names to a channel.
pub struct ChannelListener {
    /// Sender side.
    sender: Mutex<mpsc::Sender<String>>,
}

impl ChannelListener {
    /// Creates the listener and its receiver.
    pub fn new() -> (Arc<Self>, mpsc::Receiver<String>) {
        let (sender, receiver) = mpsc::channel();
        (
            Arc::new(Self {
                sender: Mutex::new(sender),
            }),
            receiver,
        )
    }
}

impl RunLifecycleListener for ChannelListener {
    fn run_finished_or_deleted(&self, run_name: &str) {
        let _sent = self.sender.lock().unwrap().send(run_name.to_string());
    }
}
