// crates/runcoord-store-file/src/poller.rs
// ============================================================================
// Module: Snapshot Poller
// Description: Periodic reload and diff of the store file.
// Purpose: Turn changes made by any process into watch notifications.
// Dependencies: runcoord-core, tracing
// ============================================================================

//! ## Overview
//! The file has no push channel, so change notification is synthesized: each
//! tick reloads the file and, when its fingerprint moved, diffs the entries
//! against the previous tick and hands the transitions to the
//! [`WatchRegistry`]. Several writes between two ticks collapse into one
//! transition per key from the old value to the final value.
//!
//! Registering a watch first catches the baseline up to the file: pending
//! transitions go to the watches already registered, then the new watch
//! joins at the current state. A new watcher therefore only hears about
//! changes made after it subscribed. While no watch is registered the
//! poller does not read the file at all.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use runcoord_core::ShutdownSignal;
use runcoord_core::StoreError;
use runcoord_core::StoreSnapshot;
use runcoord_core::WatchCallback;
use runcoord_core::WatchId;
use runcoord_core::WatchPredicate;
use runcoord_core::WatchRegistry;
use runcoord_core::diff_entries;

use crate::file::KeyValueFile;
use crate::lock::duration_millis;

// ============================================================================
// SECTION: Poller
// ============================================================================

/// Diffs successive snapshots of one file.
pub(crate) struct SnapshotPoller {
    /// File being observed.
    file: Arc<KeyValueFile>,
    /// Watches receiving transitions.
    registry: WatchRegistry,
    /// Snapshot seen by the previous tick, `None` before the first watch.
    last: Mutex<Option<StoreSnapshot>>,
}

impl SnapshotPoller {
    /// Creates a poller with no baseline.
    pub(crate) fn new(file: Arc<KeyValueFile>, queue_depth: usize) -> Self {
        Self {
            file,
            registry: WatchRegistry::new(queue_depth),
            last: Mutex::new(None),
        }
    }

    /// Registers a watch at the current file state.
    ///
    /// Transitions not yet reported are delivered to the existing watches
    /// before the new one is added.
    pub(crate) fn register(
        &self,
        predicate: WatchPredicate,
        callback: WatchCallback,
    ) -> Result<WatchId, StoreError> {
        let mut last = self.lock_last()?;
        if self.registry.is_empty()? {
            *last = Some(self.file.load()?);
        } else {
            self.advance(&mut last)?;
        }
        let id = self.registry.register(predicate, callback)?;
        drop(last);
        Ok(id)
    }

    /// Removes a watch.
    pub(crate) fn unregister(&self, id: WatchId) -> Result<bool, StoreError> {
        self.registry.unregister(id)
    }

    /// Runs one tick. Returns the number of notifications enqueued.
    ///
    /// The baseline mutex is held for the whole tick so concurrent ticks
    /// never report the same transition twice.
    pub(crate) fn poll_once(&self) -> Result<usize, StoreError> {
        let mut last = self.lock_last()?;
        if self.registry.is_empty()? {
            return Ok(0);
        }
        let enqueued = self.advance(&mut last)?;
        drop(last);
        Ok(enqueued)
    }

    /// Reloads the file, dispatches the transitions since `last`, and moves
    /// the baseline forward.
    fn advance(&self, last: &mut Option<StoreSnapshot>) -> Result<usize, StoreError> {
        let current = self.file.load()?;
        let changes = match last.as_ref() {
            Some(previous) if previous.fingerprint == current.fingerprint => return Ok(0),
            Some(previous) => diff_entries(&previous.entries, &current.entries),
            None => Vec::new(),
        };
        *last = Some(current);
        let enqueued = self.registry.dispatch(&changes)?;
        if !changes.is_empty() {
            tracing::debug!(changes = changes.len(), enqueued, "store poll dispatched changes");
        }
        Ok(enqueued)
    }

    /// Locks the baseline snapshot.
    fn lock_last(&self) -> Result<MutexGuard<'_, Option<StoreSnapshot>>, StoreError> {
        self.last
            .lock()
            .map_err(|_| StoreError::Store("store poller mutex poisoned".to_string()))
    }
}

// ============================================================================
// SECTION: Poll Loop
// ============================================================================

/// Ticks every `interval` until `signal` is requested.
///
/// Tick failures are logged and retried on the next tick.
pub(crate) fn run_poll_loop(poller: &SnapshotPoller, interval: Duration, signal: &ShutdownSignal) {
    tracing::debug!(interval_ms = duration_millis(interval), "store poll loop started");
    while !signal.wait_timeout(interval) {
        if let Err(err) = poller.poll_once() {
            tracing::warn!(
                path = %poller.file.path().display(),
                error = %err,
                "store poll failed; retrying next tick"
            );
        }
    }
    tracing::debug!("store poll loop stopped");
}
