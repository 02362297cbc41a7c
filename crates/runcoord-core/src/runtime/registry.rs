// crates/runcoord-core/src/runtime/registry.rs
// ============================================================================
// Module: Runcoord Watch Registry
// Description: In-process registry of watches and their delivery workers.
// Purpose: Fan key transitions out to matching callbacks without letting one
//          slow or failing callback affect the others.
// Dependencies: crate::core, crate::interfaces, tracing
// ============================================================================

//! ## Overview
//! Each registered watch owns a delivery thread fed by a bounded queue.
//! [`WatchRegistry::dispatch`] only enqueues, so the caller (a store's poll
//! loop or write path) never runs user code. A full queue drops the
//! notification with a warning; a failing or panicking callback is logged
//! and the watch stays registered. Unregistering closes the queue; work
//! already queued for that watch still drains.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::panic;
use std::panic::AssertUnwindSafe;
use std::sync::Mutex;
use std::sync::mpsc;
use std::sync::mpsc::Receiver;
use std::sync::mpsc::SyncSender;
use std::sync::mpsc::TrySendError;
use std::thread;

use crate::core::WatchId;
use crate::core::WatchNotification;
use crate::core::WatchPredicate;
use crate::core::validate_key;
use crate::core::validate_prefix;
use crate::interfaces::StoreError;
use crate::interfaces::WatchCallback;
use crate::interfaces::WatchDeliveryError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default number of undelivered notifications buffered per watch.
pub const DEFAULT_DELIVERY_QUEUE_DEPTH: usize = 256;

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Registry entry for one watch.
struct RegisteredWatch {
    /// Keys the watch is interested in.
    predicate: WatchPredicate,
    /// Queue feeding the watch's delivery thread.
    sender: SyncSender<WatchNotification>,
}

/// In-process watch registry.
pub struct WatchRegistry {
    /// Registered watches ordered by identifier.
    watches: Mutex<BTreeMap<WatchId, RegisteredWatch>>,
    /// Per-watch queue capacity.
    queue_depth: usize,
}

impl Default for WatchRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_DELIVERY_QUEUE_DEPTH)
    }
}

impl WatchRegistry {
    /// Creates an empty registry with the given per-watch queue depth.
    #[must_use]
    pub fn new(queue_depth: usize) -> Self {
        Self {
            watches: Mutex::new(BTreeMap::new()),
            queue_depth: queue_depth.max(1),
        }
    }

    /// Registers a watch and starts its delivery thread.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidKey`] for a malformed predicate and
    /// [`StoreError::Store`] when the delivery thread cannot be started.
    pub fn register(
        &self,
        predicate: WatchPredicate,
        callback: WatchCallback,
    ) -> Result<WatchId, StoreError> {
        match &predicate {
            WatchPredicate::Key(key) => validate_key(key)?,
            WatchPredicate::Prefix(prefix) => validate_prefix(prefix)?,
        }
        let id = WatchId::new_random();
        let (sender, receiver) = mpsc::sync_channel(self.queue_depth);
        let label = predicate.text().to_string();
        thread::Builder::new()
            .name(format!("runcoord-watch-{id}"))
            .spawn(move || deliver_loop(id, &label, &receiver, &callback))
            .map_err(|err| StoreError::Store(format!("failed to start watch worker: {err}")))?;
        self.lock()?.insert(
            id,
            RegisteredWatch {
                predicate,
                sender,
            },
        );
        Ok(id)
    }

    /// Removes a watch. Returns false when the identifier was unknown.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Store`] when the registry mutex is poisoned.
    pub fn unregister(&self, id: WatchId) -> Result<bool, StoreError> {
        Ok(self.lock()?.remove(&id).is_some())
    }

    /// Returns the number of registered watches.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Store`] when the registry mutex is poisoned.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.len())
    }

    /// Returns true when no watch is registered.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Store`] when the registry mutex is poisoned.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.lock()?.is_empty())
    }

    /// Enqueues every change for every matching watch.
    ///
    /// Returns the number of notifications enqueued.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Store`] when the registry mutex is poisoned.
    pub fn dispatch(&self, changes: &[WatchNotification]) -> Result<usize, StoreError> {
        if changes.is_empty() {
            return Ok(0);
        }
        let guard = self.lock()?;
        let mut enqueued = 0;
        for change in changes {
            for (id, watch) in guard.iter() {
                if !watch.predicate.matches(&change.key) {
                    continue;
                }
                match watch.sender.try_send(change.clone()) {
                    Ok(()) => enqueued += 1,
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(
                            watch_id = %id,
                            key = %change.key,
                            event = change.event.as_str(),
                            "watch delivery queue full; notification dropped"
                        );
                    }
                    Err(TrySendError::Disconnected(_)) => {
                        tracing::warn!(
                            watch_id = %id,
                            key = %change.key,
                            "watch delivery worker gone; notification dropped"
                        );
                    }
                }
            }
        }
        drop(guard);
        Ok(enqueued)
    }

    /// Locks the watch map.
    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<WatchId, RegisteredWatch>>, StoreError> {
        self.watches
            .lock()
            .map_err(|_| StoreError::Store("watch registry mutex poisoned".to_string()))
    }
}

// ============================================================================
// SECTION: Delivery
// ============================================================================

/// Drains a watch queue until its sender is dropped.
fn deliver_loop(
    id: WatchId,
    label: &str,
    receiver: &Receiver<WatchNotification>,
    callback: &WatchCallback,
) {
    for notification in receiver {
        if let Err(err) = invoke(callback, &notification) {
            tracing::warn!(
                watch_id = %id,
                watch = label,
                key = %notification.key,
                event = notification.event.as_str(),
                error = %err,
                "watch callback failed"
            );
        }
    }
    tracing::debug!(watch_id = %id, watch = label, "watch delivery worker stopped");
}

/// Runs a callback, converting a panic into [`WatchDeliveryError::Panicked`].
fn invoke(
    callback: &WatchCallback,
    notification: &WatchNotification,
) -> Result<(), WatchDeliveryError> {
    match panic::catch_unwind(AssertUnwindSafe(|| callback(notification))) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|text| (*text).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            Err(WatchDeliveryError::Panicked(message))
        }
    }
}
