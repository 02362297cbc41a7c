// crates/runcoord-scheduler/src/run_watch.rs
// ============================================================================
// Module: Run Watch
// Description: Store watch over the run key space.
// Purpose: Tell lifecycle listeners when a run finishes or disappears.
// Dependencies: runcoord-core, tracing
// ============================================================================

//! ## Overview
//! [`RunWatch`] registers one prefix watch on `run.` through the scheduler's
//! namespaced store. Only `status` keys matter: a status that becomes
//! `finished` (any ASCII case) or a status that is deleted, which is what a
//! whole-run prefix delete produces, notifies the listener with the run
//! name. A run that finishes and is later reaped therefore notifies twice;
//! listeners must be idempotent.
//!
//! Callbacks run on the store's delivery thread for this watch, so a slow
//! listener never blocks polling or other watches.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use runcoord_core::NamespacedStore;
use runcoord_core::StatusStore;
use runcoord_core::StoreError;
use runcoord_core::WatchCallback;
use runcoord_core::WatchEvent;
use runcoord_core::WatchId;
use runcoord_core::WatchNotification;

use crate::runs::RUN_PREFIX;
use crate::runs::fields;
use crate::runs::split_run_key;
use crate::runs::status;

// ============================================================================
// SECTION: Listener
// ============================================================================

/// Receiver of run completion notices.
pub trait RunLifecycleListener: Send + Sync {
    /// Called once per observed finish or deletion of `run_name`.
    fn run_finished_or_deleted(&self, run_name: &str);
}

/// Returns the run a notification completes, if any.
#[must_use]
pub fn completed_run(notification: &WatchNotification) -> Option<&str> {
    let (name, field) = split_run_key(&notification.key)?;
    if field != fields::STATUS {
        return None;
    }
    let completed = match notification.event {
        WatchEvent::Delete => true,
        WatchEvent::New | WatchEvent::Modified => notification
            .new_value
            .as_deref()
            .is_some_and(|value| value.eq_ignore_ascii_case(status::FINISHED)),
    };
    completed.then_some(name)
}

// ============================================================================
// SECTION: Run Watch
// ============================================================================

/// Watch on `run.*` that forwards completions to a listener.
pub struct RunWatch {
    /// Store the watch is registered on.
    store: NamespacedStore,
    /// Registration, cleared by [`Self::stop`].
    id: Mutex<Option<WatchId>>,
}

impl RunWatch {
    /// Registers the watch.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store rejects the watch.
    pub fn start(
        store: NamespacedStore,
        listener: Arc<dyn RunLifecycleListener>,
    ) -> Result<Self, StoreError> {
        let callback: WatchCallback = Arc::new(move |notification: &WatchNotification| {
            if let Some(run) = completed_run(notification) {
                tracing::debug!(
                    run,
                    event = notification.event.as_str(),
                    "run finished or deleted"
                );
                listener.run_finished_or_deleted(run);
            }
            Ok(())
        });
        let id = store.watch_prefix(RUN_PREFIX, callback)?;
        Ok(Self {
            store,
            id: Mutex::new(Some(id)),
        })
    }

    /// Returns true until [`Self::stop`] succeeds.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lock_id().is_some()
    }

    /// Unregisters the watch. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store fails to unregister.
    pub fn stop(&self) -> Result<(), StoreError> {
        let mut id = self.lock_id();
        if let Some(current) = *id {
            self.store.unwatch(current)?;
            *id = None;
        }
        drop(id);
        Ok(())
    }

    /// Locks the registration slot, recovering from poisoning.
    fn lock_id(&self) -> std::sync::MutexGuard<'_, Option<WatchId>> {
        match self.id.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for RunWatch {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            tracing::warn!(error = %err, "run watch unregister failed");
        }
    }
}
