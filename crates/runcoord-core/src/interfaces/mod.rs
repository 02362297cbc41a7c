// crates/runcoord-core/src/interfaces/mod.rs
// ============================================================================
// Module: Runcoord Interfaces
// Description: Backend-agnostic status store contract and error taxonomy.
// Purpose: Define the surface consumed by facades, monitors, and hosts.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! [`StatusStore`] is the single seam between coordination logic and storage
//! backends. A compare-and-swap that finds an unexpected value returns
//! `Ok(false)`; errors are reserved for infrastructure failures and rejected
//! input.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;

use crate::core::WatchId;
use crate::core::WatchNotification;
use crate::core::WatchPredicate;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Status store errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Lock not acquired in time, or the backing file is unreadable or
    /// unwritable. Recoverable by retry.
    #[error("status store unavailable: {0}")]
    Unavailable(String),
    /// Persisted content cannot be parsed.
    #[error("status store corruption: {0}")]
    Corrupt(String),
    /// Namespace rejected before touching the store.
    #[error("invalid namespace: {0}")]
    InvalidNamespace(String),
    /// Key or prefix rejected before touching the store.
    #[error("invalid key: {0}")]
    InvalidKey(String),
    /// Other caller input rejected before touching the store.
    #[error("status store invalid input: {0}")]
    Invalid(String),
    /// Backend reported an internal error.
    #[error("status store error: {0}")]
    Store(String),
}

/// Failure reported by a watch callback.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WatchDeliveryError {
    /// Callback returned an error.
    #[error("watch callback failed: {0}")]
    Callback(String),
    /// Callback panicked.
    #[error("watch callback panicked: {0}")]
    Panicked(String),
}

// ============================================================================
// SECTION: Watch Callback
// ============================================================================

/// Callback invoked for every matching key transition.
pub type WatchCallback =
    Arc<dyn Fn(&WatchNotification) -> Result<(), WatchDeliveryError> + Send + Sync>;

// ============================================================================
// SECTION: Status Store
// ============================================================================

/// Shared key/value store with compare-and-swap and change notification.
pub trait StatusStore: Send + Sync {
    /// Verifies the store is initialized and reachable.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] when the backend cannot be used.
    fn ensure_available(&self) -> Result<(), StoreError>;

    /// Reads a single value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the key is invalid or the read fails.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Reads every entry whose key starts with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the prefix is invalid or the read fails.
    fn get_prefix(&self, prefix: &str) -> Result<BTreeMap<String, String>, StoreError>;

    /// Writes a single value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the input is invalid or the write fails.
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Writes several values in one atomic update.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when any input is invalid or the write fails.
    fn put_all(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError>;

    /// Writes `value` for `key` only when the current value equals
    /// `expected` (`None` meaning "currently absent"), bundling `others` into
    /// the same atomic update. When `others` also names `key`, `value` wins.
    ///
    /// Returns `Ok(false)` without changing anything on mismatch.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when input is invalid or the update fails.
    fn put_swap_with(
        &self,
        key: &str,
        expected: Option<&str>,
        value: &str,
        others: &BTreeMap<String, String>,
    ) -> Result<bool, StoreError>;

    /// Removes a single key. Removing an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the key is invalid or the write fails.
    fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Removes several keys in one atomic update.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when any key is invalid or the write fails.
    fn delete_all(&self, keys: &BTreeSet<String>) -> Result<(), StoreError>;

    /// Removes every key starting with `prefix` in one atomic update.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the prefix is invalid or the write fails.
    fn delete_prefix(&self, prefix: &str) -> Result<(), StoreError>;

    /// Registers a watch.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the predicate is invalid or the watch
    /// cannot be registered.
    fn watch(
        &self,
        predicate: WatchPredicate,
        callback: WatchCallback,
    ) -> Result<WatchId, StoreError>;

    /// Removes a watch. Callbacks already queued may still run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the registry cannot be updated.
    fn unwatch(&self, id: WatchId) -> Result<(), StoreError>;

    /// Compare-and-swap without bundled writes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when input is invalid or the update fails.
    fn put_swap(&self, key: &str, expected: Option<&str>, value: &str) -> Result<bool, StoreError> {
        self.put_swap_with(key, expected, value, &BTreeMap::new())
    }

    /// Watches a single key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the watch cannot be registered.
    fn watch_key(&self, key: &str, callback: WatchCallback) -> Result<WatchId, StoreError> {
        self.watch(WatchPredicate::Key(key.to_string()), callback)
    }

    /// Watches every key under a prefix.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the watch cannot be registered.
    fn watch_prefix(&self, prefix: &str, callback: WatchCallback) -> Result<WatchId, StoreError> {
        self.watch(WatchPredicate::Prefix(prefix.to_string()), callback)
    }
}
