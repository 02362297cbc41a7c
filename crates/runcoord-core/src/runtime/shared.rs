// crates/runcoord-core/src/runtime/shared.rs
// ============================================================================
// Module: Runcoord Shared Store Wrapper
// Description: Cloneable handle around an `Arc` store trait object.
// Purpose: Let facades, monitors, and hosts share one store instance.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! [`SharedStatusStore`] is the handle passed by constructor injection into
//! every namespaced facade and the scheduler.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::core::WatchId;
use crate::core::WatchPredicate;
use crate::interfaces::StatusStore;
use crate::interfaces::StoreError;
use crate::interfaces::WatchCallback;

// ============================================================================
// SECTION: Shared Store Wrapper
// ============================================================================

/// Shared status store backed by an `Arc` trait object.
#[derive(Clone)]
pub struct SharedStatusStore {
    /// Inner store implementation.
    inner: Arc<dyn StatusStore>,
}

impl SharedStatusStore {
    /// Wraps a status store in a shared, clonable wrapper.
    #[must_use]
    pub fn from_store(store: impl StatusStore + 'static) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    /// Wraps an existing shared store.
    #[must_use]
    pub const fn new(store: Arc<dyn StatusStore>) -> Self {
        Self {
            inner: store,
        }
    }
}

impl StatusStore for SharedStatusStore {
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
