// crates/runcoord-core/src/runtime/memory.rs
// ============================================================================
// Module: Runcoord In-Memory Store
// Description: Process-local status store for tests and embedding.
// Purpose: Provide the full store contract without touching the filesystem.
// Dependencies: crate::core, crate::interfaces, crate::runtime::registry
// ============================================================================

//! ## Overview
//! [`InMemoryStatusStore`] keeps entries in a mutex-guarded map. Every
//! mutation diffs the map before and after and hands the changes to the
//! watch registry while the map is still locked, so watchers see every
//! transition in the order it was applied, without a poll loop. It is not
//! shared across processes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;

use crate::core::DEFAULT_MAX_VALUE_BYTES;
use crate::core::Mutation;
use crate::core::WatchId;
use crate::core::WatchPredicate;
use crate::core::diff_entries;
use crate::core::prefixed_entries;
use crate::core::validate_key;
use crate::core::validate_prefix;
use crate::interfaces::StatusStore;
use crate::interfaces::StoreError;
use crate::interfaces::WatchCallback;
use crate::runtime::registry::WatchRegistry;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// In-memory status store for tests and examples.
#[derive(Clone, Default)]
pub struct InMemoryStatusStore {
    /// Entry map protected by a mutex.
    entries: Arc<Mutex<BTreeMap<String, String>>>,
    /// Watches notified after each mutation.
    watches: Arc<WatchRegistry>,
}

impl InMemoryStatusStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a mutation and notifies watchers of the resulting changes.
    fn mutate(&self, mutation: &Mutation) -> Result<bool, StoreError> {
        mutation.validate(DEFAULT_MAX_VALUE_BYTES)?;
        let mut guard = self.lock()?;
        let before = guard.clone();
        let outcome = mutation.apply(&mut guard);
        if outcome.changed {
            // Enqueue under the entry lock so watchers see writes in apply order.
            self.watches.dispatch(&diff_entries(&before, &guard))?;
        }
        drop(guard);
        Ok(outcome.accepted)
    }

    /// Locks the entry map.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Store("in-memory status store mutex poisoned".to_string()))
    }
}

impl StatusStore for InMemoryStatusStore {
    fn ensure_available(&self) -> Result<(), StoreError> {
        self.lock().map(drop)
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        validate_key(key)?;
        Ok(self.lock()?.get(key).cloned())
    }

    fn get_prefix(&self, prefix: &str) -> Result<BTreeMap<String, String>, StoreError> {
        validate_prefix(prefix)?;
        let guard = self.lock()?;
        Ok(prefixed_entries(&guard, prefix))
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let entries = BTreeMap::from([(key.to_string(), value.to_string())]);
        self.mutate(&Mutation::Put(entries)).map(drop)
    }

    fn put_all(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        self.mutate(&Mutation::Put(entries.clone())).map(drop)
    }

    fn put_swap_with(
        &self,
        key: &str,
        expected: Option<&str>,
        value: &str,
        others: &BTreeMap<String, String>,
    ) -> Result<bool, StoreError> {
        self.mutate(&Mutation::Swap {
            key: key.to_string(),
            expected: expected.map(str::to_string),
            value: value.to_string(),
            others: others.clone(),
        })
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.mutate(&Mutation::Delete(BTreeSet::from([key.to_string()]))).map(drop)
    }

    fn delete_all(&self, keys: &BTreeSet<String>) -> Result<(), StoreError> {
        self.mutate(&Mutation::Delete(keys.clone())).map(drop)
    }

    fn delete_prefix(&self, prefix: &str) -> Result<(), StoreError> {
        self.mutate(&Mutation::DeletePrefix(prefix.to_string())).map(drop)
    }

    fn watch(
        &self,
        predicate: WatchPredicate,
        callback: WatchCallback,
    ) -> Result<WatchId, StoreError> {
        self.watches.register(predicate, callback)
    }

    fn unwatch(&self, id: WatchId) -> Result<(), StoreError> {
        self.watches.unregister(id).map(drop)
    }
}
