// crates/runcoord-core/src/runtime/namespaced.rs
// ============================================================================
// Module: Runcoord Namespaced Store
// Description: Namespace-local view over a shared status store.
// Purpose: Keep independent subsystems from colliding in one physical store.
// Dependencies: crate::core, crate::interfaces, crate::runtime::shared
// ============================================================================

//! ## Overview
//! [`NamespacedStore`] prepends `<namespace>.` to every key on the way in and
//! strips it on the way out. Isolation is purely lexical: namespaces never
//! contain a dot, so their prefixes are disjoint. The facade itself
//! implements [`StatusStore`], so code written against the trait works
//! unchanged on a namespaced view.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::core::Namespace;
use crate::core::NamespacePolicy;
use crate::core::WatchId;
use crate::core::WatchNotification;
use crate::core::WatchPredicate;
use crate::interfaces::StatusStore;
use crate::interfaces::StoreError;
use crate::interfaces::WatchCallback;
use crate::runtime::shared::SharedStatusStore;

// ============================================================================
// SECTION: Facade
// ============================================================================

/// Namespace-scoped view of a shared status store.
#[derive(Clone)]
pub struct NamespacedStore {
    /// Validated namespace.
    namespace: Namespace,
    /// Cached `<namespace>.` prefix.
    prefix: String,
    /// Underlying shared store.
    store: SharedStatusStore,
}

impl NamespacedStore {
    /// Creates a facade after validating `namespace` and checking that the
    /// underlying store is available.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidNamespace`] for a malformed namespace and
    /// [`StoreError::Unavailable`] when the store is not initialized.
    pub fn new(
        namespace: &str,
        policy: NamespacePolicy,
        store: SharedStatusStore,
    ) -> Result<Self, StoreError> {
        let namespace = Namespace::parse(namespace, policy)?;
        store.ensure_available()?;
        Ok(Self {
            prefix: namespace.key_prefix(),
            namespace,
            store,
        })
    }

    /// Returns the namespace.
    #[must_use]
    pub const fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Returns the underlying shared store.
    #[must_use]
    pub const fn inner(&self) -> &SharedStatusStore {
        &self.store
    }

    /// Adds the namespace prefix to a local key.
    fn qualify(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    /// Adds the namespace prefix to every key of an entry map.
    fn qualify_entries(&self, entries: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        entries.iter().map(|(key, value)| (self.qualify(key), value.clone())).collect()
    }

    /// Strips the namespace prefix from a full key.
    fn strip<'a>(&self, key: &'a str) -> Result<&'a str, StoreError> {
        key.strip_prefix(self.prefix.as_str()).ok_or_else(|| {
            StoreError::Store(format!(
                "key '{key}' returned for namespace '{}' lacks its prefix",
                self.namespace
            ))
        })
    }
}

impl StatusStore for NamespacedStore {
    fn ensure_available(&self) -> Result<(), StoreError> {
        self.store.ensure_available()
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.store.get(&self.qualify(key))
    }

    fn get_prefix(&self, prefix: &str) -> Result<BTreeMap<String, String>, StoreError> {
        let entries = self.store.get_prefix(&self.qualify(prefix))?;
        entries
            .into_iter()
            .map(|(key, value)| Ok((self.strip(&key)?.to_string(), value)))
            .collect()
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.store.put(&self.qualify(key), value)
    }

    fn put_all(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        self.store.put_all(&self.qualify_entries(entries))
    }

    fn put_swap_with(
        &self,
        key: &str,
        expected: Option<&str>,
        value: &str,
        others: &BTreeMap<String, String>,
    ) -> Result<bool, StoreError> {
        self.store.put_swap_with(&self.qualify(key), expected, value, &self.qualify_entries(others))
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.store.delete(&self.qualify(key))
    }

    fn delete_all(&self, keys: &BTreeSet<String>) -> Result<(), StoreError> {
        let keys = keys.iter().map(|key| self.qualify(key)).collect();
        self.store.delete_all(&keys)
    }

    fn delete_prefix(&self, prefix: &str) -> Result<(), StoreError> {
        self.store.delete_prefix(&self.qualify(prefix))
    }

    fn watch(
        &self,
        predicate: WatchPredicate,
        callback: WatchCallback,
    ) -> Result<WatchId, StoreError> {
        let prefix = self.prefix.clone();
        let local: WatchCallback = Arc::new(move |notification: &WatchNotification| {
            let key = notification.key.strip_prefix(prefix.as_str()).unwrap_or(&notification.key);
            callback(&WatchNotification {
                key: key.to_string(),
                event: notification.event,
                old_value: notification.old_value.clone(),
                new_value: notification.new_value.clone(),
            })
        });
        self.store.watch(predicate.with_prefix(&self.prefix), local)
    }

    fn unwatch(&self, id: WatchId) -> Result<(), StoreError> {
        self.store.unwatch(id)
    }
}
