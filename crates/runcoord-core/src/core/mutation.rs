// crates/runcoord-core/src/core/mutation.rs
// ============================================================================
// Module: Runcoord Mutations
// Description: Pure entry-map mutations shared by every backend.
// Purpose: Keep put, delete, and compare-and-swap semantics identical across
//          the in-memory and file-backed stores.
// Dependencies: crate::core::keys
// ============================================================================

//! ## Overview
//! Backends load an entry map, apply one [`Mutation`] to it, and persist the
//! result only when [`MutationOutcome::changed`] is true. Input validation
//! happens in [`Mutation::validate`] before any lock is taken.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::core::keys::validate_key;
use crate::core::keys::validate_prefix;
use crate::core::keys::validate_value;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Mutation
// ============================================================================

/// One atomic change to a store's entry map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Write every entry.
    Put(BTreeMap<String, String>),
    /// Conditional write of `key`, bundling `others` on success.
    Swap {
        /// Key compared and written.
        key: String,
        /// Expected current value, `None` meaning absent.
        expected: Option<String>,
        /// Value written on success.
        value: String,
        /// Extra entries written on success.
        others: BTreeMap<String, String>,
    },
    /// Remove every listed key.
    Delete(BTreeSet<String>),
    /// Remove every key starting with the prefix.
    DeletePrefix(String),
}

/// Result of applying a [`Mutation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationOutcome {
    /// False only for a compare-and-swap whose expectation did not hold.
    pub accepted: bool,
    /// True when the entry map differs from before.
    pub changed: bool,
}

impl Mutation {
    /// Validates keys, prefixes, and value sizes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidKey`] or [`StoreError::Invalid`] for
    /// rejected input.
    pub fn validate(&self, max_value_bytes: usize) -> Result<(), StoreError> {
        match self {
            Self::Put(entries) => validate_entries(entries, max_value_bytes),
            Self::Swap {
                key,
                expected: _,
                value,
                others,
            } => {
                validate_key(key)?;
                validate_value(key, value, max_value_bytes)?;
                validate_entries(others, max_value_bytes)
            }
            Self::Delete(keys) => keys.iter().try_for_each(|key| validate_key(key)),
            Self::DeletePrefix(prefix) => validate_prefix(prefix),
        }
    }

    /// Applies the mutation in place.
    pub fn apply(&self, entries: &mut BTreeMap<String, String>) -> MutationOutcome {
        match self {
            Self::Put(updates) => {
                let mut changed = false;
                for (key, value) in updates {
                    changed |= insert_if_different(entries, key, value);
                }
                MutationOutcome {
                    accepted: true,
                    changed,
                }
            }
            Self::Swap {
                key,
                expected,
                value,
                others,
            } => {
                if entries.get(key).map(String::as_str) != expected.as_deref() {
                    return MutationOutcome {
                        accepted: false,
                        changed: false,
                    };
                }
                let mut changed = false;
                for (other_key, other_value) in others {
                    if other_key != key {
                        changed |= insert_if_different(entries, other_key, other_value);
                    }
                }
                changed |= insert_if_different(entries, key, value);
                MutationOutcome {
                    accepted: true,
                    changed,
                }
            }
            Self::Delete(keys) => {
                let mut changed = false;
                for key in keys {
                    changed |= entries.remove(key).is_some();
                }
                MutationOutcome {
                    accepted: true,
                    changed,
                }
            }
            Self::DeletePrefix(prefix) => {
                let before = entries.len();
                entries.retain(|key, _| !key.starts_with(prefix.as_str()));
                MutationOutcome {
                    accepted: true,
                    changed: entries.len() != before,
                }
            }
        }
    }
}

/// Validates every key and value of an entry map.
fn validate_entries(
    entries: &BTreeMap<String, String>,
    max_value_bytes: usize,
) -> Result<(), StoreError> {
    for (key, value) in entries {
        validate_key(key)?;
        validate_value(key, value, max_value_bytes)?;
    }
    Ok(())
}

/// Inserts `value` unless the same value is already stored.
fn insert_if_different(entries: &mut BTreeMap<String, String>, key: &str, value: &str) -> bool {
    if entries.get(key).map(String::as_str) == Some(value) {
        return false;
    }
    entries.insert(key.to_string(), value.to_string());
    true
}

// ============================================================================
// SECTION: Tests
// ============================================================================
