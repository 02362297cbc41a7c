// crates/runcoord-core/src/core/keys.rs
// ============================================================================
// Module: Runcoord Keys and Namespaces
// Description: Key, prefix, and namespace validation for the status store.
// Purpose: Reject malformed caller input before any store I/O happens.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Keys are dot-segmented strings such as `run.U12.status`. Hierarchy exists
//! only by prefix convention, so validation here is lexical. Namespaces are
//! single segments that a facade prepends as `<namespace>.`; two namespaces
//! can never produce overlapping prefixes because a namespace never contains
//! a dot.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum length of a store key in bytes.
pub const MAX_KEY_BYTES: usize = 1024;
/// Maximum length of a namespace in bytes.
pub const MAX_NAMESPACE_BYTES: usize = 64;
/// Default maximum length of a stored value in bytes.
pub const DEFAULT_MAX_VALUE_BYTES: usize = 64 * 1024;
/// Separator between key segments.
pub const KEY_SEPARATOR: char = '.';

// ============================================================================
// SECTION: Key Validation
// ============================================================================

/// Validates a full store key.
///
/// # Errors
///
/// Returns [`StoreError::InvalidKey`] when the key is empty, too long,
/// contains control characters, or starts or ends with a separator.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey("key must not be empty".to_string()));
    }
    validate_key_text(key)?;
    if key.ends_with(KEY_SEPARATOR) {
        return Err(StoreError::InvalidKey(format!("key must not end with '.': {key}")));
    }
    Ok(())
}

/// Validates a key prefix. An empty prefix selects every key.
///
/// # Errors
///
/// Returns [`StoreError::InvalidKey`] when the prefix is too long, contains
/// control characters, or starts with a separator.
pub fn validate_prefix(prefix: &str) -> Result<(), StoreError> {
    if prefix.is_empty() {
        return Ok(());
    }
    validate_key_text(prefix)
}

/// Validates a stored value against a size limit.
///
/// # Errors
///
/// Returns [`StoreError::Invalid`] when the value exceeds `max_bytes`.
pub fn validate_value(key: &str, value: &str, max_bytes: usize) -> Result<(), StoreError> {
    if value.len() > max_bytes {
        return Err(StoreError::Invalid(format!(
            "value for {key} exceeds size limit: {} bytes (max {max_bytes})",
            value.len()
        )));
    }
    Ok(())
}

/// Shared lexical checks for keys and prefixes.
fn validate_key_text(text: &str) -> Result<(), StoreError> {
    if text.len() > MAX_KEY_BYTES {
        return Err(StoreError::InvalidKey(format!(
            "key exceeds length limit: {} bytes (max {MAX_KEY_BYTES})",
            text.len()
        )));
    }
    if text.starts_with(KEY_SEPARATOR) {
        return Err(StoreError::InvalidKey(format!("key must not start with '.': {text}")));
    }
    if text.chars().any(char::is_control) {
        return Err(StoreError::InvalidKey("key must not contain control characters".to_string()));
    }
    Ok(())
}

// ============================================================================
// SECTION: Namespaces
// ============================================================================

/// Character rules applied to a namespace string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamespacePolicy {
    /// `^[a-z][a-z0-9]*$`, used by configuration-style stores.
    Strict,
    /// `^[A-Za-z0-9][A-Za-z0-9_-]*$`, used by the dynamic status store.
    #[default]
    Relaxed,
}

/// Validated namespace for a [`crate::runtime::NamespacedStore`].
///
/// # Invariants
/// - Never empty and never contains [`KEY_SEPARATOR`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Namespace(String);

impl Namespace {
    /// Parses and validates a namespace under the given policy.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidNamespace`] when the namespace violates
    /// the policy.
    pub fn parse(raw: &str, policy: NamespacePolicy) -> Result<Self, StoreError> {
        if raw.is_empty() || raw.len() > MAX_NAMESPACE_BYTES {
            return Err(StoreError::InvalidNamespace(format!(
                "namespace must be 1..={MAX_NAMESPACE_BYTES} bytes: '{raw}'"
            )));
        }
        let mut chars = raw.chars();
        let first_ok = chars.next().is_some_and(|first| match policy {
            NamespacePolicy::Strict => first.is_ascii_lowercase(),
            NamespacePolicy::Relaxed => first.is_ascii_alphanumeric(),
        });
        let rest_ok = chars.all(|ch| match policy {
            NamespacePolicy::Strict => ch.is_ascii_lowercase() || ch.is_ascii_digit(),
            NamespacePolicy::Relaxed => ch.is_ascii_alphanumeric() || ch == '_' || ch == '-',
        });
        if !first_ok || !rest_ok {
            return Err(StoreError::InvalidNamespace(format!(
                "namespace '{raw}' does not match the {} pattern",
                policy.as_str()
            )));
        }
        Ok(Self(raw.to_string()))
    }

    /// Returns the namespace as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the key prefix owned by this namespace (`<namespace>.`).
    #[must_use]
    pub fn key_prefix(&self) -> String {
        format!("{}{KEY_SEPARATOR}", self.0)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl NamespacePolicy {
    /// Returns a stable label for the policy.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Relaxed => "relaxed",
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
