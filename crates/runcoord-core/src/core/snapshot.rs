// crates/runcoord-core/src/core/snapshot.rs
// ============================================================================
// Module: Runcoord Store Snapshot
// Description: Ordered entry set plus content fingerprint.
// Purpose: Give loaders and watchers a cheap "did anything change" check.
// Dependencies: sha2
// ============================================================================

//! ## Overview
//! A [`StoreSnapshot`] is the full content of a store at one instant. The
//! fingerprint is a SHA-256 digest over the persisted bytes, so two
//! snapshots with the same fingerprint are guaranteed to hold the same
//! entries and watchers can skip diffing entirely.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use sha2::Digest;
use sha2::Sha256;

// ============================================================================
// SECTION: Fingerprint
// ============================================================================

/// Lowercase hex SHA-256 digest of persisted store content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Computes the fingerprint of raw content bytes.
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hex_encode(&hasher.finalize()))
    }

    /// Fingerprint of empty content (also used for an absent file).
    #[must_use]
    pub fn empty() -> Self {
        Self::of_bytes(&[])
    }

    /// Returns the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Snapshot
// ============================================================================

/// Complete ordered set of entries with its content fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSnapshot {
    /// Entries keyed by full key, in lexical order.
    pub entries: BTreeMap<String, String>,
    /// Fingerprint of the content the entries were parsed from.
    pub fingerprint: Fingerprint,
}

impl StoreSnapshot {
    /// Creates a snapshot from parsed entries and their fingerprint.
    #[must_use]
    pub const fn new(entries: BTreeMap<String, String>, fingerprint: Fingerprint) -> Self {
        Self {
            entries,
            fingerprint,
        }
    }

    /// Returns an empty snapshot.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(BTreeMap::new(), Fingerprint::empty())
    }

    /// Returns the value stored for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Returns every entry whose key starts with `prefix`.
    #[must_use]
    pub fn prefixed(&self, prefix: &str) -> BTreeMap<String, String> {
        prefixed_entries(&self.entries, prefix)
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when the snapshot holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Collects the entries of an ordered map whose keys start with `prefix`.
#[must_use]
pub fn prefixed_entries(
    entries: &BTreeMap<String, String>,
    prefix: &str,
) -> BTreeMap<String, String> {
    entries
        .range(prefix.to_string()..)
        .take_while(|(key, _)| key.starts_with(prefix))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}
