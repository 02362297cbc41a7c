// crates/runcoord-store-file/src/atomic.rs
// ============================================================================
// Module: Atomic File Operations
// Description: Compare-and-swap with bundled writes on a key/value file.
// Purpose: Give racing processes a single primitive for "only if unchanged".
// Dependencies: runcoord-core
// ============================================================================

//! ## Overview
//! A swap runs inside one locked load-modify-save cycle, so the comparison
//! and the write (primary key plus every bundled entry) land in the same file
//! generation. Readers see either the whole transition or none of it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use runcoord_core::Mutation;

use crate::file::FileStoreError;
use crate::file::KeyValueFile;

// ============================================================================
// SECTION: Compare And Swap
// ============================================================================

impl KeyValueFile {
    /// Writes `value` for `key` when the current value equals `expected`
    /// (`None` meaning absent), together with every entry of `extra`.
    ///
    /// Returns `Ok(false)` and leaves the file untouched on mismatch. When
    /// `extra` also names `key`, `value` wins.
    ///
    /// # Errors
    ///
    /// Returns [`FileStoreError`] when input is rejected, the lock cannot be
    /// obtained, or the file cannot be read or written.
    pub fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        value: &str,
        extra: &BTreeMap<String, String>,
    ) -> Result<bool, FileStoreError> {
        let outcome = self.mutate(&Mutation::Swap {
            key: key.to_string(),
            expected: expected.map(str::to_string),
            value: value.to_string(),
            others: extra.clone(),
        })?;
        if !outcome.accepted {
            tracing::debug!(key, "compare-and-swap expectation not met");
        }
        Ok(outcome.accepted)
    }
}
