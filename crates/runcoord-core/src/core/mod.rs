// crates/runcoord-core/src/core/mod.rs
// ============================================================================
// Module: Runcoord Core Types
// Description: Keys, namespaces, mutations, snapshots, and the watch model.
// Purpose: Share backend-agnostic value types across store implementations.
// Dependencies: crate::core::{keys, mutation, snapshot, watch}
// ============================================================================

//! ## Overview
//! Value types used by every store backend and by the scheduler.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod keys;
pub mod mutation;
pub mod snapshot;
pub mod watch;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use keys::DEFAULT_MAX_VALUE_BYTES;
pub use keys::KEY_SEPARATOR;
pub use keys::MAX_KEY_BYTES;
pub use keys::Namespace;
pub use keys::NamespacePolicy;
pub use keys::validate_key;
pub use keys::validate_prefix;
pub use keys::validate_value;
pub use mutation::Mutation;
pub use mutation::MutationOutcome;
pub use snapshot::Fingerprint;
pub use snapshot::StoreSnapshot;
pub use snapshot::prefixed_entries;
pub use watch::WatchEvent;
pub use watch::WatchId;
pub use watch::WatchNotification;
pub use watch::WatchPredicate;
pub use watch::diff_entries;
