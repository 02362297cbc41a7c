// crates/runcoord-store-file/src/lib.rs
// ============================================================================
// Module: Runcoord File Store Library
// Description: File-backed StatusStore shared across processes.
// Purpose: Provide durable coordination state without a database server.
// Dependencies: runcoord-core, fs2, tempfile
// ============================================================================

//! ## Overview
//! This crate persists coordination state in one properties file that any
//! number of processes on the host may open. Writers serialize through an
//! advisory lock on a sidecar file; readers never block. Change
//! notification is synthesized by a poll loop that diffs successive
//! snapshots.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod atomic;
pub mod codec;
pub mod file;
pub mod lock;
mod poller;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use codec::CodecError;
pub use file::FileStoreConfig;
pub use file::FileStoreError;
pub use file::KeyValueFile;
pub use lock::FileLockGuard;
pub use lock::lock_path_for;
pub use store::FileStatusStore;
pub use store::WatchPollConfig;
