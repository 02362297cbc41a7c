// crates/runcoord-core/src/lib.rs
// ============================================================================
// Module: Runcoord Core Library
// Description: Public API surface for the Runcoord coordination substrate.
// Purpose: Expose core types, the store interface, and runtime helpers.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Runcoord lets independent processes (test runners, resource reapers,
//! servers) share mutable coordination state without a database server.
//! This crate defines the backend-agnostic pieces: dot-segmented keys and
//! namespaces, compare-and-swap mutation semantics, snapshot diffing for
//! change notification, and the [`StatusStore`] contract that backends
//! implement.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::*;

pub use interfaces::StatusStore;
pub use interfaces::StoreError;
pub use interfaces::WatchCallback;
pub use interfaces::WatchDeliveryError;
pub use runtime::DEFAULT_DELIVERY_QUEUE_DEPTH;
pub use runtime::InMemoryStatusStore;
pub use runtime::NamespacedStore;
pub use runtime::SharedStatusStore;
pub use runtime::ShutdownSignal;
pub use runtime::WatchRegistry;
