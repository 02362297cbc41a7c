// crates/runcoord-core/src/runtime/mod.rs
// ============================================================================
// Module: Runcoord Runtime
// Description: Watch registry, in-memory store, shared handle, and facade.
// Purpose: Provide backend-independent runtime building blocks.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! Runtime pieces that every backend and consumer composes: the watch
//! registry, the shutdown signal used by background loops, the in-memory
//! store, the shared store handle, and the namespaced facade.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod memory;
pub mod namespaced;
pub mod registry;
pub mod shared;
pub mod signal;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use memory::InMemoryStatusStore;
pub use namespaced::NamespacedStore;
pub use registry::DEFAULT_DELIVERY_QUEUE_DEPTH;
pub use registry::WatchRegistry;
pub use shared::SharedStatusStore;
pub use signal::ShutdownSignal;
