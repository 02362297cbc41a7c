// crates/runcoord-config/src/lib.rs
// ============================================================================
// Module: Runcoord Config Library
// Description: Canonical config model and validation.
// Purpose: Single source of truth for runcoord.toml semantics.
// Dependencies: runcoord-core, runcoord-store-file, serde, toml
// ============================================================================

//! ## Overview
//! `runcoord-config` defines the configuration model shared by every process
//! that opens a Runcoord store: where the store file lives, how long writers
//! wait for the lock, how often watches poll, and how the lifecycle
//! scheduler's monitors are timed. Validation is strict and fails closed.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
