// crates/runcoord-core/src/runtime/signal.rs
// ============================================================================
// Module: Runcoord Shutdown Signal
// Description: Cloneable cancellation token with interruptible waits.
// Purpose: Let background loops sleep between ticks yet stop promptly.
// Dependencies: std
// ============================================================================

//! ## Overview
//! A [`ShutdownSignal`] is handed to every background loop. Loops sleep with
//! [`ShutdownSignal::wait_timeout`], which returns early when shutdown is
//! requested or when another party calls [`ShutdownSignal::notify`] to make
//! waiters re-evaluate their state.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// SECTION: Signal
// ============================================================================

/// Shared state behind a [`ShutdownSignal`].
#[derive(Debug, Default)]
struct SignalState {
    /// Set once shutdown is requested; never cleared.
    requested: Mutex<bool>,
    /// Wakes waiters on request or notify.
    condvar: Condvar,
}

/// Cloneable cancellation token.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    /// Shared signal state.
    state: Arc<SignalState>,
}

impl ShutdownSignal {
    /// Creates a signal that has not been requested.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown and wakes every waiter.
    pub fn request(&self) {
        let mut requested = match self.state.requested.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *requested = true;
        drop(requested);
        self.state.condvar.notify_all();
    }

    /// Returns true once shutdown has been requested.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        match self.state.requested.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Wakes every waiter without requesting shutdown.
    pub fn notify(&self) {
        self.state.condvar.notify_all();
    }

    /// Sleeps up to `timeout`, returning early on request or notify.
    ///
    /// Returns true when shutdown has been requested.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = match self.state.requested.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *guard {
            return true;
        }
        let (guard, _) = match self.state.condvar.wait_timeout(guard, timeout) {
            Ok(result) => result,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard
    }
}
