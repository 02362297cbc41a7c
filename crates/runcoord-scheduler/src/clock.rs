// crates/runcoord-scheduler/src/clock.rs
// ============================================================================
// Module: Clock
// Description: Wall-clock source for monitor decisions.
// Purpose: Let monitors compare stored timestamps against an injectable now.
// Dependencies: time
// ============================================================================

//! ## Overview
//! Monitors never read the system time directly. [`SystemClock`] is used in
//! production; [`FixedClock`] pins time for tests.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;
use std::time::Duration;

use time::OffsetDateTime;

// ============================================================================
// SECTION: Clocks
// ============================================================================

/// Source of the current UTC time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> OffsetDateTime;
}

/// Clock backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Manually advanced clock.
#[derive(Debug)]
pub struct FixedClock {
    /// Current time.
    now: Mutex<OffsetDateTime>,
}

impl FixedClock {
    /// Creates a clock pinned at `now`.
    #[must_use]
    pub const fn new(now: OffsetDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Moves the clock to `now`.
    pub fn set(&self, now: OffsetDateTime) {
        *self.lock() = now;
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut guard = self.lock();
        *guard += by;
    }

    /// Locks the current time, recovering from poisoning.
    fn lock(&self) -> std::sync::MutexGuard<'_, OffsetDateTime> {
        match self.now.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        *self.lock()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_moves_only_when_told() {
        let start = OffsetDateTime::UNIX_EPOCH;
        let clock = FixedClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::from_secs(90));
        assert_eq!(clock.now(), start + time::Duration::seconds(90));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }
}
