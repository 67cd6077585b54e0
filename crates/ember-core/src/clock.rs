//! Wall-clock sources in epoch milliseconds.
//!
//! Every expiry decision takes `now` from a [`Clock`] and passes it into SQL
//! as a parameter; SQLite's own clock is never consulted.

use std::sync::atomic::{AtomicI64, Ordering};

/// Source of the current wall time in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// System wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Manually driven clock for tests and simulations.
///
/// Each read returns the current value and then advances it by `step_ms`,
/// which lets a test place consecutive reads on either side of a boundary.
#[derive(Debug)]
pub struct ManualClock {
    now_ms: AtomicI64,
    step_ms: i64,
}

impl ManualClock {
    /// A frozen clock at `now_ms`.
    #[must_use]
    pub const fn new(now_ms: i64) -> Self {
        Self::stepping(now_ms, 0)
    }

    /// A clock that advances by `step_ms` after every read.
    #[must_use]
    pub const fn stepping(now_ms: i64, step_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(now_ms),
            step_ms,
        }
    }

    /// Move the clock forward by `delta_ms`.
    pub fn advance(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }

    /// Jump to an absolute time.
    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    /// Current value without advancing.
    #[must_use]
    pub fn peek(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.fetch_add(self.step_ms, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::{Clock, ManualClock};

    #[test]
    fn frozen_clock_does_not_move() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_ms(), 1_000);
        assert_eq!(clock.now_ms(), 1_000);
        clock.advance(250);
        assert_eq!(clock.now_ms(), 1_250);
    }

    #[test]
    fn stepping_clock_advances_after_each_read() {
        let clock = ManualClock::stepping(10, 2);
        assert_eq!(clock.now_ms(), 10);
        assert_eq!(clock.now_ms(), 12);
        assert_eq!(clock.peek(), 14);
    }
}
