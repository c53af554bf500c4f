//! Wall-clock sources for the boundary layer.
//!
//! Limiters never read the time themselves; the caller samples a [`Clock`]
//! once per request and passes that instant to
//! [`RateLimiter::evaluate`](super::RateLimiter::evaluate).

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// A source of epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// A manually driven clock.
///
/// Clones share the same underlying instant, so advancing one clone is
/// visible through all of them.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start_millis)),
        }
    }

    pub fn advance_millis(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance_millis(secs * 1000);
    }

    pub fn set_millis(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_epoch_millis() {
        let now = SystemClock.now_millis();
        // 2020-01-01T00:00:00Z
        assert!(now > 1_577_836_800_000);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(1_000);
        let shared = clock.clone();

        assert_eq!(clock.now_millis(), 1_000);

        shared.advance_secs(2);
        assert_eq!(clock.now_millis(), 3_000);

        clock.advance_millis(250);
        assert_eq!(shared.now_millis(), 3_250);

        clock.set_millis(10);
        assert_eq!(shared.now_millis(), 10);
    }
}
