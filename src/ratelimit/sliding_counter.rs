//! Sliding window counter: a two-bucket approximation of the sliding log.
//!
//! Windows are aligned to multiples of the window size. The estimate for a
//! hit is the current window's count plus the previous window's count
//! weighted by how much of the previous window still overlaps the trailing
//! interval. The linear weighting can over- or under-count slightly
//! compared with an exact log.

use std::sync::Arc;
use tracing::{debug, trace};

use super::decision::{ceil_secs_from_millis, Decision};
use super::limiter::{Algorithm, RateLimiter};
use super::limits::SlidingWindowConfig;
use super::store::KeyedStateStore;

/// Hits counted in one aligned window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowCount {
    pub count: u64,
    pub window_start_millis: i64,
}

impl WindowCount {
    fn empty(window_start_millis: i64) -> Self {
        Self {
            count: 0,
            window_start_millis,
        }
    }
}

/// Per-client pair of adjacent windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlidingWindowCounterState {
    pub current: WindowCount,
    pub previous: WindowCount,
}

impl SlidingWindowCounterState {
    /// Roll the windows forward so `current` starts at `aligned_start`.
    fn rolled(self, aligned_start: i64, window_ms: i64) -> Self {
        if self.current.window_start_millis == aligned_start {
            return self;
        }

        let windows_elapsed = (aligned_start - self.current.window_start_millis) / window_ms;
        let previous = if windows_elapsed == 1 {
            self.current
        } else {
            // A gap of two or more windows leaves nothing worth carrying.
            WindowCount::empty(aligned_start - window_ms)
        };

        Self {
            current: WindowCount::empty(aligned_start),
            previous,
        }
    }
}

struct Outcome {
    allowed: bool,
    current_count: u64,
    previous_count: u64,
    estimated: f64,
    window_start_millis: i64,
    retry_after_secs: u64,
}

/// Sliding window counter rate limiter.
pub struct SlidingWindowCounterLimiter {
    config: SlidingWindowConfig,
    store: Arc<KeyedStateStore<SlidingWindowCounterState>>,
}

impl SlidingWindowCounterLimiter {
    pub fn new(config: SlidingWindowConfig) -> Self {
        Self::with_store(config, Arc::new(KeyedStateStore::new()))
    }

    pub fn with_store(
        config: SlidingWindowConfig,
        store: Arc<KeyedStateStore<SlidingWindowCounterState>>,
    ) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &SlidingWindowConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<KeyedStateStore<SlidingWindowCounterState>> {
        &self.store
    }
}

impl RateLimiter for SlidingWindowCounterLimiter {
    fn evaluate(&self, client_key: &str, now_millis: i64) -> Decision {
        let window_ms = self.config.window_size_millis();
        let max_requests = self.config.max_requests() as f64;
        let aligned_start = now_millis.div_euclid(window_ms) * window_ms;

        let outcome = self.store.compute(client_key, |state| {
            let mut state = match state {
                Some(state) => state.rolled(aligned_start, window_ms),
                None => SlidingWindowCounterState {
                    current: WindowCount::empty(aligned_start),
                    previous: WindowCount::empty(aligned_start - window_ms),
                },
            };

            let elapsed_ms = (now_millis - state.current.window_start_millis) as f64;
            let previous_weight = 1.0 - elapsed_ms / window_ms as f64;
            let estimated_before =
                state.previous.count as f64 * previous_weight + state.current.count as f64;
            let estimated_after = estimated_before + 1.0;

            let allowed = estimated_after <= max_requests;
            let retry_after_secs = if allowed {
                state.current.count += 1;
                0
            } else {
                let window_end = state.current.window_start_millis + window_ms;
                ceil_secs_from_millis(window_end - now_millis)
            };

            let outcome = Outcome {
                allowed,
                current_count: state.current.count,
                previous_count: state.previous.count,
                estimated: if allowed { estimated_after } else { estimated_before },
                window_start_millis: state.current.window_start_millis,
                retry_after_secs,
            };
            (state, outcome)
        });

        trace!(
            client = client_key,
            allowed = outcome.allowed,
            estimated = outcome.estimated,
            "Sliding window counter decision"
        );

        let message = if outcome.allowed {
            "ALLOWED"
        } else {
            debug!(
                client = client_key,
                estimated = outcome.estimated,
                retry_after = outcome.retry_after_secs,
                "Sliding window counter limit reached"
            );
            "BLOCKED"
        };

        let remaining = (max_requests - outcome.estimated).max(0.0).floor() as u64;

        Decision::new(outcome.allowed, message, now_millis)
            .with_retry_after(outcome.retry_after_secs)
            .with_remaining(remaining)
            .with("currentWindowCount", outcome.current_count)
            .with("previousWindowCount", outcome.previous_count)
            .with("estimatedCount", outcome.estimated)
            .with("windowStartInMillis", outcome.window_start_millis)
            .with("windowEndInMillis", outcome.window_start_millis + window_ms)
    }

    fn reset(&self) {
        self.store.reset();
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::SlidingWindowCounter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: i64, window_secs: i64) -> SlidingWindowCounterLimiter {
        SlidingWindowCounterLimiter::new(SlidingWindowConfig::new(max_requests, window_secs).unwrap())
    }

    fn estimated(decision: &Decision) -> f64 {
        decision.meta("estimatedCount").unwrap().as_f64()
    }

    #[test]
    fn test_first_window_behaves_like_fixed_window() {
        let limiter = limiter(3, 10);

        for t in [10_000, 12_000, 14_000] {
            assert!(limiter.evaluate("c", t).allowed);
        }

        let decision = limiter.evaluate("c", 15_000);
        assert!(!decision.allowed);
        assert_eq!(decision.message, "BLOCKED");
        // current window [10s, 20s)
        assert_eq!(decision.retry_after_secs, 5);
        assert_eq!(estimated(&decision), 3.0);
    }

    #[test]
    fn test_windows_are_aligned() {
        let limiter = limiter(10, 10);
        let decision = limiter.evaluate("c", 13_456);

        assert_eq!(
            decision.meta("windowStartInMillis").and_then(|v| v.as_i64()),
            Some(10_000)
        );
        assert_eq!(
            decision.meta("windowEndInMillis").and_then(|v| v.as_i64()),
            Some(20_000)
        );
    }

    #[test]
    fn test_previous_window_weighted() {
        let limiter = limiter(10, 10);

        // Eight hits in [0s, 10s)
        for t in 0..8 {
            assert!(limiter.evaluate("c", t * 1_000).allowed);
        }

        // At 12.5s, 75% of the previous window still overlaps: 8 * 0.75 = 6
        let decision = limiter.evaluate("c", 12_500);
        assert!(decision.allowed);
        assert_eq!(estimated(&decision), 7.0);
        assert_eq!(decision.meta("previousWindowCount").and_then(|v| v.as_i64()), Some(8));
        assert_eq!(decision.meta("currentWindowCount").and_then(|v| v.as_i64()), Some(1));
        assert_eq!(decision.remaining, 3);

        for _ in 0..3 {
            assert!(limiter.evaluate("c", 12_500).allowed);
        }
        let decision = limiter.evaluate("c", 12_500);
        assert!(!decision.allowed);
        assert_eq!(estimated(&decision), 10.0);
        assert_eq!(decision.retry_after_secs, 8);
    }

    #[test]
    fn test_gap_of_two_windows_discards_previous() {
        let limiter = limiter(5, 10);

        for _ in 0..5 {
            limiter.evaluate("c", 1_000);
        }

        let decision = limiter.evaluate("c", 25_000);
        assert!(decision.allowed);
        assert_eq!(decision.meta("previousWindowCount").and_then(|v| v.as_i64()), Some(0));
        assert_eq!(estimated(&decision), 1.0);

        let state = limiter.store().get("c").unwrap();
        assert_eq!(state.previous, WindowCount::empty(10_000));
        assert_eq!(
            state.current,
            WindowCount {
                count: 1,
                window_start_millis: 20_000
            }
        );
    }

    #[test]
    fn test_adjacent_rollover_carries_current_forward() {
        let state = SlidingWindowCounterState {
            current: WindowCount {
                count: 4,
                window_start_millis: 10_000,
            },
            previous: WindowCount {
                count: 9,
                window_start_millis: 0,
            },
        };

        let rolled = state.rolled(20_000, 10_000);
        assert_eq!(rolled.previous, state.current);
        assert_eq!(rolled.current, WindowCount::empty(20_000));

        assert_eq!(state.rolled(10_000, 10_000), state);
    }

    #[test]
    fn test_estimate_non_decreasing_within_window() {
        let limiter = limiter(50, 10);
        let mut last = 0.0;

        for _ in 0..60 {
            let decision = limiter.evaluate("c", 3_000);
            let estimate = estimated(&decision);
            assert!(estimate >= last);
            last = estimate;
        }
        assert_eq!(last, 50.0);
    }

    #[test]
    fn test_reset_drops_both_windows() {
        let limiter = limiter(1, 10);
        limiter.evaluate("c", 0);
        assert!(!limiter.evaluate("c", 1).allowed);

        limiter.reset();

        let decision = limiter.evaluate("c", 2);
        assert!(decision.allowed);
        assert_eq!(estimated(&decision), 1.0);
    }

    #[test]
    fn test_concurrent_hits_respect_limit() {
        let limiter = limiter(40, 60);

        let admitted: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| (0..20).filter(|_| limiter.evaluate("shared", 0).allowed).count()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(admitted, 40);
    }
}
