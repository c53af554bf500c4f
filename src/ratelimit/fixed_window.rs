//! Fixed window counting.
//!
//! Each client gets a window that opens on its first hit and lasts
//! `window_size_secs`. Up to `max_requests` hits are admitted per window.
//! Hits clustered around a window edge can admit up to twice the limit
//! across two adjacent windows; that is inherent to the algorithm.

use std::sync::Arc;
use tracing::{debug, trace};

use super::decision::{ceil_secs_from_millis, Decision};
use super::limiter::{Algorithm, RateLimiter};
use super::limits::FixedWindowConfig;
use super::store::KeyedStateStore;

/// Per-client state for a fixed window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixedWindowState {
    /// Hits admitted in the current window
    pub count: u64,
    /// When the current window opened (epoch millis)
    pub window_start_millis: i64,
}

struct Outcome {
    allowed: bool,
    count: u64,
    window_start_millis: i64,
    retry_after_secs: u64,
}

/// Fixed window rate limiter.
pub struct FixedWindowLimiter {
    config: FixedWindowConfig,
    store: Arc<KeyedStateStore<FixedWindowState>>,
}

impl FixedWindowLimiter {
    /// Create a limiter with its own private store.
    pub fn new(config: FixedWindowConfig) -> Self {
        Self::with_store(config, Arc::new(KeyedStateStore::new()))
    }

    /// Create a limiter bound to an existing store.
    pub fn with_store(config: FixedWindowConfig, store: Arc<KeyedStateStore<FixedWindowState>>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &FixedWindowConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<KeyedStateStore<FixedWindowState>> {
        &self.store
    }
}

impl RateLimiter for FixedWindowLimiter {
    fn evaluate(&self, client_key: &str, now_millis: i64) -> Decision {
        let window_ms = self.config.window_size_millis();
        let max_requests = self.config.max_requests();

        let outcome = self.store.compute(client_key, |state| match state {
            Some(state) if now_millis - state.window_start_millis < window_ms => {
                if state.count >= max_requests {
                    let window_end = state.window_start_millis + window_ms;
                    let outcome = Outcome {
                        allowed: false,
                        count: state.count,
                        window_start_millis: state.window_start_millis,
                        retry_after_secs: ceil_secs_from_millis(window_end - now_millis),
                    };
                    return (state, outcome);
                }

                let next = FixedWindowState {
                    count: state.count + 1,
                    window_start_millis: state.window_start_millis,
                };
                let outcome = Outcome {
                    allowed: true,
                    count: next.count,
                    window_start_millis: next.window_start_millis,
                    retry_after_secs: 0,
                };
                (next, outcome)
            }
            // First hit, or the previous window has fully elapsed
            _ => {
                let next = FixedWindowState {
                    count: 1,
                    window_start_millis: now_millis,
                };
                let outcome = Outcome {
                    allowed: true,
                    count: 1,
                    window_start_millis: now_millis,
                    retry_after_secs: 0,
                };
                (next, outcome)
            }
        });

        trace!(
            client = client_key,
            allowed = outcome.allowed,
            count = outcome.count,
            window_start = outcome.window_start_millis,
            "Fixed window decision"
        );

        let message = if outcome.allowed {
            "Request allowed in fixed window"
        } else {
            debug!(
                client = client_key,
                limit = max_requests,
                retry_after = outcome.retry_after_secs,
                "Fixed window limit reached"
            );
            "Fixed window limit reached"
        };

        Decision::new(outcome.allowed, message, now_millis)
            .with_retry_after(outcome.retry_after_secs)
            .with_remaining(max_requests.saturating_sub(outcome.count))
            .with("currentCount", outcome.count)
            .with("maxRequests", max_requests)
            .with("windowStart", outcome.window_start_millis)
            .with("windowEnd", outcome.window_start_millis + window_ms)
    }

    fn reset(&self) {
        self.store.reset();
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::FixedWindow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: i64, window_secs: i64) -> FixedWindowLimiter {
        FixedWindowLimiter::new(FixedWindowConfig::new(max_requests, window_secs).unwrap())
    }

    #[test]
    fn test_admits_up_to_limit_then_rejects() {
        let limiter = limiter(3, 10);

        for i in 0..3 {
            let decision = limiter.evaluate("client", i * 100);
            assert!(decision.allowed, "hit {} should be allowed", i + 1);
            assert_eq!(decision.retry_after_secs, 0);
        }

        let decision = limiter.evaluate("client", 300);
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.message, "Fixed window limit reached");
    }

    #[test]
    fn test_concrete_scenario() {
        // maxRequests=2, window=10s; hits at t=0,1,2 then t=10
        let limiter = limiter(2, 10);

        let first = limiter.evaluate("A", 0);
        assert!(first.allowed);
        assert_eq!(first.remaining, 1);

        let second = limiter.evaluate("A", 1_000);
        assert!(second.allowed);
        assert_eq!(second.remaining, 0);

        let third = limiter.evaluate("A", 2_000);
        assert!(!third.allowed);
        assert_eq!(third.retry_after_secs, 8);

        let fourth = limiter.evaluate("A", 10_000);
        assert!(fourth.allowed);
        assert_eq!(fourth.meta("currentCount").and_then(|v| v.as_i64()), Some(1));
        assert_eq!(fourth.meta("windowStart").and_then(|v| v.as_i64()), Some(10_000));
    }

    #[test]
    fn test_window_boundary_starts_fresh_window() {
        let limiter = limiter(1, 5);

        assert!(limiter.evaluate("c", 1_000).allowed);
        assert!(!limiter.evaluate("c", 5_999).allowed);

        let decision = limiter.evaluate("c", 6_000);
        assert!(decision.allowed);
        assert_eq!(
            limiter.store().get("c"),
            Some(FixedWindowState {
                count: 1,
                window_start_millis: 6_000
            })
        );
    }

    #[test]
    fn test_rejection_leaves_state_untouched() {
        let limiter = limiter(1, 10);

        limiter.evaluate("c", 0);
        let before = limiter.store().get("c");
        limiter.evaluate("c", 4_000);
        assert_eq!(limiter.store().get("c"), before);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let limiter = limiter(1, 10);

        limiter.evaluate("c", 0);
        let decision = limiter.evaluate("c", 2_500);
        assert_eq!(decision.retry_after_secs, 8);
    }

    #[test]
    fn test_boundary_burst_admits_twice_the_limit() {
        let limiter = limiter(2, 10);

        // Window opens at t=0; two hits at its tail...
        limiter.evaluate("c", 0);
        assert!(limiter.evaluate("c", 9_900).allowed);
        // ...and the next window admits two more right away
        assert!(limiter.evaluate("c", 10_000).allowed);
        assert!(limiter.evaluate("c", 10_001).allowed);
        assert!(!limiter.evaluate("c", 10_002).allowed);
    }

    #[test]
    fn test_clients_are_independent() {
        let limiter = limiter(1, 10);

        assert!(limiter.evaluate("a", 0).allowed);
        assert!(!limiter.evaluate("a", 1).allowed);
        assert!(limiter.evaluate("b", 1).allowed);
    }

    #[test]
    fn test_metadata() {
        let limiter = limiter(5, 60);
        let decision = limiter.evaluate("c", 1_000);

        assert_eq!(decision.meta("maxRequests").and_then(|v| v.as_i64()), Some(5));
        assert_eq!(decision.meta("windowStart").and_then(|v| v.as_i64()), Some(1_000));
        assert_eq!(decision.meta("windowEnd").and_then(|v| v.as_i64()), Some(61_000));
        assert_eq!(decision.timestamp_millis, 1_000);
    }

    #[test]
    fn test_reset_forgets_clients() {
        let limiter = limiter(1, 10);

        limiter.evaluate("c", 0);
        assert!(!limiter.evaluate("c", 1).allowed);

        limiter.reset();
        assert!(limiter.store().is_empty());
        assert!(limiter.evaluate("c", 2).allowed);
    }

    #[test]
    fn test_concurrent_hits_respect_limit() {
        let limiter = limiter(100, 60);

        let admitted: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        (0..50)
                            .filter(|_| limiter.evaluate("shared", 1_000).allowed)
                            .count()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(admitted, 100);
        assert_eq!(limiter.store().get("shared").map(|s| s.count), Some(100));
    }
}
