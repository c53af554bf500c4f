//! Leaky bucket (water level) limiting.

use std::sync::Arc;
use tracing::{debug, trace};

use super::decision::{ceil_secs, Decision};
use super::limiter::{Algorithm, RateLimiter};
use super::limits::LeakyBucketConfig;
use super::store::KeyedStateStore;

/// Per-client water level.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LeakyBucketState {
    pub current_water: f64,
    /// Last time the level was recomputed (epoch millis)
    pub last_leak_millis: i64,
}

struct Outcome {
    allowed: bool,
    water_after: f64,
    retry_after_secs: u64,
}

/// Leaky bucket rate limiter.
///
/// Every admitted hit pours one unit of water into the bucket, which
/// drains at `leak_rate_per_sec`. A hit that would overflow `capacity` is
/// rejected. Unlike the token bucket, the leak clock advances on every hit,
/// rejected or not.
pub struct LeakyBucketLimiter {
    config: LeakyBucketConfig,
    store: Arc<KeyedStateStore<LeakyBucketState>>,
}

impl LeakyBucketLimiter {
    pub fn new(config: LeakyBucketConfig) -> Self {
        Self::with_store(config, Arc::new(KeyedStateStore::new()))
    }

    pub fn with_store(config: LeakyBucketConfig, store: Arc<KeyedStateStore<LeakyBucketState>>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &LeakyBucketConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<KeyedStateStore<LeakyBucketState>> {
        &self.store
    }
}

impl RateLimiter for LeakyBucketLimiter {
    fn evaluate(&self, client_key: &str, now_millis: i64) -> Decision {
        let capacity = self.config.capacity() as f64;
        let rate = self.config.leak_rate_per_sec();

        let outcome = self.store.compute(client_key, |state| {
            let Some(state) = state else {
                let next = LeakyBucketState {
                    current_water: 1.0,
                    last_leak_millis: now_millis,
                };
                let outcome = Outcome {
                    allowed: true,
                    water_after: 1.0,
                    retry_after_secs: 0,
                };
                return (next, outcome);
            };

            let elapsed_secs = (now_millis - state.last_leak_millis).max(0) as f64 / 1000.0;
            let water = (state.current_water - elapsed_secs * rate).max(0.0);

            let outcome = if water + 1.0 <= capacity {
                Outcome {
                    allowed: true,
                    water_after: water + 1.0,
                    retry_after_secs: 0,
                }
            } else {
                Outcome {
                    allowed: false,
                    water_after: water,
                    retry_after_secs: ceil_secs((water - capacity + 1.0) / rate),
                }
            };

            let next = LeakyBucketState {
                current_water: outcome.water_after,
                last_leak_millis: now_millis,
            };
            (next, outcome)
        });

        trace!(
            client = client_key,
            allowed = outcome.allowed,
            water = outcome.water_after,
            "Leaky bucket decision"
        );

        let message = if outcome.allowed {
            "ALLOWED"
        } else {
            debug!(
                client = client_key,
                retry_after = outcome.retry_after_secs,
                "Leaky bucket full"
            );
            "BLOCKED"
        };

        let remaining = (capacity - outcome.water_after).max(0.0).floor() as u64;

        Decision::new(outcome.allowed, message, now_millis)
            .with_retry_after(outcome.retry_after_secs)
            .with_remaining(remaining)
            .with("queueSize", outcome.water_after)
            .with("capacity", self.config.capacity())
            .with("leakRatePerSec", rate)
    }

    fn reset(&self) {
        self.store.reset();
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::LeakyBucket
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(capacity: i64, rate: f64) -> LeakyBucketLimiter {
        LeakyBucketLimiter::new(LeakyBucketConfig::new(capacity, rate).unwrap())
    }

    #[test]
    fn test_first_hit_pours_one_unit() {
        let limiter = limiter(3, 1.0);

        let decision = limiter.evaluate("c", 0);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
        assert_eq!(decision.meta("queueSize").map(|v| v.as_f64()), Some(1.0));
    }

    #[test]
    fn test_overflow_rejected() {
        let limiter = limiter(3, 1.0);

        for _ in 0..3 {
            assert!(limiter.evaluate("c", 0).allowed);
        }

        let decision = limiter.evaluate("c", 0);
        assert!(!decision.allowed);
        assert_eq!(decision.message, "BLOCKED");
        assert_eq!(decision.remaining, 0);
        // water 3, capacity 3: one unit must leak, at 1/s
        assert_eq!(decision.retry_after_secs, 1);
    }

    #[test]
    fn test_retry_after_uses_leak_rate() {
        let limiter = limiter(2, 0.25);

        limiter.evaluate("c", 0);
        limiter.evaluate("c", 0);

        let decision = limiter.evaluate("c", 0);
        assert!(!decision.allowed);
        assert_eq!(decision.retry_after_secs, 4);
    }

    #[test]
    fn test_rejection_advances_leak_clock() {
        let limiter = limiter(1, 1.0);
        limiter.evaluate("c", 0);

        let decision = limiter.evaluate("c", 500);
        assert!(!decision.allowed);

        let state = limiter.store().get("c").unwrap();
        assert_eq!(state.last_leak_millis, 500);
        assert!((state.current_water - 0.5).abs() < 1e-9);

        // Half a unit more leaks by t=1000, leaving room for one hit
        assert!(limiter.evaluate("c", 1_000).allowed);
    }

    #[test]
    fn test_water_never_exceeds_capacity() {
        let limiter = limiter(5, 2.0);

        for i in 0..200 {
            let decision = limiter.evaluate("c", i * 37);
            let water = decision.meta("queueSize").unwrap().as_f64();
            assert!(water <= 5.0, "water {} above capacity at hit {}", water, i);
            assert!(water >= 0.0);
        }
    }

    #[test]
    fn test_full_drain_admits_fresh_burst() {
        let limiter = limiter(4, 2.0);

        for _ in 0..4 {
            assert!(limiter.evaluate("c", 0).allowed);
        }
        assert!(!limiter.evaluate("c", 0).allowed);

        // capacity / leak rate = 2s
        for _ in 0..4 {
            assert!(limiter.evaluate("c", 2_000).allowed);
        }
        assert!(!limiter.evaluate("c", 2_000).allowed);
    }

    #[test]
    fn test_metadata() {
        let limiter = limiter(7, 1.5);
        let decision = limiter.evaluate("c", 0);

        assert_eq!(decision.meta("capacity").and_then(|v| v.as_i64()), Some(7));
        assert_eq!(decision.meta("leakRatePerSec").map(|v| v.as_f64()), Some(1.5));
    }

    #[test]
    fn test_reset_empties_buckets() {
        let limiter = limiter(1, 0.01);
        limiter.evaluate("c", 0);
        assert!(!limiter.evaluate("c", 0).allowed);

        limiter.reset();
        assert!(limiter.evaluate("c", 0).allowed);
    }

    #[test]
    fn test_concurrent_hits_fill_exactly_to_capacity() {
        let limiter = limiter(50, 0.001);

        let admitted: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| (0..20).filter(|_| limiter.evaluate("shared", 0).allowed).count()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(admitted, 50);
    }
}
