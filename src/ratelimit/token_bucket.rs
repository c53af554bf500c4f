//! Token bucket with continuous refill.

use std::sync::Arc;
use tracing::{debug, trace};

use super::decision::{ceil_secs, Decision};
use super::limiter::{Algorithm, RateLimiter};
use super::limits::TokenBucketConfig;
use super::store::KeyedStateStore;

/// Per-client token level.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TokenBucketState {
    pub tokens: f64,
    /// Last time tokens were consumed (epoch millis)
    pub last_refill_millis: i64,
}

struct Outcome {
    allowed: bool,
    tokens_after: f64,
    retry_after_secs: u64,
}

/// Token bucket rate limiter.
///
/// Buckets start full. Tokens flow back at `refill_rate_per_sec` up to
/// `capacity`, and each admitted hit consumes one.
pub struct TokenBucketLimiter {
    config: TokenBucketConfig,
    store: Arc<KeyedStateStore<TokenBucketState>>,
}

impl TokenBucketLimiter {
    pub fn new(config: TokenBucketConfig) -> Self {
        Self::with_store(config, Arc::new(KeyedStateStore::new()))
    }

    pub fn with_store(config: TokenBucketConfig, store: Arc<KeyedStateStore<TokenBucketState>>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &TokenBucketConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<KeyedStateStore<TokenBucketState>> {
        &self.store
    }
}

impl RateLimiter for TokenBucketLimiter {
    fn evaluate(&self, client_key: &str, now_millis: i64) -> Decision {
        let capacity = self.config.capacity() as f64;
        let rate = self.config.refill_rate_per_sec();

        let outcome = self.store.compute(client_key, |state| {
            let Some(state) = state else {
                let next = TokenBucketState {
                    tokens: capacity - 1.0,
                    last_refill_millis: now_millis,
                };
                let outcome = Outcome {
                    allowed: true,
                    tokens_after: next.tokens,
                    retry_after_secs: 0,
                };
                return (next, outcome);
            };

            let elapsed_secs = (now_millis - state.last_refill_millis).max(0) as f64 / 1000.0;
            let tokens = (state.tokens + elapsed_secs * rate).min(capacity);

            if tokens >= 1.0 {
                let next = TokenBucketState {
                    tokens: tokens - 1.0,
                    last_refill_millis: now_millis,
                };
                let outcome = Outcome {
                    allowed: true,
                    tokens_after: next.tokens,
                    retry_after_secs: 0,
                };
                return (next, outcome);
            }

            // Keep the old refill timestamp so partial progress carries over.
            let next = TokenBucketState {
                tokens,
                last_refill_millis: state.last_refill_millis,
            };
            let outcome = Outcome {
                allowed: false,
                tokens_after: tokens,
                retry_after_secs: ceil_secs((1.0 - tokens) / rate),
            };
            (next, outcome)
        });

        trace!(
            client = client_key,
            allowed = outcome.allowed,
            tokens = outcome.tokens_after,
            "Token bucket decision"
        );

        let message = if outcome.allowed {
            "Token consumed"
        } else {
            debug!(
                client = client_key,
                retry_after = outcome.retry_after_secs,
                "Token bucket empty"
            );
            "No tokens available"
        };

        Decision::new(outcome.allowed, message, now_millis)
            .with_retry_after(outcome.retry_after_secs)
            .with_remaining(outcome.tokens_after.max(0.0).floor() as u64)
            .with("tokensRemaining", outcome.tokens_after)
            .with("bucketCapacity", self.config.capacity())
            .with("refillRatePerSecond", rate)
    }

    fn reset(&self) {
        self.store.reset();
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::TokenBucket
    }
}
