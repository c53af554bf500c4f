//! Sliding window log: exact enforcement over a trailing window.

use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, trace};

use super::decision::{ceil_secs_from_millis, Decision};
use super::limiter::{Algorithm, RateLimiter};
use super::limits::SlidingWindowConfig;
use super::store::KeyedStateStore;

/// Admitted hit timestamps (epoch millis) for one client, oldest first.
///
/// Only admitted hits are recorded, so the log never holds more than
/// `max_requests` entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlidingWindowLogState {
    pub timestamps_millis: VecDeque<i64>,
}

struct Outcome {
    allowed: bool,
    size_after: usize,
    retry_after_secs: u64,
}

/// Sliding window log rate limiter.
///
/// No more than `max_requests` admitted hits ever fall inside any interval
/// of `window_size_secs`. Memory per client grows with the limit.
pub struct SlidingWindowLogLimiter {
    config: SlidingWindowConfig,
    store: Arc<KeyedStateStore<SlidingWindowLogState>>,
}

impl SlidingWindowLogLimiter {
    pub fn new(config: SlidingWindowConfig) -> Self {
        Self::with_store(config, Arc::new(KeyedStateStore::new()))
    }

    pub fn with_store(config: SlidingWindowConfig, store: Arc<KeyedStateStore<SlidingWindowLogState>>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &SlidingWindowConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<KeyedStateStore<SlidingWindowLogState>> {
        &self.store
    }
}

impl RateLimiter for SlidingWindowLogLimiter {
    fn evaluate(&self, client_key: &str, now_millis: i64) -> Decision {
        let window_ms = self.config.window_size_millis();
        let max_requests = self.config.max_requests();
        let lower_bound = now_millis - window_ms;

        let outcome = self.store.compute(client_key, |state| {
            let mut log = state.unwrap_or_default();

            while log
                .timestamps_millis
                .front()
                .is_some_and(|&oldest| oldest < lower_bound)
            {
                log.timestamps_millis.pop_front();
            }

            let outcome = if (log.timestamps_millis.len() as u64) < max_requests {
                log.timestamps_millis.push_back(now_millis);
                Outcome {
                    allowed: true,
                    size_after: log.timestamps_millis.len(),
                    retry_after_secs: 0,
                }
            } else {
                // A full log is never empty since max_requests >= 1.
                let oldest = log.timestamps_millis.front().copied().unwrap_or(now_millis);
                Outcome {
                    allowed: false,
                    size_after: log.timestamps_millis.len(),
                    retry_after_secs: ceil_secs_from_millis(oldest + window_ms - now_millis),
                }
            };

            (log, outcome)
        });

        trace!(
            client = client_key,
            allowed = outcome.allowed,
            logged = outcome.size_after,
            "Sliding window log decision"
        );

        let message = if outcome.allowed {
            "ALLOWED"
        } else {
            debug!(
                client = client_key,
                limit = max_requests,
                retry_after = outcome.retry_after_secs,
                "Sliding window log full"
            );
            "BLOCKED"
        };

        Decision::new(outcome.allowed, message, now_millis)
            .with_retry_after(outcome.retry_after_secs)
            .with_remaining(max_requests.saturating_sub(outcome.size_after as u64))
            .with("currentWindowSize", outcome.size_after)
            .with("maxRequests", max_requests)
            .with("windowSizeSeconds", self.config.window_size_secs())
            .with("windowLowerBoundMillis", lower_bound)
            .with("nowMillis", now_millis)
    }

    fn reset(&self) {
        self.store.reset();
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::SlidingWindowLog
    }
}
