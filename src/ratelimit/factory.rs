//! Limiter construction from an algorithm tag and raw parameters.

use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use super::fixed_window::{FixedWindowLimiter, FixedWindowState};
use super::leaky_bucket::{LeakyBucketLimiter, LeakyBucketState};
use super::limiter::{Algorithm, RateLimiter};
use super::limits::{
    ConfigError, FixedWindowConfig, LeakyBucketConfig, SlidingWindowConfig, TokenBucketConfig,
};
use super::sliding_counter::{SlidingWindowCounterLimiter, SlidingWindowCounterState};
use super::sliding_log::{SlidingWindowLogLimiter, SlidingWindowLogState};
use super::store::KeyedStateStore;
use super::token_bucket::{TokenBucketLimiter, TokenBucketState};

/// Unvalidated limiter parameters, as received from a configuration
/// payload. Only the fields relevant to the chosen algorithm are read.
///
/// Layered configuration sources lowercase their keys and deliver
/// environment values as strings, so every field also answers to its
/// lowercase name and accepts a numeric string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimiterParams {
    #[serde(default, alias = "maxrequests", deserialize_with = "lenient")]
    pub max_requests: Option<i64>,

    #[serde(
        default,
        rename = "windowSize",
        alias = "windowSizeSeconds",
        alias = "windowsize",
        alias = "windowsizeseconds",
        deserialize_with = "lenient"
    )]
    pub window_size_secs: Option<i64>,

    #[serde(default, alias = "bucketcapacity", deserialize_with = "lenient")]
    pub bucket_capacity: Option<i64>,

    #[serde(
        default,
        rename = "refillRate",
        alias = "refillRatePerSecond",
        alias = "refillrate",
        alias = "refillratepersecond",
        deserialize_with = "lenient"
    )]
    pub refill_rate_per_sec: Option<f64>,

    #[serde(
        default,
        rename = "leakRate",
        alias = "leakRatePerSecond",
        alias = "leakrate",
        alias = "leakratepersecond",
        deserialize_with = "lenient"
    )]
    pub leak_rate_per_sec: Option<f64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText<T> {
    Number(T),
    Text(String),
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: fmt::Display,
{
    match Option::<NumberOrText<T>>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrText::Number(value)) => Ok(Some(value)),
        Some(NumberOrText::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| de::Error::custom(format!("invalid number {text:?}: {e}"))),
    }
}

impl LimiterParams {
    pub fn windowed(max_requests: i64, window_size_secs: i64) -> Self {
        Self {
            max_requests: Some(max_requests),
            window_size_secs: Some(window_size_secs),
            ..Self::default()
        }
    }

    pub fn token_bucket(capacity: i64, refill_rate_per_sec: f64) -> Self {
        Self {
            bucket_capacity: Some(capacity),
            refill_rate_per_sec: Some(refill_rate_per_sec),
            ..Self::default()
        }
    }

    pub fn leaky_bucket(capacity: i64, leak_rate_per_sec: f64) -> Self {
        Self {
            bucket_capacity: Some(capacity),
            leak_rate_per_sec: Some(leak_rate_per_sec),
            ..Self::default()
        }
    }

    fn fixed_window(&self) -> Result<FixedWindowConfig, ConfigError> {
        FixedWindowConfig::new(
            required(self.max_requests, "maxRequests")?,
            required(self.window_size_secs, "windowSize")?,
        )
    }

    fn sliding_window(&self) -> Result<SlidingWindowConfig, ConfigError> {
        SlidingWindowConfig::new(
            required(self.max_requests, "maxRequests")?,
            required(self.window_size_secs, "windowSize")?,
        )
    }

    fn token_bucket_config(&self) -> Result<TokenBucketConfig, ConfigError> {
        TokenBucketConfig::new(
            required(self.bucket_capacity, "bucketCapacity")?,
            required(self.refill_rate_per_sec, "refillRate")?,
        )
    }

    fn leaky_bucket_config(&self) -> Result<LeakyBucketConfig, ConfigError> {
        LeakyBucketConfig::new(
            required(self.bucket_capacity, "bucketCapacity")?,
            required(self.leak_rate_per_sec, "leakRate")?,
        )
    }
}

fn required<T>(value: Option<T>, field: &'static str) -> Result<T, ConfigError> {
    value.ok_or(ConfigError::MissingField { field })
}

/// Builds limiters, binding each algorithm to its own dedicated store.
///
/// Limiters built for the same algorithm from one factory share that
/// algorithm's store, so per-client state survives re-initialisation
/// until it is explicitly reset.
#[derive(Debug, Default)]
pub struct LimiterFactory {
    fixed_window: Arc<KeyedStateStore<FixedWindowState>>,
    token_bucket: Arc<KeyedStateStore<TokenBucketState>>,
    leaky_bucket: Arc<KeyedStateStore<LeakyBucketState>>,
    sliding_log: Arc<KeyedStateStore<SlidingWindowLogState>>,
    sliding_counter: Arc<KeyedStateStore<SlidingWindowCounterState>>,
}

impl LimiterFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `params` for `algorithm` and construct the limiter.
    pub fn build(
        &self,
        algorithm: Algorithm,
        params: &LimiterParams,
    ) -> Result<Arc<dyn RateLimiter>, ConfigError> {
        let limiter: Arc<dyn RateLimiter> = match algorithm {
            Algorithm::FixedWindow => Arc::new(FixedWindowLimiter::with_store(
                params.fixed_window()?,
                Arc::clone(&self.fixed_window),
            )),
            Algorithm::TokenBucket => Arc::new(TokenBucketLimiter::with_store(
                params.token_bucket_config()?,
                Arc::clone(&self.token_bucket),
            )),
            Algorithm::SlidingWindowLog => Arc::new(SlidingWindowLogLimiter::with_store(
                params.sliding_window()?,
                Arc::clone(&self.sliding_log),
            )),
            Algorithm::SlidingWindowCounter => Arc::new(SlidingWindowCounterLimiter::with_store(
                params.sliding_window()?,
                Arc::clone(&self.sliding_counter),
            )),
            Algorithm::LeakyBucket => Arc::new(LeakyBucketLimiter::with_store(
                params.leaky_bucket_config()?,
                Arc::clone(&self.leaky_bucket),
            )),
        };

        debug!(algorithm = %algorithm, params = ?params, "Built rate limiter");
        Ok(limiter)
    }

    /// Like [`build`](Self::build), taking the algorithm by name.
    pub fn build_named(
        &self,
        algorithm: &str,
        params: &LimiterParams,
    ) -> Result<Arc<dyn RateLimiter>, ConfigError> {
        self.build(algorithm.parse()?, params)
    }

    /// Number of clients tracked by the store dedicated to `algorithm`.
    pub fn tracked_clients(&self, algorithm: Algorithm) -> usize {
        match algorithm {
            Algorithm::FixedWindow => self.fixed_window.len(),
            Algorithm::TokenBucket => self.token_bucket.len(),
            Algorithm::SlidingWindowLog => self.sliding_log.len(),
            Algorithm::SlidingWindowCounter => self.sliding_counter.len(),
            Algorithm::LeakyBucket => self.leaky_bucket.len(),
        }
    }
}

/// Build a standalone limiter with freshly allocated state.
pub fn build(
    algorithm: Algorithm,
    params: &LimiterParams,
) -> Result<Arc<dyn RateLimiter>, ConfigError> {
    LimiterFactory::new().build(algorithm, params)
}
