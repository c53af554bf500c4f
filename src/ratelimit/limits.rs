//! Validated configuration values for each algorithm.
//!
//! Every config type has private fields and a fallible constructor, so a
//! limiter can never be built from a zero, negative or non-finite parameter.

use serde::Serialize;
use thiserror::Error;

/// Errors raised while validating limiter parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} is required")]
    MissingField { field: &'static str },

    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    #[error("{field} must be at most {max}, got {value}")]
    TooLarge {
        field: &'static str,
        value: i64,
        max: i64,
    },

    #[error("unknown algorithm: {0}")]
    UnknownAlgorithm(String),
}

fn positive_int(field: &'static str, value: i64) -> Result<u64, ConfigError> {
    if value <= 0 {
        return Err(ConfigError::NonPositive {
            field,
            value: value as f64,
        });
    }
    Ok(value as u64)
}

/// Largest accepted window, in seconds. Keeps every window bound derived
/// from an epoch-millis timestamp well inside `i64`.
pub const MAX_WINDOW_SECS: i64 = 1 << 40;

fn window_millis(field: &'static str, value: i64) -> Result<(u64, i64), ConfigError> {
    let secs = positive_int(field, value)?;
    if value > MAX_WINDOW_SECS {
        return Err(ConfigError::TooLarge {
            field,
            value,
            max: MAX_WINDOW_SECS,
        });
    }
    Ok((secs, value * 1000))
}

fn positive_rate(field: &'static str, value: f64) -> Result<f64, ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::NonPositive { field, value });
    }
    Ok(value)
}

/// Parameters for the fixed window algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FixedWindowConfig {
    max_requests: u64,
    window_size_secs: u64,
    #[serde(skip)]
    window_size_millis: i64,
}

impl FixedWindowConfig {
    pub fn new(max_requests: i64, window_size_secs: i64) -> Result<Self, ConfigError> {
        let max_requests = positive_int("maxRequests", max_requests)?;
        let (window_size_secs, window_size_millis) = window_millis("windowSize", window_size_secs)?;
        Ok(Self {
            max_requests,
            window_size_secs,
            window_size_millis,
        })
    }

    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    pub fn window_size_secs(&self) -> u64 {
        self.window_size_secs
    }

    pub(crate) fn window_size_millis(&self) -> i64 {
        self.window_size_millis
    }
}

/// Parameters for the token bucket algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBucketConfig {
    capacity: u64,
    refill_rate_per_sec: f64,
}

impl TokenBucketConfig {
    pub fn new(capacity: i64, refill_rate_per_sec: f64) -> Result<Self, ConfigError> {
        Ok(Self {
            capacity: positive_int("bucketCapacity", capacity)?,
            refill_rate_per_sec: positive_rate("refillRate", refill_rate_per_sec)?,
        })
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn refill_rate_per_sec(&self) -> f64 {
        self.refill_rate_per_sec
    }
}

/// Parameters for the leaky bucket algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeakyBucketConfig {
    capacity: u64,
    leak_rate_per_sec: f64,
}

impl LeakyBucketConfig {
    pub fn new(capacity: i64, leak_rate_per_sec: f64) -> Result<Self, ConfigError> {
        Ok(Self {
            capacity: positive_int("bucketCapacity", capacity)?,
            leak_rate_per_sec: positive_rate("leakRate", leak_rate_per_sec)?,
        })
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn leak_rate_per_sec(&self) -> f64 {
        self.leak_rate_per_sec
    }
}

/// Parameters shared by the sliding window log and counter algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlidingWindowConfig {
    max_requests: u64,
    window_size_secs: u64,
    #[serde(skip)]
    window_size_millis: i64,
}

impl SlidingWindowConfig {
    pub fn new(max_requests: i64, window_size_secs: i64) -> Result<Self, ConfigError> {
        let max_requests = positive_int("maxRequests", max_requests)?;
        let (window_size_secs, window_size_millis) = window_millis("windowSize", window_size_secs)?;
        Ok(Self {
            max_requests,
            window_size_secs,
            window_size_millis,
        })
    }

    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    pub fn window_size_secs(&self) -> u64 {
        self.window_size_secs
    }

    pub(crate) fn window_size_millis(&self) -> i64 {
        self.window_size_millis
    }
}
