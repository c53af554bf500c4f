//! Admission decisions returned for every hit.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// A numeric metadata value attached to a decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Int(i64),
    Float(f64),
}

impl MetadataValue {
    /// The value as a float, regardless of its representation.
    pub fn as_f64(&self) -> f64 {
        match *self {
            MetadataValue::Int(v) => v as f64,
            MetadataValue::Float(v) => v,
        }
    }

    /// The value as an integer, if it is one.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            MetadataValue::Int(v) => Some(v),
            MetadataValue::Float(_) => None,
        }
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Int(v)
    }
}

impl From<u64> for MetadataValue {
    fn from(v: u64) -> Self {
        MetadataValue::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<usize> for MetadataValue {
    fn from(v: usize) -> Self {
        MetadataValue::from(v as u64)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::Float(v)
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Int(v) => write!(f, "{}", v),
            MetadataValue::Float(v) => write!(f, "{}", v),
        }
    }
}

/// Algorithm-specific figures describing the state behind a decision.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// The outcome of evaluating one hit for one client key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    /// Whether the request is admitted
    pub allowed: bool,
    /// Human readable summary
    pub message: String,
    /// The instant the decision was taken at (epoch millis)
    pub timestamp_millis: i64,
    /// Seconds until the next hit is expected to succeed; zero when allowed
    pub retry_after_secs: u64,
    /// Remaining admissions the algorithm currently grants
    pub remaining: u64,
    /// Algorithm-specific metadata
    pub metadata: Metadata,
}

impl Decision {
    pub(crate) fn new(allowed: bool, message: &str, timestamp_millis: i64) -> Self {
        Self {
            allowed,
            message: message.to_string(),
            timestamp_millis,
            retry_after_secs: 0,
            remaining: 0,
            metadata: Metadata::new(),
        }
    }

    pub(crate) fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after_secs = secs;
        self
    }

    pub(crate) fn with_remaining(mut self, remaining: u64) -> Self {
        self.remaining = remaining;
        self
    }

    pub(crate) fn with(mut self, key: &str, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Look up a metadata value by key.
    pub fn meta(&self, key: &str) -> Option<MetadataValue> {
        self.metadata.get(key).copied()
    }
}

/// Round a millisecond span up to whole seconds, never below zero.
pub(crate) fn ceil_secs_from_millis(millis: i64) -> u64 {
    if millis <= 0 {
        return 0;
    }
    ((millis + 999) / 1000) as u64
}

/// Round a fractional number of seconds up, never below zero.
pub(crate) fn ceil_secs(secs: f64) -> u64 {
    if secs <= 0.0 {
        return 0;
    }
    secs.ceil() as u64
}
