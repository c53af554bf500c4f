//! The contract shared by every admission algorithm.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::decision::Decision;
use super::limits::ConfigError;

/// Identifies one of the supported algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Algorithm {
    FixedWindow,
    TokenBucket,
    SlidingWindowLog,
    SlidingWindowCounter,
    LeakyBucket,
}

impl Algorithm {
    pub const ALL: [Algorithm; 5] = [
        Algorithm::FixedWindow,
        Algorithm::TokenBucket,
        Algorithm::SlidingWindowLog,
        Algorithm::SlidingWindowCounter,
        Algorithm::LeakyBucket,
    ];

    /// The canonical tag, e.g. `TOKEN_BUCKET`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::FixedWindow => "FIXED_WINDOW",
            Algorithm::TokenBucket => "TOKEN_BUCKET",
            Algorithm::SlidingWindowLog => "SLIDING_WINDOW_LOG",
            Algorithm::SlidingWindowCounter => "SLIDING_WINDOW_COUNTER",
            Algorithm::LeakyBucket => "LEAKY_BUCKET",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = ConfigError;

    /// Accepts the canonical tags as well as kebab-case names
    /// (`sliding-window-log`), ignoring ASCII case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', "_").to_ascii_uppercase();
        Algorithm::ALL
            .into_iter()
            .find(|algorithm| algorithm.as_str() == normalized)
            .ok_or_else(|| ConfigError::UnknownAlgorithm(s.to_string()))
    }
}

/// Admission control for a stream of hits keyed by client.
///
/// Implementations keep per-key state in a
/// [`KeyedStateStore`](super::KeyedStateStore) and must be safe to call
/// from many threads at once.
pub trait RateLimiter: Send + Sync {
    /// Decide whether one hit from `client_key` at `now_millis` is admitted.
    ///
    /// The outcome depends only on the stored state for the key, `now_millis`
    /// and the limiter's configuration.
    fn evaluate(&self, client_key: &str, now_millis: i64) -> Decision;

    /// Forget every client.
    fn reset(&self);

    fn algorithm(&self) -> Algorithm;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_parses_canonical_tags() {
        for algorithm in Algorithm::ALL {
            assert_eq!(algorithm.as_str().parse::<Algorithm>(), Ok(algorithm));
        }
    }

    #[test]
    fn test_algorithm_parses_kebab_case() {
        assert_eq!("token-bucket".parse(), Ok(Algorithm::TokenBucket));
        assert_eq!(
            "sliding-window-counter".parse(),
            Ok(Algorithm::SlidingWindowCounter)
        );
        assert_eq!("Leaky_Bucket".parse(), Ok(Algorithm::LeakyBucket));
    }

    #[test]
    fn test_unknown_algorithm() {
        assert_eq!(
            "GCRA".parse::<Algorithm>(),
            Err(ConfigError::UnknownAlgorithm("GCRA".to_string()))
        );
    }

    #[test]
    fn test_algorithm_serde_tags() {
        let json = serde_json::to_string(&Algorithm::SlidingWindowLog).unwrap();
        assert_eq!(json, "\"SLIDING_WINDOW_LOG\"");

        let parsed: Algorithm = serde_json::from_str("\"FIXED_WINDOW\"").unwrap();
        assert_eq!(parsed, Algorithm::FixedWindow);
    }
}
