//! Rate limiting algorithms and per-client state management.

mod active;
mod clock;
mod decision;
mod factory;
mod fixed_window;
mod leaky_bucket;
mod limiter;
mod limits;
mod sliding_counter;
mod sliding_log;
mod store;
mod token_bucket;

pub use active::ActiveLimiter;
pub use clock::{Clock, ManualClock, SystemClock};
pub use decision::{Decision, Metadata, MetadataValue};
pub use factory::{build, LimiterFactory, LimiterParams};
pub use fixed_window::{FixedWindowLimiter, FixedWindowState};
pub use leaky_bucket::{LeakyBucketLimiter, LeakyBucketState};
pub use limiter::{Algorithm, RateLimiter};
pub use limits::{
    ConfigError, FixedWindowConfig, LeakyBucketConfig, SlidingWindowConfig, TokenBucketConfig,
    MAX_WINDOW_SECS,
};
pub use sliding_counter::{SlidingWindowCounterLimiter, SlidingWindowCounterState, WindowCount};
pub use sliding_log::{SlidingWindowLogLimiter, SlidingWindowLogState};
pub use store::KeyedStateStore;
pub use token_bucket::{TokenBucketLimiter, TokenBucketState};
