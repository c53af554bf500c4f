//! The currently installed limiter, swappable at runtime.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

use super::limiter::RateLimiter;

/// Holds the limiter that request handling currently evaluates against.
///
/// Reconfiguration replaces the limiter wholesale. Readers clone the `Arc`
/// and release the lock before evaluating, so a swap never waits on
/// in-flight decisions and in-flight decisions finish against the limiter
/// they started with.
#[derive(Default)]
pub struct ActiveLimiter {
    current: RwLock<Option<Arc<dyn RateLimiter>>>,
}

impl ActiveLimiter {
    /// Create a holder with no limiter installed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a holder with `limiter` already installed.
    pub fn with_limiter(limiter: Arc<dyn RateLimiter>) -> Self {
        Self {
            current: RwLock::new(Some(limiter)),
        }
    }

    /// Install `limiter`, returning the one it replaces.
    pub fn install(&self, limiter: Arc<dyn RateLimiter>) -> Option<Arc<dyn RateLimiter>> {
        info!(algorithm = %limiter.algorithm(), "Installing rate limiter");
        self.current.write().replace(limiter)
    }

    /// The installed limiter, if any.
    pub fn current(&self) -> Option<Arc<dyn RateLimiter>> {
        self.current.read().clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.current.read().is_some()
    }
}
