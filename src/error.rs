//! Error types for the Ratekeeper service.

use thiserror::Error;

use crate::ratelimit::ConfigError;

/// Main error type for Ratekeeper operations.
#[derive(Error, Debug)]
pub enum RatekeeperError {
    /// Service configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Limiter parameters were rejected at construction time
    #[error("Invalid limiter configuration: {0}")]
    Validation(#[from] ConfigError),

    /// Errors raised while layering configuration sources
    #[error("Settings error: {0}")]
    Settings(#[from] ::config::ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Ratekeeper operations.
pub type Result<T> = std::result::Result<T, RatekeeperError>;
