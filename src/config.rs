//! Configuration management for Ratekeeper.

use ::config::builder::{ConfigBuilder, DefaultState};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use tracing::info;

use crate::error::{RatekeeperError, Result};
use crate::ratelimit::{Algorithm, LimiterParams};

/// Environment variable prefix; nested keys are separated by `__`,
/// e.g. `RATEKEEPER__SERVER__HTTP_ADDR`.
pub const ENV_PREFIX: &str = "RATEKEEPER";

/// Main configuration for the Ratekeeper service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Limiter installed at start-up, if any
    #[serde(default)]
    pub limiter: Option<InitialLimiter>,
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// Origins allowed to call the API from a browser
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            cors_origins: default_cors_origins(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// A limiter to install when the service starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialLimiter {
    pub algorithm: Algorithm,

    #[serde(flatten)]
    pub params: LimiterParams,
}

impl ServiceConfig {
    /// Load configuration from an optional file, then `RATEKEEPER__*`
    /// environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: ServiceConfig = Self::sources(path).build()?.try_deserialize()?;
        Ok(config)
    }

    fn sources(path: Option<&Path>) -> ConfigBuilder<DefaultState> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(::config::File::from(path).required(true));
        }

        builder.add_source(::config::Environment::with_prefix(ENV_PREFIX).separator("__"))
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| RatekeeperError::Config(format!("Failed to parse configuration: {}", e)))
    }
}
