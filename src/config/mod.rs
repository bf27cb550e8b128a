//! Application configuration module
//!
//! Type-safe configuration loading from environment variables using the
//! `config` and `dotenvy` crates. Configuration is loaded with the
//! `WIDGET_RELAY` prefix and nested values use double underscores as
//! separators.
//!
//! # Example
//!
//! ```no_run
//! use widget_relay::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod error;
mod redis;
mod state;

pub use error::{ConfigError, ValidationError};
pub use redis::RedisConfig;
pub use state::StateConfig;

use serde::Deserialize;

/// Root application configuration
///
/// Load using [`AppConfig::load()`] which reads from environment
/// variables, or construct directly for tests and embedders.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Coordination core configuration (backend selection, TTLs)
    #[serde(default)]
    pub state: StateConfig,

    /// Redis configuration (required only in deploy mode)
    #[serde(default)]
    pub redis: RedisConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `WIDGET_RELAY` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    ///
    /// # Environment Variable Format
    ///
    /// - `WIDGET_RELAY__STATE__DEPLOY_MODE=true` -> `state.deploy_mode = true`
    /// - `WIDGET_RELAY__REDIS__URL=redis://...` -> `redis.url = ...`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into the expected
    /// types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("WIDGET_RELAY")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// The Redis section is only validated in deploy mode — a
    /// single-process deployment needs no external store at all.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.state.validate()?;
        if self.state.deploy_mode {
            self.redis.validate()?;
        }
        Ok(())
    }

    /// Configuration for a single-process deployment (memory backends).
    pub fn local() -> Self {
        Self::default()
    }

    /// Configuration for a multi-worker deployment against the given
    /// Redis URL.
    pub fn deployed(redis_url: impl Into<String>) -> Self {
        Self {
            state: StateConfig {
                deploy_mode: true,
                ..Default::default()
            },
            redis: RedisConfig {
                url: redis_url.into(),
                ..Default::default()
            },
        }
    }
}
