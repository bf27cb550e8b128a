//! State/coordination layer configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Configuration of the coordination core itself: backend selection, key
/// namespacing, and record TTLs.
#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    /// Multi-worker deployment flag: `true` selects the Redis backends,
    /// `false` the in-process memory backends.
    #[serde(default)]
    pub deploy_mode: bool,

    /// Namespace prefix for every Redis key and channel.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Widget record TTL in seconds (Redis backend; sliding on update).
    #[serde(default = "default_widget_ttl")]
    pub widget_ttl_secs: u64,

    /// Connection record TTL in seconds; heartbeats reset it.
    #[serde(default = "default_connection_ttl")]
    pub connection_ttl_secs: u64,

    /// Default session TTL in seconds applied when a session is created
    /// without an explicit TTL. `0` means such sessions never expire.
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,

    /// Per-subscriber event queue capacity.
    #[serde(default = "default_queue_capacity")]
    pub event_queue_capacity: usize,

    /// When set, any role holding the `admin` permission satisfies every
    /// permission check, including resource-scoped ones.
    #[serde(default)]
    pub admin_implies_all: bool,
}

impl StateConfig {
    /// Widget TTL as a Duration.
    pub fn widget_ttl(&self) -> Duration {
        Duration::from_secs(self.widget_ttl_secs)
    }

    /// Connection TTL as a Duration.
    pub fn connection_ttl(&self) -> Duration {
        Duration::from_secs(self.connection_ttl_secs)
    }

    /// Default session TTL; `None` when sessions default to non-expiring.
    pub fn default_session_ttl(&self) -> Option<Duration> {
        (self.session_ttl_secs > 0).then(|| Duration::from_secs(self.session_ttl_secs))
    }

    /// Validate state configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.key_prefix.is_empty() {
            return Err(ValidationError::EmptyKeyPrefix);
        }
        if self.widget_ttl_secs == 0 {
            return Err(ValidationError::InvalidTtl("widget_ttl_secs"));
        }
        if self.connection_ttl_secs == 0 {
            return Err(ValidationError::InvalidTtl("connection_ttl_secs"));
        }
        if self.event_queue_capacity == 0 {
            return Err(ValidationError::InvalidQueueCapacity);
        }
        Ok(())
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            deploy_mode: false,
            key_prefix: default_key_prefix(),
            widget_ttl_secs: default_widget_ttl(),
            connection_ttl_secs: default_connection_ttl(),
            session_ttl_secs: default_session_ttl(),
            event_queue_capacity: default_queue_capacity(),
            admin_implies_all: false,
        }
    }
}

fn default_key_prefix() -> String {
    "widgetrelay".to_string()
}

fn default_widget_ttl() -> u64 {
    3600
}

fn default_connection_ttl() -> u64 {
    90
}

fn default_session_ttl() -> u64 {
    86400
}

fn default_queue_capacity() -> usize {
    128
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_config_defaults() {
        let config = StateConfig::default();
        assert!(!config.deploy_mode);
        assert_eq!(config.key_prefix, "widgetrelay");
        assert_eq!(config.widget_ttl(), Duration::from_secs(3600));
        assert_eq!(config.connection_ttl(), Duration::from_secs(90));
        assert_eq!(
            config.default_session_ttl(),
            Some(Duration::from_secs(86400))
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_session_ttl_means_no_default_expiry() {
        let config = StateConfig {
            session_ttl_secs: 0,
            ..Default::default()
        };
        assert!(config.default_session_ttl().is_none());
        // Still valid: sessions may be non-expiring by default.
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_empty_prefix() {
        let config = StateConfig {
            key_prefix: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_ttls() {
        let config = StateConfig {
            widget_ttl_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = StateConfig {
            connection_ttl_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_queue_capacity() {
        let config = StateConfig {
            event_queue_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
