//! Bus configuration from defaults and environment variables.
//!
//! # Example
//!
//! ```ignore
//! let config = BusConfig::from_env()
//!     .with_heartbeat_interval(Duration::from_secs(30))
//!     .with_max_message_body_bytes(64 * 1024);
//! config.validate()?;
//! ```

use crate::error::ConfigError;
use crate::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_EVENT_BUFFER_CAPACITY, DEFAULT_FAN_IN_TIMEOUT,
    DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_MAX_MESSAGE_BODY_BYTES,
};
use std::env;
use std::time::Duration;

/// Configuration shared by a broker and the channels it creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// Broadcast buffer of the in-memory transport
    pub channel_capacity: usize,

    /// Events a channel buffers while no listener drains them
    pub event_buffer_capacity: usize,

    /// Idle time before a heartbeat is emitted. `Duration::ZERO` disables heartbeats.
    pub heartbeat_interval: Duration,

    /// Timeout of the default fan-in policy
    pub default_fan_in_timeout: Duration,

    /// Serialized payloads of at least this size overflow to the blob store
    pub max_message_body_bytes: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            event_buffer_capacity: DEFAULT_EVENT_BUFFER_CAPACITY,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            default_fan_in_timeout: DEFAULT_FAN_IN_TIMEOUT,
            max_message_body_bytes: DEFAULT_MAX_MESSAGE_BODY_BYTES,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl BusConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `APPLETS_CHANNEL_CAPACITY`: transport buffer (default: 1024)
    /// - `APPLETS_EVENT_BUFFER`: per-channel event buffer (default: 256)
    /// - `APPLETS_HEARTBEAT_INTERVAL_MS`: heartbeat idle interval, 0 disables (default: 10000)
    /// - `APPLETS_FAN_IN_TIMEOUT_MS`: default fan-in timeout (default: 5000)
    /// - `APPLETS_MAX_MESSAGE_BODY_BYTES`: blob overflow threshold (default: 262144)
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            channel_capacity: env_parse("APPLETS_CHANNEL_CAPACITY")
                .unwrap_or(defaults.channel_capacity),
            event_buffer_capacity: env_parse("APPLETS_EVENT_BUFFER")
                .unwrap_or(defaults.event_buffer_capacity),
            heartbeat_interval: env_parse("APPLETS_HEARTBEAT_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.heartbeat_interval),
            default_fan_in_timeout: env_parse("APPLETS_FAN_IN_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.default_fan_in_timeout),
            max_message_body_bytes: env_parse("APPLETS_MAX_MESSAGE_BODY_BYTES")
                .unwrap_or(defaults.max_message_body_bytes),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_capacity == 0 {
            return Err(ConfigError::InvalidParameters(
                "channel_capacity cannot be 0".to_string(),
            ));
        }
        if self.event_buffer_capacity == 0 {
            return Err(ConfigError::InvalidParameters(
                "event_buffer_capacity cannot be 0".to_string(),
            ));
        }
        if self.default_fan_in_timeout.is_zero() {
            return Err(ConfigError::InvalidParameters(
                "default_fan_in_timeout cannot be 0".to_string(),
            ));
        }
        if self.max_message_body_bytes == 0 {
            return Err(ConfigError::InvalidParameters(
                "max_message_body_bytes cannot be 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn heartbeat_enabled(&self) -> bool {
        !self.heartbeat_interval.is_zero()
    }

    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_event_buffer_capacity(mut self, capacity: usize) -> Self {
        self.event_buffer_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    #[must_use]
    pub fn without_heartbeat(self) -> Self {
        self.with_heartbeat_interval(Duration::ZERO)
    }

    #[must_use]
    pub fn with_default_fan_in_timeout(mut self, timeout: Duration) -> Self {
        self.default_fan_in_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_message_body_bytes(mut self, limit: usize) -> Self {
        self.max_message_body_bytes = limit;
        self
    }
}
