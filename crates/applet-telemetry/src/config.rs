//! Logging configuration from environment variables.

use std::env;

/// Configuration of the log subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Service name attached to the startup log line
    pub service_name: String,

    /// `EnvFilter` directive (trace, debug, info, warn, error, or per-target)
    pub log_level: String,

    /// Emit one JSON object per event instead of the pretty format
    pub json_logs: bool,

    /// Include the event target (module path)
    pub with_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "applets".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            with_target: true,
        }
    }
}

fn env_flag(key: &str) -> Option<bool> {
    env::var(key)
        .ok()
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `APPLETS_SERVICE_NAME`: service name (default: applets)
    /// - `APPLETS_LOG_LEVEL` or `RUST_LOG`: filter directive (default: info)
    /// - `APPLETS_JSON_LOGS`: JSON output (default: false)
    /// - `APPLETS_LOG_TARGET`: include targets (default: true)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            service_name: env::var("APPLETS_SERVICE_NAME").unwrap_or(defaults.service_name),
            log_level: env::var("APPLETS_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or(defaults.log_level),
            json_logs: env_flag("APPLETS_JSON_LOGS").unwrap_or(defaults.json_logs),
            with_target: env_flag("APPLETS_LOG_TARGET").unwrap_or(defaults.with_target),
        }
    }

    /// Configuration for a named service, other fields from the environment.
    pub fn for_service(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            ..Self::from_env()
        }
    }

    #[must_use]
    pub fn with_log_level(mut self, log_level: impl Into<String>) -> Self {
        self.log_level = log_level.into();
        self
    }

    #[must_use]
    pub fn with_json_logs(mut self, json_logs: bool) -> Self {
        self.json_logs = json_logs;
        self
    }
}
