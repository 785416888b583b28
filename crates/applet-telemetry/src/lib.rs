//! # Applet Telemetry
//!
//! Structured logging bootstrap shared by applet processes and tests.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use applet_telemetry::{init_logging, TelemetryConfig};
//!
//! fn main() {
//!     let config = TelemetryConfig::from_env();
//!     if let Err(err) = init_logging(&config) {
//!         eprintln!("logging disabled: {err}");
//!     }
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `APPLETS_SERVICE_NAME` | `applets` | Service name in the startup line |
//! | `APPLETS_LOG_LEVEL` / `RUST_LOG` | `info` | Filter directive |
//! | `APPLETS_JSON_LOGS` | `false` | JSON output |
//! | `APPLETS_LOG_TARGET` | `true` | Include event targets |

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::{init_logging, init_test_logging};

use thiserror::Error;

/// Logging initialization errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),

    #[error("A global subscriber is already installed")]
    AlreadyInitialized,
}
