//! # DM Telemetry
//!
//! Logging setup shared by every division mesh binary.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dm_telemetry::{init_logging, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env();
//! init_logging(&config)?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `DM_SERVICE_NAME` | `division-mesh` | Service name in records |
//! | `DM_LOG_LEVEL` / `RUST_LOG` | `info` | Filter directive |
//! | `DM_JSON_LOGS` | `false` (`true` in containers) | JSON output |
//! | `DM_LOG_LOCATION` | `false` | Source file and line |

#![warn(missing_docs)]

mod config;
mod logging;

pub use config::{TelemetryConfig, DEFAULT_SERVICE_NAME};
pub use logging::{env_filter, init_logging};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The filter directive does not parse.
    #[error("Invalid log filter: {0}")]
    Filter(String),

    /// A global subscriber is already installed.
    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Convenience macro for a span carrying the division being served.
///
/// # Example
///
/// ```rust,ignore
/// let _span = dm_telemetry::division_span!("deliver", "div-b", message_id = %id).entered();
/// ```
#[macro_export]
macro_rules! division_span {
    ($name:expr, $division:expr) => {
        tracing::info_span!($name, division = %$division)
    };
    ($name:expr, $division:expr, $($field:tt)*) => {
        tracing::info_span!($name, division = %$division, $($field)*)
    };
}
