//! # Ledger Telemetry
//!
//! Logging and metrics for the points ledger.
//!
//! ## Components
//!
//! | Concern | Implementation |
//! |---------|----------------|
//! | Logs    | `tracing-subscriber` with env filter, pretty or JSON output |
//! | Metrics | Prometheus counters and histograms in a ledger-owned registry |
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ledger_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env();
//! init_telemetry(&config)?;
//! ```

pub mod config;
pub mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::{init_logging, init_test_logging};
pub use metrics::{
    encode_metrics, record_operation, record_points, record_rp_burn, register_metrics,
    OperationTimer,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and, if enabled, the metrics registry.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    if config.metrics_enabled {
        register_metrics()?;
    }
    init_logging(config)
}
