//! # Radio Telemetry
//!
//! Logging and metrics for the Radio Gateway.
//!
//! ## Components
//!
//! - **Logging**: `tracing-subscriber` with an env filter and a fmt or JSON layer
//! - **Metrics**: Prometheus registry with the gateway's counters, gauges and histograms
//!
//! ## Usage
//!
//! ```rust,ignore
//! use radio_telemetry::{TelemetryConfig, init_telemetry};
//!
//! fn main() {
//!     let config = TelemetryConfig::from_env();
//!     let _guard = init_telemetry(config).expect("Failed to init telemetry");
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `RG_SERVICE_NAME` | `radio-gateway` | Service name in log lines |
//! | `RG_LOG_LEVEL` | `info` | Log level filter |
//! | `RG_JSON_LOGS` | `false` | Emit JSON log lines |

mod config;
mod logging;
mod metrics;

pub use config::TelemetryConfig;
pub use logging::{init_logging, init_test_logging, StructuredLogger};
pub use metrics::{
    register_metrics, render_metrics, MetricsHandle, COMMANDS_SUBMITTED, COMMAND_LATENCY,
    COMMAND_OUTCOMES, CONNECTION_GENERATION, DOMAIN_RESETS, DROPPED_FRAMES,
    GUARD_FORCED_RELEASES, GUARD_HOLDS, INDICATIONS_DELIVERED, PENDING_COMMANDS, REGISTRY,
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

/// Initialize logging and metrics.
///
/// Returns a guard that must be held for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    if config.service_name.is_empty() {
        return Err(TelemetryError::Config("service name is empty".to_string()));
    }

    let metrics_handle = register_metrics()?;
    let logger = init_logging(&config)?;

    Ok(TelemetryGuard {
        _logger: logger,
        _metrics: metrics_handle,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    _logger: StructuredLogger,
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}
