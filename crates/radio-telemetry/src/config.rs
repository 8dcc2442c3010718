//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for gateway logging and metrics.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to every log line
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error)
    pub log_level: String,

    /// Whether to enable console output (for development)
    pub console_output: bool,

    /// Whether to enable JSON formatted logs
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "radio-gateway".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `RG_SERVICE_NAME`: Service name (default: radio-gateway)
    /// - `RG_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `RG_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `RG_JSON_LOGS`: Enable JSON logs (default: false)
    pub fn from_env() -> Self {
        Self {
            service_name: env::var("RG_SERVICE_NAME")
                .unwrap_or_else(|_| "radio-gateway".to_string()),

            log_level: env::var("RG_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            console_output: env::var("RG_CONSOLE_OUTPUT")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),

            json_logs: env::var("RG_JSON_LOGS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }
}
