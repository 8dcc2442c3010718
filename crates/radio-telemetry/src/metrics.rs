//! Prometheus metrics for the Radio Gateway.
//!
//! All metrics follow the naming convention: `rg_<area>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., commands_submitted_total)
//! - **Gauge**: Value that can go up or down (e.g., pending_commands)
//! - **Histogram**: Distribution of values (e.g., command_latency_seconds)

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // REQUEST LIFECYCLE
    // =========================================================================

    /// Commands accepted into the pending table
    pub static ref COMMANDS_SUBMITTED: CounterVec = CounterVec::new(
        Opts::new("rg_commands_submitted_total", "Commands accepted by the gateway"),
        &["domain"]
    ).expect("metric creation failed");

    /// Terminal outcomes delivered to callers
    pub static ref COMMAND_OUTCOMES: CounterVec = CounterVec::new(
        Opts::new("rg_command_outcomes_total", "Terminal command outcomes"),
        &["domain", "outcome"]  // outcome: success/error/synthetic_timeout/domain_reset/shutdown
    ).expect("metric creation failed");

    /// Commands currently awaiting a terminal outcome
    pub static ref PENDING_COMMANDS: Gauge = Gauge::new(
        "rg_pending_commands",
        "Commands awaiting a terminal outcome"
    ).expect("metric creation failed");

    /// Round-trip latency by command kind
    pub static ref COMMAND_LATENCY: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "rg_command_latency_seconds",
            "Time between submission and terminal outcome"
        ).buckets(exponential_buckets(0.001, 2.0, 16).expect("valid bucket layout")),
        &["kind"]
    ).expect("metric creation failed");

    /// Inbound frames dropped as stale, unknown or undecodable
    pub static ref DROPPED_FRAMES: CounterVec = CounterVec::new(
        Opts::new("rg_dropped_frames_total", "Inbound frames logged and dropped"),
        &["domain", "reason"]  // reason: stale/unknown_serial/decode/unexpected_ack
    ).expect("metric creation failed");

    // =========================================================================
    // RESOURCE GUARDS
    // =========================================================================

    /// Outstanding holds per guard
    pub static ref GUARD_HOLDS: GaugeVec = GaugeVec::new(
        Opts::new("rg_guard_holds", "Outstanding holds per resource guard"),
        &["guard"]
    ).expect("metric creation failed");

    /// Guard releases forced by the timeout timer
    pub static ref GUARD_FORCED_RELEASES: CounterVec = CounterVec::new(
        Opts::new("rg_guard_forced_releases_total", "Guard releases forced by timeout"),
        &["guard"]
    ).expect("metric creation failed");

    // =========================================================================
    // CONNECTIONS
    // =========================================================================

    /// Current connection generation per domain
    pub static ref CONNECTION_GENERATION: GaugeVec = GaugeVec::new(
        Opts::new("rg_connection_generation", "Current connection generation per domain"),
        &["domain"]
    ).expect("metric creation failed");

    /// Domain resets after backend death
    pub static ref DOMAIN_RESETS: CounterVec = CounterVec::new(
        Opts::new("rg_domain_resets_total", "Domain resets after backend death"),
        &["domain"]
    ).expect("metric creation failed");

    /// Indications delivered to subscribers
    pub static ref INDICATIONS_DELIVERED: CounterVec = CounterVec::new(
        Opts::new("rg_indications_delivered_total", "Indications fanned out to subscribers"),
        &["domain"]
    ).expect("metric creation failed");
}

/// Handle for the metrics registry
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register all metrics with the global registry.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Request lifecycle
        Box::new(COMMANDS_SUBMITTED.clone()),
        Box::new(COMMAND_OUTCOMES.clone()),
        Box::new(PENDING_COMMANDS.clone()),
        Box::new(COMMAND_LATENCY.clone()),
        Box::new(DROPPED_FRAMES.clone()),
        // Guards
        Box::new(GUARD_HOLDS.clone()),
        Box::new(GUARD_FORCED_RELEASES.clone()),
        // Connections
        Box::new(CONNECTION_GENERATION.clone()),
        Box::new(DOMAIN_RESETS.clone()),
        Box::new(INDICATIONS_DELIVERED.clone()),
    ];

    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics as Prometheus text format.
pub fn render_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
