//! Gateway configuration with validation.

use crate::domain::types::CommandKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Main gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Guard and sweep timing
    pub timeouts: TimeoutConfig,
    /// Table and dispatcher limits
    pub limits: LimitsConfig,
    /// Behavior after a backend dies
    pub recovery: RecoveryConfig,
    /// Indication fan-out
    pub indications: IndicationConfig,
    /// Kinds completed with a synthesized default when they take too long
    pub synthetic_timeouts: Vec<SyntheticTimeoutConfig>,
    /// Kinds whose backend sends a handshake acknowledgement before the response
    pub acknowledged_kinds: Vec<CommandKind>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            timeouts: TimeoutConfig::default(),
            limits: LimitsConfig::default(),
            recovery: RecoveryConfig::default(),
            indications: IndicationConfig::default(),
            synthetic_timeouts: vec![SyntheticTimeoutConfig::activity_info()],
            acknowledged_kinds: Vec::new(),
        }
    }
}

impl GatewayConfig {
    /// Parse TOML and validate.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: GatewayConfig =
            toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeouts.request_hold.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "request_hold cannot be 0".into(),
            ));
        }
        if self.timeouts.handshake_hold.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "handshake_hold cannot be 0".into(),
            ));
        }
        if self.timeouts.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "sweep_interval cannot be 0".into(),
            ));
        }

        if self.limits.max_pending == 0 {
            return Err(ConfigError::InvalidLimit("max_pending cannot be 0".into()));
        }
        if self.limits.max_consecutive_decode_errors == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_consecutive_decode_errors cannot be 0".into(),
            ));
        }
        if self.limits.retired_history == 0 {
            return Err(ConfigError::InvalidLimit(
                "retired_history cannot be 0".into(),
            ));
        }
        if self.indications.channel_capacity == 0 {
            return Err(ConfigError::InvalidLimit(
                "indications.channel_capacity cannot be 0".into(),
            ));
        }

        let mut seen = HashSet::new();
        for synthetic in &self.synthetic_timeouts {
            if !seen.insert(synthetic.kind) {
                return Err(ConfigError::DuplicateSyntheticKind(synthetic.kind));
            }
            if synthetic.after.is_zero() {
                return Err(ConfigError::InvalidTimeout(format!(
                    "synthetic timeout for {} cannot be 0",
                    synthetic.kind
                )));
            }
        }

        Ok(())
    }
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// How long a command may hold the primary guard
    #[serde(with = "humantime_serde")]
    pub request_hold: Duration,
    /// How long an acknowledgement may hold the handshake guard
    #[serde(with = "humantime_serde")]
    pub handshake_hold: Duration,
    /// Dispatcher timer tick
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_hold: Duration::from_secs(60),
            handshake_hold: Duration::from_millis(200),
            sweep_interval: Duration::from_secs(1),
        }
    }
}

/// Table and dispatcher limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum simultaneously pending commands
    pub max_pending: usize,
    /// Undecodable frames in a row before the connection is treated as dead
    pub max_consecutive_decode_errors: u32,
    /// Retired serials remembered for anomaly logs
    pub retired_history: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_pending: 4096,
            max_consecutive_decode_errors: 3,
            retired_history: 128,
        }
    }
}

/// Which domains are reset when one backend dies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetScope {
    /// Only the domain that died
    #[default]
    Domain,
    /// Every connected domain
    AllDomains,
}

/// Recovery configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub scope: ResetScope,
}

/// Indication fan-out configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicationConfig {
    /// Per-domain broadcast buffer
    pub channel_capacity: usize,
}

impl Default for IndicationConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

/// One synthesize-on-timeout entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticTimeoutConfig {
    pub kind: CommandKind,
    #[serde(with = "humantime_serde")]
    pub after: Duration,
    /// Default outcome payload delivered to the caller
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl SyntheticTimeoutConfig {
    /// Zeroed modem activity report delivered when the modem does not answer.
    pub fn activity_info() -> Self {
        Self {
            kind: CommandKind::GET_ACTIVITY_INFO,
            after: Duration::from_secs(2),
            payload: serde_json::json!({
                "sleep_mode_time_ms": 0,
                "idle_mode_time_ms": 0,
                "tx_mode_time_ms": [0, 0, 0, 0, 0],
                "rx_mode_time_ms": 0,
            }),
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    #[error("duplicate synthetic timeout for {0}")]
    DuplicateSyntheticKind(CommandKind),
    #[error("parse error: {0}")]
    Parse(String),
}

/// Humantime-like duration serialization ("60s", "200ms", "2m")
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        // "ms" before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(|_| "invalid minutes")
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
