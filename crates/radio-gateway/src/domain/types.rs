//! Core value types shared by every gateway component.

use crate::domain::correlation::CorrelationId;
use crate::domain::error::GatewayError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Functional backend category with its own connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceDomain {
    Voice,
    Data,
    Messaging,
    Modem,
    Network,
    Sim,
}

impl ServiceDomain {
    /// Every domain, in reset order.
    pub const ALL: [ServiceDomain; 6] = [
        ServiceDomain::Voice,
        ServiceDomain::Data,
        ServiceDomain::Messaging,
        ServiceDomain::Modem,
        ServiceDomain::Network,
        ServiceDomain::Sim,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceDomain::Voice => "voice",
            ServiceDomain::Data => "data",
            ServiceDomain::Messaging => "messaging",
            ServiceDomain::Modem => "modem",
            ServiceDomain::Network => "network",
            ServiceDomain::Sim => "sim",
        }
    }
}

impl fmt::Display for ServiceDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceDomain {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServiceDomain::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| GatewayError::Decode(format!("unknown domain: {}", s)))
    }
}

/// Interface generation of a backend service (`major.minor`).
///
/// Ordering is numeric on `(major, minor)`, so `1.10 > 1.6`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VersionTag {
    pub major: u16,
    pub minor: u16,
}

impl VersionTag {
    pub const V1_0: VersionTag = VersionTag::new(1, 0);
    pub const V1_1: VersionTag = VersionTag::new(1, 1);
    pub const V1_2: VersionTag = VersionTag::new(1, 2);
    pub const V1_3: VersionTag = VersionTag::new(1, 3);
    pub const V1_4: VersionTag = VersionTag::new(1, 4);
    pub const V1_5: VersionTag = VersionTag::new(1, 5);
    pub const V1_6: VersionTag = VersionTag::new(1, 6);

    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for VersionTag {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || GatewayError::Decode(format!("invalid version tag: {}", s));
        let (major, minor) = s.trim().split_once('.').ok_or_else(invalid)?;
        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }
}

/// Numeric identifier of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandKind(pub u32);

impl CommandKind {
    pub const GET_SIM_STATUS: CommandKind = CommandKind(1);
    pub const GET_CURRENT_CALLS: CommandKind = CommandKind(9);
    pub const DIAL: CommandKind = CommandKind(10);
    pub const HANGUP: CommandKind = CommandKind(12);
    pub const SIGNAL_STRENGTH: CommandKind = CommandKind(19);
    pub const RADIO_POWER: CommandKind = CommandKind(23);
    pub const SEND_SMS: CommandKind = CommandKind(25);
    pub const SETUP_DATA_CALL: CommandKind = CommandKind(27);
    pub const DEACTIVATE_DATA_CALL: CommandKind = CommandKind(41);
    pub const BASEBAND_VERSION: CommandKind = CommandKind(51);
    pub const GET_ACTIVITY_INFO: CommandKind = CommandKind(135);

    /// Symbolic name for well-known kinds.
    pub fn name(&self) -> Option<&'static str> {
        Some(match *self {
            Self::GET_SIM_STATUS => "GET_SIM_STATUS",
            Self::GET_CURRENT_CALLS => "GET_CURRENT_CALLS",
            Self::DIAL => "DIAL",
            Self::HANGUP => "HANGUP",
            Self::SIGNAL_STRENGTH => "SIGNAL_STRENGTH",
            Self::RADIO_POWER => "RADIO_POWER",
            Self::SEND_SMS => "SEND_SMS",
            Self::SETUP_DATA_CALL => "SETUP_DATA_CALL",
            Self::DEACTIVATE_DATA_CALL => "DEACTIVATE_DATA_CALL",
            Self::BASEBAND_VERSION => "BASEBAND_VERSION",
            Self::GET_ACTIVITY_INFO => "GET_ACTIVITY_INFO",
            _ => return None,
        })
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "KIND_{}", self.0),
        }
    }
}

/// Per-command correlation identifier on the wire.
///
/// Unique only while the command is pending; reused after wraparound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Serial(pub u32);

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Numeric identifier of an unsolicited indication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndicationKind(pub u32);

impl fmt::Display for IndicationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IND_{}", self.0)
    }
}

/// Monotonic connection instance counter for one domain.
pub type Generation = u64;

/// Terminal result of a command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    /// Backend answered with no error.
    Success(Option<serde_json::Value>),
    /// Backend answered with a non-zero error code.
    Rejected {
        code: i32,
        payload: Option<serde_json::Value>,
    },
    /// Synthesized default delivered on timeout.
    TimedOut(serde_json::Value),
    /// The gateway gave up on the command.
    Aborted(GatewayError),
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CommandOutcome::Success(_))
    }

    /// Metric label for this outcome.
    pub fn label(&self) -> &'static str {
        match self {
            CommandOutcome::Success(_) => "success",
            CommandOutcome::Rejected { .. } => "error",
            CommandOutcome::TimedOut(_) => "synthetic_timeout",
            CommandOutcome::Aborted(GatewayError::ShuttingDown) => "shutdown",
            CommandOutcome::Aborted(GatewayError::DomainReset { .. }) => "domain_reset",
            CommandOutcome::Aborted(_) => "aborted",
        }
    }
}

/// Delivered exactly once per accepted command.
#[derive(Debug, Clone)]
pub struct Completion {
    pub serial: Serial,
    pub correlation_id: CorrelationId,
    pub kind: CommandKind,
    pub domain: ServiceDomain,
    pub outcome: CommandOutcome,
    /// Time from submission to the terminal event
    pub latency: Duration,
}

/// Completion callback stored with each pending command.
pub type ResultSink = Box<dyn FnOnce(Completion) + Send + 'static>;
