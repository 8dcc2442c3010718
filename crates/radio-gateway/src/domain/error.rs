//! Gateway error types and backend error codes.

use crate::domain::types::{CommandKind, ServiceDomain, VersionTag};
use thiserror::Error;

/// Backend error codes carried in response frames.
pub mod codes {
    pub const NONE: i32 = 0;
    pub const RADIO_NOT_AVAILABLE: i32 = 1;
    pub const GENERIC_FAILURE: i32 = 2;
    pub const REQUEST_NOT_SUPPORTED: i32 = 6;
    pub const CANCELLED: i32 = 7;
    pub const NO_MEMORY: i32 = 37;
    pub const INTERNAL_ERR: i32 = 38;
    pub const SYSTEM_ERR: i32 = 39;
    pub const NO_RESOURCES: i32 = 42;
    pub const INVALID_ARGUMENTS: i32 = 44;
}

/// Gateway-level failures.
///
/// Synchronous variants are returned from `submit`; the rest reach callers
/// through `CommandOutcome::Aborted`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// No interface version could be negotiated
    #[error("domain {domain} unavailable")]
    DomainUnavailable { domain: ServiceDomain },

    /// The negotiated interface does not implement the command
    #[error("{kind} not supported by {domain} v{version}")]
    RequestNotSupported {
        domain: ServiceDomain,
        kind: CommandKind,
        version: VersionTag,
    },

    /// Backend died while the command was pending
    #[error("domain {domain} was reset")]
    DomainReset { domain: ServiceDomain },

    /// Unknown serial or superseded generation
    #[error("stale frame from {domain}: {reason}")]
    StaleFrame {
        domain: ServiceDomain,
        reason: String,
    },

    /// Malformed inbound frame
    #[error("decode error: {0}")]
    Decode(String),

    /// Transport send failed
    #[error("transport failure on {domain}: {message}")]
    Transport {
        domain: ServiceDomain,
        message: String,
    },

    /// Pending table is full
    #[error("too many pending commands (limit {limit})")]
    TooManyPending { limit: usize },

    /// Serial space exhausted
    #[error("no free serial")]
    SerialExhausted,

    /// Gateway is shutting down
    #[error("gateway shutting down")]
    ShuttingDown,
}

impl GatewayError {
    /// Backend-style error code for this failure.
    pub fn code(&self) -> i32 {
        match self {
            GatewayError::DomainUnavailable { .. }
            | GatewayError::DomainReset { .. }
            | GatewayError::ShuttingDown => codes::RADIO_NOT_AVAILABLE,
            GatewayError::RequestNotSupported { .. } => codes::REQUEST_NOT_SUPPORTED,
            GatewayError::StaleFrame { .. } | GatewayError::Decode(_) => codes::INTERNAL_ERR,
            GatewayError::Transport { .. } => codes::SYSTEM_ERR,
            GatewayError::TooManyPending { .. } | GatewayError::SerialExhausted => {
                codes::NO_RESOURCES
            }
        }
    }

    pub fn stale(domain: ServiceDomain, reason: impl Into<String>) -> Self {
        GatewayError::StaleFrame {
            domain,
            reason: reason.into(),
        }
    }
}

/// Guard bookkeeping failures. Indicate a defect in the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    #[error("{guard} guard released more times than acquired")]
    Underflow { guard: &'static str },
}

/// Why a serial left the pending table. Kept for anomaly logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetireReason {
    Responded,
    SyntheticTimeout,
    DomainReset,
    Withdrawn,
    ShuttingDown,
}

impl std::fmt::Display for RetireReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RetireReason::Responded => "responded",
            RetireReason::SyntheticTimeout => "synthetic_timeout",
            RetireReason::DomainReset => "domain_reset",
            RetireReason::Withdrawn => "withdrawn",
            RetireReason::ShuttingDown => "shutting_down",
        })
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
