//! Outbound ports: backend discovery, transport handles and the exclusive
//! resource behind the guards.

use crate::domain::types::{Generation, ServiceDomain, VersionTag};
use crate::ipc::frames::{AckFrame, CommandFrame, DeathSignal, InboundSender};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Discovery failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("{domain} v{version} not found")]
    NotFound {
        domain: ServiceDomain,
        version: VersionTag,
    },
    #[error("probe of {domain} v{version} failed: {reason}")]
    Failed {
        domain: ServiceDomain,
        version: VersionTag,
        reason: String,
    },
}

/// Transport failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// Finds a backend implementation of a domain at one interface version.
#[async_trait]
pub trait ServiceProbe: Send + Sync {
    async fn probe(
        &self,
        domain: ServiceDomain,
        version: VersionTag,
    ) -> Result<Arc<dyn ServiceHandle>, ProbeError>;
}

/// Live transport to one backend.
///
/// Sends must not wait for replies; replies arrive through the
/// [`InboundSender`] given to the transport.
#[async_trait]
pub trait ServiceHandle: Send + Sync {
    async fn send_command(&self, frame: CommandFrame) -> Result<(), TransportError>;

    async fn send_ack(&self, ack: AckFrame) -> Result<(), TransportError>;

    /// Register for death notification of this backend instance.
    fn link_to_death(&self, link: DeathLink);
}

/// Death notification hook carrying the generation cookie it was created for.
#[derive(Debug, Clone)]
pub struct DeathLink {
    domain: ServiceDomain,
    cookie: Generation,
    inbound: InboundSender,
}

impl DeathLink {
    pub fn new(domain: ServiceDomain, cookie: Generation, inbound: InboundSender) -> Self {
        Self {
            domain,
            cookie,
            inbound,
        }
    }

    pub fn domain(&self) -> ServiceDomain {
        self.domain
    }

    pub fn cookie(&self) -> Generation {
        self.cookie
    }

    /// Report that the backend died.
    pub fn notify(&self) {
        let signal = DeathSignal {
            domain: self.domain,
            generation_cookie: self.cookie,
        };
        if self.inbound.death(signal).is_err() {
            debug!(domain = %self.domain, "Death signal after dispatcher stopped");
        }
    }
}

/// Scarce resource held while work is outstanding.
pub trait ExclusiveResource: Send + Sync {
    fn engage(&self);
    fn disengage(&self);
}

/// Resource that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopResource;

impl ExclusiveResource for NoopResource {
    fn engage(&self) {}
    fn disengage(&self) {}
}
