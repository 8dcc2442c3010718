//! Immutable snapshot of one domain's backend connection.
//!
//! A connection is never patched in place: every state change installs a
//! new `ServiceConnection`, and every (re)connect attempt carries a higher
//! generation than the one before it.

use crate::domain::error::GatewayError;
use crate::domain::types::{CommandKind, Generation, ServiceDomain, VersionTag};
use crate::ports::outbound::ServiceHandle;
use crate::registry::strategy::InterfaceStrategy;
use std::fmt;
use std::sync::Arc;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// No version could be negotiated; not probed again until rediscovered
    Disabled,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disabled => "disabled",
        }
    }
}

/// One generation of a domain's connection.
#[derive(Clone)]
pub struct ServiceConnection {
    domain: ServiceDomain,
    generation: Generation,
    state: ConnectionState,
    link: Option<Link>,
}

#[derive(Clone)]
struct Link {
    version: VersionTag,
    handle: Arc<dyn ServiceHandle>,
    strategy: Arc<dyn InterfaceStrategy>,
}

impl ServiceConnection {
    pub(crate) fn without_link(
        domain: ServiceDomain,
        generation: Generation,
        state: ConnectionState,
    ) -> Self {
        debug_assert_ne!(state, ConnectionState::Connected);
        Self {
            domain,
            generation,
            state,
            link: None,
        }
    }

    pub(crate) fn connected(
        domain: ServiceDomain,
        generation: Generation,
        handle: Arc<dyn ServiceHandle>,
        strategy: Arc<dyn InterfaceStrategy>,
    ) -> Self {
        Self {
            domain,
            generation,
            state: ConnectionState::Connected,
            link: Some(Link {
                version: strategy.version(),
                handle,
                strategy,
            }),
        }
    }

    pub fn domain(&self) -> ServiceDomain {
        self.domain
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Negotiated version, if connected.
    pub fn version(&self) -> Option<VersionTag> {
        self.link.as_ref().map(|link| link.version)
    }

    pub fn handle(&self) -> Result<&Arc<dyn ServiceHandle>, GatewayError> {
        self.link
            .as_ref()
            .map(|link| &link.handle)
            .ok_or(GatewayError::DomainUnavailable {
                domain: self.domain,
            })
    }

    pub fn strategy(&self) -> Result<&Arc<dyn InterfaceStrategy>, GatewayError> {
        self.link
            .as_ref()
            .map(|link| &link.strategy)
            .ok_or(GatewayError::DomainUnavailable {
                domain: self.domain,
            })
    }

    /// Fails with `RequestNotSupported` when the negotiated interface lacks `kind`.
    pub fn ensure_supports(&self, kind: CommandKind) -> Result<(), GatewayError> {
        let link = self.link.as_ref().ok_or(GatewayError::DomainUnavailable {
            domain: self.domain,
        })?;
        if link.strategy.supports(kind) {
            Ok(())
        } else {
            Err(GatewayError::RequestNotSupported {
                domain: self.domain,
                kind,
                version: link.version,
            })
        }
    }
}

impl fmt::Debug for ServiceConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConnection")
            .field("domain", &self.domain)
            .field("generation", &self.generation)
            .field("state", &self.state)
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}
