//! Connection registry: discovery, version negotiation and resets.
//!
//! Each domain has one slot holding the current [`ServiceConnection`]
//! snapshot behind a short read/write lock, plus an async mutex that
//! serializes probing so two resets of one domain never interleave.

use crate::domain::error::GatewayError;
use crate::domain::types::{Generation, ServiceDomain};
use crate::ipc::frames::InboundSender;
use crate::ports::outbound::{DeathLink, ServiceProbe};
use crate::registry::connection::{ConnectionState, ServiceConnection};
use crate::registry::strategy::StrategyTable;
use parking_lot::RwLock;
use radio_telemetry::CONNECTION_GENERATION;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

struct DomainSlot {
    current: RwLock<Arc<ServiceConnection>>,
    probe_lock: AsyncMutex<()>,
}

/// One connection per domain.
pub struct ConnectionRegistry {
    slots: HashMap<ServiceDomain, DomainSlot>,
    probe: Arc<dyn ServiceProbe>,
    strategies: StrategyTable,
    inbound: InboundSender,
}

impl ConnectionRegistry {
    pub fn new(
        probe: Arc<dyn ServiceProbe>,
        strategies: StrategyTable,
        inbound: InboundSender,
    ) -> Self {
        let slots = ServiceDomain::ALL
            .into_iter()
            .map(|domain| {
                let initial =
                    ServiceConnection::without_link(domain, 0, ConnectionState::Disconnected);
                (
                    domain,
                    DomainSlot {
                        current: RwLock::new(Arc::new(initial)),
                        probe_lock: AsyncMutex::new(()),
                    },
                )
            })
            .collect();

        Self {
            slots,
            probe,
            strategies,
            inbound,
        }
    }

    fn slot(&self, domain: ServiceDomain) -> &DomainSlot {
        // Every domain gets a slot in `new`
        &self.slots[&domain]
    }

    /// Current snapshot for `domain`, whatever its state.
    pub fn current(&self, domain: ServiceDomain) -> Arc<ServiceConnection> {
        self.slot(domain).current.read().clone()
    }

    pub fn generation(&self, domain: ServiceDomain) -> Generation {
        self.slot(domain).current.read().generation()
    }

    /// Connected snapshot for `domain`, probing if needed.
    ///
    /// A `Disabled` domain fails immediately without probing.
    pub async fn get(&self, domain: ServiceDomain) -> Result<Arc<ServiceConnection>, GatewayError> {
        if let Some(result) = Self::settled(&self.current(domain)) {
            return result;
        }

        let slot = self.slot(domain);
        let _probing = slot.probe_lock.lock().await;

        // Another caller may have finished probing while we waited
        let current = self.current(domain);
        if let Some(result) = Self::settled(&current) {
            return result;
        }

        self.connect_locked(domain, current.generation() + 1).await
    }

    fn settled(
        connection: &Arc<ServiceConnection>,
    ) -> Option<Result<Arc<ServiceConnection>, GatewayError>> {
        match connection.state() {
            ConnectionState::Connected => Some(Ok(connection.clone())),
            ConnectionState::Disabled => Some(Err(GatewayError::DomainUnavailable {
                domain: connection.domain(),
            })),
            ConnectionState::Disconnected | ConnectionState::Connecting => None,
        }
    }

    /// Drop the current connection and negotiate a new generation.
    ///
    /// A disabled domain stays disabled; use [`rediscover`](Self::rediscover).
    pub async fn reset(
        &self,
        domain: ServiceDomain,
    ) -> Result<Arc<ServiceConnection>, GatewayError> {
        let target = self.generation(domain) + 1;
        self.reset_to(domain, target).await
    }

    /// Make sure `domain` runs at generation `target` or newer.
    ///
    /// Whoever reaches the probe lock first performs the reset; later callers
    /// with the same target get the connection it installed.
    pub async fn reset_to(
        &self,
        domain: ServiceDomain,
        target: Generation,
    ) -> Result<Arc<ServiceConnection>, GatewayError> {
        let slot = self.slot(domain);
        let _probing = slot.probe_lock.lock().await;

        let current = self.current(domain);
        if current.generation() >= target {
            if let Some(result) = Self::settled(&current) {
                return result;
            }
            return self.connect_locked(domain, current.generation() + 1).await;
        }
        if current.state() == ConnectionState::Disabled {
            return Err(GatewayError::DomainUnavailable { domain });
        }

        let generation = target;
        self.install(ServiceConnection::without_link(
            domain,
            generation,
            ConnectionState::Disconnected,
        ));
        debug!(domain = %domain, generation, "Connection discarded for reset");

        self.connect_locked(domain, generation).await
    }

    /// Replace the connection with a disabled generation.
    pub async fn disable(&self, domain: ServiceDomain) -> Arc<ServiceConnection> {
        let slot = self.slot(domain);
        let _probing = slot.probe_lock.lock().await;

        let generation = self.current(domain).generation() + 1;
        let disabled = self.install(ServiceConnection::without_link(
            domain,
            generation,
            ConnectionState::Disabled,
        ));
        info!(domain = %domain, generation, "Domain disabled");
        disabled
    }

    /// Clear a disabled domain and probe it again.
    pub async fn rediscover(
        &self,
        domain: ServiceDomain,
    ) -> Result<Arc<ServiceConnection>, GatewayError> {
        let slot = self.slot(domain);
        let _probing = slot.probe_lock.lock().await;

        let current = self.current(domain);
        if current.is_connected() {
            return Ok(current);
        }

        info!(domain = %domain, "Rediscovering domain");
        self.connect_locked(domain, current.generation() + 1).await
    }

    /// Probe known versions newest first. Caller holds the slot's probe lock.
    async fn connect_locked(
        &self,
        domain: ServiceDomain,
        generation: Generation,
    ) -> Result<Arc<ServiceConnection>, GatewayError> {
        self.install(ServiceConnection::without_link(
            domain,
            generation,
            ConnectionState::Connecting,
        ));

        for version in self.strategies.versions_descending(domain) {
            let Some(strategy) = self.strategies.resolve(domain, version) else {
                continue;
            };

            match self.probe.probe(domain, version).await {
                Ok(handle) => {
                    handle.link_to_death(DeathLink::new(
                        domain,
                        generation,
                        self.inbound.clone(),
                    ));
                    let connection = self.install(ServiceConnection::connected(
                        domain, generation, handle, strategy,
                    ));
                    info!(
                        domain = %domain,
                        generation,
                        version = %version,
                        "Connected to backend"
                    );
                    return Ok(connection);
                }
                Err(e) => {
                    debug!(
                        domain = %domain,
                        version = %version,
                        error = %e,
                        "Probe failed, trying older version"
                    );
                }
            }
        }

        self.install(ServiceConnection::without_link(
            domain,
            generation,
            ConnectionState::Disabled,
        ));
        warn!(
            domain = %domain,
            generation,
            "No interface version available, domain disabled"
        );
        Err(GatewayError::DomainUnavailable { domain })
    }

    fn install(&self, connection: ServiceConnection) -> Arc<ServiceConnection> {
        let connection = Arc::new(connection);
        CONNECTION_GENERATION
            .with_label_values(&[connection.domain().as_str()])
            .set(connection.generation() as f64);
        *self.slot(connection.domain()).current.write() = connection.clone();
        connection
    }
}
