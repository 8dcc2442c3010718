//! Radio Gateway service - the client-facing entry point.
//!
//! Wires the pending table, connection registry, death watcher and
//! dispatcher together from an explicit [`GatewayContext`].

use crate::dispatch::{DeathStats, DeathWatcher, Dispatcher, Liveness};
use crate::domain::compat::CompatibilityTable;
use crate::domain::config::{ConfigError, GatewayConfig};
use crate::domain::correlation::CorrelationId;
use crate::domain::error::GatewayError;
use crate::domain::guard::{GuardKind, GuardSnapshot, ResourceGuard};
use crate::domain::pending::{PendingRequestTable, PendingStats, Submission, TimeoutPolicy};
use crate::domain::types::{CommandKind, Completion, Serial, ServiceDomain, VersionTag};
use crate::ipc::frames::{DeathSignal, DispatchEvent, IndicationFrame, InboundSender};
use crate::ipc::indications::IndicationSubscribers;
use crate::ports::outbound::{ExclusiveResource, NoopResource, ServiceProbe};
use crate::registry::{ConnectionRegistry, ServiceConnection, StrategyTable};
use parking_lot::Mutex;
use radio_telemetry::TelemetryError;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Everything the gateway needs from its host.
pub struct GatewayContext {
    pub config: GatewayConfig,
    pub probe: Arc<dyn ServiceProbe>,
    pub strategies: StrategyTable,
    /// Held while any command is outstanding
    pub primary_resource: Arc<dyn ExclusiveResource>,
    /// Held while an acknowledgement is outstanding
    pub handshake_resource: Arc<dyn ExclusiveResource>,
}

impl GatewayContext {
    pub fn new(
        config: GatewayConfig,
        probe: Arc<dyn ServiceProbe>,
        strategies: StrategyTable,
    ) -> Self {
        Self {
            config,
            probe,
            strategies,
            primary_resource: Arc::new(NoopResource),
            handshake_resource: Arc::new(NoopResource),
        }
    }

    pub fn with_resources(
        mut self,
        primary: Arc<dyn ExclusiveResource>,
        handshake: Arc<dyn ExclusiveResource>,
    ) -> Self {
        self.primary_resource = primary;
        self.handshake_resource = handshake;
        self
    }
}

/// A command as submitted by a caller.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub domain: ServiceDomain,
    pub kind: CommandKind,
    pub payload: serde_json::Value,
}

impl CommandRequest {
    pub fn new(domain: ServiceDomain, kind: CommandKind) -> Self {
        Self {
            domain,
            kind,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Handle to an accepted command's eventual outcome.
#[derive(Debug)]
pub struct CommandTicket {
    pub serial: Serial,
    pub correlation_id: CorrelationId,
    pub domain: ServiceDomain,
    pub kind: CommandKind,
    /// Version the command was encoded for, after any override
    pub version: VersionTag,
    rx: oneshot::Receiver<Completion>,
}

impl CommandTicket {
    /// Wait for the terminal outcome.
    pub async fn wait(self) -> Result<Completion, GatewayError> {
        self.rx.await.map_err(|_| GatewayError::ShuttingDown)
    }
}

struct DispatchParts {
    dispatcher: Dispatcher,
    rx: mpsc::UnboundedReceiver<DispatchEvent>,
}

/// Radio Gateway service
pub struct RadioGateway {
    config: GatewayConfig,
    pending: Arc<PendingRequestTable>,
    registry: Arc<ConnectionRegistry>,
    compat: CompatibilityTable,
    indications: Arc<IndicationSubscribers>,
    watcher: Arc<DeathWatcher>,
    inbound: InboundSender,
    parts: Mutex<Option<DispatchParts>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RadioGateway {
    /// Build a gateway. Nothing runs until [`start`](Self::start).
    pub fn new(context: GatewayContext) -> Result<Self, ConfigError> {
        let GatewayContext {
            config,
            probe,
            strategies,
            primary_resource,
            handshake_resource,
        } = context;

        config.validate()?;

        let primary = Arc::new(ResourceGuard::new(
            GuardKind::Primary,
            config.timeouts.request_hold,
            primary_resource,
        ));
        let handshake = Arc::new(ResourceGuard::new(
            GuardKind::Handshake,
            config.timeouts.handshake_hold,
            handshake_resource,
        ));
        let pending = Arc::new(PendingRequestTable::new(
            primary,
            handshake,
            TimeoutPolicy::from_config(&config),
            &config.limits,
        ));

        let (inbound, rx) = InboundSender::channel();
        let registry = Arc::new(ConnectionRegistry::new(probe, strategies, inbound.clone()));
        let indications = Arc::new(IndicationSubscribers::new(
            config.indications.channel_capacity,
        ));
        let watcher = Arc::new(DeathWatcher::new(
            pending.clone(),
            registry.clone(),
            config.recovery.scope,
        ));
        let dispatcher = Dispatcher::new(
            pending.clone(),
            registry.clone(),
            indications.clone(),
            watcher.clone(),
            config.timeouts.sweep_interval,
            config.limits.max_consecutive_decode_errors,
        );

        Ok(Self {
            config,
            pending,
            registry,
            compat: CompatibilityTable::new(),
            indications,
            watcher,
            inbound,
            parts: Mutex::new(Some(DispatchParts { dispatcher, rx })),
            task: Mutex::new(None),
        })
    }

    /// Spawn the dispatch task. Returns false if it was already started.
    pub fn start(&self) -> bool {
        let Some(DispatchParts { dispatcher, rx }) = self.parts.lock().take() else {
            warn!("Radio Gateway already started");
            return false;
        };

        info!(
            scope = ?self.config.recovery.scope,
            max_pending = self.config.limits.max_pending,
            "Starting Radio Gateway"
        );
        *self.task.lock() = Some(tokio::spawn(dispatcher.run(rx)));
        true
    }

    /// Submit a command.
    ///
    /// Synchronous failures (`DomainUnavailable`, `RequestNotSupported`,
    /// `TooManyPending`, `ShuttingDown`, `Transport`) mean no outcome will
    /// ever be delivered. Otherwise the ticket resolves exactly once.
    ///
    /// A submission that loses a race with a backend reset is admitted on
    /// the connection that replaced the dead one.
    pub async fn submit(&self, request: CommandRequest) -> Result<CommandTicket, GatewayError> {
        let CommandRequest {
            domain,
            kind,
            payload,
        } = request;

        let mut connection = self.registry.get(domain).await?;
        let (admission, rx, version, generation, handle, strategy) = loop {
            connection.ensure_supports(kind)?;

            let negotiated = connection
                .version()
                .ok_or(GatewayError::DomainUnavailable { domain })?;
            let version = self.compat.clamp(kind, negotiated);
            let handle = connection.handle()?.clone();
            let strategy = connection.strategy()?.clone();
            let generation = connection.generation();

            let (tx, rx) = oneshot::channel();
            let submitted = self.pending.submit(Submission {
                domain,
                generation,
                kind,
                expects_ack: self.config.acknowledged_kinds.contains(&kind),
                sink: Box::new(move |completion| {
                    let _ = tx.send(completion);
                }),
            });

            match submitted {
                Ok(admission) => break (admission, rx, version, generation, handle, strategy),
                Err(GatewayError::DomainReset { .. }) => {
                    // The fence only rises after a death; each pass waits for a fresh probe
                    let fence = self.pending.fence(domain);
                    debug!(
                        domain = %domain,
                        generation,
                        fence,
                        "Connection reset during submit, moving to the new generation"
                    );
                    connection = self.registry.reset_to(domain, fence).await?;
                }
                Err(e) => return Err(e),
            }
        };

        let frame = strategy.encode(admission.serial, kind, version, payload);
        if let Err(e) = handle.send_command(frame).await {
            if self.pending.withdraw(admission.serial) {
                warn!(
                    serial = %admission.serial,
                    domain = %domain,
                    generation,
                    error = %e,
                    "Command send failed, resetting connection"
                );
                if self
                    .inbound
                    .death(DeathSignal {
                        domain,
                        generation_cookie: generation,
                    })
                    .is_err()
                {
                    debug!(domain = %domain, "Dispatcher gone, no reset raised");
                }
                return Err(GatewayError::Transport {
                    domain,
                    message: e.to_string(),
                });
            }
            // Already retired by a reset or shutdown; the ticket carries that outcome
            debug!(serial = %admission.serial, error = %e, "Send failed after command retired");
        }

        debug!(
            serial = %admission.serial,
            correlation_id = %admission.correlation_id,
            domain = %domain,
            kind = %kind,
            version = %version,
            "Command sent"
        );

        Ok(CommandTicket {
            serial: admission.serial,
            correlation_id: admission.correlation_id,
            domain,
            kind,
            version,
            rx,
        })
    }

    /// Wait until every event queued before this call has been handled.
    pub async fn flush(&self) -> Result<(), GatewayError> {
        let (tx, rx) = oneshot::channel();
        self.inbound.send(DispatchEvent::Flush(tx))?;
        rx.await.map_err(|_| GatewayError::ShuttingDown)
    }

    /// Stop the dispatch task and fail everything still pending.
    ///
    /// Returns the number of commands failed with `ShuttingDown`.
    pub async fn shutdown(&self) -> usize {
        info!("Shutting down Radio Gateway");

        if self.inbound.send(DispatchEvent::Stop).is_err() {
            debug!("Dispatcher already stopped");
        }
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "Dispatch task ended abnormally");
            }
        }
        self.parts.lock().take();

        let failed = self.pending.close();
        info!(failed, "Radio Gateway stopped");
        failed
    }

    /// Cap the version used for `kind`. Only downgrades are accepted.
    pub fn set_compat_override(&self, kind: CommandKind, version: VersionTag) -> bool {
        self.compat.set_override(kind, version)
    }

    pub fn compat_override(&self, kind: CommandKind) -> Option<VersionTag> {
        self.compat.get_override(kind)
    }

    pub fn subscribe_indications(
        &self,
        domain: ServiceDomain,
    ) -> broadcast::Receiver<IndicationFrame> {
        self.indications.subscribe(domain)
    }

    /// Queue for transports delivering inbound frames.
    pub fn inbound_sender(&self) -> InboundSender {
        self.inbound.clone()
    }

    /// Connected snapshot of `domain`, probing if needed.
    pub async fn connect(
        &self,
        domain: ServiceDomain,
    ) -> Result<Arc<ServiceConnection>, GatewayError> {
        self.registry.get(domain).await
    }

    /// Current snapshot of `domain` without probing.
    pub fn connection(&self, domain: ServiceDomain) -> Arc<ServiceConnection> {
        self.registry.current(domain)
    }

    pub fn liveness(&self, domain: ServiceDomain) -> Liveness {
        self.watcher.liveness(domain)
    }

    /// Disable `domain` and fail its pending commands with `DomainUnavailable`.
    pub async fn disable_domain(&self, domain: ServiceDomain) -> usize {
        let disabled = self.registry.disable(domain).await;
        self.pending.fail_all(
            domain,
            GatewayError::DomainUnavailable { domain },
            disabled.generation(),
        )
    }

    /// Probe a disabled domain again.
    pub async fn rediscover_domain(
        &self,
        domain: ServiceDomain,
    ) -> Result<Arc<ServiceConnection>, GatewayError> {
        self.registry.rediscover(domain).await
    }

    pub fn pending_count(&self) -> usize {
        self.pending.pending_count()
    }

    pub fn is_pending(&self, serial: Serial) -> bool {
        self.pending.is_pending(serial)
    }

    pub fn primary_guard(&self) -> GuardSnapshot {
        self.pending.primary_guard().snapshot()
    }

    pub fn handshake_guard(&self) -> GuardSnapshot {
        self.pending.handshake_guard().snapshot()
    }

    pub fn pending_stats(&self) -> &PendingStats {
        self.pending.stats()
    }

    pub fn death_stats(&self) -> &DeathStats {
        self.watcher.stats()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Prometheus text exposition of the gateway metrics.
    pub fn render_metrics(&self) -> Result<String, TelemetryError> {
        radio_telemetry::render_metrics()
    }
}
