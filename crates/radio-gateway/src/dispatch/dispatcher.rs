//! Single-consumer dispatch task.
//!
//! Drains the inbound queue (frames, raw bytes, death signals) and runs the
//! periodic timeout sweep. Every inbound frame is classified before it is
//! routed:
//!
//! | Frame                         | Route                                        |
//! |-------------------------------|----------------------------------------------|
//! | Response                      | pending table                                |
//! | Response with `ack_required`  | ack on the originating connection, then pending table |
//! | Ack                           | handshake hold of the oldest waiting command |
//! | Indication                    | domain subscribers (acked first if required) |

use crate::dispatch::death::DeathWatcher;
use crate::domain::error::{codes, GatewayError};
use crate::domain::guard::HolderId;
use crate::domain::pending::PendingRequestTable;
use crate::domain::types::{CommandOutcome, Generation, ServiceDomain};
use crate::ipc::frames::{AckFrame, DeathSignal, DispatchEvent, InboundFrame};
use crate::ipc::indications::IndicationSubscribers;
use crate::registry::{ConnectionRegistry, ServiceConnection};
use radio_telemetry::DROPPED_FRAMES;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

/// How an inbound frame is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameClass {
    Response,
    ResponseWithAck,
    Acknowledgement,
    Indication,
    IndicationWithAck,
}

impl FrameClass {
    pub fn requires_ack(&self) -> bool {
        matches!(self, FrameClass::ResponseWithAck | FrameClass::IndicationWithAck)
    }
}

/// Routes inbound events. Owned by the dispatch task.
pub struct Dispatcher {
    pending: Arc<PendingRequestTable>,
    registry: Arc<ConnectionRegistry>,
    indications: Arc<IndicationSubscribers>,
    watcher: Arc<DeathWatcher>,
    sweep_interval: Duration,
    max_decode_errors: u32,
    /// Consecutive decode failures per connection
    decode_failures: HashMap<(ServiceDomain, Generation), u32>,
}

impl Dispatcher {
    pub fn new(
        pending: Arc<PendingRequestTable>,
        registry: Arc<ConnectionRegistry>,
        indications: Arc<IndicationSubscribers>,
        watcher: Arc<DeathWatcher>,
        sweep_interval: Duration,
        max_decode_errors: u32,
    ) -> Self {
        Self {
            pending,
            registry,
            indications,
            watcher,
            sweep_interval,
            max_decode_errors: max_decode_errors.max(1),
            decode_failures: HashMap::new(),
        }
    }

    /// Classify a frame without acting on it.
    pub fn classify(frame: &InboundFrame) -> FrameClass {
        match frame {
            InboundFrame::Response(response) if response.ack_required => {
                FrameClass::ResponseWithAck
            }
            InboundFrame::Response(_) => FrameClass::Response,
            InboundFrame::Ack(_) => FrameClass::Acknowledgement,
            InboundFrame::Indication(indication) if indication.ack_required => {
                FrameClass::IndicationWithAck
            }
            InboundFrame::Indication(_) => FrameClass::Indication,
        }
    }

    /// Run until `Stop` is received or every sender is gone.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<DispatchEvent>) {
        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            sweep_interval_ms = self.sweep_interval.as_millis() as u64,
            "Dispatcher started"
        );

        loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else {
                        debug!("Inbound queue closed");
                        break;
                    };
                    if !self.handle(event).await {
                        break;
                    }
                }
                _ = sweep.tick() => {
                    self.tick(Instant::now());
                }
            }
        }

        info!("Dispatcher stopped");
    }

    /// Process one event. Returns false when the task should stop.
    pub async fn handle(&mut self, event: DispatchEvent) -> bool {
        match event {
            DispatchEvent::Frame {
                domain,
                generation,
                frame,
            } => {
                self.on_frame(domain, generation, frame).await;
            }
            DispatchEvent::Raw {
                domain,
                generation,
                bytes,
            } => {
                self.on_raw(domain, generation, &bytes).await;
            }
            DispatchEvent::Death(signal) => {
                self.on_death(signal).await;
            }
            DispatchEvent::Flush(done) => {
                let _ = done.send(());
            }
            DispatchEvent::Stop => return false,
        }
        true
    }

    /// Timeout sweep plus guard expiry.
    pub fn tick(&self, now: Instant) {
        let report = self.pending.sweep_timeouts(now);
        let primary = self.pending.primary_guard().expire(now);
        let handshake = self.pending.handshake_guard().expire(now);

        if report.synthesized > 0 || report.holds_released > 0 || primary || handshake {
            debug!(
                synthesized = report.synthesized,
                holds_released = report.holds_released,
                primary_expired = primary,
                handshake_expired = handshake,
                "Sweep"
            );
        }
    }

    async fn on_death(&mut self, signal: DeathSignal) {
        self.decode_failures
            .retain(|(domain, _), _| *domain != signal.domain);
        self.watcher.on_death(signal).await;
    }

    async fn on_raw(&mut self, domain: ServiceDomain, generation: Generation, bytes: &[u8]) {
        match InboundFrame::decode(bytes) {
            Ok(frame) => {
                self.decode_failures.remove(&(domain, generation));
                self.on_frame(domain, generation, frame).await;
            }
            Err(e) => {
                let failures = self.decode_failures.entry((domain, generation)).or_insert(0);
                *failures += 1;
                let failures = *failures;

                DROPPED_FRAMES
                    .with_label_values(&[domain.as_str(), "decode"])
                    .inc();
                warn!(
                    domain = %domain,
                    generation,
                    failures,
                    error = %e,
                    "Dropped undecodable frame"
                );

                if failures >= self.max_decode_errors {
                    warn!(
                        domain = %domain,
                        generation,
                        "Too many consecutive decode failures, treating connection as dead"
                    );
                    self.on_death(DeathSignal {
                        domain,
                        generation_cookie: generation,
                    })
                    .await;
                }
            }
        }
    }

    async fn on_frame(&self, domain: ServiceDomain, generation: Generation, frame: InboundFrame) {
        let connection = self.registry.current(domain);
        if !connection.is_connected() || connection.generation() != generation {
            DROPPED_FRAMES
                .with_label_values(&[domain.as_str(), "stale"])
                .inc();
            debug!(
                domain = %domain,
                generation,
                current = connection.generation(),
                error = %GatewayError::stale(domain, "superseded generation"),
                "Dropped frame"
            );
            return;
        }

        let class = Self::classify(&frame);
        trace!(domain = %domain, generation, class = ?class, "Inbound frame");

        match frame {
            InboundFrame::Response(response) => {
                if class.requires_ack() {
                    self.send_ack(&connection).await;
                }

                let outcome = if response.error_code == codes::NONE {
                    CommandOutcome::Success(response.payload)
                } else {
                    CommandOutcome::Rejected {
                        code: response.error_code,
                        payload: response.payload,
                    }
                };

                if !self
                    .pending
                    .complete_from(domain, generation, response.serial, outcome)
                {
                    debug!(
                        error = %GatewayError::stale(
                            domain,
                            format!("serial {} not pending", response.serial)
                        ),
                        "Dropped response"
                    );
                }
            }
            InboundFrame::Ack(_) => {
                self.pending.acknowledge(domain);
            }
            InboundFrame::Indication(indication) => {
                if indication.domain != domain {
                    DROPPED_FRAMES
                        .with_label_values(&[domain.as_str(), "misrouted"])
                        .inc();
                    warn!(
                        domain = %domain,
                        claimed = %indication.domain,
                        kind = %indication.kind,
                        "Indication arrived on another domain's connection, dropped"
                    );
                    return;
                }

                if class.requires_ack() {
                    self.send_ack(&connection).await;
                }
                self.indications.publish(indication);
            }
        }
    }

    /// Send an acknowledgement on `connection` under a handshake hold.
    async fn send_ack(&self, connection: &ServiceConnection) {
        let domain = connection.domain();
        let handle = match connection.handle() {
            Ok(handle) => handle,
            Err(e) => {
                warn!(domain = %domain, error = %e, "No handle to acknowledge on");
                return;
            }
        };

        let guard = self.pending.handshake_guard();
        let hold = guard.acquire(HolderId::Ack(domain));

        if let Err(e) = handle.send_ack(AckFrame {}).await {
            warn!(domain = %domain, error = %e, "Acknowledgement send failed");
        } else {
            trace!(domain = %domain, "Acknowledgement sent");
        }

        if let Err(e) = guard.release(hold) {
            warn!(domain = %domain, error = %e, "Handshake release failed");
        }
    }
}
