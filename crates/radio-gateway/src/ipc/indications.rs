//! Domain-scoped indication fan-out.

use crate::domain::types::ServiceDomain;
use crate::ipc::frames::IndicationFrame;
use dashmap::DashMap;
use radio_telemetry::INDICATIONS_DELIVERED;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Broadcast channel per domain. Channels are created on first subscribe.
pub struct IndicationSubscribers {
    channels: DashMap<ServiceDomain, broadcast::Sender<IndicationFrame>>,
    capacity: usize,
    /// Indications published with nobody listening
    unheard: AtomicU64,
}

impl IndicationSubscribers {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
            unheard: AtomicU64::new(0),
        }
    }

    /// Subscribe to indications of `domain`.
    pub fn subscribe(&self, domain: ServiceDomain) -> broadcast::Receiver<IndicationFrame> {
        let receiver = self
            .channels
            .entry(domain)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();

        debug!(
            domain = %domain,
            subscribers = self.subscriber_count(domain),
            "Indication subscriber added"
        );
        receiver
    }

    /// Deliver to every current subscriber of the frame's domain.
    ///
    /// Returns the number of receivers reached.
    pub fn publish(&self, frame: IndicationFrame) -> usize {
        let domain = frame.domain;
        let kind = frame.kind;

        let reached = match self.channels.get(&domain) {
            Some(sender) => sender.send(frame).unwrap_or(0),
            None => 0,
        };

        if reached == 0 {
            self.unheard.fetch_add(1, Ordering::Relaxed);
            trace!(domain = %domain, kind = %kind, "Indication with no subscribers");
        } else {
            INDICATIONS_DELIVERED
                .with_label_values(&[domain.as_str()])
                .inc();
            trace!(domain = %domain, kind = %kind, reached, "Indication delivered");
        }

        reached
    }

    pub fn subscriber_count(&self, domain: ServiceDomain) -> usize {
        self.channels
            .get(&domain)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    pub fn unheard(&self) -> u64 {
        self.unheard.load(Ordering::Relaxed)
    }
}
