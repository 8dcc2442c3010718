//! In-memory backend for tests and local runs.
//!
//! Outbound commands are forwarded to an mpsc receiver; replies are pushed
//! back through the gateway's [`InboundSender`](crate::ipc::InboundSender).

use crate::domain::types::{ServiceDomain, VersionTag};
use crate::ipc::frames::{AckFrame, CommandFrame};
use crate::ports::outbound::{DeathLink, ProbeError, ServiceHandle, ServiceProbe, TransportError};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

struct LoopbackState {
    offered: RwLock<HashMap<ServiceDomain, BTreeSet<VersionTag>>>,
    probes: Mutex<Vec<(ServiceDomain, VersionTag)>>,
    commands: mpsc::UnboundedSender<CommandFrame>,
    links: Mutex<HashMap<ServiceDomain, DeathLink>>,
    failing: Mutex<HashSet<ServiceDomain>>,
    acks: Mutex<HashMap<ServiceDomain, u64>>,
}

/// Probe over in-memory backends.
#[derive(Clone)]
pub struct LoopbackProbe {
    state: Arc<LoopbackState>,
}

impl LoopbackProbe {
    /// Create a probe and the receiver of every command sent through it.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CommandFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let probe = Self {
            state: Arc::new(LoopbackState {
                offered: RwLock::new(HashMap::new()),
                probes: Mutex::new(Vec::new()),
                commands: tx,
                links: Mutex::new(HashMap::new()),
                failing: Mutex::new(HashSet::new()),
                acks: Mutex::new(HashMap::new()),
            }),
        };
        (probe, rx)
    }

    /// Make `domain` discoverable at `versions`.
    pub fn offer(&self, domain: ServiceDomain, versions: &[VersionTag]) {
        self.state
            .offered
            .write()
            .entry(domain)
            .or_default()
            .extend(versions.iter().copied());
    }

    /// Make every domain discoverable at `versions`.
    pub fn offer_everywhere(&self, versions: &[VersionTag]) {
        for domain in ServiceDomain::ALL {
            self.offer(domain, versions);
        }
    }

    /// Stop offering `domain` at any version.
    pub fn withdraw(&self, domain: ServiceDomain) {
        self.state.offered.write().remove(&domain);
    }

    /// Every probe attempt so far, in order.
    pub fn probe_log(&self) -> Vec<(ServiceDomain, VersionTag)> {
        self.state.probes.lock().clone()
    }

    /// Simulate a crash of the most recently linked backend of `domain`.
    pub fn kill(&self, domain: ServiceDomain) -> bool {
        let link = self.state.links.lock().remove(&domain);
        match link {
            Some(link) => {
                debug!(domain = %domain, cookie = link.cookie(), "Loopback backend killed");
                link.notify();
                true
            }
            None => false,
        }
    }

    /// Make sends on `domain` fail (or succeed again).
    pub fn fail_sends(&self, domain: ServiceDomain, failing: bool) {
        let mut set = self.state.failing.lock();
        if failing {
            set.insert(domain);
        } else {
            set.remove(&domain);
        }
    }

    /// Acknowledgements the gateway sent to `domain`.
    pub fn acks_sent(&self, domain: ServiceDomain) -> u64 {
        self.state.acks.lock().get(&domain).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ServiceProbe for LoopbackProbe {
    async fn probe(
        &self,
        domain: ServiceDomain,
        version: VersionTag,
    ) -> Result<Arc<dyn ServiceHandle>, ProbeError> {
        self.state.probes.lock().push((domain, version));

        let offered = self
            .state
            .offered
            .read()
            .get(&domain)
            .is_some_and(|versions| versions.contains(&version));

        if offered {
            Ok(Arc::new(LoopbackHandle {
                domain,
                state: self.state.clone(),
            }))
        } else {
            Err(ProbeError::NotFound { domain, version })
        }
    }
}

struct LoopbackHandle {
    domain: ServiceDomain,
    state: Arc<LoopbackState>,
}

#[async_trait]
impl ServiceHandle for LoopbackHandle {
    async fn send_command(&self, frame: CommandFrame) -> Result<(), TransportError> {
        if self.state.failing.lock().contains(&self.domain) {
            return Err(TransportError::SendFailed(format!(
                "loopback {} refused the frame",
                self.domain
            )));
        }
        self.state
            .commands
            .send(frame)
            .map_err(|_| TransportError::Closed)
    }

    async fn send_ack(&self, _ack: AckFrame) -> Result<(), TransportError> {
        *self.state.acks.lock().entry(self.domain).or_insert(0) += 1;
        Ok(())
    }

    fn link_to_death(&self, link: DeathLink) {
        self.state.links.lock().insert(self.domain, link);
    }
}
