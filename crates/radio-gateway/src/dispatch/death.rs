//! Backend death handling.
//!
//! Lifecycle of one domain across a crash:
//!
//! ```text
//! Live(g) ── death(cookie = g) ──→ Dead(g) ── fail_all ──→ Reprobing(g + 1)
//!                                                            │
//!                                   Live(g + 1) ←── probe ok ┤
//!                                   Disabled(g + 1) ←─ none ─┘
//! ```
//!
//! A signal whose cookie is not the domain's current connected generation
//! is ignored entirely.

use crate::domain::config::ResetScope;
use crate::domain::error::GatewayError;
use crate::domain::pending::PendingRequestTable;
use crate::domain::types::{Generation, ServiceDomain};
use crate::ipc::frames::DeathSignal;
use crate::registry::{ConnectionRegistry, ConnectionState};
use parking_lot::Mutex;
use radio_telemetry::{DOMAIN_RESETS, DROPPED_FRAMES};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Health of one domain as seen by the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Never connected yet, or mid-probe outside a recovery
    Idle(Generation),
    Live(Generation),
    Dead(Generation),
    Reprobing(Generation),
    Disabled(Generation),
}

/// Result of recovering one domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainRecovery {
    pub domain: ServiceDomain,
    /// Generation that died
    pub died: Generation,
    /// Pending commands failed with `DomainReset`
    pub failed: usize,
    /// State after reprobing
    pub liveness: Liveness,
}

/// What a death signal led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeathOutcome {
    /// Cookie did not match the current generation
    Stale {
        domain: ServiceDomain,
        cookie: Generation,
        current: Generation,
    },
    Recovered(Vec<DomainRecovery>),
}

/// Death watcher statistics
#[derive(Debug, Default)]
pub struct DeathStats {
    /// Signals that triggered a recovery
    pub total_deaths: AtomicU64,
    /// Signals ignored for a stale cookie
    pub total_stale: AtomicU64,
    /// Domains reset, counting every domain of a combined reset
    pub total_resets: AtomicU64,
    /// Resets that ended with the domain disabled
    pub total_disabled: AtomicU64,
}

/// Fails and reprobes domains whose backend died.
pub struct DeathWatcher {
    pending: Arc<PendingRequestTable>,
    registry: Arc<ConnectionRegistry>,
    scope: ResetScope,
    transitions: Mutex<HashMap<ServiceDomain, Liveness>>,
    stats: DeathStats,
}

impl DeathWatcher {
    pub fn new(
        pending: Arc<PendingRequestTable>,
        registry: Arc<ConnectionRegistry>,
        scope: ResetScope,
    ) -> Self {
        Self {
            pending,
            registry,
            scope,
            transitions: Mutex::new(HashMap::new()),
            stats: DeathStats::default(),
        }
    }

    /// Handle a death notification.
    pub async fn on_death(&self, signal: DeathSignal) -> DeathOutcome {
        let DeathSignal {
            domain,
            generation_cookie,
        } = signal;

        let current = self.registry.current(domain);
        if !current.is_connected() || current.generation() != generation_cookie {
            self.stats.total_stale.fetch_add(1, Ordering::Relaxed);
            DROPPED_FRAMES
                .with_label_values(&[domain.as_str(), "stale_death"])
                .inc();
            debug!(
                domain = %domain,
                cookie = generation_cookie,
                current = current.generation(),
                state = current.state().as_str(),
                "Ignoring stale death signal"
            );
            return DeathOutcome::Stale {
                domain,
                cookie: generation_cookie,
                current: current.generation(),
            };
        }

        self.stats.total_deaths.fetch_add(1, Ordering::Relaxed);
        warn!(
            domain = %domain,
            generation = generation_cookie,
            scope = ?self.scope,
            "Backend died"
        );

        let domains: Vec<ServiceDomain> = match self.scope {
            ResetScope::Domain => vec![domain],
            ResetScope::AllDomains => ServiceDomain::ALL
                .into_iter()
                .filter(|other| *other == domain || self.registry.current(*other).is_connected())
                .collect(),
        };

        let mut recovered = Vec::with_capacity(domains.len());
        for target in domains {
            recovered.push(self.recover(target).await);
        }
        DeathOutcome::Recovered(recovered)
    }

    /// Fail everything pending on `domain`, then reprobe it.
    async fn recover(&self, domain: ServiceDomain) -> DomainRecovery {
        let died = self.registry.generation(domain);
        self.mark(domain, Liveness::Dead(died));

        let failed = self
            .pending
            .fail_all(domain, GatewayError::DomainReset { domain }, died + 1);
        self.stats.total_resets.fetch_add(1, Ordering::Relaxed);
        DOMAIN_RESETS.with_label_values(&[domain.as_str()]).inc();

        self.mark(domain, Liveness::Reprobing(died + 1));

        let liveness = match self.registry.reset_to(domain, died + 1).await {
            Ok(connection) => Liveness::Live(connection.generation()),
            Err(e) => {
                self.stats.total_disabled.fetch_add(1, Ordering::Relaxed);
                warn!(domain = %domain, error = %e, "Domain did not come back");
                Liveness::Disabled(self.registry.generation(domain))
            }
        };
        self.transitions.lock().remove(&domain);

        info!(
            domain = %domain,
            died,
            failed,
            liveness = ?liveness,
            "Domain recovered from backend death"
        );

        DomainRecovery {
            domain,
            died,
            failed,
            liveness,
        }
    }

    fn mark(&self, domain: ServiceDomain, liveness: Liveness) {
        debug!(domain = %domain, liveness = ?liveness, "Liveness transition");
        self.transitions.lock().insert(domain, liveness);
    }

    /// Current health of `domain`.
    pub fn liveness(&self, domain: ServiceDomain) -> Liveness {
        if let Some(transient) = self.transitions.lock().get(&domain) {
            return *transient;
        }

        let connection = self.registry.current(domain);
        match connection.state() {
            ConnectionState::Connected => Liveness::Live(connection.generation()),
            ConnectionState::Disabled => Liveness::Disabled(connection.generation()),
            ConnectionState::Disconnected | ConnectionState::Connecting => {
                Liveness::Idle(connection.generation())
            }
        }
    }

    pub fn stats(&self) -> &DeathStats {
        &self.stats
    }
}
