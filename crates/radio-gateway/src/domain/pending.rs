//! Pending request table.
//!
//! Assigns serials, stores in-flight commands and matches terminal events
//! back to the stored result sink. Every accepted command leaves the table
//! through exactly one of: a response, a synthetic timeout, a domain
//! failure, a withdrawal after a failed send, or shutdown.
//!
//! Flow:
//! 1. Caller resolves a connection and calls `submit()` with its generation
//! 2. Table assigns a serial and takes the primary (and optional handshake) hold
//! 3. Caller sends the command frame over the connection
//! 4. Dispatcher calls `complete()` / `acknowledge()` as frames arrive
//! 5. Dispatcher tick calls `sweep_timeouts()`

use crate::domain::config::{GatewayConfig, LimitsConfig};
use crate::domain::correlation::CorrelationId;
use crate::domain::error::{GatewayError, RetireReason};
use crate::domain::guard::{GuardHandle, HolderId, ResourceGuard};
use crate::domain::serial::{RetiredLog, SerialAllocator};
use crate::domain::types::{
    CommandKind, CommandOutcome, Completion, Generation, ResultSink, Serial, ServiceDomain,
};
use parking_lot::Mutex;
use radio_telemetry::{
    COMMANDS_SUBMITTED, COMMAND_LATENCY, COMMAND_OUTCOMES, DROPPED_FRAMES, PENDING_COMMANDS,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Synthesized default for one command kind.
#[derive(Debug, Clone)]
pub struct SyntheticTimeout {
    pub after: Duration,
    pub payload: serde_json::Value,
}

/// Per-kind timeout behavior.
#[derive(Debug, Clone)]
pub struct TimeoutPolicy {
    hold: Duration,
    synthetic: HashMap<CommandKind, SyntheticTimeout>,
}

impl TimeoutPolicy {
    /// Policy that only bounds how long a command holds the primary guard.
    pub fn new(hold: Duration) -> Self {
        Self {
            hold,
            synthetic: HashMap::new(),
        }
    }

    pub fn with_synthetic(
        mut self,
        kind: CommandKind,
        after: Duration,
        payload: serde_json::Value,
    ) -> Self {
        self.synthetic
            .insert(kind, SyntheticTimeout { after, payload });
        self
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        config.synthetic_timeouts.iter().fold(
            Self::new(config.timeouts.request_hold),
            |policy, entry| policy.with_synthetic(entry.kind, entry.after, entry.payload.clone()),
        )
    }

    pub fn hold(&self) -> Duration {
        self.hold
    }

    pub fn synthetic(&self, kind: CommandKind) -> Option<&SyntheticTimeout> {
        self.synthetic.get(&kind)
    }
}

/// A command to admit into the table.
pub struct Submission {
    pub domain: ServiceDomain,
    /// Connection generation the command will be sent on
    pub generation: Generation,
    pub kind: CommandKind,
    /// Hold the handshake guard until the backend acknowledges
    pub expects_ack: bool,
    pub sink: ResultSink,
}

/// Identifiers assigned to an admitted command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub serial: Serial,
    pub correlation_id: CorrelationId,
}

/// A command waiting for its terminal event
struct PendingRequest {
    serial: Serial,
    correlation_id: CorrelationId,
    kind: CommandKind,
    domain: ServiceDomain,
    generation: Generation,
    /// Admission order, used for FIFO acknowledgement matching
    admitted: u64,
    submitted_at: Instant,
    sink: ResultSink,
    primary: Option<GuardHandle>,
    handshake: Option<GuardHandle>,
    hold_expired: bool,
}

struct TableState {
    serials: SerialAllocator,
    requests: HashMap<Serial, PendingRequest>,
    /// Lowest generation accepted per domain
    fences: HashMap<ServiceDomain, Generation>,
    retired: RetiredLog,
    admitted: u64,
    closed: bool,
}

/// Statistics for the pending table
#[derive(Debug, Default)]
pub struct PendingStats {
    /// Total commands admitted
    pub total_registered: AtomicU64,
    /// Total terminal outcomes delivered
    pub total_completed: AtomicU64,
    /// Outcomes synthesized on timeout
    pub total_synthetic: AtomicU64,
    /// Commands failed by a domain reset, disable or shutdown
    pub total_reset: AtomicU64,
    /// Commands withdrawn after a failed send
    pub total_withdrawn: AtomicU64,
    /// Primary holds released by the hold timeout
    pub total_hold_expired: AtomicU64,
    /// Completions and acknowledgements that matched nothing
    pub total_anomalies: AtomicU64,
}

/// What one sweep did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub synthesized: usize,
    pub holds_released: usize,
}

/// Table of in-flight commands.
pub struct PendingRequestTable {
    state: Mutex<TableState>,
    primary: Arc<ResourceGuard>,
    handshake: Arc<ResourceGuard>,
    policy: TimeoutPolicy,
    max_pending: usize,
    stats: PendingStats,
}

impl PendingRequestTable {
    pub fn new(
        primary: Arc<ResourceGuard>,
        handshake: Arc<ResourceGuard>,
        policy: TimeoutPolicy,
        limits: &LimitsConfig,
    ) -> Self {
        Self {
            state: Mutex::new(TableState {
                serials: SerialAllocator::new(),
                requests: HashMap::new(),
                fences: HashMap::new(),
                retired: RetiredLog::new(limits.retired_history),
                admitted: 0,
                closed: false,
            }),
            primary,
            handshake,
            policy,
            max_pending: limits.max_pending,
            stats: PendingStats::default(),
        }
    }

    /// Restart serial assignment at `serial`.
    pub fn with_serial_start(self, serial: u32) -> Self {
        self.state.lock().serials = SerialAllocator::starting_at(serial);
        self
    }

    /// Admit a command and take its guard holds.
    ///
    /// Fails with `DomainReset` when `generation` predates the domain's last
    /// reset, so a command can never be admitted against a dead connection.
    pub fn submit(&self, submission: Submission) -> Result<Admission, GatewayError> {
        let Submission {
            domain,
            generation,
            kind,
            expects_ack,
            sink,
        } = submission;

        let mut guard = self.state.lock();
        let state = &mut *guard;

        if state.closed {
            return Err(GatewayError::ShuttingDown);
        }

        let fence = state.fences.get(&domain).copied().unwrap_or(0);
        if generation < fence {
            debug!(
                domain = %domain,
                generation,
                fence,
                "Rejected submission against a superseded connection"
            );
            return Err(GatewayError::DomainReset { domain });
        }

        if state.requests.len() >= self.max_pending {
            warn!(
                domain = %domain,
                kind = %kind,
                limit = self.max_pending,
                "Pending table full"
            );
            return Err(GatewayError::TooManyPending {
                limit: self.max_pending,
            });
        }

        let serial = state
            .serials
            .allocate(&state.requests)
            .ok_or(GatewayError::SerialExhausted)?;

        let primary = self.primary.acquire(HolderId::Command(serial));
        let handshake = expects_ack.then(|| self.handshake.acquire(HolderId::Command(serial)));

        state.admitted += 1;
        let correlation_id = CorrelationId::new();
        state.requests.insert(
            serial,
            PendingRequest {
                serial,
                correlation_id,
                kind,
                domain,
                generation,
                admitted: state.admitted,
                submitted_at: Instant::now(),
                sink,
                primary: Some(primary),
                handshake,
                hold_expired: false,
            },
        );
        let pending = state.requests.len();
        drop(guard);

        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);
        COMMANDS_SUBMITTED.with_label_values(&[domain.as_str()]).inc();
        PENDING_COMMANDS.set(pending as f64);

        debug!(
            serial = %serial,
            correlation_id = %correlation_id,
            domain = %domain,
            kind = %kind,
            generation,
            expects_ack,
            "Registered pending command"
        );

        Ok(Admission {
            serial,
            correlation_id,
        })
    }

    /// Deliver the terminal outcome for `serial`.
    ///
    /// Returns false, logging an anomaly, if the serial is not pending.
    pub fn complete(&self, serial: Serial, outcome: CommandOutcome) -> bool {
        self.complete_matching(serial, None, outcome)
    }

    /// Like [`complete`](Self::complete), but only if the command was sent on
    /// `domain` at `generation`.
    pub fn complete_from(
        &self,
        domain: ServiceDomain,
        generation: Generation,
        serial: Serial,
        outcome: CommandOutcome,
    ) -> bool {
        self.complete_matching(serial, Some((domain, generation)), outcome)
    }

    fn complete_matching(
        &self,
        serial: Serial,
        origin: Option<(ServiceDomain, Generation)>,
        outcome: CommandOutcome,
    ) -> bool {
        let mut state = self.state.lock();

        let accept = state.requests.get(&serial).is_some_and(|request| {
            origin.map_or(true, |(domain, generation)| {
                request.domain == domain && request.generation == generation
            })
        });
        let taken = if accept {
            state.requests.remove(&serial)
        } else {
            None
        };

        match taken {
            Some(request) => {
                state.retired.record(serial, RetireReason::Responded);
                let pending = state.requests.len();
                drop(state);
                self.finish(request, outcome, pending);
                true
            }
            None => {
                let retired_as = state.retired.lookup(serial);
                let origin_mismatch = state.requests.contains_key(&serial);
                drop(state);

                self.stats.total_anomalies.fetch_add(1, Ordering::Relaxed);
                let domain_label = origin.map_or("unknown", |(domain, _)| domain.as_str());
                DROPPED_FRAMES
                    .with_label_values(&[domain_label, "unknown_serial"])
                    .inc();
                warn!(
                    serial = %serial,
                    domain = domain_label,
                    retired_as = ?retired_as,
                    origin_mismatch,
                    "Completion for a serial that is not pending, dropped"
                );
                false
            }
        }
    }

    /// Fail every pending command of `domain` with `reason`.
    ///
    /// Raises the domain's fence to `fence` in the same critical section, so
    /// a concurrent submit either lands in the failed set or is rejected.
    pub fn fail_all(
        &self,
        domain: ServiceDomain,
        reason: GatewayError,
        fence: Generation,
    ) -> usize {
        let retire_as = match reason {
            GatewayError::ShuttingDown => RetireReason::ShuttingDown,
            _ => RetireReason::DomainReset,
        };

        let (drained, pending) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            let current = state.fences.entry(domain).or_insert(0);
            *current = (*current).max(fence);

            let serials: Vec<Serial> = state
                .requests
                .values()
                .filter(|request| request.domain == domain)
                .map(|request| request.serial)
                .collect();

            let mut drained = Vec::with_capacity(serials.len());
            for serial in serials {
                if let Some(request) = state.requests.remove(&serial) {
                    state.retired.record(serial, retire_as);
                    drained.push(request);
                }
            }
            drained.sort_by_key(|request| request.admitted);
            (drained, state.requests.len())
        };

        let failed = drained.len();
        self.stats
            .total_reset
            .fetch_add(failed as u64, Ordering::Relaxed);
        for request in drained {
            self.finish(request, CommandOutcome::Aborted(reason.clone()), pending);
        }

        info!(
            domain = %domain,
            fence,
            failed,
            reason = %reason,
            "Failed pending commands for domain"
        );

        failed
    }

    /// Refuse new submissions and fail everything still pending.
    pub fn close(&self) -> usize {
        let drained = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            state.closed = true;

            let mut drained: Vec<PendingRequest> =
                state.requests.drain().map(|(_, request)| request).collect();
            for request in &drained {
                state.retired.record(request.serial, RetireReason::ShuttingDown);
            }
            drained.sort_by_key(|request| request.admitted);
            drained
        };

        let failed = drained.len();
        self.stats
            .total_reset
            .fetch_add(failed as u64, Ordering::Relaxed);
        for request in drained {
            self.finish(request, CommandOutcome::Aborted(GatewayError::ShuttingDown), 0);
        }

        info!(failed, "Pending table closed");
        failed
    }

    /// Release the handshake hold of the oldest command on `domain` still
    /// waiting for an acknowledgement. The primary hold is untouched.
    pub fn acknowledge(&self, domain: ServiceDomain) -> Option<Serial> {
        let taken = {
            let mut state = self.state.lock();
            state
                .requests
                .values_mut()
                .filter(|request| request.domain == domain && request.handshake.is_some())
                .min_by_key(|request| request.admitted)
                .and_then(|request| {
                    request
                        .handshake
                        .take()
                        .map(|handle| (request.serial, handle))
                })
        };

        match taken {
            Some((serial, handle)) => {
                self.release_hold(&self.handshake, handle);
                debug!(serial = %serial, domain = %domain, "Acknowledgement received");
                Some(serial)
            }
            None => {
                self.stats.total_anomalies.fetch_add(1, Ordering::Relaxed);
                DROPPED_FRAMES
                    .with_label_values(&[domain.as_str(), "unexpected_ack"])
                    .inc();
                warn!(domain = %domain, "Unexpected acknowledgement, dropped");
                None
            }
        }
    }

    /// Apply per-kind timeout policy to commands older than their threshold.
    ///
    /// Synthetic kinds are completed with their default payload. Every other
    /// kind gives up its primary hold once and stays pending, so a late
    /// genuine reply still completes it.
    pub fn sweep_timeouts(&self, now: Instant) -> SweepReport {
        let (expired_holds, synthesized, pending) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            let mut due = Vec::new();
            let mut expired_holds = Vec::new();

            for request in state.requests.values_mut() {
                let age = now.saturating_duration_since(request.submitted_at);

                if let Some(synthetic) = self.policy.synthetic(request.kind) {
                    if age >= synthetic.after {
                        due.push(request.serial);
                        continue;
                    }
                }

                if !request.hold_expired && age >= self.policy.hold() {
                    request.hold_expired = true;
                    if let Some(handle) = request.primary.take() {
                        expired_holds.push((
                            request.serial,
                            request.domain,
                            request.kind,
                            age,
                            handle,
                        ));
                    }
                }
            }

            let mut synthesized = Vec::with_capacity(due.len());
            for serial in due {
                if let Some(request) = state.requests.remove(&serial) {
                    state.retired.record(serial, RetireReason::SyntheticTimeout);
                    synthesized.push(request);
                }
            }
            synthesized.sort_by_key(|request| request.admitted);

            (expired_holds, synthesized, state.requests.len())
        };

        let report = SweepReport {
            synthesized: synthesized.len(),
            holds_released: expired_holds.len(),
        };

        for (serial, domain, kind, age, handle) in expired_holds {
            warn!(
                serial = %serial,
                domain = %domain,
                kind = %kind,
                age_ms = age.as_millis() as u64,
                "Command exceeded hold timeout, released its guard and still waiting"
            );
            self.release_hold(&self.primary, handle);
            self.stats.total_hold_expired.fetch_add(1, Ordering::Relaxed);
        }

        for request in synthesized {
            let payload = self
                .policy
                .synthetic(request.kind)
                .map(|synthetic| synthetic.payload.clone())
                .unwrap_or(serde_json::Value::Null);
            info!(
                serial = %request.serial,
                domain = %request.domain,
                kind = %request.kind,
                "Completing command with synthetic timeout result"
            );
            self.stats.total_synthetic.fetch_add(1, Ordering::Relaxed);
            self.finish(request, CommandOutcome::TimedOut(payload), pending);
        }

        report
    }

    /// Remove a command whose send failed. Its sink is dropped uncalled.
    pub fn withdraw(&self, serial: Serial) -> bool {
        let (request, pending) = {
            let mut state = self.state.lock();
            let request = state.requests.remove(&serial);
            if request.is_some() {
                state.retired.record(serial, RetireReason::Withdrawn);
            }
            (request, state.requests.len())
        };

        let Some(request) = request else {
            return false;
        };

        if let Some(handle) = request.primary {
            self.release_hold(&self.primary, handle);
        }
        if let Some(handle) = request.handshake {
            self.release_hold(&self.handshake, handle);
        }
        self.stats.total_withdrawn.fetch_add(1, Ordering::Relaxed);
        PENDING_COMMANDS.set(pending as f64);

        debug!(serial = %serial, domain = %request.domain, "Withdrew pending command");
        true
    }

    fn finish(&self, request: PendingRequest, outcome: CommandOutcome, pending: usize) {
        let PendingRequest {
            serial,
            correlation_id,
            kind,
            domain,
            submitted_at,
            sink,
            primary,
            handshake,
            ..
        } = request;

        if let Some(handle) = primary {
            self.release_hold(&self.primary, handle);
        }
        if let Some(handle) = handshake {
            self.release_hold(&self.handshake, handle);
        }

        let latency = submitted_at.elapsed();
        let label = outcome.label();

        self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
        COMMAND_OUTCOMES
            .with_label_values(&[domain.as_str(), label])
            .inc();
        let kind_label = kind.to_string();
        COMMAND_LATENCY
            .with_label_values(&[kind_label.as_str()])
            .observe(latency.as_secs_f64());
        PENDING_COMMANDS.set(pending as f64);

        debug!(
            serial = %serial,
            correlation_id = %correlation_id,
            domain = %domain,
            kind = %kind,
            outcome = label,
            latency_ms = latency.as_millis() as u64,
            "Completed pending command"
        );

        sink(Completion {
            serial,
            correlation_id,
            kind,
            domain,
            outcome,
            latency,
        });
    }

    fn release_hold(&self, guard: &ResourceGuard, handle: GuardHandle) {
        if let Err(e) = guard.release(handle) {
            error!(error = %e, "Guard release failed");
        }
    }

    /// Get number of currently pending commands
    pub fn pending_count(&self) -> usize {
        self.state.lock().requests.len()
    }

    pub fn is_pending(&self, serial: Serial) -> bool {
        self.state.lock().requests.contains_key(&serial)
    }

    /// Serials pending on `domain`, oldest first.
    pub fn pending_for(&self, domain: ServiceDomain) -> Vec<Serial> {
        let state = self.state.lock();
        let mut pending: Vec<(u64, Serial)> = state
            .requests
            .values()
            .filter(|request| request.domain == domain)
            .map(|request| (request.admitted, request.serial))
            .collect();
        pending.sort_unstable();
        pending.into_iter().map(|(_, serial)| serial).collect()
    }

    /// Lowest generation `submit` accepts for `domain`.
    pub fn fence(&self, domain: ServiceDomain) -> Generation {
        self.state.lock().fences.get(&domain).copied().unwrap_or(0)
    }

    /// Why `serial` most recently left the table, if still remembered.
    pub fn retired_reason(&self, serial: Serial) -> Option<RetireReason> {
        self.state.lock().retired.lookup(serial)
    }

    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }

    pub fn primary_guard(&self) -> &Arc<ResourceGuard> {
        &self.primary
    }

    pub fn handshake_guard(&self) -> &Arc<ResourceGuard> {
        &self.handshake
    }

    pub fn policy(&self) -> &TimeoutPolicy {
        &self.policy
    }
}
