//! Reference-counted, timeout-bounded exclusive resource holder.
//!
//! The underlying [`ExclusiveResource`] is engaged on the first hold and
//! disengaged when the last hold is released. Every acquire re-arms a
//! timeout tagged with the acquire's sequence number; a timeout only fires
//! if its sequence is still the current arm, so a timer left over from an
//! earlier epoch can never release holds taken after it.

use crate::domain::error::GuardError;
use crate::domain::types::{Serial, ServiceDomain};
use crate::ports::outbound::ExclusiveResource;
use parking_lot::Mutex;
use radio_telemetry::{GUARD_FORCED_RELEASES, GUARD_HOLDS};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, trace, warn};

/// Which guard instance a handle belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardKind {
    /// Held for the full round-trip of a command
    Primary,
    /// Held only until an acknowledgement is exchanged
    Handshake,
}

impl GuardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardKind::Primary => "primary",
            GuardKind::Handshake => "handshake",
        }
    }
}

/// Who holds a guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HolderId {
    /// A pending command
    Command(Serial),
    /// An outbound acknowledgement on a domain
    Ack(ServiceDomain),
}

impl fmt::Display for HolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HolderId::Command(serial) => write!(f, "command#{}", serial),
            HolderId::Ack(domain) => write!(f, "ack:{}", domain),
        }
    }
}

/// Proof of one hold. Consumed by [`ResourceGuard::release`].
#[derive(Debug, PartialEq, Eq)]
pub struct GuardHandle {
    holder: HolderId,
    sequence: u64,
    kind: GuardKind,
}

impl GuardHandle {
    pub fn holder(&self) -> HolderId {
        self.holder
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn kind(&self) -> GuardKind {
        self.kind
    }
}

/// Guard statistics
#[derive(Debug, Default)]
pub struct GuardStats {
    /// Total holds taken
    pub total_acquired: AtomicU64,
    /// Holds returned through `release`
    pub total_released: AtomicU64,
    /// Timeouts that cleared every hold
    pub total_forced: AtomicU64,
    /// Timeouts ignored because a newer arm superseded them
    pub total_stale_timeouts: AtomicU64,
    /// Times the underlying resource was engaged
    pub total_engagements: AtomicU64,
}

/// Point-in-time view of a guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardSnapshot {
    pub kind: GuardKind,
    pub held: bool,
    pub count: usize,
    /// Outstanding holds ordered by sequence
    pub holders: Vec<(u64, HolderId)>,
    pub armed_sequence: Option<u64>,
}

struct GuardState {
    count: usize,
    outstanding: BTreeMap<u64, HolderId>,
    sequence: u64,
    armed: Option<(u64, Instant)>,
    held: bool,
}

/// Reference-counted exclusive resource guard.
pub struct ResourceGuard {
    kind: GuardKind,
    timeout: Duration,
    resource: Arc<dyn ExclusiveResource>,
    state: Mutex<GuardState>,
    stats: GuardStats,
}

impl ResourceGuard {
    pub fn new(kind: GuardKind, timeout: Duration, resource: Arc<dyn ExclusiveResource>) -> Self {
        Self {
            kind,
            timeout,
            resource,
            state: Mutex::new(GuardState {
                count: 0,
                outstanding: BTreeMap::new(),
                sequence: 0,
                armed: None,
                held: false,
            }),
            stats: GuardStats::default(),
        }
    }

    /// Take a hold, engaging the resource if this is the first one.
    pub fn acquire(&self, holder: HolderId) -> GuardHandle {
        let mut state = self.state.lock();

        if !state.held {
            self.resource.engage();
            state.held = true;
            self.stats.total_engagements.fetch_add(1, Ordering::Relaxed);
        }

        state.count += 1;
        state.sequence += 1;
        let sequence = state.sequence;
        state.outstanding.insert(sequence, holder);
        state.armed = Some((sequence, Instant::now() + self.timeout));

        self.stats.total_acquired.fetch_add(1, Ordering::Relaxed);
        GUARD_HOLDS
            .with_label_values(&[self.kind.as_str()])
            .set(state.count as f64);

        trace!(
            guard = self.kind.as_str(),
            holder = %holder,
            sequence,
            count = state.count,
            "Guard acquired"
        );

        GuardHandle {
            holder,
            sequence,
            kind: self.kind,
        }
    }

    /// Return a hold.
    ///
    /// Returns `Ok(false)` when the hold was already cleared by a forced
    /// timeout release.
    pub fn release(&self, handle: GuardHandle) -> Result<bool, GuardError> {
        debug_assert_eq!(handle.kind, self.kind, "handle released on the wrong guard");

        let mut state = self.state.lock();

        if state.outstanding.remove(&handle.sequence).is_none() {
            debug!(
                guard = self.kind.as_str(),
                holder = %handle.holder,
                sequence = handle.sequence,
                "Release of a hold already cleared by timeout"
            );
            return Ok(false);
        }

        match state.count.checked_sub(1) {
            Some(count) => state.count = count,
            None => {
                error!(
                    guard = self.kind.as_str(),
                    holder = %handle.holder,
                    "Guard refcount underflow"
                );
                debug_assert!(false, "{} guard refcount underflow", self.kind.as_str());
                return Err(GuardError::Underflow {
                    guard: self.kind.as_str(),
                });
            }
        }

        if state.count == 0 {
            state.armed = None;
            if state.held {
                self.resource.disengage();
                state.held = false;
            }
        }

        self.stats.total_released.fetch_add(1, Ordering::Relaxed);
        GUARD_HOLDS
            .with_label_values(&[self.kind.as_str()])
            .set(state.count as f64);

        trace!(
            guard = self.kind.as_str(),
            holder = %handle.holder,
            count = state.count,
            "Guard released"
        );

        Ok(true)
    }

    /// Clear every hold if `sequence` is still the current timer arm.
    pub fn force_timeout_release(&self, sequence: u64) -> bool {
        let mut state = self.state.lock();

        match state.armed {
            Some((armed, _)) if armed == sequence => {}
            _ => {
                self.stats
                    .total_stale_timeouts
                    .fetch_add(1, Ordering::Relaxed);
                debug!(
                    guard = self.kind.as_str(),
                    sequence,
                    current = ?state.armed.map(|(s, _)| s),
                    "Ignoring stale guard timeout"
                );
                return false;
            }
        }

        let cleared = state.outstanding.len();
        state.outstanding.clear();
        state.count = 0;
        state.armed = None;
        if state.held {
            self.resource.disengage();
            state.held = false;
        }

        self.stats.total_forced.fetch_add(1, Ordering::Relaxed);
        GUARD_FORCED_RELEASES
            .with_label_values(&[self.kind.as_str()])
            .inc();
        GUARD_HOLDS.with_label_values(&[self.kind.as_str()]).set(0.0);

        warn!(
            guard = self.kind.as_str(),
            sequence,
            cleared,
            timeout_ms = self.timeout.as_millis() as u64,
            "Guard timed out, released all holds"
        );

        true
    }

    /// Fire the armed timeout if its deadline has passed.
    pub fn expire(&self, now: Instant) -> bool {
        let due = {
            let state = self.state.lock();
            match state.armed {
                Some((sequence, deadline)) if now >= deadline => sequence,
                _ => return false,
            }
        };
        self.force_timeout_release(due)
    }

    pub fn kind(&self) -> GuardKind {
        self.kind
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Current number of outstanding holds
    pub fn count(&self) -> usize {
        self.state.lock().count
    }

    /// Whether the underlying resource is engaged
    pub fn is_held(&self) -> bool {
        self.state.lock().held
    }

    pub fn snapshot(&self) -> GuardSnapshot {
        let state = self.state.lock();
        GuardSnapshot {
            kind: self.kind,
            held: state.held,
            count: state.count,
            holders: state.outstanding.iter().map(|(s, h)| (*s, *h)).collect(),
            armed_sequence: state.armed.map(|(s, _)| s),
        }
    }

    pub fn stats(&self) -> &GuardStats {
        &self.stats
    }
}
