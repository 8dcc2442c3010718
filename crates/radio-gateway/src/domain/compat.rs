//! Per-command-kind interface version caps.
//!
//! An override pins a command kind to a maximum interface version. Entries
//! can only move downwards once set and persist for the process lifetime.

use crate::domain::types::{CommandKind, VersionTag};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{info, warn};

/// Downgrade-only map from command kind to maximum version.
#[derive(Debug, Default)]
pub struct CompatibilityTable {
    overrides: DashMap<CommandKind, VersionTag>,
}

impl CompatibilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap `kind` at `version`.
    ///
    /// Returns false, leaving the entry untouched, unless `version` is
    /// strictly lower than an existing cap.
    pub fn set_override(&self, kind: CommandKind, version: VersionTag) -> bool {
        match self.overrides.entry(kind) {
            Entry::Vacant(entry) => {
                entry.insert(version);
                info!(kind = %kind, version = %version, "Compatibility override set");
                true
            }
            Entry::Occupied(mut entry) => {
                let current = *entry.get();
                if version < current {
                    entry.insert(version);
                    info!(
                        kind = %kind,
                        from = %current,
                        to = %version,
                        "Compatibility override lowered"
                    );
                    true
                } else {
                    warn!(
                        kind = %kind,
                        current = %current,
                        requested = %version,
                        "Rejected non-downgrade compatibility override"
                    );
                    false
                }
            }
        }
    }

    pub fn get_override(&self, kind: CommandKind) -> Option<VersionTag> {
        self.overrides.get(&kind).map(|v| *v)
    }

    /// Version to use when dispatching `kind` over a connection negotiated at
    /// `negotiated`.
    pub fn clamp(&self, kind: CommandKind, negotiated: VersionTag) -> VersionTag {
        match self.get_override(kind) {
            Some(cap) => cap.min(negotiated),
            None => negotiated,
        }
    }

    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}
