//! Interface strategies: one per (domain, version) pair.
//!
//! A strategy is resolved once per connection and cached in it. It decides
//! which command kinds the negotiated interface implements and how a
//! command is framed for that interface.

use crate::domain::types::{CommandKind, Serial, ServiceDomain, VersionTag};
use crate::ipc::frames::CommandFrame;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Behavior of one backend interface generation.
pub trait InterfaceStrategy: Send + Sync {
    fn domain(&self) -> ServiceDomain;

    fn version(&self) -> VersionTag;

    /// Whether this interface implements `kind`.
    fn supports(&self, kind: CommandKind) -> bool;

    /// Frame a command for this interface. `version` is already clamped by
    /// any compatibility override.
    fn encode(
        &self,
        serial: Serial,
        kind: CommandKind,
        version: VersionTag,
        payload: serde_json::Value,
    ) -> CommandFrame {
        CommandFrame {
            serial,
            domain: self.domain(),
            kind,
            version,
            payload,
        }
    }
}

/// Strategy backed by a set of supported kinds.
#[derive(Debug, Clone)]
pub struct KindSetStrategy {
    domain: ServiceDomain,
    version: VersionTag,
    /// `None` supports every kind
    kinds: Option<HashSet<CommandKind>>,
}

impl KindSetStrategy {
    /// Interface implementing every command kind.
    pub fn all(domain: ServiceDomain, version: VersionTag) -> Self {
        Self {
            domain,
            version,
            kinds: None,
        }
    }

    /// Interface implementing only `kinds`.
    pub fn only(
        domain: ServiceDomain,
        version: VersionTag,
        kinds: impl IntoIterator<Item = CommandKind>,
    ) -> Self {
        Self {
            domain,
            version,
            kinds: Some(kinds.into_iter().collect()),
        }
    }
}

impl InterfaceStrategy for KindSetStrategy {
    fn domain(&self) -> ServiceDomain {
        self.domain
    }

    fn version(&self) -> VersionTag {
        self.version
    }

    fn supports(&self, kind: CommandKind) -> bool {
        self.kinds.as_ref().map_or(true, |kinds| kinds.contains(&kind))
    }
}

/// Registered strategies, keyed by domain then version.
#[derive(Default, Clone)]
pub struct StrategyTable {
    entries: HashMap<ServiceDomain, BTreeMap<VersionTag, Arc<dyn InterfaceStrategy>>>,
}

impl StrategyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every domain at every one of `versions`, supporting all kinds.
    pub fn uniform(versions: &[VersionTag]) -> Self {
        let mut table = Self::new();
        for domain in ServiceDomain::ALL {
            for version in versions {
                table.register(KindSetStrategy::all(domain, *version));
            }
        }
        table
    }

    /// Add or replace the strategy for its (domain, version).
    pub fn register(&mut self, strategy: impl InterfaceStrategy + 'static) -> &mut Self {
        let strategy: Arc<dyn InterfaceStrategy> = Arc::new(strategy);
        self.entries
            .entry(strategy.domain())
            .or_default()
            .insert(strategy.version(), strategy);
        self
    }

    /// Known versions of `domain`, newest first.
    pub fn versions_descending(&self, domain: ServiceDomain) -> Vec<VersionTag> {
        self.entries
            .get(&domain)
            .map(|versions| versions.keys().rev().copied().collect())
            .unwrap_or_default()
    }

    pub fn resolve(
        &self,
        domain: ServiceDomain,
        version: VersionTag,
    ) -> Option<Arc<dyn InterfaceStrategy>> {
        self.entries
            .get(&domain)
            .and_then(|versions| versions.get(&version))
            .cloned()
    }
}

impl fmt::Debug for StrategyTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (domain, versions) in &self.entries {
            map.entry(domain, &versions.keys().collect::<Vec<_>>());
        }
        map.finish()
    }
}
