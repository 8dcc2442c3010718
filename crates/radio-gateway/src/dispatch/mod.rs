//! Inbound event processing and backend death recovery.

pub mod death;
pub mod dispatcher;

pub use death::{DeathOutcome, DeathStats, DeathWatcher, DomainRecovery, Liveness};
pub use dispatcher::{Dispatcher, FrameClass};
