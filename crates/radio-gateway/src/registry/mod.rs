//! Backend connections and interface version negotiation.

pub mod connection;
#[allow(clippy::module_inception)]
pub mod registry;
pub mod strategy;

pub use connection::{ConnectionState, ServiceConnection};
pub use registry::ConnectionRegistry;
pub use strategy::{InterfaceStrategy, KindSetStrategy, StrategyTable};
