//! Ports to the outside world.

pub mod outbound;

pub use outbound::{
    DeathLink, ExclusiveResource, NoopResource, ProbeError, ServiceHandle, ServiceProbe,
    TransportError,
};
