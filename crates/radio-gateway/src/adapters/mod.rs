//! Adapters implementing the outbound ports.

pub mod loopback;

pub use loopback::LoopbackProbe;
