//! Backend frames, the dispatch queue and indication fan-out.

pub mod frames;
pub mod indications;

pub use frames::{
    AckFrame, CommandFrame, DeathSignal, DispatchEvent, InboundFrame, InboundSender,
    IndicationFrame, ResponseFrame,
};
pub use indications::IndicationSubscribers;
