//! # Radio Gateway
//!
//! Control-plane gateway between a stable command API and independently
//! versioned, independently restartable radio service backends (voice,
//! data, messaging, modem, network, sim).
//!
//! Callers submit asynchronous commands; the gateway delivers exactly one
//! terminal outcome per accepted command while tolerating backend crashes
//! and version skew, holding a scarce exclusive resource only while work is
//! outstanding.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        RadioGateway                              │
//! │                                                                  │
//! │  submit ──→ ConnectionRegistry::get ──→ PendingRequestTable      │
//! │                 │  (probe 1.6 → 1.0)        │  serial + guards   │
//! │                 ▼                            ▼                   │
//! │           ServiceConnection ──────→ ServiceHandle::send_command  │
//! │                                                                  │
//! │  ┌──────────────── dispatch task (single consumer) ────────────┐ │
//! │  │  InboundSender ──→ Dispatcher ──→ complete / acknowledge    │ │
//! │  │        ▲               │      └──→ IndicationSubscribers    │ │
//! │  │        │               └──→ DeathWatcher ──→ fail_all       │ │
//! │  │  DeathLink                             └──→ registry.reset  │ │
//! │  │                 interval ──→ sweep_timeouts                 │ │
//! │  └─────────────────────────────────────────────────────────────┘ │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use radio_gateway::{CommandKind, CommandRequest, GatewayConfig, GatewayContext, RadioGateway, ServiceDomain};
//!
//! let context = GatewayContext::new(GatewayConfig::default(), probe, strategies);
//! let gateway = RadioGateway::new(context)?;
//! gateway.start();
//!
//! let ticket = gateway
//!     .submit(CommandRequest::new(ServiceDomain::Voice, CommandKind::DIAL))
//!     .await?;
//! let completion = ticket.wait().await?;
//! ```

#![deny(unsafe_code)]

pub mod adapters;
pub mod dispatch;
pub mod domain;
pub mod ipc;
pub mod ports;
pub mod registry;
pub mod service;

pub use adapters::LoopbackProbe;
pub use dispatch::{DeathOutcome, DeathWatcher, Dispatcher, FrameClass, Liveness};
pub use domain::{
    codes, CommandKind, CommandOutcome, CompatibilityTable, Completion, ConfigError,
    CorrelationId, GatewayConfig, GatewayError, GatewayResult, Generation, GuardKind,
    GuardSnapshot, HolderId, IndicationKind, ResetScope, Serial, ServiceDomain, VersionTag,
};
pub use ipc::{
    AckFrame, CommandFrame, DeathSignal, DispatchEvent, InboundFrame, InboundSender,
    IndicationFrame, ResponseFrame,
};
pub use ports::{
    DeathLink, ExclusiveResource, NoopResource, ProbeError, ServiceHandle, ServiceProbe,
};
pub use registry::{
    ConnectionState, InterfaceStrategy, KindSetStrategy, ServiceConnection, StrategyTable,
};
pub use service::{CommandRequest, CommandTicket, GatewayContext, RadioGateway};
