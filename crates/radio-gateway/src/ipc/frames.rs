//! Frames exchanged with backend services, and the dispatcher's inbound queue.

use crate::domain::error::GatewayError;
use crate::domain::types::{
    CommandKind, Generation, IndicationKind, Serial, ServiceDomain, VersionTag,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

/// Outbound command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandFrame {
    pub serial: Serial,
    pub domain: ServiceDomain,
    pub kind: CommandKind,
    /// Interface version the command is encoded for
    pub version: VersionTag,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Solicited reply to a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub serial: Serial,
    #[serde(default)]
    pub error_code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Backend wants a handshake acknowledgement for this frame
    #[serde(default)]
    pub ack_required: bool,
}

impl ResponseFrame {
    pub fn ok(serial: Serial, payload: Option<serde_json::Value>) -> Self {
        Self {
            serial,
            error_code: 0,
            payload,
            ack_required: false,
        }
    }

    pub fn error(serial: Serial, error_code: i32) -> Self {
        Self {
            serial,
            error_code,
            payload: None,
            ack_required: false,
        }
    }

    pub fn requiring_ack(mut self) -> Self {
        self.ack_required = true;
        self
    }
}

/// Handshake acknowledgement. Correlated only by connection and order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckFrame {}

/// Unsolicited event from a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicationFrame {
    pub domain: ServiceDomain,
    pub kind: IndicationKind,
    #[serde(default)]
    pub ack_required: bool,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Backend death notification, tagged with the generation it was linked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeathSignal {
    pub domain: ServiceDomain,
    pub generation_cookie: Generation,
}

/// Any frame a backend can send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    Response(ResponseFrame),
    Ack(AckFrame),
    Indication(IndicationFrame),
}

impl InboundFrame {
    /// Decode a JSON-encoded frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, GatewayError> {
        serde_json::from_slice(bytes).map_err(|e| GatewayError::Decode(e.to_string()))
    }

    pub fn encode(&self) -> Result<Vec<u8>, GatewayError> {
        serde_json::to_vec(self).map_err(|e| GatewayError::Decode(e.to_string()))
    }
}

/// Work item for the dispatch task.
#[derive(Debug)]
pub enum DispatchEvent {
    /// Decoded frame received on a connection
    Frame {
        domain: ServiceDomain,
        generation: Generation,
        frame: InboundFrame,
    },
    /// Undecoded bytes received on a connection
    Raw {
        domain: ServiceDomain,
        generation: Generation,
        bytes: Vec<u8>,
    },
    /// Backend died
    Death(DeathSignal),
    /// Reply once every earlier event has been handled
    Flush(oneshot::Sender<()>),
    /// Stop the dispatch task
    Stop,
}

/// Producer side of the dispatch queue, handed to transports.
#[derive(Debug, Clone)]
pub struct InboundSender {
    tx: mpsc::UnboundedSender<DispatchEvent>,
}

impl InboundSender {
    /// Create the dispatch queue.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DispatchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, event: DispatchEvent) -> Result<(), GatewayError> {
        self.tx
            .send(event)
            .map_err(|_| GatewayError::ShuttingDown)
    }

    pub fn frame(
        &self,
        domain: ServiceDomain,
        generation: Generation,
        frame: InboundFrame,
    ) -> Result<(), GatewayError> {
        self.send(DispatchEvent::Frame {
            domain,
            generation,
            frame,
        })
    }

    pub fn raw(
        &self,
        domain: ServiceDomain,
        generation: Generation,
        bytes: Vec<u8>,
    ) -> Result<(), GatewayError> {
        self.send(DispatchEvent::Raw {
            domain,
            generation,
            bytes,
        })
    }

    pub fn death(&self, signal: DeathSignal) -> Result<(), GatewayError> {
        self.send(DispatchEvent::Death(signal))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
