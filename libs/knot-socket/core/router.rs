//! Event routing
//!
//! Turns decoded frames and raw transport notifications into [`ClientEvent`]s
//! and fans them out to subscribers.
//!
//! # Architecture
//!
//! ```text
//! TransportEvent ──(proxy table)──────────────┐
//!                                             ├──> EventRouter ──> "open"   subscribers
//! Frame ──route_frame──> Emit(ClientEvent) ───┘                ──> "error"  subscribers
//!                   └──> Reconnect (transient error code)      ──> "*"      subscribers
//! ```
//!
//! Subscribers are unbounded crossbeam channels; a subscriber whose receiver
//! was dropped is pruned on the next emit.

use super::codec::Frame;
use crate::traits::{is_transient_code, KnotError, TransportEvent};
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Fallback message for `error` frames that carry none
pub const DEFAULT_ERROR_MESSAGE: &str = "Unexpected error";

/// Event observed by callers
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Transport opened
    Open,
    /// Transport closed
    Close { code: u16, reason: String },
    /// Decode, protocol, transport, liveness or probe failure
    Error(KnotError),
    /// Handshake answered with a plain HTTP response
    UnexpectedResponse { status: u16 },
    /// Peer ping
    Ping(Vec<u8>),
    /// Peer pong
    Pong(Vec<u8>),
    /// A reconnect was scheduled
    Reconnect { attempt: u32, delay: Duration },
    /// Any decoded frame other than `error`
    Frame { kind: String, data: Value },
}

impl ClientEvent {
    /// Event name subscribers register for
    pub fn name(&self) -> &str {
        match self {
            ClientEvent::Open => "open",
            ClientEvent::Close { .. } => "close",
            ClientEvent::Error(_) => "error",
            ClientEvent::UnexpectedResponse { .. } => "unexpected-response",
            ClientEvent::Ping(_) => "ping",
            ClientEvent::Pong(_) => "pong",
            ClientEvent::Reconnect { .. } => "reconnect",
            ClientEvent::Frame { kind, .. } => kind,
        }
    }

    /// Re-emission of a proxied transport notification
    ///
    /// `Message` is not proxied; it goes through the codec instead.
    pub fn proxied(event: &TransportEvent) -> Option<Self> {
        match event {
            TransportEvent::Opened => Some(ClientEvent::Open),
            TransportEvent::Closed { code, reason } => Some(ClientEvent::Close {
                code: *code,
                reason: reason.clone(),
            }),
            TransportEvent::Error(err) => Some(ClientEvent::Error(KnotError::Transport(err.clone()))),
            TransportEvent::UnexpectedResponse { status } => {
                Some(ClientEvent::UnexpectedResponse { status: *status })
            }
            TransportEvent::Ping(payload) => Some(ClientEvent::Ping(payload.clone())),
            TransportEvent::Pong(payload) => Some(ClientEvent::Pong(payload.clone())),
            TransportEvent::Message(_) => None,
        }
    }
}

/// What to do with a decoded frame
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    /// Surface to subscribers
    Emit(ClientEvent),
    /// Recognised transient condition; reconnect instead of surfacing
    Reconnect { code: String },
}

/// Route a decoded frame
///
/// `raw` is the payload the frame was decoded from and is attached to
/// protocol errors for diagnostics.
pub fn route_frame(frame: Frame, raw: &str) -> Routed {
    if frame.kind != "error" {
        return Routed::Emit(ClientEvent::Frame {
            kind: frame.kind,
            data: frame.data,
        });
    }

    let code = match frame.data.get("code") {
        Some(Value::String(code)) => Some(code.clone()),
        Some(Value::Number(code)) => Some(code.to_string()),
        _ => None,
    };
    if is_transient_code(code.as_deref()) {
        return Routed::Reconnect {
            code: code.unwrap_or_default(),
        };
    }

    let message = frame
        .data
        .get("message")
        .and_then(Value::as_str)
        .filter(|message| !message.is_empty())
        .unwrap_or(DEFAULT_ERROR_MESSAGE)
        .to_string();

    Routed::Emit(ClientEvent::Error(KnotError::Protocol {
        message,
        code,
        frame: raw.to_string(),
    }))
}

/// Observer list keyed by event name
#[derive(Debug, Default)]
pub struct EventRouter {
    by_name: HashMap<String, Vec<Sender<ClientEvent>>>,
    all: Vec<Sender<ClientEvent>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive events named `name`
    pub fn subscribe(&mut self, name: impl Into<String>) -> Receiver<ClientEvent> {
        let (tx, rx) = unbounded();
        self.add_subscriber(Some(name.into()), tx);
        rx
    }

    /// Receive every event
    pub fn subscribe_all(&mut self) -> Receiver<ClientEvent> {
        let (tx, rx) = unbounded();
        self.add_subscriber(None, tx);
        rx
    }

    /// Register a sender created elsewhere
    pub fn add_subscriber(&mut self, name: Option<String>, tx: Sender<ClientEvent>) {
        match name {
            Some(name) => self.by_name.entry(name).or_default().push(tx),
            None => self.all.push(tx),
        }
    }

    /// Deliver an event to its named and catch-all subscribers
    pub fn emit(&mut self, event: ClientEvent) {
        if let Some(subscribers) = self.by_name.get_mut(event.name()) {
            subscribers.retain(|tx| tx.send(event.clone()).is_ok());
            if subscribers.is_empty() {
                self.by_name.remove(event.name());
            }
        }
        self.all.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.by_name.values().map(Vec::len).sum::<usize>() + self.all.len()
    }
}
