//! Transport contract
//!
//! The lifecycle never touches sockets directly. It asks a [`Transport`] for a
//! fresh [`TransportHandle`] on every connect, and the transport reports what
//! happens on that handle through an [`EventSink`]:
//!
//! ```text
//! Lifecycle ──open(uri)──> Transport ──> TransportHandle (send / ping / close)
//!     ↑                        │
//!     └──── (generation, TransportEvent) ── EventSink
//! ```
//!
//! Each sink is stamped with the generation of the handle it belongs to, so
//! notifications from a retired handle can be recognised and dropped.

use super::error::{Result, TransportError};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use url::Url;

/// Normal closure disposition code
pub const CLOSE_NORMAL: u16 = 1000;

/// Close frame carried no status code
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Connection dropped without a close frame
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Notification delivered by a transport handle
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The opening handshake completed
    Opened,
    /// A text payload arrived
    Message(String),
    /// The connection is gone; `code` is the close disposition
    Closed { code: u16, reason: String },
    /// Transport-level failure
    Error(TransportError),
    /// The peer sent a ping
    Ping(Vec<u8>),
    /// The peer acknowledged a ping
    Pong(Vec<u8>),
    /// The server answered the handshake with a non-upgrade HTTP response
    UnexpectedResponse { status: u16 },
}

/// Options applied when opening a transport handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOptions {
    /// Upper bound for the opening handshake
    pub connect_timeout: Duration,
    /// Subprotocol advertised during the handshake
    pub protocol: Option<String>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            protocol: None,
        }
    }
}

/// Where a transport handle reports its notifications
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: UnboundedSender<(u64, TransportEvent)>,
}

impl EventSink {
    pub fn new(generation: u64, tx: UnboundedSender<(u64, TransportEvent)>) -> Self {
        Self { generation, tx }
    }

    /// Generation of the handle this sink belongs to
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Deliver a notification
    ///
    /// Returns `false` once the lifecycle has gone away.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx.send((self.generation, event)).is_ok()
    }
}

/// An open (or opening) duplex message channel
///
/// Handles are owned exclusively by the lifecycle and are never reused
/// after `close`.
pub trait TransportHandle: Send {
    /// Send a text payload
    fn send(&mut self, payload: String) -> Result<()>;

    /// Whether this handle has an active liveness probe primitive
    fn supports_ping(&self) -> bool {
        false
    }

    /// Send a liveness probe
    fn ping(&mut self) -> Result<()> {
        Err(TransportError::new("ping is not supported by this transport").into())
    }

    /// Close the handle
    ///
    /// Must be idempotent.
    fn close(&mut self);
}

/// Factory for transport handles
pub trait Transport: Send + 'static {
    /// Start opening a handle against `uri`
    ///
    /// Returns immediately; completion is reported as [`TransportEvent::Opened`]
    /// (or an error and [`TransportEvent::Closed`]) through `sink`.
    fn open(
        &mut self,
        uri: &Url,
        options: &OpenOptions,
        sink: EventSink,
    ) -> Result<Box<dyn TransportHandle>>;
}
