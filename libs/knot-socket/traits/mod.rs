//! # knot-socket traits
//!
//! The seams of the client:
//!
//! - **Transport**: open a duplex message channel and report its notifications
//! - **ReconnectionStrategy**: decide how long to wait before reconnecting
//! - **KnotError**: the error domain shared by every layer
//!
//! ## Example
//!
//! ```rust,ignore
//! use knot_socket::traits::*;
//!
//! struct Loopback;
//!
//! impl Transport for Loopback {
//!     fn open(
//!         &mut self,
//!         uri: &Url,
//!         options: &OpenOptions,
//!         sink: EventSink,
//!     ) -> Result<Box<dyn TransportHandle>> {
//!         sink.emit(TransportEvent::Opened);
//!         Ok(Box::new(LoopbackHandle { sink }))
//!     }
//! }
//! ```

pub mod error;
pub mod reconnect;
pub mod transport;

// Re-export commonly used types
pub use error::{
    is_transient_code, KnotError, Result, TransportError, CONNECTION_REFUSED, HANDSHAKE_TIMEOUT,
    PROBE_TIMEOUT,
};
pub use reconnect::{
    ExponentialBackoff, ReconnectionStrategy, FIRST_RETRY_WINDOW, MAX_BACKOFF_SECS,
};
pub use transport::{
    EventSink, OpenOptions, Transport, TransportEvent, TransportHandle, CLOSE_ABNORMAL,
    CLOSE_NORMAL, CLOSE_NO_STATUS,
};
