//! # knot-socket core
//!
//! Connection lifecycle, frame codec and event routing for the KNoT cloud
//! WebSocket protocol.
//!
//! ## Example
//!
//! ```rust,ignore
//! use knot_socket::{ConnectionOptions, ClientEvent};
//!
//! #[tokio::main]
//! async fn main() -> knot_socket::Result<()> {
//!     let options = ConnectionOptions::new("ws.knot.cloud")
//!         .with_credentials("d4a7b3e1", "c0ffee");
//!
//!     let client = knot_socket::builder().options(options).build()?;
//!     let ready = client.subscribe("ready");
//!     let errors = client.subscribe("error");
//!
//!     client.connect().await?;
//!
//!     // Receive events
//!     while let Ok(event) = ready.recv() {
//!         println!("Event: {:?}", event);
//!     }
//!
//!     client.shutdown().await
//! }
//! ```

pub mod builder;
pub mod client;
pub mod codec;
pub mod commands;
pub mod config;
pub mod connection_state;
pub mod heartbeat;
pub mod lifecycle;
pub mod liveness;
pub mod router;
pub mod websocket;

// Re-export main types
pub use builder::{states, KnotClientBuilder};
pub use client::{KnotClient, Metrics};
pub use codec::Frame;
pub use commands::{Credentials, Request};
pub use config::{ConnectionOptions, Scheme, DEFAULT_PATH, DEFAULT_PORT};
pub use connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
pub use heartbeat::{KeepaliveMonitor, DEFAULT_IDLE_TIMEOUT, DEFAULT_KEEPALIVE_INTERVAL};
pub use lifecycle::Lifecycle;
pub use liveness::LivenessTracker;
pub use router::{ClientEvent, EventRouter};
pub use websocket::WsTransport;

// Re-export traits for convenience
pub use crate::traits::*;

/// Create a new KNoT client builder
///
/// # Example
/// ```ignore
/// let client = knot_socket::builder()
///     .options(ConnectionOptions::new("ws.knot.cloud").with_credentials(id, token))
///     .reconnect_strategy(ExponentialBackoff::new(1.0, 32.0))
///     .build()?;
/// ```
pub fn builder() -> KnotClientBuilder<builder::states::NoOptions> {
    KnotClientBuilder::new()
}
