//! # knot-socket
//!
//! A persistent WebSocket client for the KNoT cloud `{type, data}` frame
//! protocol.
//!
//! ## Features
//!
//! - **Single-owner lifecycle**: one task drives connect, identity, keepalive and reconnect
//! - **Type-state builder**: connection options are required at compile time
//! - **Jittered backoff**: exponential reconnect delays that reset after a successful identity
//! - **Event fan-out**: named and catch-all subscriptions over crossbeam channels
//! - **Pluggable transport**: tokio-tungstenite by default, any [`Transport`] in tests

pub mod traits;
pub mod core;

// Re-export all traits
pub use traits::*;

// Re-export core client functionality
pub use self::core::{
    builder, client, codec, commands, config, connection_state, heartbeat, lifecycle, liveness,
    router, websocket,
    builder::{states, KnotClientBuilder},
    client::{KnotClient, Metrics},
    codec::Frame,
    commands::{Credentials, Request},
    config::{ConnectionOptions, Scheme},
    connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState},
    router::ClientEvent,
    websocket::WsTransport,
};

// Convenience function
pub use self::core::builder as client_builder;
