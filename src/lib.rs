//! KNoT cloud client - Main Library
//!
//! This crate wires the `knot-socket` library into a runnable client.
//!
//! ## Architecture
//!
//! - **bin_common**: Common utilities for binary executables (CLI, config, logging, shutdown)
//! - **knot_socket**: Connection lifecycle and frame protocol (re-exported from workspace)
//!
//! ## Usage in Binaries
//!
//! ```rust
//! use knot_cloud_client::bin_common::{load_config_from_env, ClientConfig};
//! use knot_cloud_client::knot_socket::ConnectionOptions;
//! ```

// Re-export workspace libraries for convenience
pub use knot_socket;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod config;
    pub mod logging;
    pub mod shutdown;

    pub use cli::{load_config_from_env, parse_args, CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH};
    pub use config::{ClientConfig, ConfigError};
    pub use logging::{init_tracing, init_tracing_with_level};
    pub use shutdown::ShutdownManager;
}
