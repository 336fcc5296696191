//! Logging initialization

use tracing_subscriber::EnvFilter;

/// Initialize tracing with standard configuration
pub fn init_tracing() {
    init_tracing_with_level("info");
}

/// Initialize tracing at `level` unless `RUST_LOG` says otherwise
///
/// An unparseable level falls back to `info`.
pub fn init_tracing_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // A second init (tests, embedding) is not an error
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .try_init();
}
