use anyhow::Result;
use knot_cloud_client::bin_common::{
    init_tracing_with_level, load_config_from_env, parse_args, ClientConfig, ShutdownManager,
};
use knot_cloud_client::knot_socket::{self, ClientEvent};
use std::time::Duration;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load config first (before logging is initialized)
    let args = parse_args();
    let config_path = load_config_from_env(&args);
    let config = ClientConfig::load(&config_path)?;

    // Initialize logging with configured level
    init_tracing_with_level(&config.log_level);
    config.log();

    let shutdown = ShutdownManager::new();
    shutdown.spawn_signal_handler();

    let client = knot_socket::builder()
        .options(config.connection.clone())
        .build()?;
    let events = client.subscribe_all();

    print_banner("KNoT cloud client", &config);
    client.connect().await?;

    // Subscribers are crossbeam receivers; drain them off the runtime
    let printer = tokio::task::spawn_blocking(move || {
        while let Ok(event) = events.recv() {
            log_event(&event);
        }
    });

    shutdown.wait().await;

    let metrics = client.metrics();
    client.shutdown().await?;
    if tokio::time::timeout(Duration::from_secs(1), printer).await.is_err() {
        warn!("Event printer did not stop in time");
    }

    print_shutdown(
        "KNoT cloud client",
        &format!(
            "Frames sent: {}, received: {}, reconnects: {}",
            metrics.frames_sent, metrics.frames_received, metrics.reconnect_count
        ),
    );
    Ok(())
}

fn log_event(event: &ClientEvent) {
    match event {
        ClientEvent::Open => info!("Connection open"),
        ClientEvent::Close { code, reason } => info!(code, "Connection closed: {}", reason),
        ClientEvent::Error(e) => error!("Error: {}", e),
        ClientEvent::UnexpectedResponse { status } => warn!(status, "Unexpected response"),
        ClientEvent::Reconnect { attempt, delay } => {
            info!(attempt, "Reconnecting in {:?}", delay)
        }
        ClientEvent::Ping(_) | ClientEvent::Pong(_) => {}
        ClientEvent::Frame { kind, data } => info!("[{}] {}", kind, data),
    }
}

fn print_banner(name: &str, config: &ClientConfig) {
    info!("");
    info!("========================================");
    info!("Starting {}", name);
    info!("Device: {}", config.connection.id);
    info!("Press Ctrl+C to stop");
    info!("========================================");
    info!("");
}

fn print_shutdown(name: &str, stats: &str) {
    info!("");
    info!("========================================");
    info!("{} stopped gracefully", name);
    info!("{}", stats);
    info!("========================================");
}
