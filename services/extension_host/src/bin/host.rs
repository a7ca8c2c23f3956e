//! services/extension_host/src/bin/host.rs
//!
//! Started by the browser as a native-messaging host. Stdout carries frames, so
//! logs go to stderr.

use extension_host::{Bridge, Config, Host, HostError};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), HostError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    info!("Configuration loaded. Starting extension host...");

    // --- 2. Storage & Background Context ---
    let host = Host::start(&config).await?;
    let shutdown = host.shutdown_token();

    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, shutting down.");
            on_signal.cancel();
        }
    });

    // --- 3. Serve the Browser ---
    let result = Bridge::new(host.router().clone())
        .run(tokio::io::stdin(), tokio::io::stdout(), shutdown)
        .await;

    // --- 4. Cleanup ---
    host.stop().await;
    result
}
