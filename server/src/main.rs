//! Fanout server binary.
//!
//! Entry point for the WebSocket fan-out server.

use fanout_server::{AppState, Server, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,fanout_hub=debug,fanout_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env()?;
    let state = AppState::from_config(&config)?;

    tracing::info!(
        addr = %config.addr(),
        channels = ?config.hub.channels,
        default_channel = %config.default_channel,
        "Starting fanout server"
    );

    let server = Server::new(config, state);
    server.run().await?;

    Ok(())
}
