use std::future::IntoFuture;
use std::sync::Arc;

use chess_session::transport::Hub;
use relay_server::{config, relay, routes};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env();
    let hub = Arc::new(Hub::new(config.hub_config()));
    tracing::info!(
        history_limit = config.history_limit,
        channel_capacity = config.channel_capacity,
        "Hub ready"
    );

    let relay_addr = format!("{}:{}", config.host, config.port);
    let relay_listener = tokio::net::TcpListener::bind(&relay_addr).await?;
    tracing::info!("Relay listening on {relay_addr}");

    let http_addr = format!("{}:{}", config.host, config.http_port);
    let http_listener = tokio::net::TcpListener::bind(&http_addr).await?;
    tracing::info!("HTTP API listening on {http_addr}");

    let app = routes::router(hub.clone());
    tokio::select! {
        result = relay::serve(relay_listener, hub) => result?,
        result = axum::serve(http_listener, app).into_future() => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
    }
    Ok(())
}
