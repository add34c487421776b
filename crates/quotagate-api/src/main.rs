//! QuotaGate server

use anyhow::Context;
use quotagate_api::{build_router, AppState, PlaceholderSuggestions};
use quotagate_core::{Gate, GateConfig};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("QUOTAGATE_CONFIG").unwrap_or_else(|_| "quotagate.toml".into());
    let config = GateConfig::load(Some(&config_path))
        .with_context(|| format!("loading configuration from {config_path}"))?;

    let gate = Gate::from_config(&config).context("initializing gate")?;
    let state = AppState::new(gate, Arc::new(PlaceholderSuggestions::default()));
    let app = build_router(state);

    let addr = config.server.bind_addr.as_str();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(
        addr,
        free_daily_limit = config.quota.free_daily_limit,
        "QuotaGate listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("QuotaGate stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
