// =============================================================================
// FxPulse — Main Entry Point
// =============================================================================
//
// Streaming forex engine: Tiingo tick ingest -> candle aggregation + price
// alerts -> WebSocket fan-out, with a REST facade for queries and alert CRUD.
// Everything is in-memory and rebuilt from the upstream feed on restart.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod alerts;
mod api;
mod engine;
mod hub;
mod indicators;
mod market_data;
mod runtime_config;
mod tiingo;

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::engine::FxEngine;
use crate::runtime_config::RuntimeConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║              FxPulse Engine — Starting Up               ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let mut config = RuntimeConfig::load("fxpulse.json").unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });

    if let Ok(addr) = std::env::var("FXPULSE_BIND_ADDR") {
        config.bind_addr = addr;
    }

    // Missing API key is the one fatal configuration error: without it the
    // upstream handshake can never succeed.
    let api_key = std::env::var("TIINGO_API_KEY").unwrap_or_default();
    if api_key.is_empty() {
        anyhow::bail!("TIINGO_API_KEY is not set — cannot subscribe to the quote feed");
    }

    info!(
        upstream = %config.tiingo_ws_url,
        bind = %config.bind_addr,
        reconnect_delay_secs = config.reconnect_delay_secs,
        "configuration loaded"
    );

    // ── 2. Build the engine ──────────────────────────────────────────────
    let (engine, tick_rx) = FxEngine::new(config.clone(), api_key);

    // ── 3. Tick pipeline ─────────────────────────────────────────────────
    let pipeline_engine = engine.clone();
    tokio::spawn(async move {
        pipeline_engine.run_pipeline(tick_rx).await;
    });

    // ── 4. Upstream ingest (supervised reconnect loop) ───────────────────
    let ingestor = engine.ingestor.clone();
    tokio::spawn(async move {
        ingestor.run().await;
    });

    // ── 5. REST / WebSocket server ───────────────────────────────────────
    let api_engine = engine.clone();
    let bind_addr = config.bind_addr.clone();
    tokio::spawn(async move {
        let app = api::rest::router(api_engine);
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .expect("Failed to bind API server");
        info!(addr = %bind_addr, "API server listening");
        axum::serve(listener, app).await.expect("API server failed");
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 6. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");

    engine.ingestor.stop();

    info!("FxPulse shut down complete.");
    Ok(())
}
