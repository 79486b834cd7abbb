use std::net::SocketAddr;
use std::sync::Arc;

use roulette_bridge::start_server;
use roulette_core::telemetry::init_logging;
use roulette_core::{ItemExtractor, RouletteConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env is optional
    let _ = dotenvy::dotenv();
    init_logging();

    // Load configuration (defaults + env + optional TOML overlay)
    let cfg = RouletteConfig::load();
    let extractor = ItemExtractor::from_config(cfg)?;

    let addr: SocketAddr = std::env::var("ROULETTE_BIND_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:5000".into())
        .parse()?;

    tracing::info!("Voice-to-Roulette backend listening on http://{}", addr);
    start_server(addr, Arc::new(extractor))
        .await
        .map_err(|e| e.into())
}
