//! Station Temperature Server - Main Entry Point
//!
//! Usage: `station-server [CONFIG_FILE]`

use anyhow::Context;
use api::config::AppConfig;
use api::{init_logging, init_metrics, run_server};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args().nth(1);
    let config = AppConfig::load(path.as_deref()).context("loading configuration")?;

    init_logging(&config.logging).context("installing tracing subscriber")?;

    info!("=== Station Server v{} ===", env!("CARGO_PKG_VERSION"));

    let metrics = match init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Prometheus recorder unavailable: {}", e);
            None
        }
    };

    run_server(config, metrics).await
}
