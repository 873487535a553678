//! Sensor Hub Engine - Main Entry Point

use anyhow::Context;
use hub_service::{init_logging, load_config, run};
use std::path::PathBuf;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    info!("=== Sensor Hub Engine v{} ===", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    if let Some(path) = &config_path {
        info!("loading configuration from {}", path.display());
    }
    let cfg = load_config(config_path.as_deref()).context("loading configuration")?;

    run(cfg).await
}
