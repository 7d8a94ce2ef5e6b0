/// Main entry point for the quote ingestion worker
use anyhow::Context;
use tracing::info;

use quoteflow::{config::load_config_from_env, logging::init_tracing, worker::Worker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config_from_env().context("loading configuration")?;
    init_tracing(&config.log_level, &config.log_format);

    info!("Starting quote worker for {}", config.symbols.join(", "));

    let worker = Worker::from_config(config)
        .await
        .context("initializing worker")?;

    worker.run().await?;

    Ok(())
}
