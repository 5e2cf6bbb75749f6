use anyhow::{Context, Result};
use dotenv::dotenv;
use price_ingest_rust::{scheduler, IngestorConfig, PriceIngestor};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting price_ingest_rust...");

    let config = IngestorConfig::from_env().context("Invalid configuration")?;
    info!(
        "Key Vault: {}, secret: {}, event hub: {}",
        config.vault_url(),
        config.eventhub_secret_name,
        config.eventhub_name
    );

    let ingestor = Arc::new(
        PriceIngestor::from_config(&config).context("Failed to initialize ingestor")?,
    );

    if config.run_once {
        scheduler::run_tick(ingestor)
            .await
            .context("Ingest tick failed")?;
        return Ok(());
    }

    if config.run_on_startup {
        // A failed startup tick is logged and the scheduler still starts
        scheduler::run_tick(ingestor.clone()).await.ok();
    }

    let mut sched = scheduler::start(&config.schedule, ingestor)
        .await
        .context("Failed to start scheduler")?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutting down...");
    sched
        .shutdown()
        .await
        .context("Failed to stop scheduler")?;

    Ok(())
}
