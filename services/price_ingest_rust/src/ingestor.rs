//! PriceIngestor: one tick of secret fetch, price fetch and publish
//!
//! Steps run strictly in order and the first failure ends the tick:
//! 1. Resolve the Event Hubs connection string from Key Vault
//! 2. Fetch BTC and ETH spot prices from CoinGecko
//! 3. Flatten them into a `PriceRecord`
//! 4. Open a producer, send the record as one event, close the producer

use crate::config::IngestorConfig;
use coinflow_rust_core::azure::{
    ChainedCredential, EventHubSink, EventProducer, EventSink, KeyVaultClient, SecretStore,
    TokenCredential,
};
use coinflow_rust_core::clients::{CoinGeckoClient, PriceSource};
use coinflow_rust_core::models::{AssetPair, PriceRecord, VS_CURRENCY};
use coinflow_rust_core::{IngestError, IngestResult};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct PriceIngestor {
    secrets: Arc<dyn SecretStore>,
    prices: Arc<dyn PriceSource>,
    sink: Arc<dyn EventSink>,
    secret_name: String,
    event_hub: String,
}

impl PriceIngestor {
    pub fn new(
        config: &IngestorConfig,
        secrets: Arc<dyn SecretStore>,
        prices: Arc<dyn PriceSource>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            secrets,
            prices,
            sink,
            secret_name: config.eventhub_secret_name.clone(),
            event_hub: config.eventhub_name.clone(),
        }
    }

    /// Wire the production collaborators: ambient Azure identity, Key Vault,
    /// CoinGecko and Event Hubs.
    pub fn from_config(config: &IngestorConfig) -> IngestResult<Self> {
        let credential = Arc::new(ChainedCredential::from_env()?);
        info!("Using {} for Key Vault access", credential.credential_name());

        let secrets = Arc::new(KeyVaultClient::with_vault_url(&config.vault_url(), credential)?);
        let prices = Arc::new(CoinGeckoClient::with_base_url(
            &config.coingecko_base_url,
            config.coingecko_timeout(),
        )?);
        let sink = Arc::new(EventHubSink::new());

        Ok(Self::new(config, secrets, prices, sink))
    }

    /// Run a single tick and return the record that was published
    pub async fn run_once(&self) -> IngestResult<PriceRecord> {
        info!("crypto_ingest_timer triggered");

        let connection_string = self.secrets.get_secret(&self.secret_name).await?;
        debug!("Resolved connection string from secret '{}'", self.secret_name);

        debug!("Fetching spot prices from {}", self.prices.provider_name());
        let body = self
            .prices
            .simple_price(&AssetPair::coin_ids(), VS_CURRENCY)
            .await?;

        let record = PriceRecord::from_simple_price(&body);
        let payload = record
            .to_json()
            .map_err(|e| IngestError::Publish(format!("Failed to serialize record: {}", e)))?;

        self.publish(connection_string.expose(), payload.clone()).await?;

        info!("Sent: {}", payload);
        Ok(record)
    }

    /// Send one message on a producer that lives only for this call.
    ///
    /// The producer is closed whether or not the send succeeded. A send
    /// failure takes precedence over a close failure.
    async fn publish(&self, connection_string: &str, payload: String) -> IngestResult<()> {
        let mut producer = self.sink.open(connection_string, &self.event_hub).await?;
        debug!("Publishing to event hub '{}'", producer.event_hub());

        let sent = producer.send(payload).await;
        let closed = producer.close().await;

        match (sent, closed) {
            (Err(send_err), Err(close_err)) => {
                warn!("Producer close failed after send error: {}", close_err);
                Err(send_err)
            }
            (Err(send_err), Ok(())) => Err(send_err),
            (Ok(()), closed) => closed,
        }
    }
}
