//! price_ingest_rust - Scheduled BTC/ETH spot price ingest into Azure Event Hubs

pub mod config;
pub mod ingestor;
pub mod scheduler;

pub use config::IngestorConfig;
pub use ingestor::PriceIngestor;
