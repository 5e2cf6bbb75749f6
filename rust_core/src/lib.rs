//! Coinflow Core - shared building blocks for the price ingest service.
//!
//! This module provides:
//! - The normalized `PriceRecord` emitted on every tick
//! - A `PriceSource` trait and its CoinGecko client
//! - Azure identity, Key Vault and Event Hubs clients behind traits
//! - The `IngestError` taxonomy shared by all of the above

pub mod azure;
pub mod clients;
pub mod error;
pub mod models;
pub mod utils;

pub use error::{IngestError, IngestResult};
pub use models::{AssetPair, PairPrices, PriceRecord};
