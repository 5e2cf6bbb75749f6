//! Crypto Price Source Trait
//!
//! Defines the interface the ingestor uses to pull spot quotes. The production
//! implementation is [`CoinGeckoClient`](super::coingecko::CoinGeckoClient);
//! tests substitute in-memory fakes.

use crate::error::IngestResult;
use async_trait::async_trait;
use serde_json::Value;

/// Common trait for spot price sources
///
/// Implementations must be Send + Sync for use in async contexts.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Get the provider's display name (e.g., "CoinGecko")
    fn provider_name(&self) -> &str;

    /// Fetch spot prices for several coins in one request
    ///
    /// # Arguments
    /// * `coin_ids` - Provider-specific coin ids, e.g. `["bitcoin", "ethereum"]`
    /// * `vs_currency` - Quote currency, e.g. `"usd"`
    ///
    /// # Returns
    /// * `Ok(Value)` - The decoded JSON body, shape not validated
    /// * `Err(IngestError::Upstream)` - Non-2xx status, timeout, transport failure or non-JSON body
    async fn simple_price(&self, coin_ids: &[&str], vs_currency: &str) -> IngestResult<Value>;
}
