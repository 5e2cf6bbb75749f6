//! CoinGecko API Client
//!
//! Fetches spot prices from the public `/simple/price` endpoint. One request
//! per call, bounded by a timeout, never retried.

use super::crypto_price::PriceSource;
use crate::error::{IngestError, IngestResult};
use crate::utils::text::{truncate_body, MAX_ERROR_BODY};
use async_trait::async_trait;
use reqwest::{Client, Request};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub const COINGECKO_API: &str = "https://api.coingecko.com/api/v3";

/// Upper bound on a single price request, connect through body.
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// CoinGecko API client
#[derive(Debug, Clone)]
pub struct CoinGeckoClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl CoinGeckoClient {
    /// Create a client against `base_url` (normally [`COINGECKO_API`])
    pub fn with_base_url(base_url: &str, timeout: Duration) -> IngestResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("Coinflow/1.0")
            .build()
            .map_err(|e| {
                IngestError::Configuration(format!("Failed to create HTTP client for CoinGecko: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    /// Build the `/simple/price` request without sending it
    fn build_simple_price_request(
        &self,
        coin_ids: &[&str],
        vs_currency: &str,
    ) -> IngestResult<Request> {
        let ids = coin_ids.join(",");
        self.client
            .get(format!("{}/simple/price", self.base_url))
            .query(&[("ids", ids.as_str()), ("vs_currencies", vs_currency)])
            .build()
            .map_err(|e| IngestError::Upstream(format!("Invalid CoinGecko request: {}", e)))
    }

    fn transport_error(&self, e: reqwest::Error) -> IngestError {
        if e.is_timeout() {
            IngestError::Upstream(format!(
                "CoinGecko request timed out after {}s",
                self.timeout.as_secs()
            ))
        } else {
            IngestError::Upstream(format!("Failed to fetch from CoinGecko: {}", e))
        }
    }
}

#[async_trait]
impl PriceSource for CoinGeckoClient {
    fn provider_name(&self) -> &str {
        "CoinGecko"
    }

    async fn simple_price(&self, coin_ids: &[&str], vs_currency: &str) -> IngestResult<Value> {
        let request = self.build_simple_price_request(coin_ids, vs_currency)?;

        debug!("Fetching {} prices from {}", coin_ids.len(), request.url());

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| self.transport_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = truncate_body(response.text().await.unwrap_or_default(), MAX_ERROR_BODY);
            return Err(IngestError::Upstream(format!(
                "CoinGecko API error: {} - {}",
                status, body
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?;

        serde_json::from_slice(&bytes)
            .map_err(|e| IngestError::Upstream(format!("Failed to parse CoinGecko response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssetPair, PairPrices, VS_CURRENCY};
    use crate::utils::mock_http::serve_once;

    fn public_client() -> CoinGeckoClient {
        CoinGeckoClient::with_base_url(COINGECKO_API, Duration::from_secs(DEFAULT_TIMEOUT_SECS)).unwrap()
    }

    #[test]
    fn test_simple_price_request() {
        let request = public_client()
            .build_simple_price_request(&AssetPair::coin_ids(), VS_CURRENCY)
            .unwrap();

        assert_eq!(request.method(), &reqwest::Method::GET);
        assert_eq!(
            request.url().as_str(),
            "https://api.coingecko.com/api/v3/simple/price?ids=bitcoin%2Cethereum&vs_currencies=usd"
        );
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client =
            CoinGeckoClient::with_base_url("http://localhost:8080/api/", Duration::from_secs(1))
                .unwrap();
        let request = client.build_simple_price_request(&["bitcoin"], "usd").unwrap();
        assert_eq!(request.url().path(), "/api/simple/price");
    }

    #[tokio::test]
    async fn test_simple_price_returns_body() {
        let server = serve_once(200, r#"{"bitcoin":{"usd":65000.12},"ethereum":{"usd":3400.5}}"#).await;
        let client = CoinGeckoClient::with_base_url(&server.url, Duration::from_secs(5)).unwrap();

        let body = client
            .simple_price(&AssetPair::coin_ids(), VS_CURRENCY)
            .await
            .unwrap();
        let prices = PairPrices::from_simple_price(&body);
        assert_eq!(prices.btc_usd, Some(65000.12));
        assert_eq!(prices.eth_usd, Some(3400.5));

        let request = server.request().await;
        assert!(request.starts_with("GET /simple/price?ids=bitcoin%2Cethereum&vs_currencies=usd "));
    }

    #[tokio::test]
    async fn test_server_error_is_upstream_error() {
        let server = serve_once(500, r#"{"error":"internal"}"#).await;
        let client = CoinGeckoClient::with_base_url(&server.url, Duration::from_secs(5)).unwrap();

        match client.simple_price(&AssetPair::coin_ids(), VS_CURRENCY).await {
            Err(IngestError::Upstream(msg)) => {
                assert!(msg.contains("500"));
                assert!(msg.contains("internal"));
            }
            other => panic!("expected upstream error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_json_body_is_upstream_error() {
        let server = serve_once(200, "<html>rate limited</html>").await;
        let client = CoinGeckoClient::with_base_url(&server.url, Duration::from_secs(5)).unwrap();

        match client.simple_price(&AssetPair::coin_ids(), VS_CURRENCY).await {
            Err(IngestError::Upstream(msg)) => assert!(msg.contains("parse")),
            other => panic!("expected upstream error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_host_is_upstream_error() {
        let client =
            CoinGeckoClient::with_base_url("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = client.simple_price(&["bitcoin"], "usd").await.unwrap_err();
        assert!(matches!(err, IngestError::Upstream(_)));
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_simple_price_live() {
        let body = public_client()
            .simple_price(&AssetPair::coin_ids(), VS_CURRENCY)
            .await
            .unwrap();
        let prices = PairPrices::from_simple_price(&body);
        assert!(prices.btc_usd.unwrap_or_default() > 0.0);
        assert!(prices.eth_usd.unwrap_or_default() > 0.0);
    }
}
