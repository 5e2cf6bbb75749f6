pub mod coingecko;
pub mod crypto_price;

// Re-export commonly used types
pub use coingecko::CoinGeckoClient;
pub use crypto_price::PriceSource;
