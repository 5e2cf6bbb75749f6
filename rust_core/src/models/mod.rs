// Shared models for Coinflow Rust services
use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Source tag stamped on every record.
pub const SOURCE_COINGECKO: &str = "coingecko";

/// Quote currency requested from the upstream.
pub const VS_CURRENCY: &str = "usd";

// ============================================================================
// Asset Pairs
// ============================================================================

/// The two pairs the ingestor tracks. Adding a pair means adding a field to
/// [`PairPrices`] as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetPair {
    BtcUsd,
    EthUsd,
}

impl AssetPair {
    pub const ALL: [AssetPair; 2] = [AssetPair::BtcUsd, AssetPair::EthUsd];

    /// CoinGecko coin id for the base asset
    pub fn coin_id(&self) -> &'static str {
        match self {
            AssetPair::BtcUsd => "bitcoin",
            AssetPair::EthUsd => "ethereum",
        }
    }

    /// Coin ids of all tracked pairs, in request order.
    pub fn coin_ids() -> Vec<&'static str> {
        Self::ALL.iter().map(|p| p.coin_id()).collect()
    }
}

// ============================================================================
// Price Record
// ============================================================================

/// Prices keyed by pair. Both keys are always serialized; a missing quote is
/// `null`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PairPrices {
    pub btc_usd: Option<f64>,
    pub eth_usd: Option<f64>,
}

impl PairPrices {
    fn set(&mut self, pair: AssetPair, price: Option<f64>) {
        match pair {
            AssetPair::BtcUsd => self.btc_usd = price,
            AssetPair::EthUsd => self.eth_usd = price,
        }
    }

    /// Flatten a `/simple/price` body into the two tracked pairs.
    ///
    /// Reads `<coin_id>.usd` for each pair. Anything missing, null or
    /// non-numeric along that path becomes `None`; the body shape is not
    /// otherwise validated.
    pub fn from_simple_price(body: &Value) -> Self {
        let mut prices = Self::default();
        for pair in AssetPair::ALL {
            let price = body
                .get(pair.coin_id())
                .and_then(|coin| coin.get(VS_CURRENCY))
                .and_then(Value::as_f64);
            prices.set(pair, price);
        }
        prices
    }
}

/// One normalized price snapshot, built fresh for each tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    /// UTC wall clock at assembly time, without offset
    #[serde(with = "naive_iso")]
    pub ts_utc: NaiveDateTime,
    pub source: String,
    pub prices: PairPrices,
}

impl PriceRecord {
    pub fn new(prices: PairPrices, at: DateTime<Utc>) -> Self {
        Self {
            ts_utc: at.naive_utc().trunc_subsecs(6),
            source: SOURCE_COINGECKO.to_string(),
            prices,
        }
    }

    /// Build a record stamped with the current time from an upstream body.
    pub fn from_simple_price(body: &Value) -> Self {
        Self::new(PairPrices::from_simple_price(body), Utc::now())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// `YYYY-MM-DDTHH:MM:SS.ffffff`, UTC, no offset suffix.
pub mod naive_iso {
    use chrono::NaiveDateTime;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

    pub fn serialize<S>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&ts.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S%.f").map_err(serde::de::Error::custom)
    }
}
