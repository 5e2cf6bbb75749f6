//! Configuration for price_ingest_rust
//!
//! Read once at startup and passed into the ingestor; ticks never consult the
//! environment themselves.

use coinflow_rust_core::azure::KeyVaultClient;
use coinflow_rust_core::clients::coingecko::{COINGECKO_API, DEFAULT_TIMEOUT_SECS};
use coinflow_rust_core::{IngestError, IngestResult};
use std::env;
use std::time::Duration;

/// Every minute at second zero
pub const DEFAULT_SCHEDULE: &str = "0 */1 * * * *";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestorConfig {
    // Destination
    pub keyvault_name: String,
    pub eventhub_secret_name: String,
    pub eventhub_name: String,

    // Trigger
    pub schedule: String,
    pub run_on_startup: bool,
    pub run_once: bool,

    // Upstream
    pub coingecko_base_url: String,
    pub coingecko_timeout_secs: u64,
}

impl IngestorConfig {
    pub fn from_env() -> IngestResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> IngestResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let keyvault_name = required(&get, "KEYVAULT_NAME")?;
        let eventhub_secret_name = required(&get, "EVENTHUB_SECRET_NAME")?;
        let eventhub_name = required(&get, "EVENTHUB_NAME")?;

        validate_vault_name(&keyvault_name)?;

        let coingecko_timeout_secs = parse_u64(&get, "COINGECKO_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;
        if coingecko_timeout_secs == 0 {
            return Err(IngestError::Configuration(
                "COINGECKO_TIMEOUT_SECS must be > 0".to_string(),
            ));
        }

        Ok(Self {
            keyvault_name,
            eventhub_secret_name,
            eventhub_name,

            schedule: get("INGEST_SCHEDULE").unwrap_or_else(|| DEFAULT_SCHEDULE.to_string()),
            run_on_startup: parse_bool(&get, "INGEST_RUN_ON_STARTUP", false)?,
            run_once: parse_bool(&get, "INGEST_RUN_ONCE", false)?,

            coingecko_base_url: get("COINGECKO_BASE_URL").unwrap_or_else(|| COINGECKO_API.to_string()),
            coingecko_timeout_secs,
        })
    }

    pub fn vault_url(&self) -> String {
        KeyVaultClient::vault_url_for(&self.keyvault_name)
    }

    pub fn coingecko_timeout(&self) -> Duration {
        Duration::from_secs(self.coingecko_timeout_secs)
    }
}

fn required<F>(get: &F, var_name: &str) -> IngestResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    get(var_name).ok_or_else(|| IngestError::Configuration(format!("{} must be set", var_name)))
}

/// Key Vault names: 3-24 chars of ASCII letters, digits and hyphens
fn validate_vault_name(name: &str) -> IngestResult<()> {
    let valid_chars = name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !(3..=24).contains(&name.len()) || !valid_chars {
        return Err(IngestError::Configuration(format!(
            "KEYVAULT_NAME '{}' is not a valid vault name",
            name
        )));
    }
    Ok(())
}

/// Parse environment variable as u64 with default fallback
fn parse_u64<F>(get: &F, var_name: &str, default: u64) -> IngestResult<u64>
where
    F: Fn(&str) -> Option<String>,
{
    match get(var_name) {
        Some(val) => val
            .parse()
            .map_err(|_| IngestError::Configuration(format!("{} must be a valid u64", var_name))),
        None => Ok(default),
    }
}

/// Parse environment variable as bool (`true/false/1/0/yes/no`) with default fallback
fn parse_bool<F>(get: &F, var_name: &str, default: bool) -> IngestResult<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match get(var_name).map(|v| v.to_lowercase()) {
        Some(val) => match val.as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => Err(IngestError::Configuration(format!("{} must be a boolean", var_name))),
        },
        None => Ok(default),
    }
}
