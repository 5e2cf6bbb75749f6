//! Azure Key Vault secret client.
//!
//! Reads the current version of a named secret over the Key Vault REST API,
//! authenticating with a bearer token from an injected [`TokenCredential`].

use super::credential::TokenCredential;
use crate::error::{classify_vault_status, IngestError, IngestResult};
use crate::utils::text::{truncate_body, MAX_ERROR_BODY};
use async_trait::async_trait;
use reqwest::{Client, Request};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Token audience for Key Vault
pub const KEYVAULT_RESOURCE: &str = "https://vault.azure.net";
const KEYVAULT_API_VERSION: &str = "7.4";
const KEYVAULT_TIMEOUT_SECS: u64 = 15;

/// A secret's value. `Debug` never prints the contents.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretValue(<redacted>)")
    }
}

/// Named-secret lookup
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch the current value of `name`
    ///
    /// # Returns
    /// * `Err(IngestError::Auth)` - Identity could not get a token or lacks access
    /// * `Err(IngestError::NotFound)` - No such secret
    async fn get_secret(&self, name: &str) -> IngestResult<SecretValue>;
}

#[derive(Debug, Deserialize)]
struct SecretBundle {
    value: Option<String>,
}

/// Key Vault client bound to one vault
pub struct KeyVaultClient {
    client: Client,
    vault_url: String,
    credential: Arc<dyn TokenCredential>,
}

impl fmt::Debug for KeyVaultClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyVaultClient")
            .field("vault_url", &self.vault_url)
            .field("credential", &self.credential.credential_name())
            .finish()
    }
}

impl KeyVaultClient {
    /// `https://{vault_name}.vault.azure.net`
    pub fn vault_url_for(vault_name: &str) -> String {
        format!("https://{}.vault.azure.net", vault_name)
    }

    /// Create a client for an explicit vault URL
    pub fn with_vault_url(vault_url: &str, credential: Arc<dyn TokenCredential>) -> IngestResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(KEYVAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                IngestError::Configuration(format!("Failed to create HTTP client for Key Vault: {}", e))
            })?;

        Ok(Self {
            client,
            vault_url: vault_url.trim_end_matches('/').to_string(),
            credential,
        })
    }

    pub fn vault_url(&self) -> &str {
        &self.vault_url
    }

    fn build_get_secret_request(&self, name: &str, bearer: &str) -> IngestResult<Request> {
        self.client
            .get(format!(
                "{}/secrets/{}",
                self.vault_url,
                urlencoding::encode(name)
            ))
            .query(&[("api-version", KEYVAULT_API_VERSION)])
            .bearer_auth(bearer)
            .build()
            .map_err(|e| IngestError::Configuration(format!("Invalid Key Vault request: {}", e)))
    }
}

#[async_trait]
impl SecretStore for KeyVaultClient {
    async fn get_secret(&self, name: &str) -> IngestResult<SecretValue> {
        let token = self.credential.get_token(KEYVAULT_RESOURCE).await?;
        let request = self.build_get_secret_request(name, &token.token)?;

        debug!(
            "Fetching secret '{}' from {} (token valid until {})",
            name, self.vault_url, token.expires_on
        );

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| IngestError::Auth(format!("Failed to reach Key Vault {}: {}", self.vault_url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = truncate_body(response.text().await.unwrap_or_default(), MAX_ERROR_BODY);
            return Err(classify_vault_status(
                status,
                &format!("secret '{}' in {}: {}", name, self.vault_url, body),
            ));
        }

        let bundle: SecretBundle = response
            .json()
            .await
            .map_err(|e| IngestError::Auth(format!("Failed to parse Key Vault response: {}", e)))?;

        bundle
            .value
            .map(SecretValue)
            .ok_or_else(|| IngestError::NotFound(format!("secret '{}' has no value", name)))
    }
}
