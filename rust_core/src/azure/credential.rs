//! Ambient identity for Azure resource access.
//!
//! [`TokenCredential`] is the only capability the secret-store client needs:
//! turn a resource URI into a short-lived bearer token. Two sources are
//! provided, chained in the same order the Azure SDKs use by default:
//!
//! 1. [`ClientSecretCredential`] from `AZURE_TENANT_ID` / `AZURE_CLIENT_ID` /
//!    `AZURE_CLIENT_SECRET`
//! 2. [`ManagedIdentityCredential`], via the App Service identity endpoint when
//!    `IDENTITY_ENDPOINT` + `IDENTITY_HEADER` are set, otherwise IMDS
//!
//! Tokens are not cached: every tick asks for a fresh one.

use crate::error::{IngestError, IngestResult};
use crate::utils::text::{truncate_body, MAX_ERROR_BODY};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const AZURE_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";

const TOKEN_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Bearer token plus its expiry. Only tokens still valid when received are
/// handed out.
#[derive(Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: DateTime<Utc>,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// Source of bearer tokens for Azure resources
#[async_trait]
pub trait TokenCredential: Send + Sync {
    /// Name used in logs and chained error messages
    fn credential_name(&self) -> &str;

    /// Acquire a token for `resource` (e.g. `https://vault.azure.net`)
    ///
    /// Failures are reported as [`IngestError::Auth`].
    async fn get_token(&self, resource: &str) -> IngestResult<AccessToken>;
}

/// Token endpoint response. Entra ID returns `expires_in` as a number, the
/// managed identity endpoints return `expires_on` as a string of epoch seconds.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<Value>,
    #[serde(default)]
    expires_on: Option<Value>,
}

impl TokenResponse {
    fn into_access_token(self, source: &str, now: DateTime<Utc>) -> IngestResult<AccessToken> {
        let expires_on = self
            .expires_on
            .as_ref()
            .and_then(value_as_i64)
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .or_else(|| {
                self.expires_in
                    .as_ref()
                    .and_then(value_as_i64)
                    .and_then(TimeDelta::try_seconds)
                    .and_then(|lifetime| now.checked_add_signed(lifetime))
            })
            // Unknown or out-of-range lifetime: assume the shortest documented one
            .unwrap_or_else(|| now + TimeDelta::minutes(5));

        if expires_on <= now {
            return Err(IngestError::Auth(format!(
                "{} returned a token that expired at {}",
                source, expires_on
            )));
        }

        Ok(AccessToken {
            token: self.access_token,
            expires_on,
        })
    }
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn http_client() -> IngestResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(TOKEN_REQUEST_TIMEOUT_SECS))
        .build()
        .map_err(|e| IngestError::Configuration(format!("Failed to create HTTP client for identity: {}", e)))
}

/// Decode a token response, mapping any failure to [`IngestError::Auth`].
async fn read_token_response(
    source: &str,
    response: reqwest::Response,
) -> IngestResult<AccessToken> {
    let status = response.status();
    if !status.is_success() {
        let body = truncate_body(response.text().await.unwrap_or_default(), MAX_ERROR_BODY);
        return Err(IngestError::Auth(format!(
            "{} token request failed: {} - {}",
            source, status, body
        )));
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| IngestError::Auth(format!("Failed to parse {} token response: {}", source, e)))?;

    token.into_access_token(source, Utc::now())
}

fn scope_for(resource: &str) -> String {
    format!("{}/.default", resource.trim_end_matches('/'))
}

// ============================================================================
// Client secret (service principal)
// ============================================================================

/// OAuth2 client-credentials flow against Entra ID
pub struct ClientSecretCredential {
    client: Client,
    tenant_id: String,
    client_id: String,
    client_secret: String,
}

impl fmt::Debug for ClientSecretCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSecretCredential")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .finish()
    }
}

impl ClientSecretCredential {
    pub fn new(tenant_id: String, client_id: String, client_secret: String) -> IngestResult<Self> {
        Ok(Self {
            client: http_client()?,
            tenant_id,
            client_id,
            client_secret,
        })
    }

    /// Build from `AZURE_TENANT_ID`, `AZURE_CLIENT_ID` and `AZURE_CLIENT_SECRET`.
    ///
    /// Returns `Ok(None)` unless all three are set and non-blank.
    pub fn from_lookup<F>(lookup: F) -> IngestResult<Option<Self>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        match (
            non_blank("AZURE_TENANT_ID"),
            non_blank("AZURE_CLIENT_ID"),
            non_blank("AZURE_CLIENT_SECRET"),
        ) {
            (Some(tenant), Some(client_id), Some(secret)) => {
                Ok(Some(Self::new(tenant, client_id, secret)?))
            }
            _ => Ok(None),
        }
    }

    fn token_url(&self) -> String {
        format!("{}/{}/oauth2/v2.0/token", AZURE_AUTHORITY_HOST, self.tenant_id)
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    fn credential_name(&self) -> &str {
        "ClientSecretCredential"
    }

    async fn get_token(&self, resource: &str) -> IngestResult<AccessToken> {
        let scope = scope_for(resource);
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", scope.as_str()),
        ];

        debug!("Requesting token for {} from {}", scope, self.token_url());

        let response = self
            .client
            .post(self.token_url())
            .form(&form)
            .send()
            .await
            .map_err(|e| IngestError::Auth(format!("Failed to reach Entra ID: {}", e)))?;

        read_token_response(self.credential_name(), response).await
    }
}

// ============================================================================
// Managed identity
// ============================================================================

#[derive(Clone)]
enum MsiEndpoint {
    /// App Service / Functions identity endpoint
    AppService { endpoint: String, header: String },
    /// Instance metadata service (VMs, AKS, container instances)
    Imds { endpoint: String },
}

impl fmt::Debug for MsiEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MsiEndpoint::AppService { endpoint, .. } => {
                f.debug_struct("AppService").field("endpoint", endpoint).finish()
            }
            MsiEndpoint::Imds { endpoint } => f.debug_struct("Imds").field("endpoint", endpoint).finish(),
        }
    }
}

/// System- or user-assigned managed identity of the hosting compute
#[derive(Debug)]
pub struct ManagedIdentityCredential {
    client: Client,
    endpoint: MsiEndpoint,
    /// Selects a user-assigned identity; `None` means system-assigned
    client_id: Option<String>,
}

impl ManagedIdentityCredential {
    /// Pick the endpoint from `IDENTITY_ENDPOINT` / `IDENTITY_HEADER`, falling
    /// back to IMDS. `AZURE_CLIENT_ID` selects a user-assigned identity.
    pub fn from_lookup<F>(lookup: F) -> IngestResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let endpoint = match (non_blank("IDENTITY_ENDPOINT"), non_blank("IDENTITY_HEADER")) {
            (Some(endpoint), Some(header)) => MsiEndpoint::AppService { endpoint, header },
            _ => MsiEndpoint::Imds {
                endpoint: IMDS_ENDPOINT.to_string(),
            },
        };

        Ok(Self {
            client: http_client()?,
            endpoint,
            client_id: non_blank("AZURE_CLIENT_ID"),
        })
    }

    fn build_request(&self, resource: &str) -> reqwest::RequestBuilder {
        let mut query: Vec<(&str, &str)> = vec![("resource", resource)];
        if let Some(client_id) = &self.client_id {
            query.push(("client_id", client_id.as_str()));
        }

        match &self.endpoint {
            MsiEndpoint::AppService { endpoint, header } => {
                query.push(("api-version", APP_SERVICE_API_VERSION));
                self.client
                    .get(endpoint)
                    .query(&query)
                    .header("X-IDENTITY-HEADER", header)
            }
            MsiEndpoint::Imds { endpoint } => {
                query.push(("api-version", IMDS_API_VERSION));
                self.client.get(endpoint).query(&query).header("Metadata", "true")
            }
        }
    }
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    fn credential_name(&self) -> &str {
        "ManagedIdentityCredential"
    }

    async fn get_token(&self, resource: &str) -> IngestResult<AccessToken> {
        debug!("Requesting managed identity token for {} ({:?})", resource, self.endpoint);

        let response = self
            .build_request(resource)
            .send()
            .await
            .map_err(|e| IngestError::Auth(format!("Managed identity endpoint unavailable: {}", e)))?;

        read_token_response(self.credential_name(), response).await
    }
}

// ============================================================================
// Chain
// ============================================================================

/// Tries each credential in order and returns the first token obtained
pub struct ChainedCredential {
    sources: Vec<Arc<dyn TokenCredential>>,
    name: String,
}

impl ChainedCredential {
    pub fn new(sources: Vec<Arc<dyn TokenCredential>>) -> Self {
        let names: Vec<&str> = sources.iter().map(|s| s.credential_name()).collect();
        let name = format!("ChainedCredential({})", names.join(" -> "));

        Self { sources, name }
    }

    /// Default chain built from the process environment
    pub fn from_env() -> IngestResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Default chain: client secret (when configured), then managed identity
    pub fn from_lookup<F>(lookup: F) -> IngestResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut sources: Vec<Arc<dyn TokenCredential>> = Vec::new();
        if let Some(secret) = ClientSecretCredential::from_lookup(&lookup)? {
            sources.push(Arc::new(secret));
        }
        sources.push(Arc::new(ManagedIdentityCredential::from_lookup(&lookup)?));

        Ok(Self::new(sources))
    }
}

#[async_trait]
impl TokenCredential for ChainedCredential {
    fn credential_name(&self) -> &str {
        &self.name
    }

    async fn get_token(&self, resource: &str) -> IngestResult<AccessToken> {
        let mut failures: Vec<String> = Vec::new();

        for source in &self.sources {
            match source.get_token(resource).await {
                Ok(token) => {
                    debug!("Got token for {} from {}", resource, source.credential_name());
                    return Ok(token);
                }
                Err(e) => {
                    warn!("{} failed for {}: {}", source.credential_name(), resource, e);
                    failures.push(format!("{}: {}", source.credential_name(), e));
                }
            }
        }

        Err(IngestError::Auth(if failures.is_empty() {
            format!("No credentials available for {}", resource)
        } else {
            format!("All credentials failed for {}: {}", resource, failures.join("; "))
        }))
    }
}
