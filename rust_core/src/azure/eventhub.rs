//! Azure Event Hubs producer over the REST send endpoint.
//!
//! A producer is opened from a connection string, sends messages, and is
//! closed by its owner. The ingestor opens one producer per tick and closes it
//! whether or not the send succeeded.

use crate::error::{IngestError, IngestResult};
use crate::utils::text::{truncate_body, MAX_ERROR_BODY};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::Sha256;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

/// SAS tokens are minted at open and valid for this long
const SAS_TTL_SECS: u64 = 3600;
const SEND_TIMEOUT_SECS: u64 = 30;
const EVENTHUB_API_VERSION: &str = "2014-01";
const SINGLE_EVENT_CONTENT_TYPE: &str = "application/atom+xml;type=entry;charset=utf-8";

// ============================================================================
// Connection string
// ============================================================================

/// Parsed `Endpoint=sb://...;SharedAccessKeyName=...;SharedAccessKey=...`
#[derive(Clone, PartialEq, Eq)]
pub struct EventHubConnectionString {
    /// Namespace host, e.g. `my-ns.servicebus.windows.net`
    pub host: String,
    pub key_name: String,
    key: String,
    pub entity_path: Option<String>,
}

impl fmt::Debug for EventHubConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHubConnectionString")
            .field("host", &self.host)
            .field("key_name", &self.key_name)
            .field("key", &"<redacted>")
            .field("entity_path", &self.entity_path)
            .finish()
    }
}

impl FromStr for EventHubConnectionString {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut endpoint = None;
        let mut key_name = None;
        let mut key = None;
        let mut entity_path = None;

        for part in s.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            // Keys are base64 and may end in '=', so split on the first one only
            let (name, value) = part
                .split_once('=')
                .ok_or_else(|| IngestError::Publish("Malformed connection string segment".to_string()))?;
            let value = value.trim().to_string();
            match name.trim().to_ascii_lowercase().as_str() {
                "endpoint" => endpoint = Some(value),
                "sharedaccesskeyname" => key_name = Some(value),
                "sharedaccesskey" => key = Some(value),
                "entitypath" => entity_path = Some(value).filter(|v| !v.is_empty()),
                _ => {}
            }
        }

        let endpoint = require(endpoint, "Endpoint")?;
        let host = endpoint
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&endpoint)
            .trim_end_matches('/')
            .to_string();
        if host.is_empty() || host.contains('/') {
            return Err(IngestError::Publish(format!(
                "Connection string Endpoint '{}' is not a namespace address",
                endpoint
            )));
        }

        Ok(Self {
            host,
            key_name: require(key_name, "SharedAccessKeyName")?,
            key: require(key, "SharedAccessKey")?,
            entity_path,
        })
    }
}

fn require(value: Option<String>, name: &str) -> IngestResult<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| IngestError::Publish(format!("Connection string is missing {}", name)))
}

impl EventHubConnectionString {
    /// Event hub this producer should target.
    ///
    /// When the connection string is scoped to an entity it must agree with
    /// the configured hub.
    pub fn resolve_event_hub<'a>(&'a self, configured: &'a str) -> IngestResult<&'a str> {
        match &self.entity_path {
            Some(path) if !path.eq_ignore_ascii_case(configured) => Err(IngestError::Publish(format!(
                "Connection string targets event hub '{}' but '{}' is configured",
                path, configured
            ))),
            _ => Ok(configured),
        }
    }

    /// `SharedAccessSignature` authorization for `resource_uri`, valid until
    /// `expiry` (epoch seconds).
    pub fn sas_token(&self, resource_uri: &str, expiry: u64) -> IngestResult<String> {
        generate_sas_token(resource_uri, &self.key_name, &self.key, expiry)
    }
}

/// Sign `resource_uri` with a shared access key.
///
/// The string to sign is the lower-cased, URL-encoded resource URI and the
/// expiry separated by a newline, HMAC-SHA256'd with the key's UTF-8 bytes.
pub fn generate_sas_token(
    resource_uri: &str,
    key_name: &str,
    key: &str,
    expiry: u64,
) -> IngestResult<String> {
    let encoded_uri = urlencoding::encode(&resource_uri.to_lowercase()).into_owned();
    let string_to_sign = format!("{}\n{}", encoded_uri, expiry);

    let mut mac = Hmac::<Sha256>::new_from_slice(key.as_bytes())
        .map_err(|e| IngestError::Publish(format!("Invalid shared access key: {}", e)))?;
    mac.update(string_to_sign.as_bytes());
    let signature = BASE64.encode(mac.finalize().into_bytes());

    Ok(format!(
        "SharedAccessSignature sr={}&sig={}&se={}&skn={}",
        encoded_uri,
        urlencoding::encode(&signature),
        expiry,
        urlencoding::encode(key_name)
    ))
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

// ============================================================================
// Producer
// ============================================================================

/// Open connection to one event hub
#[async_trait]
pub trait EventProducer: Send {
    fn event_hub(&self) -> &str;

    /// Send one opaque UTF-8 message
    async fn send(&mut self, body: String) -> IngestResult<()>;

    /// Release the connection. Closing twice is a no-op.
    async fn close(&mut self) -> IngestResult<()>;
}

/// Factory for producers, one per tick
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn open(
        &self,
        connection_string: &str,
        event_hub: &str,
    ) -> IngestResult<Box<dyn EventProducer>>;
}

/// Opens [`EventHubProducer`]s against the real service
#[derive(Debug, Clone)]
pub struct EventHubSink {
    timeout: Duration,
}

impl EventHubSink {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(SEND_TIMEOUT_SECS),
        }
    }
}

impl Default for EventHubSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSink for EventHubSink {
    async fn open(
        &self,
        connection_string: &str,
        event_hub: &str,
    ) -> IngestResult<Box<dyn EventProducer>> {
        let producer = EventHubProducer::from_connection_string(connection_string, event_hub, self.timeout)?;
        Ok(Box::new(producer))
    }
}

/// REST producer for a single event hub
pub struct EventHubProducer {
    /// `None` once closed
    client: Option<Client>,
    event_hub: String,
    send_url: String,
    authorization: String,
}

impl fmt::Debug for EventHubProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHubProducer")
            .field("event_hub", &self.event_hub)
            .field("send_url", &self.send_url)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl EventHubProducer {
    pub fn from_connection_string(
        connection_string: &str,
        event_hub: &str,
        timeout: Duration,
    ) -> IngestResult<Self> {
        let parsed: EventHubConnectionString = connection_string.parse()?;
        let event_hub = parsed.resolve_event_hub(event_hub)?.to_string();

        let resource_uri = format!("https://{}/{}", parsed.host, event_hub);
        let authorization = parsed.sas_token(&resource_uri, epoch_secs() + SAS_TTL_SECS)?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IngestError::Publish(format!("Failed to create HTTP client for Event Hubs: {}", e)))?;

        debug!("Opened producer for {}", resource_uri);

        Ok(Self {
            client: Some(client),
            send_url: format!("{}/messages", resource_uri),
            event_hub,
            authorization,
        })
    }

    fn is_closed(&self) -> bool {
        self.client.is_none()
    }
}

#[async_trait]
impl EventProducer for EventHubProducer {
    fn event_hub(&self) -> &str {
        &self.event_hub
    }

    async fn send(&mut self, body: String) -> IngestResult<()> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| IngestError::Publish(format!("Producer for '{}' is closed", self.event_hub)))?;

        let response = client
            .post(&self.send_url)
            .query(&[("timeout", "60"), ("api-version", EVENTHUB_API_VERSION)])
            .header(reqwest::header::AUTHORIZATION, &self.authorization)
            .header(reqwest::header::CONTENT_TYPE, SINGLE_EVENT_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| IngestError::Publish(format!("Failed to send to '{}': {}", self.event_hub, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = truncate_body(response.text().await.unwrap_or_default(), MAX_ERROR_BODY);
            return Err(IngestError::Publish(format!(
                "Event Hubs rejected send to '{}': {} - {}",
                self.event_hub, status, body
            )));
        }

        Ok(())
    }

    async fn close(&mut self) -> IngestResult<()> {
        if self.client.take().is_some() {
            debug!("Closed producer for {}", self.event_hub);
        }
        Ok(())
    }
}
