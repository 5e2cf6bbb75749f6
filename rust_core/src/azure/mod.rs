//! Azure service clients: identity, Key Vault secrets and Event Hubs publishing.

pub mod credential;
pub mod eventhub;
pub mod keyvault;

pub use credential::{AccessToken, ChainedCredential, ClientSecretCredential, ManagedIdentityCredential, TokenCredential};
pub use eventhub::{EventHubConnectionString, EventHubProducer, EventHubSink, EventProducer, EventSink};
pub use keyvault::{KeyVaultClient, SecretStore, SecretValue};
