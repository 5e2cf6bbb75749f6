//! Error taxonomy for a single ingest tick.
//!
//! Every failure aborts the tick and is reported to the scheduler. Nothing here
//! is retried locally.

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Missing or malformed configuration, detected before any network call
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Identity token could not be obtained or was rejected by the vault
    #[error("auth error: {0}")]
    Auth(String),

    /// The requested secret does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Price fetch failed (status, timeout, transport or body)
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Producer could not be opened, the send failed, or close failed
    #[error("publish error: {0}")]
    Publish(String),
}

impl IngestError {
    /// Short stable label used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Auth(_) => "auth",
            Self::NotFound(_) => "not_found",
            Self::Upstream(_) => "upstream",
            Self::Publish(_) => "publish",
        }
    }
}

pub type IngestResult<T> = std::result::Result<T, IngestError>;

/// Map a failed secret-store response to the taxonomy.
///
/// 401/403 are access problems, 404 is a missing secret. Anything else the
/// vault returns is treated as an auth failure because the tick cannot obtain
/// its connection string either way.
pub fn classify_vault_status(status: StatusCode, detail: &str) -> IngestError {
    match status {
        StatusCode::NOT_FOUND => IngestError::NotFound(format!("{} - {}", status, detail)),
        _ => IngestError::Auth(format!("{} - {}", status, detail)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_vault_status() {
        assert!(matches!(
            classify_vault_status(StatusCode::NOT_FOUND, "SecretNotFound"),
            IngestError::NotFound(_)
        ));
        assert!(matches!(
            classify_vault_status(StatusCode::FORBIDDEN, "Forbidden"),
            IngestError::Auth(_)
        ));
        assert!(matches!(
            classify_vault_status(StatusCode::UNAUTHORIZED, ""),
            IngestError::Auth(_)
        ));
    }

    #[test]
    fn test_error_display_and_kind() {
        let err = IngestError::Upstream("CoinGecko API error: 500".to_string());
        assert_eq!(err.to_string(), "upstream error: CoinGecko API error: 500");
        assert_eq!(err.kind(), "upstream");
        assert_eq!(IngestError::Configuration(String::new()).kind(), "configuration");
    }
}
