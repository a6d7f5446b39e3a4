mod http;

pub use http::HttpStatusClient;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Endpoint {url} returned HTTP {status}")]
    Endpoint { url: String, status: u16 },
    #[error("Network error fetching {url}: {reason}")]
    Network { url: String, reason: String },
    #[error("Timeout fetching {url}")]
    Timeout { url: String },
    #[error("Undecodable response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

impl FetchError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Endpoint { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Source of raw homework status payloads.
///
/// `fetch` returns the decoded body untouched; shape checks belong to the
/// validator. Implementations must not retry, the poll loop owns that.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch(&self, cursor: i64) -> Result<Value, FetchError>;
}
