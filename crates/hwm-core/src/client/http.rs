use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use super::{FetchError, StatusSource};

/// Status API client. One GET per call, no retries.
#[derive(Debug, Clone)]
pub struct HttpStatusClient {
    client: Client,
    endpoint: String,
    token: String,
}

impl HttpStatusClient {
    pub fn new(
        endpoint: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Self::build_client(timeout)?;
        Ok(Self::with_client(client, endpoint, token))
    }

    pub fn with_client(client: Client, endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            token: token.into(),
        }
    }

    pub fn from_config(
        config: &crate::config::PollerConfig,
        token: impl Into<String>,
    ) -> Result<Self, reqwest::Error> {
        Self::new(config.endpoint.clone(), token, config.request_timeout)
    }

    pub fn build_client(timeout: Duration) -> Result<Client, reqwest::Error> {
        Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .gzip(true)
            .build()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl StatusSource for HttpStatusClient {
    async fn fetch(&self, cursor: i64) -> Result<Value, FetchError> {
        let from_date = cursor.max(0);
        debug!(endpoint = %self.endpoint, from_date, "Requesting homework statuses");

        let response = self
            .client
            .get(&self.endpoint)
            .header(AUTHORIZATION, format!("OAuth {}", self.token))
            .query(&[("from_date", from_date)])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    warn!(endpoint = %self.endpoint, "Status request timed out");
                    FetchError::Timeout {
                        url: self.endpoint.clone(),
                    }
                } else {
                    warn!(endpoint = %self.endpoint, error = %e, "Status request network error");
                    FetchError::Network {
                        url: self.endpoint.clone(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(endpoint = %self.endpoint, status = status.as_u16(), "Status endpoint returned error status");
            return Err(FetchError::Endpoint {
                url: self.endpoint.clone(),
                status: status.as_u16(),
            });
        }

        response.json::<Value>().await.map_err(|e| {
            warn!(endpoint = %self.endpoint, error = %e, "Status response is not valid JSON");
            FetchError::Decode {
                url: self.endpoint.clone(),
                reason: e.to_string(),
            }
        })
    }
}
