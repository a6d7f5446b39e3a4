use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{Messenger, SendError};

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Telegram Bot API sink (`sendMessage`).
#[derive(Clone)]
pub struct TelegramMessenger {
    client: Client,
    api_base: String,
    token: String,
}

impl std::fmt::Debug for TelegramMessenger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramMessenger")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl TelegramMessenger {
    pub fn new(token: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self::with_client(client, token))
    }

    pub fn with_client(client: Client, token: impl Into<String>) -> Self {
        Self {
            client,
            api_base: TELEGRAM_API_BASE.to_string(),
            token: token.into(),
        }
    }

    /// Points the messenger at a different Bot API server (self-hosted or test).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn send_message_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.token)
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    fn type_name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, chat_id: &str, text: &str) -> Result<(), SendError> {
        debug!(chat_id, "Sending Telegram message");

        let response = self
            .client
            .post(self.send_message_url())
            .json(&serde_json::json!({
                "chat_id": chat_id,
                "text": text,
            }))
            .send()
            .await
            .map_err(|e| SendError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(SendError::Http {
            status: status.as_u16(),
            body,
        })
    }
}
