//! Notification delivery.
//!
//! The [`Notifier`] turns a detected status change into a [`Notification`] and
//! hands it to a [`Messenger`]. Delivery is best-effort: a failed send is
//! logged and reported back as [`SendFailed`], it never faults the poll cycle.

mod telegram;

pub use telegram::{TelegramMessenger, TELEGRAM_API_BASE};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{PollerConfig, MAX_NOTIFY_RETRIES};
use crate::monitor::Homework;

#[derive(Debug, Clone, Error)]
pub enum SendError {
    #[error("Messenger returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Messenger request failed: {0}")]
    Transport(String),
}

/// Messaging sink. One call per message, no retries.
#[async_trait]
pub trait Messenger: Send + Sync {
    fn type_name(&self) -> &str;

    async fn send(&self, chat_id: &str, text: &str) -> Result<(), SendError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub recipient: String,
    pub text: String,
}

impl Notification {
    pub fn new(recipient: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            recipient: recipient.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Sent {
    pub notification: Notification,
    pub attempts: u32,
}

#[derive(Debug, Clone, Error)]
#[error("Failed to deliver notification for '{name}' after {attempts} attempt(s): {source}")]
pub struct SendFailed {
    pub name: String,
    pub attempts: u32,
    #[source]
    pub source: SendError,
}

pub struct Notifier {
    messenger: Arc<dyn Messenger>,
    chat_id: String,
    max_retries: u32,
    backoff: Duration,
}

impl Notifier {
    /// At-most-once notifier: a single attempt per message.
    pub fn new(messenger: Arc<dyn Messenger>, chat_id: impl Into<String>) -> Self {
        Self {
            messenger,
            chat_id: chat_id.into(),
            max_retries: 0,
            backoff: Duration::from_secs(1),
        }
    }

    pub fn from_config(
        messenger: Arc<dyn Messenger>,
        chat_id: impl Into<String>,
        config: &PollerConfig,
    ) -> Self {
        Self::new(messenger, chat_id).with_retries(config.notify_retries, config.notify_backoff)
    }

    /// `max_retries` is capped at [`MAX_NOTIFY_RETRIES`].
    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries.min(MAX_NOTIFY_RETRIES);
        self.backoff = backoff;
        self
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn build(&self, homework: &Homework) -> Notification {
        Notification::new(&self.chat_id, homework.message())
    }

    pub async fn notify(&self, homework: &Homework) -> Result<Sent, SendFailed> {
        let notification = self.build(homework);
        let sink = self.messenger.type_name();
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.backoff * 2u32.saturating_pow(attempt - 1);
                debug!(sink, attempt, backoff_ms = backoff.as_millis(), "Retrying notification");
                tokio::time::sleep(backoff).await;
            }

            match self
                .messenger
                .send(&notification.recipient, &notification.text)
                .await
            {
                Ok(()) => {
                    info!(sink, homework = %homework.name, status = %homework.status, "Notification sent");
                    return Ok(Sent {
                        notification,
                        attempts: attempt + 1,
                    });
                }
                Err(e) => {
                    warn!(sink, homework = %homework.name, attempt, error = %e, "Notification delivery failed");
                    last_error = Some(e);
                }
            }
        }

        Err(SendFailed {
            name: homework.name.clone(),
            attempts: self.max_retries + 1,
            source: last_error
                .unwrap_or_else(|| SendError::Transport("no delivery attempt made".into())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::HomeworkStatus;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FlakyMessenger {
        failures_left: AtomicU32,
        calls: AtomicU32,
        sent: Mutex<Vec<(String, String)>>,
    }

    impl FlakyMessenger {
        fn failing(times: u32) -> Self {
            Self {
                failures_left: AtomicU32::new(times),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl Messenger for FlakyMessenger {
        fn type_name(&self) -> &str {
            "flaky"
        }

        async fn send(&self, chat_id: &str, text: &str) -> Result<(), SendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(SendError::Http {
                    status: 502,
                    body: "bad gateway".into(),
                });
            }
            self.sent
                .lock()
                .unwrap()
                .push((chat_id.to_string(), text.to_string()));
            Ok(())
        }
    }

    fn homework() -> Homework {
        Homework::new("hw1", HomeworkStatus::Approved)
    }

    #[tokio::test]
    async fn sends_formatted_text_to_chat() {
        let messenger = Arc::new(FlakyMessenger::default());
        let notifier = Notifier::new(messenger.clone(), "42");

        let sent = notifier.notify(&homework()).await.unwrap();
        assert_eq!(sent.attempts, 1);
        assert_eq!(sent.notification.recipient, "42");

        let log = messenger.sent.lock().unwrap();
        assert_eq!(
            log[0],
            (
                "42".to_string(),
                "Изменился статус проверки работы \"hw1\". Работа проверена: ревьюеру всё понравилось. Ура!"
                    .to_string()
            )
        );
    }

    #[tokio::test]
    async fn default_is_single_attempt() {
        let messenger = Arc::new(FlakyMessenger::failing(1));
        let notifier = Notifier::new(messenger.clone(), "42");

        let err = notifier.notify(&homework()).await.unwrap_err();
        assert_eq!(err.attempts, 1);
        assert_eq!(err.name, "hw1");
        assert!(matches!(err.source, SendError::Http { status: 502, .. }));
        assert_eq!(messenger.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bounded_retries_recover() {
        let messenger = Arc::new(FlakyMessenger::failing(2));
        let notifier =
            Notifier::new(messenger.clone(), "42").with_retries(2, Duration::from_millis(1));

        let sent = notifier.notify(&homework()).await.unwrap();
        assert_eq!(sent.attempts, 3);
        assert_eq!(messenger.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_stop_at_limit() {
        let messenger = Arc::new(FlakyMessenger::failing(10));
        let notifier =
            Notifier::new(messenger.clone(), "42").with_retries(2, Duration::from_millis(1));

        let err = notifier.notify(&homework()).await.unwrap_err();
        assert_eq!(err.attempts, 3);
        assert_eq!(messenger.calls.load(Ordering::SeqCst), 3);
        assert!(err.to_string().contains("after 3 attempt(s)"));
    }

    #[tokio::test]
    async fn retry_count_is_capped() {
        let messenger = Arc::new(FlakyMessenger::failing(u32::MAX));
        let notifier = Notifier::new(messenger.clone(), "42")
            .with_retries(u32::MAX, Duration::from_millis(0));

        let err = notifier.notify(&homework()).await.unwrap_err();
        assert_eq!(err.attempts, MAX_NOTIFY_RETRIES + 1);
        assert_eq!(messenger.calls.load(Ordering::SeqCst), MAX_NOTIFY_RETRIES + 1);
    }

    #[test]
    fn from_config_takes_retry_policy() {
        let config = PollerConfig::default()
            .with_notify_retries(4)
            .with_notify_backoff(Duration::from_millis(250));
        let notifier = Notifier::from_config(Arc::new(FlakyMessenger::default()), "7", &config);
        assert_eq!(notifier.max_retries, 4);
        assert_eq!(notifier.backoff, Duration::from_millis(250));
        assert_eq!(notifier.chat_id(), "7");
    }
}
