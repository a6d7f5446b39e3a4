#![forbid(unsafe_code)]

pub mod client;
pub mod config;
pub mod credentials;
pub mod monitor;
pub mod notify;

pub use client::{FetchError, HttpStatusClient, StatusSource};
pub use config::{
    ConfigError, CursorStart, PollerConfig, DEFAULT_ENDPOINT, MAX_LOOKBACK_DAYS, MAX_NOTIFY_RETRIES,
};
pub use credentials::Credentials;
pub use monitor::{
    FailureKind, Homework, HomeworkStatus, PollError, PollFailure, PollOutcome, PollReport,
    PollState, Poller, StatusChange, StatusTracker,
};
pub use notify::{Messenger, Notification, Notifier, SendError, SendFailed, Sent, TelegramMessenger};
