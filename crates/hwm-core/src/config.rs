use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_ENDPOINT: &str = "https://practicum.yandex.ru/api/user_api/homework_statuses/";

/// Longest accepted `lookback:<days>` window.
pub const MAX_LOOKBACK_DAYS: u32 = 3650;

/// Upper bound on extra delivery attempts per notification.
pub const MAX_NOTIFY_RETRIES: u32 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variables: {}", .0.join(", "))]
    MissingCredentials(Vec<&'static str>),
    #[error("Failed to read config file {path}: {reason}")]
    Read { path: String, reason: String },
    #[error("Failed to parse config file {path}: {reason}")]
    Parse { path: String, reason: String },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Where the poll cursor starts when the process boots.
///
/// Starting from `Now` only reports changes that happen while the monitor is
/// running. `Lookback` also replays the most recent status of anything updated
/// during the window, so the first poll after a restart may notify again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorStart {
    Now,
    Lookback { days: u32 },
}

impl CursorStart {
    pub fn resolve(self, now: DateTime<Utc>) -> i64 {
        match self {
            Self::Now => now.timestamp(),
            Self::Lookback { days } => now
                .checked_sub_signed(chrono::Duration::days(i64::from(days)))
                .map_or(0, |start| start.timestamp().max(0)),
        }
    }
}

impl Default for CursorStart {
    fn default() -> Self {
        Self::Lookback { days: 30 }
    }
}

impl fmt::Display for CursorStart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Now => write!(f, "now"),
            Self::Lookback { days } => write!(f, "{} days ago", days),
        }
    }
}

impl FromStr for CursorStart {
    type Err = ConfigError;

    /// Accepts `now`, `lookback` (30 days) or `lookback:<days>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "now" => Ok(Self::Now),
            "lookback" => Ok(Self::default()),
            other => other
                .strip_prefix("lookback:")
                .and_then(|days| days.parse::<u32>().ok())
                .ok_or_else(|| {
                    ConfigError::Invalid(format!(
                        "cursor start '{}': expected 'now', 'lookback' or 'lookback:<days>'",
                        other
                    ))
                })
                .and_then(|days| {
                    if days > MAX_LOOKBACK_DAYS {
                        return Err(ConfigError::Invalid(format!(
                            "cursor start '{}': lookback is limited to {} days",
                            other, MAX_LOOKBACK_DAYS
                        )));
                    }
                    Ok(Self::Lookback { days })
                }),
        }
    }
}

/// Configuration for a poller instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Status endpoint queried on every cycle.
    pub endpoint: String,
    /// Fixed sleep between cycles (default: 600s).
    pub poll_interval: Duration,
    /// HTTP request timeout for status fetches.
    pub request_timeout: Duration,
    pub cursor_start: CursorStart,
    /// Extra delivery attempts after a failed send. Zero means at-most-once.
    pub notify_retries: u32,
    /// Base backoff between delivery attempts (doubled each attempt).
    pub notify_backoff: Duration,
    /// Maximum number of failed cycles to retain (ring buffer capacity).
    pub failure_limit: usize,
    /// Maximum number of detected status changes to retain.
    pub change_limit: usize,
    /// Consecutive failed cycles before an alert is logged. Zero disables it.
    pub failure_alert_threshold: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            poll_interval: Duration::from_secs(600),
            request_timeout: Duration::from_secs(30),
            cursor_start: CursorStart::default(),
            notify_retries: 0,
            notify_backoff: Duration::from_secs(1),
            failure_limit: 50,
            change_limit: 100,
            failure_alert_threshold: 5,
        }
    }
}

impl PollerConfig {
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_poll_interval(mut self, secs: u64) -> Self {
        self.poll_interval = Duration::from_secs(secs.max(1));
        self
    }

    pub fn with_request_timeout(mut self, secs: u64) -> Self {
        self.request_timeout = Duration::from_secs(secs.max(1));
        self
    }

    pub fn with_cursor_start(mut self, start: CursorStart) -> Self {
        self.cursor_start = start;
        self
    }

    pub fn with_notify_retries(mut self, retries: u32) -> Self {
        self.notify_retries = retries.min(MAX_NOTIFY_RETRIES);
        self
    }

    pub fn with_notify_backoff(mut self, backoff: Duration) -> Self {
        self.notify_backoff = backoff;
        self
    }

    pub fn with_failure_limit(mut self, limit: usize) -> Self {
        self.failure_limit = limit.max(1);
        self
    }

    pub fn with_change_limit(mut self, limit: usize) -> Self {
        self.change_limit = limit.max(1);
        self
    }

    pub fn with_failure_alert_threshold(mut self, threshold: u32) -> Self {
        self.failure_alert_threshold = threshold;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn defaults_match_reference_bot() {
        let c = PollerConfig::default();
        assert_eq!(c.poll_interval, Duration::from_secs(600));
        assert_eq!(c.cursor_start, CursorStart::Lookback { days: 30 });
        assert_eq!(c.notify_retries, 0);
        assert_eq!(c.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn cursor_start_resolves_against_clock() {
        let now = Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();
        assert_eq!(CursorStart::Now.resolve(now), now.timestamp());
        assert_eq!(
            CursorStart::Lookback { days: 30 }.resolve(now),
            now.timestamp() - 30 * 86_400
        );
        assert_eq!(CursorStart::Lookback { days: 0 }.resolve(now), now.timestamp());
    }

    #[test]
    fn cursor_start_parses_cli_forms() {
        assert_eq!("now".parse::<CursorStart>().unwrap(), CursorStart::Now);
        assert_eq!(
            "lookback".parse::<CursorStart>().unwrap(),
            CursorStart::Lookback { days: 30 }
        );
        assert_eq!(
            "lookback:7".parse::<CursorStart>().unwrap(),
            CursorStart::Lookback { days: 7 }
        );
        assert!("yesterday".parse::<CursorStart>().is_err());
        assert!("lookback:-1".parse::<CursorStart>().is_err());
    }

    #[test]
    fn cursor_start_rejects_oversized_lookback() {
        let err = "lookback:4000000000".parse::<CursorStart>().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("limited to 3650 days"), "{}", err);

        assert_eq!(
            "lookback:3650".parse::<CursorStart>().unwrap(),
            CursorStart::Lookback { days: 3650 }
        );
    }

    #[test]
    fn huge_lookback_resolves_to_epoch() {
        let now = Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();
        assert_eq!(CursorStart::Lookback { days: u32::MAX }.resolve(now), 0);
    }

    #[test]
    fn builder_caps_notify_retries() {
        let c = PollerConfig::default().with_notify_retries(u32::MAX);
        assert_eq!(c.notify_retries, MAX_NOTIFY_RETRIES);
    }

    #[test]
    fn builder_clamps_zero_interval() {
        let c = PollerConfig::default().with_poll_interval(0);
        assert_eq!(c.poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn missing_credentials_message_lists_all() {
        let err = ConfigError::MissingCredentials(vec!["PRACTICUM_TOKEN", "TELEGRAM_TOKEN"]);
        assert_eq!(
            err.to_string(),
            "Missing required environment variables: PRACTICUM_TOKEN, TELEGRAM_TOKEN"
        );
    }
}
