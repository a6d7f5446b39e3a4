//! TOML configuration file schema and parsing.
//!
//! Secrets never live here; they come from the environment. Example:
//!
//! ```toml
//! [logging]
//! file = "/var/log/homework-monitor.log"
//! format = "json"
//!
//! [poller]
//! endpoint = "https://practicum.yandex.ru/api/user_api/homework_statuses/"
//! interval_secs = 600
//! cursor_start = "lookback:30"
//! notify_retries = 2
//!
//! [telegram]
//! api_base = "https://api.telegram.org"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use hwm_core::{ConfigError, CursorStart, PollerConfig, DEFAULT_ENDPOINT, MAX_NOTIFY_RETRIES};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub poller: PollerSection,

    #[serde(default)]
    pub telegram: TelegramSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_file")]
    pub file: PathBuf,

    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: default_log_file(),
            format: default_log_format(),
        }
    }
}

fn default_log_file() -> PathBuf {
    PathBuf::from("homework-monitor.log")
}

fn default_log_format() -> String {
    "pretty".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollerSection {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// `now`, `lookback` or `lookback:<days>`.
    #[serde(default)]
    pub cursor_start: Option<String>,

    #[serde(default)]
    pub notify_retries: u32,

    #[serde(default = "default_notify_backoff_ms")]
    pub notify_backoff_ms: u64,

    #[serde(default)]
    pub failure_alert_threshold: Option<u32>,
}

impl Default for PollerSection {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            interval_secs: default_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            cursor_start: None,
            notify_retries: 0,
            notify_backoff_ms: default_notify_backoff_ms(),
            failure_alert_threshold: None,
        }
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.into()
}

fn default_interval_secs() -> u64 {
    600
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_notify_backoff_ms() -> u64 {
    1000
}

impl PollerSection {
    pub fn to_poller_config(&self) -> Result<PollerConfig, ConfigError> {
        let mut c = PollerConfig::default()
            .with_endpoint(&self.endpoint)
            .with_poll_interval(self.interval_secs)
            .with_request_timeout(self.request_timeout_secs)
            .with_notify_retries(self.notify_retries)
            .with_notify_backoff(Duration::from_millis(self.notify_backoff_ms));
        if let Some(ref start) = self.cursor_start {
            c = c.with_cursor_start(start.parse::<CursorStart>()?);
        }
        if let Some(t) = self.failure_alert_threshold {
            c = c.with_failure_alert_threshold(t);
        }
        Ok(c)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramSection {
    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_telegram_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TelegramSection {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            timeout_secs: default_telegram_timeout_secs(),
        }
    }
}

fn default_api_base() -> String {
    hwm_core::notify::TELEGRAM_API_BASE.into()
}

fn default_telegram_timeout_secs() -> u64 {
    10
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let config: AppConfig = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_http_url("poller.endpoint", &self.poller.endpoint)?;
        check_http_url("telegram.api_base", &self.telegram.api_base)?;

        if self.poller.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "poller.interval_secs must be greater than zero".into(),
            ));
        }
        if let Some(ref start) = self.poller.cursor_start {
            start.parse::<CursorStart>()?;
        }
        if self.poller.notify_retries > MAX_NOTIFY_RETRIES {
            return Err(ConfigError::Invalid(format!(
                "poller.notify_retries {} exceeds the maximum of {}",
                self.poller.notify_retries, MAX_NOTIFY_RETRIES
            )));
        }

        match self.logging.format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(ConfigError::Invalid(format!(
                    "logging.format '{}': must be 'pretty' or 'json'",
                    other
                )));
            }
        }

        Ok(())
    }
}

fn check_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(value)
        .map_err(|e| ConfigError::Invalid(format!("{} '{}': {}", field, value, e)))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ConfigError::Invalid(format!(
            "{} must use http or https: {}",
            field, value
        )));
    }
    Ok(())
}
