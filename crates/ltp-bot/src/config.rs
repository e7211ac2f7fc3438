//! Application configuration.
//!
//! Tunables come from a TOML file; secrets come from the environment and
//! are validated before any connection attempt.

use crate::error::{AppError, AppResult};
use ltp_core::{ExchangeSegment, Instrument};
use ltp_notify::RetryPolicy;
use ltp_ws::supervisor::{BackoffPolicy, SupervisorConfig};
use ltp_ws::{FeedConfig, FeedCredentials};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// One watched instrument as configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Provider security id (opaque decimal string).
    pub security_id: String,
    /// Exchange segment the id is scoped to.
    pub segment: ExchangeSegment,
    /// Display symbol used in outbound messages.
    pub symbol: String,
}

/// Feed connection and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSettings {
    /// WebSocket base URL.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// Dead-connection window: no frame within this means reconnect.
    #[serde(default = "default_silence_timeout_ms")]
    pub silence_timeout_ms: u64,
    /// Keepalive ping interval.
    #[serde(default = "default_keepalive_interval_ms")]
    pub keepalive_interval_ms: u64,
    /// Base delay for reconnect backoff.
    #[serde(default = "default_backoff_base_delay_ms")]
    pub backoff_base_delay_ms: u64,
    /// Cap on the reconnect backoff delay.
    #[serde(default = "default_backoff_max_delay_ms")]
    pub backoff_max_delay_ms: u64,
    /// Consecutive failures before the state reads Degraded (0 = never;
    /// retries are unbounded either way).
    #[serde(default)]
    pub max_consecutive_failures: u32,
}

fn default_ws_url() -> String {
    "wss://api-feed.dhan.co".to_string()
}

fn default_silence_timeout_ms() -> u64 {
    30_000
}

fn default_keepalive_interval_ms() -> u64 {
    10_000
}

fn default_backoff_base_delay_ms() -> u64 {
    1_000
}

fn default_backoff_max_delay_ms() -> u64 {
    60_000
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            silence_timeout_ms: default_silence_timeout_ms(),
            keepalive_interval_ms: default_keepalive_interval_ms(),
            backoff_base_delay_ms: default_backoff_base_delay_ms(),
            backoff_max_delay_ms: default_backoff_max_delay_ms(),
            max_consecutive_failures: 0,
        }
    }
}

/// Notification throttling and delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifySettings {
    /// Flush period: at most one message per instrument per period.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Total send attempts per message (first try included).
    #[serde(default = "default_max_send_attempts")]
    pub max_send_attempts: u32,
    /// Retry delay base when the channel gives no retry-after hint.
    #[serde(default = "default_send_retry_base_delay_ms")]
    pub send_retry_base_delay_ms: u64,
    /// Grace period for in-flight sends on shutdown.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_flush_interval_ms() -> u64 {
    5_000
}

fn default_max_send_attempts() -> u32 {
    3
}

fn default_send_retry_base_delay_ms() -> u64 {
    1_000
}

fn default_shutdown_grace_ms() -> u64 {
    5_000
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            flush_interval_ms: default_flush_interval_ms(),
            max_send_attempts: default_max_send_attempts(),
            send_retry_base_delay_ms: default_send_retry_base_delay_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub feed: FeedSettings,
    #[serde(default)]
    pub notify: NotifySettings,
    #[serde(default)]
    pub instruments: Vec<InstrumentConfig>,
}

impl AppConfig {
    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config {path}: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config {path}: {e}")))
    }

    /// Load from the given path, falling back to defaults if absent.
    pub fn load(path: &str) -> AppResult<Self> {
        if Path::new(path).exists() {
            Self::from_file(path)
        } else {
            tracing::warn!(path = %path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Fail fast on configurations the relay cannot run with.
    pub fn validate(&self) -> AppResult<()> {
        if self.instruments.is_empty() {
            return Err(AppError::Config(
                "No instruments configured; nothing to relay".to_string(),
            ));
        }
        if self.notify.max_send_attempts == 0 {
            return Err(AppError::Config(
                "notify.max_send_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The typed instrument set.
    pub fn instruments(&self) -> Vec<Instrument> {
        self.instruments
            .iter()
            .map(|i| Instrument::new(i.security_id.clone(), i.segment, i.symbol.clone()))
            .collect()
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            feed: FeedConfig {
                url: self.feed.ws_url.clone(),
                silence_timeout_ms: self.feed.silence_timeout_ms,
                keepalive_interval_ms: self.feed.keepalive_interval_ms,
            },
            backoff: BackoffPolicy {
                base_delay_ms: self.feed.backoff_base_delay_ms,
                max_delay_ms: self.feed.backoff_max_delay_ms,
            },
            max_consecutive_failures: self.feed.max_consecutive_failures,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.notify.max_send_attempts,
            base_delay_ms: self.notify.send_retry_base_delay_ms,
        }
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.notify.flush_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.notify.shutdown_grace_ms)
    }
}

/// Secrets, loaded from the environment at startup.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub feed: FeedCredentials,
    pub telegram_bot_token: String,
    pub telegram_chat_id: String,
}

impl Credentials {
    /// Read all required secrets; missing ones fail fast before any
    /// connection attempt. `DHAN_TOKEN` is accepted as an alias for
    /// `DHAN_ACCESS_TOKEN`.
    pub fn from_env() -> AppResult<Self> {
        let client_id = require_env("DHAN_CLIENT_ID")?;
        let access_token = std::env::var("DHAN_ACCESS_TOKEN")
            .or_else(|_| std::env::var("DHAN_TOKEN"))
            .map_err(|_| missing("DHAN_ACCESS_TOKEN"))?;
        let telegram_bot_token = require_env("TELEGRAM_BOT_TOKEN")?;
        let telegram_chat_id = require_env("TELEGRAM_CHAT_ID")?;

        Ok(Self {
            feed: FeedCredentials {
                client_id,
                access_token,
            },
            telegram_bot_token,
            telegram_chat_id,
        })
    }
}

fn require_env(name: &str) -> AppResult<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| missing(name))
}

fn missing(name: &str) -> AppError {
    AppError::Config(format!("Required environment variable {name} is not set"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let config = AppConfig::default();
        assert_eq!(config.feed.silence_timeout_ms, 30_000);
        assert_eq!(config.feed.backoff_base_delay_ms, 1_000);
        assert_eq!(config.feed.backoff_max_delay_ms, 60_000);
        assert_eq!(config.notify.flush_interval_ms, 5_000);
        assert_eq!(config.notify.max_send_attempts, 3);
        assert_eq!(config.notify.shutdown_grace_ms, 5_000);
    }

    #[test]
    fn test_empty_instrument_list_fails_validation() {
        let config = AppConfig::default();
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
            [feed]
            ws_url = "wss://feed.example"
            silence_timeout_ms = 15000

            [notify]
            flush_interval_ms = 2000

            [[instruments]]
            security_id = "2885"
            segment = "NSE_EQ"
            symbol = "RELIANCE"

            [[instruments]]
            security_id = "13"
            segment = "NSE_INDEX"
            symbol = "NIFTY 50"
        "#;

        let config: AppConfig = toml::from_str(toml_str).unwrap();
        config.validate().unwrap();

        assert_eq!(config.feed.ws_url, "wss://feed.example");
        assert_eq!(config.feed.silence_timeout_ms, 15_000);
        // Unspecified fields fall back to defaults.
        assert_eq!(config.feed.keepalive_interval_ms, 10_000);
        assert_eq!(config.notify.flush_interval_ms, 2_000);

        let instruments = config.instruments();
        assert_eq!(instruments.len(), 2);
        assert_eq!(instruments[0].symbol, "RELIANCE");
        assert_eq!(instruments[1].segment, ExchangeSegment::NseIndex);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = AppConfig {
            instruments: vec![InstrumentConfig {
                security_id: "11536".to_string(),
                segment: ExchangeSegment::NseEquity,
                symbol: "TCS".to_string(),
            }],
            ..Default::default()
        };
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.instruments.len(), 1);
        assert_eq!(parsed.instruments[0].symbol, "TCS");
    }
}
