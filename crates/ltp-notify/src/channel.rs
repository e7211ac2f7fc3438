//! Outbound message channel abstraction and the Telegram implementation.
//!
//! The trait keeps the dispatcher independent of the concrete transport,
//! allowing mock channels in tests.

use crate::error::{NotifyResult, SendError};
use ltp_core::PriceUpdate;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// "Send text message to the configured chat."
///
/// Idempotency is not assumed; the caller owns retry policy.
pub trait MessageChannel: Send + Sync {
    fn send(&self, text: String) -> BoxFuture<'_, Result<(), SendError>>;
}

/// Arc wrapper for MessageChannel trait objects.
pub type DynMessageChannel = Arc<dyn MessageChannel>;

/// Render one update as a chat line, e.g. `RELIANCE (NSE_EQ): 2885.50`.
pub fn format_update(update: &PriceUpdate) -> String {
    format!(
        "{} ({}): {:.2}",
        update.instrument.symbol,
        update.instrument.segment,
        update.price.inner()
    )
}

/// Default timeout for Bot API requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Telegram Bot API request body for sendMessage.
#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
}

/// Relevant subset of the Bot API response envelope.
#[derive(Debug, Default, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

/// Telegram Bot API channel.
pub struct TelegramChannel {
    client: reqwest::Client,
    send_url: String,
    chat_id: String,
}

impl TelegramChannel {
    /// Create a channel for `https://api.telegram.org`.
    pub fn new(bot_token: &str, chat_id: impl Into<String>) -> NotifyResult<Self> {
        Self::with_base_url("https://api.telegram.org", bot_token, chat_id)
    }

    /// Create a channel against an explicit base URL (test servers).
    pub fn with_base_url(
        base_url: &str,
        bot_token: &str,
        chat_id: impl Into<String>,
    ) -> NotifyResult<Self> {
        let client = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self {
            client,
            send_url: format!("{base_url}/bot{bot_token}/sendMessage"),
            chat_id: chat_id.into(),
        })
    }

    /// Map an HTTP status plus response envelope to a send outcome.
    fn classify(status: u16, body: ApiResponse) -> Result<(), SendError> {
        let description = body
            .description
            .unwrap_or_else(|| format!("HTTP {status}"));

        match status {
            429 => Err(SendError::RateLimited {
                retry_after: body
                    .parameters
                    .and_then(|p| p.retry_after)
                    .map(Duration::from_secs),
            }),
            // Bad chat id, revoked token, bot kicked: retrying cannot help.
            400 | 401 | 403 | 404 => Err(SendError::Fatal(description)),
            _ => Err(SendError::Transient(description)),
        }
    }
}

impl MessageChannel for TelegramChannel {
    fn send(&self, text: String) -> BoxFuture<'_, Result<(), SendError>> {
        Box::pin(async move {
            let request = SendMessageRequest {
                chat_id: &self.chat_id,
                text: &text,
            };

            let response = self
                .client
                .post(&self.send_url)
                .json(&request)
                .send()
                .await
                .map_err(|e| SendError::Transient(e.to_string()))?;

            let status = response.status();
            if status.is_success() {
                debug!(chars = text.len(), "Message delivered");
                return Ok(());
            }

            let body: ApiResponse = response.json().await.unwrap_or_default();
            Self::classify(status.as_u16(), body)
        })
    }
}

/// Mock message channel for testing.
///
/// Pops one scripted result per send (defaulting to success once the
/// script is exhausted) and records delivered texts for verification.
pub struct MockMessageChannel {
    script: parking_lot::Mutex<std::collections::VecDeque<Result<(), SendError>>>,
    sent: parking_lot::Mutex<Vec<String>>,
    attempts: std::sync::atomic::AtomicU64,
}

impl Default for MockMessageChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMessageChannel {
    /// Create a mock that always succeeds.
    pub fn new() -> Self {
        Self::with_script(Vec::new())
    }

    /// Create a mock with scripted send results.
    pub fn with_script(script: Vec<Result<(), SendError>>) -> Self {
        Self {
            script: parking_lot::Mutex::new(script.into()),
            sent: parking_lot::Mutex::new(Vec::new()),
            attempts: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Append a result to the script.
    pub fn push_result(&self, result: Result<(), SendError>) {
        self.script.lock().push_back(result);
    }

    /// Get successfully delivered texts.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Total send attempts, successful or not.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl MessageChannel for MockMessageChannel {
    fn send(&self, text: String) -> BoxFuture<'_, Result<(), SendError>> {
        Box::pin(async move {
            self.attempts
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let result = self.script.lock().pop_front().unwrap_or(Ok(()));
            if result.is_ok() {
                self.sent.lock().push(text);
            }
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ltp_core::{ExchangeSegment, Instrument, Price};
    use rust_decimal_macros::dec;

    #[test]
    fn test_format_update_line() {
        let update = PriceUpdate::new(
            Instrument::new("2885", ExchangeSegment::NseEquity, "RELIANCE"),
            Price::new(dec!(2885.5)),
            Utc::now(),
            7,
        );
        assert_eq!(format_update(&update), "RELIANCE (NSE_EQ): 2885.50");
    }

    #[test]
    fn test_classify_rate_limit_with_retry_after() {
        let body = ApiResponse {
            description: Some("Too Many Requests".to_string()),
            parameters: Some(ResponseParameters {
                retry_after: Some(17),
            }),
        };
        match TelegramChannel::classify(429, body) {
            Err(SendError::RateLimited { retry_after }) => {
                assert_eq!(retry_after, Some(Duration::from_secs(17)));
            }
            other => panic!("Expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_hard_failures_fatal() {
        for status in [400, 401, 403, 404] {
            let result = TelegramChannel::classify(status, ApiResponse::default());
            assert!(
                matches!(result, Err(SendError::Fatal(_))),
                "status {status} should be fatal"
            );
        }
    }

    #[test]
    fn test_classify_server_errors_transient() {
        let result = TelegramChannel::classify(502, ApiResponse::default());
        assert!(matches!(result, Err(SendError::Transient(_))));
    }

    #[tokio::test]
    async fn test_mock_channel_scripts_results() {
        let mock = MockMessageChannel::with_script(vec![
            Err(SendError::RateLimited { retry_after: None }),
            Ok(()),
        ]);

        let text = "NIFTY 50 (NSE_INDEX): 24100.10".to_string();
        assert!(mock.send(text.clone()).await.is_err());
        assert!(mock.send(text.clone()).await.is_ok());
        // Exhausted script defaults to success.
        assert!(mock.send(text.clone()).await.is_ok());

        assert_eq!(mock.attempts(), 3);
        assert_eq!(mock.sent().len(), 2);
    }
}
