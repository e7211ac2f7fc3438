//! Notification error types.

use std::time::Duration;
use thiserror::Error;

/// Outcome of one channel send attempt.
#[derive(Debug, Error)]
pub enum SendError {
    /// Channel-side rate limit; retry after the advertised delay if given.
    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Transient transport failure worth retrying.
    #[error("Transient channel error: {0}")]
    Transient(String),

    /// Hard failure (bad destination, revoked auth); never retried.
    #[error("Fatal channel error: {0}")]
    Fatal(String),
}

impl SendError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transient(_))
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    /// The output channel is permanently broken; the relay cannot fulfill
    /// its purpose and must surface this to the operator.
    #[error("Channel delivery failed permanently: {0}")]
    ChannelFailed(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type NotifyResult<T> = Result<T, NotifyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(SendError::RateLimited { retry_after: None }.is_retryable());
        assert!(SendError::Transient("503".to_string()).is_retryable());
        assert!(!SendError::Fatal("chat not found".to_string()).is_retryable());
    }
}
