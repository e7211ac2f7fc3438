//! WebSocket error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Server disconnect notice: code={code}, reason={reason}")]
    ServerDisconnect { code: u16, reason: String },

    #[error("Silence timeout: no frame received for {0} ms")]
    SilenceTimeout(u64),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type WsResult<T> = Result<T, WsError>;
