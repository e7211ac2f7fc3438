//! Feed error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),

    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Duplicate instrument in configuration: {0}")]
    DuplicateInstrument(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type FeedResult<T> = Result<T, FeedError>;
