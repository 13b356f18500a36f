//! Error types for upstream and setup operations.

use thiserror::Error;
use whale_alerts::DbError;

/// Errors from the upstream subscription / holder API.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("Upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode upstream response: {0}")]
    Decode(String),

    #[error("Webhook not found: {0}")]
    NotFound(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            UpstreamError::Decode(e.to_string())
        } else {
            UpstreamError::Transport(e.to_string())
        }
    }
}

/// Result type for upstream calls.
pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// Errors from the setup flows. Per-item upstream failures are counted,
/// not returned; only store failures abort a flow.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Token list error: {0}")]
    TokenList(#[from] crate::tokens::TokenListError),
}
