//! Connector error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status}: {message}")]
    UnexpectedStatus { status: u16, message: String },

    #[error("version conflict")]
    Conflict,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("response decode error: {0}")]
    Decode(String),

    #[error("invalid url: {0}")]
    Url(String),
}

impl ConnectorError {
    /// Whether this error is a server-side failure (HTTP 5xx).
    pub fn is_server_error(&self) -> bool {
        match self {
            ConnectorError::UnexpectedStatus { status, .. } => *status >= 500,
            ConnectorError::Http(e) => e.status().is_some_and(|s| s.is_server_error()),
            _ => false,
        }
    }
}
