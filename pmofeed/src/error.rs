//! Error types for the PMOFeed core

use crate::transport::TransportError;

/// Result type alias for PMOFeed operations
pub type Result<T, E = FeedError> = std::result::Result<T, E>;

/// Errors that can occur while loading pages or refreshing credentials
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// The page request failed (transport or HTTP status).
    ///
    /// A 401 only shows up here when the token refresh failed or the
    /// replay budget was exhausted.
    #[error("Fetch failed: {0}")]
    FetchFailed(#[from] TransportError),

    /// The page body could not be decoded
    #[error("Decoding failed: {0}")]
    Decode(#[from] serde_json::Error),

    /// The token-exchange endpoint rejected the refresh token
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// Configuration error (from pmoconfig/anyhow)
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl FeedError {
    /// Create a generic error from a string
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create a refresh error
    pub fn refresh_failed(msg: impl Into<String>) -> Self {
        Self::RefreshFailed(msg.into())
    }

    /// True when the failure is an unrecovered HTTP 401
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::FetchFailed(e) if e.is_unauthorized())
    }

    /// HTTP status code behind the failure, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::FetchFailed(e) => e.status(),
            _ => None,
        }
    }
}
