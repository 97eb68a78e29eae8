//! Error types for the model-chat channel.

use std::time::Duration;

use thiserror::Error;

/// Errors from the model-chat collaborator.
///
/// The engine never retries this channel; `is_retryable` exists so the
/// channel's owner can implement backoff on top of the trait.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ChatError {
    /// Transport-level failure reaching the model server.
    ///
    /// DNS, connection or socket trouble. Typically retryable.
    #[error("network error: {0}")]
    Network(String),

    /// The request took longer than the channel's own limit.
    #[error("chat request timed out")]
    Timeout,

    /// The server asked the caller to slow down.
    #[error("rate limited: {retry_after:?}")]
    RateLimited {
        /// Suggested wait before retrying, if the server provided one.
        retry_after: Option<Duration>,
    },

    /// The model failed while generating.
    #[error("model error: {0}")]
    Model(String),

    /// The server's reply did not have the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The client was built with unusable settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The model server is down or overloaded.
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl ChatError {
    /// Whether the channel's owner may reasonably retry this request.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout | Self::RateLimited { .. } | Self::Unavailable(_)
        )
    }

    /// The suggested wait before retrying, for rate-limit errors.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}
