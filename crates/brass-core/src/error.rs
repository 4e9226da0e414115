//! Error types shared with adapters.

use thiserror::Error;

/// Error type for bot API calls.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The bot is not connected.
    #[error("bot is not connected")]
    NotConnected,

    /// The API call timed out.
    #[error("API call timed out")]
    Timeout,

    /// The API returned an error.
    #[error("API error ({retcode}): {message}")]
    Failed {
        /// Protocol specific return code.
        retcode: i32,
        /// Message returned by the remote side.
        message: String,
    },

    /// Failed to serialize/deserialize.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The event does not have the required session information.
    #[error("missing session info")]
    MissingSession,

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for API calls.
pub type ApiResult<T> = Result<T, ApiError>;
