//! Error types for the reconciliation engine.

use thiserror::Error;

/// Result type alias using `SyncError`.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors raised by the directory access, the REST clients and the connectors.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A decoded group names a permission the application does not know.
    #[error("Unsupported {application} permission '{value}'")]
    UnknownPermission { application: String, value: String },

    /// A group name matched the pattern but a required capture is missing.
    #[error("Could not decode group '{group}': {reason}")]
    GroupDecode { group: String, reason: String },

    /// A directory call was made before a successful `authenticate()`.
    #[error("Authentication required")]
    NotAuthenticated,

    /// Login against the directory failed.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote API answered with "429 Too Many Requests".
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Non-success response from the remote API.
    #[error("API error: {status} - {body}")]
    Api { status: u16, body: String },

    /// A call failed after the retry policy gave up.
    #[error("Request failed: {0}")]
    Unavailable(String),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// CSV output error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl SyncError {
    /// Whether this error is a "too many requests" answer.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SyncError::RateLimited)
    }

    /// Whether retrying the pass would change nothing.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Config(_) | SyncError::UnknownPermission { .. } | SyncError::GroupDecode { .. }
        )
    }
}
