//! Error types for record import.

use thiserror::Error;

/// Errors from one import call.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UploadError {
    /// Request could not be sent or the response not read.
    #[error("network error: {0}")]
    Network(String),

    /// Non-success HTTP status.
    #[error("import API returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The API answered with an error, or an import without a count.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The API imported a different number of records than were sent.
    #[error("import count mismatch: submitted {submitted}, API reported {reported}")]
    CountMismatch { submitted: usize, reported: usize },

    /// Response body was not JSON.
    #[error("JSON parse error: {0}")]
    JsonParse(String),

    /// Client could not be configured.
    #[error("upload configuration error: {0}")]
    Config(String),
}

impl UploadError {
    /// Whether sending the same batch again might succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<serde_json::Error> for UploadError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonParse(err.to_string())
    }
}

/// Result type alias for import calls.
pub type Result<T> = std::result::Result<T, UploadError>;
