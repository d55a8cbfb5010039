//! Provider error types.

use thiserror::Error;

pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Request failed with status {status}: {message}")]
    RequestFailed { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Media error: {0}")]
    Media(#[from] reel_media::MediaError),
}

impl ProviderError {
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    /// Classify a non-success HTTP status. The body is truncated so raw
    /// provider output never travels far.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message: String = body.chars().take(200).collect();
        match status {
            429 => Self::RateLimited(message),
            500..=599 => Self::ServiceUnavailable(format!("{}: {}", status, message)),
            _ => Self::RequestFailed { status, message },
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::ServiceUnavailable(_)
            | ProviderError::RateLimited(_)
            | ProviderError::Timeout(_)
            | ProviderError::Network(_) => true,
            ProviderError::InvalidResponse(_) => true,
            ProviderError::Media(e) => e.is_retryable(),
            ProviderError::RequestFailed { .. }
            | ProviderError::Json(_)
            | ProviderError::Io(_) => false,
        }
    }
}
