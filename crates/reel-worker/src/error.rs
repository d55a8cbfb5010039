//! Pipeline error types.

use reel_media::MediaError;
use reel_models::{FailureCategory, TransitionError};
use reel_providers::ProviderError;
use reel_store::StoreError;
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Malformed collaborator response: {0}")]
    MalformedResponse(String),

    #[error("Duration mismatch: {0}")]
    DurationMismatch(String),

    #[error("Segment index corruption: {0}")]
    SegmentIndexCorruption(String),

    #[error("Job cancelled")]
    Cancelled,

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn generation_failed(msg: impl Into<String>) -> Self {
        Self::GenerationFailed(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    pub fn duration_mismatch(msg: impl Into<String>) -> Self {
        Self::DurationMismatch(msg.into())
    }

    pub fn index_corruption(msg: impl Into<String>) -> Self {
        Self::SegmentIndexCorruption(msg.into())
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    /// Category recorded on a failed job.
    pub fn category(&self) -> FailureCategory {
        match self {
            PipelineError::GenerationFailed(_)
            | PipelineError::MalformedResponse(_)
            | PipelineError::Provider(_) => FailureCategory::GenerationFailed,
            PipelineError::DurationMismatch(_) => FailureCategory::DurationMismatch,
            PipelineError::SegmentIndexCorruption(_) => FailureCategory::SegmentIndexCorruption,
            PipelineError::Timeout(_) => FailureCategory::Timeout,
            PipelineError::Media(_) => FailureCategory::MediaFailed,
            PipelineError::Store(_) => FailureCategory::StorageFailed,
            PipelineError::Cancelled
            | PipelineError::InvalidRequest(_)
            | PipelineError::NotFound(_)
            | PipelineError::InvalidTransition(_)
            | PipelineError::Io(_) => FailureCategory::Internal,
        }
    }

    /// Short message safe to persist on the job. Collaborator payloads and
    /// FFmpeg stderr stay in the logs.
    pub fn summary(&self) -> String {
        match self {
            PipelineError::Provider(e) => match e {
                ProviderError::RateLimited(_) => "provider rate limit exhausted".to_string(),
                ProviderError::Timeout(secs) => format!("provider timed out after {}s", secs),
                _ => "provider request failed".to_string(),
            },
            PipelineError::Media(MediaError::Timeout(secs)) => {
                format!("encoder timed out after {}s", secs)
            }
            PipelineError::Media(_) => "video encoding failed".to_string(),
            PipelineError::Store(_) => "job storage failed".to_string(),
            PipelineError::Io(_) => "filesystem operation failed".to_string(),
            PipelineError::GenerationFailed(msg)
            | PipelineError::MalformedResponse(msg)
            | PipelineError::DurationMismatch(msg)
            | PipelineError::SegmentIndexCorruption(msg)
            | PipelineError::Timeout(msg)
            | PipelineError::InvalidRequest(msg) => msg.clone(),
            other => other.to_string(),
        }
    }

    /// Check if a collaborator call that produced this error may be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Timeout(_) | PipelineError::MalformedResponse(_) => true,
            PipelineError::Provider(e) => e.is_retryable(),
            PipelineError::Media(e) => e.is_retryable(),
            PipelineError::Store(e) => e.is_retryable(),
            _ => false,
        }
    }
}
