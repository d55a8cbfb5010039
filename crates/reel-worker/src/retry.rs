//! Retry utilities with exponential backoff.
//!
//! Every collaborator call goes through [`retry_async`]: each attempt is
//! bounded by a timeout, transient failures are retried with exponential
//! backoff, and a stop request ends the loop before the next attempt.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cancel::CancelFlag;
use crate::error::PipelineError;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,
    /// Base delay for exponential backoff (doubles each attempt).
    pub base_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Bound on a single attempt. A timed-out attempt counts as transient.
    pub attempt_timeout: Option<Duration>,
    /// Operation name for logging.
    pub operation_name: String,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            attempt_timeout: None,
            operation_name: "operation".to_string(),
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with the given operation name.
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            ..Default::default()
        }
    }

    /// Set the maximum number of retries.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the base delay for exponential backoff.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Bound each attempt.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Same policy under another operation name.
    pub fn named(&self, operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            ..self.clone()
        }
    }

    /// Calculate delay for a given attempt number.
    pub(crate) fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        delay.min(self.max_delay)
    }
}

/// Result of a retry operation.
#[derive(Debug)]
pub enum RetryResult<T, E> {
    /// Operation succeeded.
    Success { value: T, attempts: u32 },
    /// Operation failed after all retries exhausted, or with a permanent error.
    Failed { error: E, attempts: u32 },
}

impl<T, E> RetryResult<T, E> {
    /// Returns true if the operation succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, RetryResult::Success { .. })
    }

    /// Number of attempts made.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryResult::Success { attempts, .. } | RetryResult::Failed { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryResult::Success { value, .. } => Ok(value),
            RetryResult::Failed { error, .. } => Err(error),
        }
    }
}

/// Execute an async operation with retry logic.
///
/// # Example
/// ```ignore
/// let config = RetryConfig::new("image_generation").with_max_retries(2);
/// let result = retry_async(&config, &cancel, || async {
///     images.generate_image(prompt, size, &path).await.map_err(PipelineError::from)
/// }).await;
/// ```
pub async fn retry_async<F, Fut, T>(
    config: &RetryConfig,
    cancel: &CancelFlag,
    operation: F,
) -> RetryResult<T, PipelineError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, PipelineError>>,
{
    let mut attempt = 0;

    loop {
        if cancel.is_stopped() {
            return RetryResult::Failed {
                error: PipelineError::Cancelled,
                attempts: attempt,
            };
        }

        let outcome = match config.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, operation()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(PipelineError::Timeout(format!(
                    "{} exceeded {:.0}s",
                    config.operation_name,
                    limit.as_secs_f64()
                ))),
            },
            None => operation().await,
        };

        match outcome {
            Ok(value) => {
                if attempt > 0 {
                    debug!(
                        "{} succeeded after {} retries",
                        config.operation_name, attempt
                    );
                }
                return RetryResult::Success {
                    value,
                    attempts: attempt + 1,
                };
            }
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    "{} failed (attempt {}/{}), retrying in {:?}: {}",
                    config.operation_name,
                    attempt + 1,
                    config.max_retries + 1,
                    delay,
                    e
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.stopped() => {
                        return RetryResult::Failed {
                            error: PipelineError::Cancelled,
                            attempts: attempt + 1,
                        };
                    }
                }
                attempt += 1;
            }
            Err(e) => {
                return RetryResult::Failed {
                    error: e,
                    attempts: attempt + 1,
                }
            }
        }
    }
}
