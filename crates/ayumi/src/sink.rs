//! Submission hand-off for completed flows.
//!
//! The controller's contract ends when it returns the finalized payload.
//! Everything here runs afterwards: a failed submission never reopens the
//! flow, and retrying is the sink's business.

use async_trait::async_trait;
use ayumi_core::{FlowKind, Payload};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{info, warn};

/// Identifier assigned by the backend to an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubmissionId(String);

impl SubmissionId {
    /// Creates a new SubmissionId.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SubmissionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Errors reported by a [`SubmissionSink`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SubmissionError {
    /// The backend refused the payload. Retrying will not help.
    #[error("Submission rejected: {0}")]
    Rejected(String),

    /// The backend could not be reached.
    #[error("Submission sink unavailable: {0}")]
    Unavailable(String),

    /// No answer within the configured timeout.
    #[error("Submission timed out after {attempts} attempt(s)")]
    Timeout {
        /// Attempts made before giving up.
        attempts: u32,
    },
}

impl SubmissionError {
    /// Returns `true` for transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SubmissionError::Unavailable(_) | SubmissionError::Timeout { .. }
        )
    }
}

/// Receives finalized payloads, typically by sending them to a backend.
///
/// # Examples
///
/// ```
/// use ayumi::{FlowKind, Payload, SubmissionError, SubmissionId, SubmissionSink};
/// use async_trait::async_trait;
///
/// struct Discard;
///
/// #[async_trait]
/// impl SubmissionSink for Discard {
///     async fn submit(&self, kind: FlowKind, _payload: &Payload) -> Result<SubmissionId, SubmissionError> {
///         Ok(SubmissionId::new(format!("{}-0", kind)))
///     }
/// }
/// ```
#[async_trait]
pub trait SubmissionSink: Send + Sync {
    /// Submits a completed flow's payload.
    async fn submit(&self, kind: FlowKind, payload: &Payload)
        -> Result<SubmissionId, SubmissionError>;
}

/// How often, and how long apart, a transient submission failure is retried.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Give up after the first failure.
    #[default]
    None,
    /// Wait the same `delay` before each retry.
    Fixed {
        /// Retries after the first attempt.
        max_retries: u32,
        /// Wait before each retry.
        delay: Duration,
    },
    /// Multiply the wait by `multiplier` after each retry, up to `max_delay`.
    ExponentialBackoff {
        /// Retries after the first attempt.
        max_retries: u32,
        /// Wait before the first retry.
        initial_delay: Duration,
        /// Upper bound on any single wait.
        max_delay: Duration,
        /// Growth factor between consecutive waits.
        multiplier: u32,
    },
}

/// Invalid [`RetryPolicy::exponential_backoff`] settings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RetryPolicyError {
    /// A zero multiplier would make every wait after the first zero.
    #[error("Backoff multiplier must be greater than 0")]
    ZeroMultiplier,

    /// The cap is below the first wait.
    #[error("max_delay {max_delay:?} is below initial_delay {initial_delay:?}")]
    DelayCapTooLow {
        /// Requested first wait.
        initial_delay: Duration,
        /// Requested cap.
        max_delay: Duration,
    },
}

impl RetryPolicy {
    /// Retries `max_retries` times, `delay` apart.
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        RetryPolicy::Fixed { max_retries, delay }
    }

    /// Doubling backoff capped at one minute.
    ///
    /// ```
    /// use ayumi::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::exponential(5, Duration::from_millis(100));
    ///
    /// // Delays: 100ms, 200ms, 400ms, 800ms, 1600ms
    /// assert_eq!(policy.delay_for_attempt(0), Some(Duration::from_millis(100)));
    /// assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(400)));
    /// ```
    pub fn exponential(max_retries: u32, initial_delay: Duration) -> Self {
        RetryPolicy::ExponentialBackoff {
            max_retries,
            initial_delay,
            max_delay: Duration::from_secs(60),
            multiplier: 2,
        }
    }

    /// Backoff with explicit cap and growth factor.
    ///
    /// # Errors
    ///
    /// Returns [`RetryPolicyError`] if `multiplier` is 0 or `max_delay` is
    /// below `initial_delay`. Large multipliers are fine: waits saturate
    /// and are then capped.
    pub fn exponential_backoff(
        max_retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: u32,
    ) -> Result<Self, RetryPolicyError> {
        if multiplier == 0 {
            return Err(RetryPolicyError::ZeroMultiplier);
        }
        if max_delay < initial_delay {
            return Err(RetryPolicyError::DelayCapTooLow {
                initial_delay,
                max_delay,
            });
        }
        Ok(RetryPolicy::ExponentialBackoff {
            max_retries,
            initial_delay,
            max_delay,
            multiplier,
        })
    }

    /// Retries allowed after the first attempt.
    pub fn max_retries(&self) -> u32 {
        match self {
            RetryPolicy::None => 0,
            RetryPolicy::Fixed { max_retries, .. }
            | RetryPolicy::ExponentialBackoff { max_retries, .. } => *max_retries,
        }
    }

    /// Wait before retry number `attempt` (0-indexed), or `None` when the
    /// policy never retries.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        match self {
            RetryPolicy::None => None,
            RetryPolicy::Fixed { delay, .. } => Some(*delay),
            RetryPolicy::ExponentialBackoff {
                initial_delay,
                max_delay,
                multiplier,
                ..
            } => {
                let factor = multiplier.saturating_pow(attempt);
                Some(initial_delay.saturating_mul(factor).min(*max_delay))
            }
        }
    }
}

/// Timeout and retry settings for [`RetryingSink`].
#[derive(Debug, Clone)]
pub struct SubmissionConfig {
    /// Maximum time allowed per attempt.
    pub timeout: Duration,
    /// Retry policy for transient failures.
    pub retry_policy: RetryPolicy,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry_policy: RetryPolicy::None,
        }
    }
}

/// Wraps a sink with a per-attempt timeout and a retry policy.
///
/// Only [retryable](SubmissionError::is_retryable) failures are retried.
#[derive(Debug)]
pub struct RetryingSink<S> {
    inner: S,
    config: SubmissionConfig,
}

impl<S: SubmissionSink> RetryingSink<S> {
    /// Wraps `inner` with `config`.
    pub fn new(inner: S, config: SubmissionConfig) -> Self {
        Self { inner, config }
    }

    /// Returns the wrapped sink.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn wait_for_retry(&self, kind: FlowKind, attempt: u32, reason: &SubmissionError) {
        info!(
            "Submission of {} flow failed ({}), retrying ({}/{})",
            kind,
            reason,
            attempt + 1,
            self.config.retry_policy.max_retries()
        );
        if let Some(delay) = self.config.retry_policy.delay_for_attempt(attempt) {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl<S: SubmissionSink> SubmissionSink for RetryingSink<S> {
    async fn submit(
        &self,
        kind: FlowKind,
        payload: &Payload,
    ) -> Result<SubmissionId, SubmissionError> {
        let max_retries = self.config.retry_policy.max_retries();
        let mut attempt = 0;

        loop {
            let error = match timeout(self.config.timeout, self.inner.submit(kind, payload)).await
            {
                Ok(Ok(id)) => return Ok(id),
                Ok(Err(e)) => e,
                Err(_) => SubmissionError::Timeout {
                    attempts: attempt + 1,
                },
            };

            if !error.is_retryable() || attempt >= max_retries {
                warn!(
                    "Submission of {} flow failed after {} retries: {}",
                    kind, attempt, error
                );
                return Err(error);
            }
            self.wait_for_retry(kind, attempt, &error).await;
            attempt += 1;
        }
    }
}

/// Hands a completed flow's payload to `sink`.
///
/// The flow is already `Completed` when this runs; a failure here is
/// reported to the caller and nothing else.
pub async fn submit_completed<S>(
    sink: &S,
    kind: FlowKind,
    payload: Payload,
) -> Result<SubmissionId, SubmissionError>
where
    S: SubmissionSink + ?Sized,
{
    info!("Submitting {} flow with {} fields", kind, payload.len());
    match sink.submit(kind, &payload).await {
        Ok(id) => {
            info!("{} flow accepted as '{}'", kind, id);
            Ok(id)
        }
        Err(e) => {
            warn!("{} flow submission failed: {}", kind, e);
            Err(e)
        }
    }
}
