//! Retry policy and failure classification for remote services.
//!
//! Both the translator and the dictionary enricher talk to rate-limited
//! third-party APIs. Failures are classified once into a [`ServiceErrorKind`]
//! and a [`RetryPolicy`] decides whether and how long to wait before the next
//! attempt.

use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Category of a remote service failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    /// HTTP 429, quota exhausted, "too many requests".
    RateLimited,
    /// HTTP 502/503, connection refused, "service unavailable".
    Unavailable,
    /// Request or gateway timeout.
    Timeout,
    /// The service answered successfully but with empty text.
    EmptyResponse,
    /// HTTP 404 for the requested resource.
    NotFound,
    /// Any other 4xx rejection.
    Rejected,
    /// The payload could not be parsed.
    Malformed,
    /// Anything else.
    Other,
}

/// A classified failure from a remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    pub kind: ServiceErrorKind,
    pub message: String,
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ServiceError {}

impl ServiceError {
    pub fn new(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Classifies a non-success HTTP status and its response body.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let kind = match status.as_u16() {
            429 => ServiceErrorKind::RateLimited,
            502 | 503 => ServiceErrorKind::Unavailable,
            408 | 504 => ServiceErrorKind::Timeout,
            404 => ServiceErrorKind::NotFound,
            // Some backends report quota exhaustion as 400/403 with a message.
            400..=499 => match classify_message(body) {
                ServiceErrorKind::Other => ServiceErrorKind::Rejected,
                kind => kind,
            },
            _ => classify_message(body),
        };
        Self::new(kind, format!("status {}: {}", status, body.trim()))
    }

    /// A successful response that carried no usable text.
    pub fn empty_response(what: &str) -> Self {
        Self::new(
            ServiceErrorKind::EmptyResponse,
            format!("Empty {} received", what),
        )
    }

    /// Whether waiting and retrying is likely to help.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            ServiceErrorKind::RateLimited
                | ServiceErrorKind::Unavailable
                | ServiceErrorKind::Timeout
                | ServiceErrorKind::EmptyResponse
        )
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            ServiceErrorKind::Timeout
        } else if e.is_connect() {
            ServiceErrorKind::Unavailable
        } else if e.is_decode() {
            ServiceErrorKind::Malformed
        } else if let Some(status) = e.status() {
            ServiceError::from_status(status, "").kind
        } else {
            classify_message(&e.to_string())
        };
        Self::new(kind, e.to_string())
    }
}

/// Maps an error message onto a failure category.
pub fn classify_message(message: &str) -> ServiceErrorKind {
    let msg = message.to_lowercase();
    if msg.contains("429")
        || msg.contains("rate limit")
        || msg.contains("quota")
        || msg.contains("too many requests")
    {
        ServiceErrorKind::RateLimited
    } else if msg.contains("service unavailable") || msg.contains("503") || msg.contains("502") {
        ServiceErrorKind::Unavailable
    } else if msg.contains("timed out") || msg.contains("timeout") {
        ServiceErrorKind::Timeout
    } else {
        ServiceErrorKind::Other
    }
}

/// Retries every failure.
pub fn retry_any(_: &ServiceError) -> bool {
    true
}

/// Retries only transient failures.
pub fn retry_transient(e: &ServiceError) -> bool {
    e.is_transient()
}

/// Bounded per-call retry with linear backoff for transient failures.
///
/// Attempt `n` that fails transiently waits `base_delay * n`; any other
/// retryable failure waits `fallback_delay`. No wait follows the final attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub fallback_delay: Duration,
    /// Failures for which another attempt is made at all.
    pub retryable: fn(&ServiceError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            fallback_delay: Duration::from_secs(1),
            retryable: retry_any,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, fallback_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            fallback_delay,
            retryable: retry_any,
        }
    }

    /// A policy that makes a single attempt.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Replaces the retryable predicate.
    pub fn retry_on(mut self, retryable: fn(&ServiceError) -> bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Wait before the attempt following failed attempt `attempt` (1-based).
    pub fn delay_for(&self, error: &ServiceError, attempt: u32) -> Duration {
        if error.is_transient() {
            self.base_delay * attempt
        } else {
            self.fallback_delay
        }
    }

    /// Runs `op` until it succeeds, a non-retryable error occurs, or the
    /// attempt budget is spent. `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, ServiceError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("'{}' succeeded on attempt {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(e) => {
                    if attempt >= max_attempts || !(self.retryable)(&e) {
                        return Err(e);
                    }

                    let wait = self.delay_for(&e, attempt);
                    warn!(
                        "'{}' failed ({}). Waiting {:?} before retry {}/{}...",
                        label, e, wait, attempt, max_attempts
                    );
                    if !wait.is_zero() {
                        tokio::time::sleep(wait).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}
