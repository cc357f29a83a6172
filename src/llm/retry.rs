//! Retry with exponential backoff for LLM HTTP calls.

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::error::{Result, Text2SqlError};

/// How often and how patiently a request is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

/// Error from one attempt, tagged with whether another attempt may help.
#[derive(Debug)]
pub struct AttemptError {
    pub error: Text2SqlError,
    pub retryable: bool,
}

impl AttemptError {
    pub fn fatal(error: Text2SqlError) -> Self {
        Self {
            error,
            retryable: false,
        }
    }

    pub fn transient(error: Text2SqlError) -> Self {
        Self {
            error,
            retryable: true,
        }
    }
}

/// Throttling and server-side failures are worth another try.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Maps a transport error; timeouts and refused connections are transient.
pub fn request_error(provider: &str, error: &reqwest::Error) -> AttemptError {
    if error.is_timeout() {
        AttemptError::transient(Text2SqlError::llm(format!(
            "{provider} request timed out. Try again."
        )))
    } else if error.is_connect() {
        AttemptError::transient(Text2SqlError::llm(format!(
            "Failed to connect to {provider}. Check your network."
        )))
    } else {
        AttemptError::fatal(Text2SqlError::llm(format!(
            "{provider} request failed: {error}"
        )))
    }
}

/// Runs `call` until it succeeds, fails for good, or runs out of attempts.
///
/// The delay doubles after every retry.
pub async fn with_retries<T, F, Fut>(provider: &str, policy: RetryPolicy, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, AttemptError>>,
{
    let mut delay = policy.base_delay;
    let mut attempt = 1;

    loop {
        debug!(provider, attempt, "LLM request");
        match call().await {
            Ok(value) => return Ok(value),
            Err(failure) if !failure.retryable || attempt >= policy.max_attempts => {
                return Err(failure.error);
            }
            Err(failure) => {
                warn!(provider, attempt, ?delay, "LLM request failed, retrying: {}", failure.error);
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
        }
    }
}
