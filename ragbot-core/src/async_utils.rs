//! Async utilities
//!
//! Retry with backoff, timeouts and ordered bounded concurrency for calls to
//! external services.

use crate::error::{ErrorContext, RagbotError, RagbotResult, Recoverable};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: usize,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Backoff multiplier (exponential backoff)
    pub backoff_multiplier: f64,
    /// Whether to add +/-10% jitter to delays
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 8000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// A single attempt, no retries
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    fn delay_for(&self, base_ms: u64) -> Duration {
        let actual = if self.jitter {
            let jitter_factor = 0.1;
            let jitter = (fastrand::f64() - 0.5) * 2.0 * jitter_factor;
            ((base_ms as f64) * (1.0 + jitter)) as u64
        } else {
            base_ms
        };
        Duration::from_millis(actual)
    }
}

/// Retry an async operation with exponential backoff.
///
/// Only errors whose [`Recoverable::is_recoverable`] is true are retried; the
/// last error is returned once `max_attempts` is reached.
pub async fn retry_async<F, Fut, T, E>(
    mut operation: F,
    config: &RetryConfig,
    operation_name: &str,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display + Recoverable,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    let mut delay = config.initial_delay_ms;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(error) => {
                if !error.is_recoverable() || attempt >= max_attempts {
                    return Err(error);
                }

                warn!(
                    operation = operation_name,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    error = %error,
                    delay_ms = delay,
                    "Operation failed, retrying"
                );

                sleep(config.delay_for(delay)).await;

                delay = ((delay as f64) * config.backoff_multiplier) as u64;
                delay = delay.min(config.max_delay_ms);
            }
        }
    }
}

/// Bound a future by `limit`, turning expiry into [`RagbotError::Timeout`]
pub async fn with_timeout<F, T>(future: F, limit: Duration, operation_name: &str) -> RagbotResult<T>
where
    F: Future<Output = T>,
{
    match timeout(limit, future).await {
        Ok(result) => Ok(result),
        Err(_) => {
            let timeout_ms = limit.as_millis() as u64;
            Err(RagbotError::Timeout {
                operation: operation_name.to_string(),
                duration_ms: timeout_ms,
                context: ErrorContext::new("async_utils")
                    .with_operation("timeout")
                    .with_metadata("timeout_ms", &timeout_ms.to_string())
                    .with_suggestion("Increase the timeout for this service")
                    .with_suggestion("Check network connectivity"),
            })
        }
    }
}

/// Run `processor` over `items` with at most `max_concurrent` in flight.
///
/// Results come back in input order.
pub async fn process_concurrently<T, R, F, Fut>(
    items: Vec<T>,
    max_concurrent: usize,
    processor: F,
) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    stream::iter(items)
        .map(processor)
        .buffered(max_concurrent.max(1))
        .collect()
        .await
}
