//! Timeouts and retries around calls to external services

use crate::types::{RagError, RagResult, UpstreamKind};
use ragbot_core::{retry_async, with_timeout, RagbotConfig, RetryConfig};
use std::future::Future;
use std::time::Duration;

/// Which collaborator a call goes to; decides how a timeout is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upstream {
    Model,
    Store,
}

#[derive(Debug, Clone)]
pub struct CallPolicy {
    pub timeout: Duration,
    pub retry: RetryConfig,
}

impl CallPolicy {
    pub fn new(timeout: Duration, retry: RetryConfig) -> Self {
        Self { timeout, retry }
    }

    pub fn for_llm(config: &RagbotConfig) -> Self {
        Self::new(config.llm.timeout(), config.retry.clone())
    }

    pub fn for_embedding(config: &RagbotConfig) -> Self {
        Self::new(config.embedding.timeout(), config.retry.clone())
    }

    pub fn for_store(config: &RagbotConfig) -> Self {
        Self::new(config.store.timeout(), config.retry.clone())
    }
}

/// Run `call` with a per-attempt timeout, retrying recoverable failures
pub async fn guarded<F, Fut, T>(
    policy: &CallPolicy,
    upstream: Upstream,
    operation: &str,
    mut call: F,
) -> RagResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RagResult<T>>,
{
    let limit = policy.timeout;
    retry_async(
        || {
            let attempt = call();
            async move {
                match with_timeout(attempt, limit, operation).await {
                    Ok(result) => result,
                    Err(_) => Err(timed_out(upstream, operation, limit)),
                }
            }
        },
        &policy.retry,
        operation,
    )
    .await
}

fn timed_out(upstream: Upstream, operation: &str, limit: Duration) -> RagError {
    let message = format!("{} timed out after {}ms", operation, limit.as_millis());
    match upstream {
        Upstream::Model => RagError::model(UpstreamKind::Timeout, message),
        Upstream::Store => RagError::store(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn policy(timeout_ms: u64) -> CallPolicy {
        CallPolicy::new(
            Duration::from_millis(timeout_ms),
            RetryConfig {
                max_attempts: 2,
                initial_delay_ms: 1,
                max_delay_ms: 1,
                backoff_multiplier: 1.0,
                jitter: false,
            },
        )
    }

    #[tokio::test]
    async fn test_timeout_maps_to_upstream_kind() {
        let calls = AtomicUsize::new(0);
        let result: RagResult<()> = guarded(&policy(5), Upstream::Model, "slow", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            }
        })
        .await;

        assert!(matches!(
            result,
            Err(RagError::UpstreamModel {
                kind: UpstreamKind::Timeout,
                ..
            })
        ));
        // timeouts are recoverable, so both attempts ran
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_malformed_is_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: RagResult<()> = guarded(&policy(100), Upstream::Model, "bad", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(RagError::model(UpstreamKind::Malformed, "junk")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_store_timeout() {
        let result: RagResult<()> = guarded(&policy(1), Upstream::Store, "query", || async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(RagError::UpstreamStore { .. })));
    }
}
