//! Transient-failure retry for state-store operations.
//!
//! Connection-level failures retry with exponential backoff (1s base,
//! factor 2, capped attempts); everything else surfaces immediately. After
//! exhaustion the typed transient error propagates to the caller.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::RetryConfig;

/// Run a state-store operation, retrying transient failures per the policy.
pub async fn with_backoff<T, F, Fut>(policy: &RetryConfig, mut op: F) -> DomainResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DomainResult<T>>,
{
    let mut backoff = ExponentialBackoff {
        initial_interval: Duration::from_millis(policy.initial_backoff_ms),
        multiplier: policy.multiplier,
        max_elapsed_time: None,
        ..ExponentialBackoff::default()
    };

    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = backoff
                    .next_backoff()
                    .unwrap_or(Duration::from_millis(policy.initial_backoff_ms));
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient state-store failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Classify and wrap an arbitrary failure as transient.
pub fn transient(msg: impl Into<String>) -> DomainError {
    DomainError::Transient(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryConfig {
        RetryConfig { initial_backoff_ms: 1, multiplier: 1.0, max_attempts: 3 }
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(&fast_policy(), || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(transient("connection refused"))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_surfaces_transient() {
        let calls = AtomicU32::new(0);
        let result: DomainResult<()> = with_backoff(&fast_policy(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(transient("still down"))
        })
        .await;
        assert!(matches!(result, Err(DomainError::Transient(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_not_retried() {
        let calls = AtomicU32::new(0);
        let result: DomainResult<()> = with_backoff(&fast_policy(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(DomainError::TaskNotFound("t1".into()))
        })
        .await;
        assert!(matches!(result, Err(DomainError::TaskNotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
