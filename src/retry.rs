use std::future::Future;

use tokio::time::{sleep, timeout, Duration};
use tokio_util::sync::CancellationToken;

use crate::config::RetryPolicy;
use crate::error::{Error, Result};

/// Run an external call under the policy's per-attempt timeout, retrying
/// transient failures with exponential backoff and 25% jitter. Returns
/// `Error::Cancelled` as soon as the token fires, including mid-call.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    label: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            outcome = timeout(policy.timeout, op()) => outcome,
        };

        let err = match outcome {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => err,
            Err(_) => Error::Timeout(policy.timeout.as_secs()),
        };

        attempt += 1;
        if attempt >= max_attempts || !err.is_retryable() {
            return Err(err);
        }

        let delay = backoff(policy, attempt - 1);
        tracing::warn!(
            attempt,
            max_attempts,
            call = label,
            error = %err,
            "External call failed, retrying in {:?}",
            delay
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = sleep(delay) => {}
        }
    }
}

fn backoff(policy: &RetryPolicy, attempt: u32) -> Duration {
    let base = policy
        .base_delay
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(policy.max_delay);
    let jitter_ms = fastrand::u64(0..=base.as_millis() as u64 / 4);
    base + Duration::from_millis(jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            timeout: Duration::from_millis(200),
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    fn unavailable() -> Error {
        Error::Upstream {
            service: "SerpAPI",
            status: 503,
            message: "unavailable".to_string(),
        }
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let token = CancellationToken::new();

        let value = with_retry(&fast_policy(), &token, "search", || {
            let calls = calls.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(unavailable())
                } else {
                    Ok(7)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let token = CancellationToken::new();

        let err = with_retry(&fast_policy(), &token, "search", || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(unavailable())
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Upstream { status: 503, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let token = CancellationToken::new();

        let err = with_retry(&fast_policy(), &token, "generate", || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::Upstream {
                    service: "Gemini",
                    status: 401,
                    message: "invalid key".to_string(),
                })
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Upstream { status: 401, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let policy = RetryPolicy {
            max_attempts: 1,
            timeout: Duration::from_millis(20),
            ..fast_policy()
        };
        let token = CancellationToken::new();

        let err = with_retry(&policy, &token, "generate", || async {
            sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Timeout(_)));
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_call() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let policy = RetryPolicy {
            timeout: Duration::from_secs(10),
            ..fast_policy()
        };
        let err = with_retry(&policy, &token, "generate", || async {
            sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            ..RetryPolicy::default()
        };
        let delay = backoff(&policy, 8);
        assert!(delay >= Duration::from_secs(10));
        assert!(delay <= Duration::from_millis(12_500));
    }
}
