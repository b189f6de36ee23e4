use crate::config::RetryConfig;
use crate::error::{HealError, Result};
use std::time::Duration;
use tracing::warn;

/// Maximum backoff cap to prevent excessively long waits.
const MAX_DELAY: Duration = Duration::from_secs(30);

/// Bounded retry policy for service calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::ZERO,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_backoff_ms),
        }
    }
}

/// Determine whether an error is transient.
///
/// Retryable: rate limiting (429), server errors (5xx), timeouts and
/// connection issues. When the service answered, only the status code
/// decides. A response that arrived but lacks a completion is never retried.
fn is_retryable(err: &HealError) -> bool {
    match err {
        HealError::Http(e) => e.is_timeout() || e.is_connect(),
        HealError::ApiRequest {
            status: Some(status),
            ..
        } => *status == 429 || (500..600).contains(status),
        HealError::ApiRequest {
            status: None,
            message,
        } => {
            let msg = message.to_lowercase();
            ["timeout", "connection refused", "connection reset"]
                .iter()
                .any(|p| msg.contains(p))
        }
        _ => false,
    }
}

/// Retry an async operation with exponential backoff.
///
/// Starts with `initial_delay` and doubles it each attempt, capping at 30 seconds.
/// Non-retryable errors are returned immediately.
pub async fn retry_with_backoff<F, Fut, T>(policy: RetryPolicy, f: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut delay = policy.initial_delay;
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(val) => return Ok(val),
            Err(err) => {
                if attempt >= policy.max_retries || !is_retryable(&err) {
                    return Err(err);
                }

                attempt += 1;
                warn!(
                    attempt,
                    max_attempts = policy.max_retries + 1,
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "Service call failed, retrying"
                );

                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_succeeds_first_try() {
        let result = retry_with_backoff(policy(3), || async { Ok::<_, HealError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retries_on_retryable_error() {
        let counter = AtomicU32::new(0);

        let result = retry_with_backoff(policy(3), || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(api_error(503, "service unavailable"))
                } else {
                    Ok(99)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 99);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_retry_on_missing_completion() {
        let counter = AtomicU32::new(0);

        let result = retry_with_backoff(policy(3), || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(HealError::MissingCompletion) }
        })
        .await;

        assert!(matches!(result, Err(HealError::MissingCompletion)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausts_retries() {
        let counter = AtomicU32::new(0);

        let result = retry_with_backoff(policy(2), || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(api_error(500, "internal server error")) }
        })
        .await;

        assert!(result.is_err());
        // Initial attempt + 2 retries = 3 total
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_retries_is_single_attempt() {
        let counter = AtomicU32::new(0);

        let result = retry_with_backoff(RetryPolicy::none(), || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(api_error(429, "too many requests")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    fn api_error(status: u16, body: &str) -> HealError {
        HealError::ApiRequest {
            status: Some(status),
            message: format!("{} {}", status, body),
        }
    }

    #[test]
    fn test_retryable_classification() {
        assert!(is_retryable(&api_error(429, "Too Many Requests")));
        assert!(is_retryable(&api_error(502, "Bad Gateway")));
        assert!(is_retryable(&HealError::ApiRequest {
            status: None,
            message: "connection reset".into(),
        }));

        assert!(!is_retryable(&api_error(401, "Unauthorized")));
        assert!(!is_retryable(&api_error(400, "invalid model")));
        assert!(!is_retryable(&HealError::ApiRequest {
            status: None,
            message: "some random error".into(),
        }));
        assert!(!is_retryable(&HealError::EmptyCompletion));
        assert!(!is_retryable(&HealError::MissingCredential("x".into())));
    }

    #[test]
    fn test_status_decides_over_body_text() {
        assert!(is_retryable(&api_error(
            429,
            r#"{"error":{"message":"Rate limit hit, wait 400 seconds"}}"#
        )));
        assert!(is_retryable(&api_error(
            503,
            r#"{"error":{"code":"InvalidState","message":"unauthorized upstream"}}"#
        )));
        assert!(!is_retryable(&api_error(404, "upstream returned 503")));
    }

    #[test]
    fn test_policy_from_config() {
        let policy = RetryPolicy::from(&RetryConfig {
            max_retries: 4,
            initial_backoff_ms: 250,
        });
        assert_eq!(policy.max_retries, 4);
        assert_eq!(policy.initial_delay, Duration::from_millis(250));
    }
}
