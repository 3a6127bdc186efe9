//! Retry with exponential backoff for outbound calls.
//!
//! Used by the push webhook client of the notification worker.

use backon::{ExponentialBuilder, Retryable};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Backoff policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound of any delay.
    pub max_delay: Duration,
    /// Growth factor between delays.
    pub factor: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            factor: 1.0,
        }
    }

    /// Set the number of retries.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the initial delay.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries as usize)
            .with_factor(self.factor)
            .with_jitter()
    }
}

/// Runs `operation` until it succeeds, fails permanently or the policy is
/// exhausted. Only errors accepted by [`is_transient`] are retried.
///
/// # Errors
///
/// Returns the last error of the operation.
pub async fn retry<F, Fut, T>(policy: &RetryPolicy, operation_name: &str, operation: F) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let max_retries = policy.max_retries;
    let mut attempt = 0u32;
    let notify = |err: &anyhow::Error, dur: Duration| {
        attempt += 1;
        warn!(
            operation = %operation_name,
            attempt,
            max_retries,
            next_delay_ms = dur.as_millis() as u64,
            error = %err,
            "Operation failed, will retry"
        );
    };

    operation
        .retry(policy.backoff())
        .when(is_transient)
        .notify(notify)
        .await
}

/// Whether an error is worth retrying: transport failures, timeouts and
/// retryable HTTP statuses.
pub fn is_transient(error: &anyhow::Error) -> bool {
    for cause in error.chain() {
        if let Some(status) = cause.downcast_ref::<StatusError>() {
            return is_retryable_status(status.0);
        }
        if let Some(err) = cause.downcast_ref::<reqwest::Error>() {
            if err.is_timeout() || err.is_connect() || err.is_request() {
                debug!(error = %err, "Transient transport error");
                return true;
            }
            if let Some(status) = err.status() {
                return is_retryable_status(status.as_u16());
            }
        }
    }

    let msg = error.to_string().to_lowercase();
    msg.contains("connection refused")
        || msg.contains("connection reset")
        || msg.contains("timed out")
        || msg.contains("database is locked")
}

/// HTTP statuses worth retrying.
#[must_use]
pub const fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

/// Non-success HTTP status returned by a remote endpoint.
#[derive(Debug, thiserror::Error)]
#[error("remote returned status {0}")]
pub struct StatusError(pub u16);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick() -> RetryPolicy {
        RetryPolicy::default().with_initial_delay(Duration::from_millis(5))
    }

    #[test]
    fn test_retryable_statuses() {
        for status in [408, 429, 500, 502, 503, 504] {
            assert!(is_retryable_status(status), "{status}");
        }
        for status in [200, 400, 401, 404] {
            assert!(!is_retryable_status(status), "{status}");
        }
    }

    #[test]
    fn test_status_error_classification() {
        assert!(is_transient(&anyhow::Error::new(StatusError(503))));
        assert!(!is_transient(&anyhow::Error::new(StatusError(400))));
        assert!(is_transient(&anyhow::anyhow!("connection refused")));
        assert!(!is_transient(&anyhow::anyhow!("invalid device token")));
    }

    #[tokio::test]
    async fn test_retry_until_success() -> anyhow::Result<()> {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let value = retry(&quick(), "push", || {
            let c = counter.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(StatusError(503).into())
                } else {
                    Ok(7)
                }
            }
        })
        .await?;

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: anyhow::Result<()> = retry(&quick(), "push", || {
            let c = counter.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(StatusError(400).into())
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: anyhow::Result<()> = retry(&quick().with_max_retries(2), "push", || {
            let c = counter.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(StatusError(502).into())
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
