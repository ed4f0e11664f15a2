//! # Retry Wrapper
//!
//! Bounded retry with linear backoff around a single transport call. The wait after
//! failed attempt `k` is `k` backoff units (1s, 2s, 3s, ... by default). There is no
//! jitter and no cap on the delay; the feeds are polled at chat-message rates.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use super::ky_http::RequestResult;

/// Attempt count and backoff unit for [`retry_with_backoff`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, the first one included. Never zero.
    pub max_attempts: u32,
    /// Delay multiplied by the attempt number between attempts.
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy; `max_attempts` is raised to at least one.
    pub fn new(max_attempts: u32, backoff_unit: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_unit,
        }
    }

    /// Wait inserted after failed attempt number `attempt` (1-based).
    /// Saturates at `Duration::MAX`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff_unit.checked_mul(attempt).unwrap_or(Duration::MAX)
    }

    /// Upper bound of the time spent sleeping between attempts.
    pub fn total_backoff(&self) -> Duration {
        (1..self.max_attempts)
            .map(|k| self.delay_after(k))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

/// Invokes `operation` until it returns an `ok` result or the policy is exhausted.
///
/// HTTP error statuses and transport failures are both retried. When every attempt
/// fails, the last result is returned with its `error` rewritten to name the attempt
/// count and the last attempt's own error text; status and body are kept.
pub async fn retry_with_backoff<F, Fut>(policy: &RetryPolicy, mut operation: F) -> RequestResult
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RequestResult>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;
        let mut result = operation().await;
        if result.ok {
            if attempts > 1 {
                log::info!("Request succeeded on attempt {attempts}/{max_attempts}");
            }
            return result;
        }

        log::warn!(
            "Request failed (Attempt {}/{}): {}",
            attempts,
            max_attempts,
            result.error_text()
        );

        if attempts >= max_attempts {
            let last_error = result
                .error
                .take()
                .unwrap_or_else(|| "unknown error".to_string());
            result.error = Some(format!(
                "failed after {max_attempts} attempts; last error: {last_error}"
            ));
            return result;
        }

        sleep(policy.delay_after(attempts)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    fn success() -> RequestResult {
        RequestResult {
            ok: true,
            status_code: Some(200),
            body_text: "fine".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn succeeds_after_k_failures_with_k_plus_one_calls() {
        for k in 0..5 {
            let calls = AtomicU32::new(0);
            let result = retry_with_backoff(&fast_policy(5), || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < k {
                        RequestResult::failure(format!("boom {n}"))
                    } else {
                        success()
                    }
                }
            })
            .await;

            assert!(result.ok);
            assert_eq!(result.body_text, "fine");
            assert_eq!(calls.load(Ordering::SeqCst), k + 1);
        }
    }

    #[tokio::test]
    async fn always_failing_stops_at_n_and_keeps_last_error() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&fast_policy(5), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { RequestResult::failure(format!("connection refused #{n}")) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert!(!result.ok);
        let error = result.error_text();
        assert!(error.contains('5'));
        assert!(error.contains("connection refused #5"));
        assert!(!error.contains("#4"));
    }

    #[tokio::test]
    async fn status_failures_keep_their_body() {
        let result = retry_with_backoff(&fast_policy(2), || async {
            RequestResult {
                status_code: Some(502),
                body_text: "bad gateway".into(),
                error: Some("HTTP status 502 Bad Gateway".into()),
                ..Default::default()
            }
        })
        .await;

        assert_eq!(result.status_code, Some(502));
        assert_eq!(result.body_text, "bad gateway");
        assert!(result.error_text().contains("502 Bad Gateway"));
    }

    #[test]
    fn backoff_is_linear() {
        let policy = RetryPolicy::default();
        let delays: Vec<_> = (1..policy.max_attempts).map(|k| policy.delay_after(k)).collect();
        assert_eq!(
            delays,
            [1, 2, 3, 4].map(Duration::from_secs).to_vec()
        );
        assert_eq!(policy.total_backoff(), Duration::from_secs(10));
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[test]
    fn huge_backoff_unit_saturates() {
        let unit = Duration::from_secs(u64::MAX / 2);
        let policy = RetryPolicy::new(5, unit);
        assert_eq!(policy.delay_after(1), unit);
        assert_eq!(policy.delay_after(3), Duration::MAX);
        assert_eq!(policy.total_backoff(), Duration::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_linear_delays_between_attempts() {
        let policy = RetryPolicy::new(4, Duration::from_secs(1));
        let started = tokio::time::Instant::now();
        let calls = AtomicU32::new(0);

        let result = retry_with_backoff(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { RequestResult::failure("connection refused") }
        })
        .await;

        assert!(!result.ok);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // 1s + 2s + 3s
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(6), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(6_100), "{elapsed:?}");
        assert_eq!(policy.total_backoff(), Duration::from_secs(6));
    }
}
