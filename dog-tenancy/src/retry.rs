use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::TenancyResult;

/// Bounded exponential backoff for transient failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(20),
            max_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before attempt `attempt + 1`, doubling from `base_backoff`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        std::cmp::min(self.base_backoff.saturating_mul(factor), self.max_backoff)
    }

    /// Run `op` until it succeeds, fails permanently or attempts run out.
    /// Only errors with [`is_transient`](crate::TenancyError::is_transient)
    /// are retried.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> TenancyResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = TenancyResult<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let delay = self.backoff_for(attempt);
                    warn!(attempt, max_attempts, ?delay, error = %err, "{what} failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TenancyError;
    use dog_core::TenantId;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(10));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(20));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(40));
        assert_eq!(policy.backoff_for(4), Duration::from_millis(50));
        assert_eq!(policy.backoff_for(40), Duration::from_millis(50));
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = fast(3)
            .run("lookup", move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TenancyError::RegistryUnavailable("down".into()))
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: TenancyResult<()> = fast(2)
            .run("lookup", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(TenancyError::TargetUnavailable("down".into()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn never_retries_tenant_mismatch() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: TenancyResult<()> = fast(5)
            .run("find", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(TenancyError::mismatch(&TenantId::new("t1"), "t2"))
            })
            .await;

        assert!(matches!(result, Err(TenancyError::TenantMismatch { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
