use std::future::Future;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::error::Result;

/// Run `op` up to `attempts` times with linear backoff between failures.
/// The 1-based attempt number is passed to `op` so callers can log it.
/// Zero attempts is treated as one.
pub async fn with_retries<T, F, Fut>(attempts: u32, backoff: Duration, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                warn!(attempt, error = %e, "Attempt failed, retrying");
                tokio::time::sleep(backoff * attempt).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Soft deadline for a whole run. Per-call timeouts are capped by the
/// remaining budget so in-flight provider calls abort at expiry while
/// already-accumulated results keep flowing.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
        }
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Time left; zero once expired.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// Cap a per-call timeout by the remaining run budget.
    pub fn cap(&self, timeout: Duration) -> Duration {
        timeout.min(self.remaining())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_succeeds_after_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = with_retries(2, Duration::from_millis(1), move |_| {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(PipelineError::Extraction("first try fails".to_string()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: crate::error::Result<u32> =
            with_retries(2, Duration::from_millis(1), move |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(PipelineError::Extraction("always fails".to_string()))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_attempts_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = with_retries(0, Duration::from_millis(1), move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_deadline_caps_timeouts() {
        let deadline = Deadline::after(Duration::from_secs(10));
        assert!(!deadline.expired());
        assert!(deadline.cap(Duration::from_secs(60)) <= Duration::from_secs(10));
        assert_eq!(
            deadline.cap(Duration::from_millis(5)),
            Duration::from_millis(5)
        );

        let expired = Deadline::after(Duration::from_secs(0));
        assert!(expired.expired());
        assert_eq!(expired.remaining(), Duration::ZERO);
    }
}
