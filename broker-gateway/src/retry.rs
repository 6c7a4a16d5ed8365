use log::warn;
use std::future::Future;
use std::time::Duration;
use trading::BrokerageError;

/// Per-call deadline plus bounded retry for transient failures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    timeout: Duration,
    max_retries: u32,
    backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), 2, Duration::from_millis(500))
    }
}

impl RetryPolicy {
    /// # Arguments
    ///
    /// * `timeout` - Deadline applied to every individual attempt.
    /// * `max_retries` - Extra attempts after the first one.
    /// * `backoff` - Base delay; attempt `n` waits `n * backoff`.
    pub fn new(timeout: Duration, max_retries: u32, backoff: Duration) -> Self {
        Self {
            timeout,
            max_retries,
            backoff,
        }
    }

    /// Runs `op` until it succeeds, fails permanently, or the retry budget is
    /// spent. `idempotent` tells whether a possibly-delivered request may be
    /// sent again (see [`BrokerageError::is_transient`]).
    pub async fn run<T, F, Fut>(&self, label: &str, idempotent: bool, mut op: F) -> Result<T, BrokerageError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BrokerageError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let outcome = match tokio::time::timeout(self.timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(BrokerageError::Timeout(self.timeout)),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_retries && e.is_transient(idempotent) => {
                    attempt += 1;
                    warn!(
                        "{} failed ({}), retry {}/{}",
                        label, e, attempt, self.max_retries
                    );
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(200), max_retries, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = fast_policy(3)
            .run("ltp", true, move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(BrokerageError::Connect("refused".into()))
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = fast_policy(2)
            .run("history", true, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(BrokerageError::Transport("reset".into()))
            })
            .await;

        assert!(matches!(result, Err(BrokerageError::Transport(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = fast_policy(5)
            .run("order", false, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(BrokerageError::rejected("OrderException", "Insufficient margin"))
            })
            .await;

        assert!(matches!(result, Err(BrokerageError::Rejected { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_idempotent_timeout_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let policy = RetryPolicy::new(Duration::from_millis(20), 3, Duration::ZERO);
        let result: Result<(), _> = policy
            .run("order", false, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok(())
            })
            .await;

        assert_eq!(result, Err(BrokerageError::Timeout(Duration::from_millis(20))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
