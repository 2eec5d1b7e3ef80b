use std::future::Future;
use std::time::Duration;

use crate::error::AppError;

/// Fixed-delay retry for transient storage conflicts.
///
/// Business errors are returned on the first attempt; only [`AppError::Transient`]
/// is retried, up to `attempts` tries in total.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Err(e) if e.is_transient() && attempt < self.attempts => {
                    tracing::warn!(
                        operation,
                        attempt,
                        "Transient storage conflict, retrying in {:?}: {}",
                        self.delay,
                        e
                    );
                    attempt += 1;
                    tokio::time::sleep(self.delay).await;
                }
                result => return result,
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            crate::config::DEFAULT_RETRY_ATTEMPTS,
            Duration::from_millis(crate::config::DEFAULT_RETRY_DELAY_MS),
        )
    }
}
