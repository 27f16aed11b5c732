//! Reconnection pacing with a fixed backoff

use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How long to wait between reconnection attempts
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Constant delay between attempts, no jitter. Attempts are unbounded.
    pub interval: Duration,
}

impl ReconnectPolicy {
    pub fn fixed(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(5))
    }
}

/// The wait was interrupted by cancellation
#[derive(Debug, Error)]
pub enum ReconnectError {
    #[error("Reconnection cancelled")]
    Cancelled,
}

/// Counts attempts and sleeps the policy's interval between them
pub struct ReconnectManager {
    policy: ReconnectPolicy,
    attempt: usize,
}

impl ReconnectManager {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Wait before next reconnection attempt.
    ///
    /// Returns early with [`ReconnectError::Cancelled`] when `cancel` fires.
    pub async fn wait(&mut self, cancel: &CancellationToken) -> Result<(), ReconnectError> {
        self.attempt += 1;

        debug!(
            "Waiting {}ms before reconnection attempt {}",
            self.policy.interval.as_millis(),
            self.attempt
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ReconnectError::Cancelled),
            _ = sleep(self.policy.interval) => Ok(()),
        }
    }

    /// Reset attempt counter (call after successful connection)
    pub fn reset(&mut self) {
        if self.attempt > 0 {
            debug!("Resetting reconnection attempts after {}", self.attempt);
        }
        self.attempt = 0;
    }

    /// Get current attempt number
    pub fn attempt(&self) -> usize {
        self.attempt
    }

    pub fn interval(&self) -> Duration {
        self.policy.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_backoff_is_constant() {
        let mut manager = ReconnectManager::new(ReconnectPolicy::fixed(Duration::from_secs(5)));
        let cancel = CancellationToken::new();

        for expected_attempt in 1..=4 {
            let started = Instant::now();
            manager.wait(&cancel).await.unwrap();

            assert_eq!(manager.attempt(), expected_attempt);
            assert_eq!(started.elapsed(), Duration::from_secs(5));
        }
    }

    #[tokio::test]
    async fn test_reconnect_reset() {
        let mut manager = ReconnectManager::new(ReconnectPolicy::fixed(Duration::from_millis(1)));
        let cancel = CancellationToken::new();

        manager.wait(&cancel).await.unwrap();
        manager.wait(&cancel).await.unwrap();

        assert_eq!(manager.attempt(), 2);

        manager.reset();

        assert_eq!(manager.attempt(), 0);
        assert_eq!(manager.interval(), Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_are_unbounded() {
        let mut manager = ReconnectManager::new(ReconnectPolicy::fixed(Duration::from_secs(5)));
        let cancel = CancellationToken::new();

        for _ in 0..100 {
            assert!(manager.wait(&cancel).await.is_ok());
        }
        assert_eq!(manager.attempt(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_is_cancellable() {
        let mut manager = ReconnectManager::new(ReconnectPolicy::fixed(Duration::from_secs(3600)));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result = manager.wait(&cancel).await;

        assert!(matches!(result, Err(ReconnectError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(3600));
    }
}
