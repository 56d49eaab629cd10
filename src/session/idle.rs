//! Idle supervision for local sessions

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Tracks the last time traffic was seen
///
/// Clones share state, so the relay pumps can `touch` while a separate
/// future waits on `expired`.
#[derive(Debug, Clone)]
pub struct IdleTimer {
    start: Instant,
    last_activity_ms: Arc<AtomicU64>,
    timeout: Duration,
}

impl IdleTimer {
    /// Start the timer now
    pub fn new(timeout: Duration) -> Self {
        IdleTimer {
            start: Instant::now(),
            last_activity_ms: Arc::new(AtomicU64::new(0)),
            timeout,
        }
    }

    /// Configured idle period
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Record traffic
    pub fn touch(&self) {
        let elapsed = self.start.elapsed().as_millis() as u64;
        self.last_activity_ms.fetch_max(elapsed, Ordering::Relaxed);
    }

    fn deadline(&self) -> Instant {
        let last = Duration::from_millis(self.last_activity_ms.load(Ordering::Relaxed));
        self.start + last + self.timeout
    }

    /// Resolves once `timeout` has passed without a `touch`
    pub async fn expired(&self) {
        loop {
            let deadline = self.deadline();
            if Instant::now() >= deadline {
                return;
            }
            tokio::time::sleep_until(deadline).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_expires_without_traffic() {
        let timer = IdleTimer::new(Duration::from_secs(600));
        let start = Instant::now();

        timer.expired().await;
        assert!(start.elapsed() >= Duration::from_secs(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_pushes_deadline_back() {
        let timer = IdleTimer::new(Duration::from_secs(10));
        let start = Instant::now();

        let toucher = {
            let timer = timer.clone();
            tokio::spawn(async move {
                for _ in 0..3 {
                    tokio::time::sleep(Duration::from_secs(6)).await;
                    timer.touch();
                }
            })
        };

        timer.expired().await;
        // Last touch at 18s, so the timer fires at 28s
        assert!(start.elapsed() >= Duration::from_secs(28));
        toucher.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_expired_before_timeout() {
        let timer = IdleTimer::new(Duration::from_secs(5));
        let result = tokio::time::timeout(Duration::from_secs(4), timer.expired()).await;
        assert!(result.is_err());
        assert_eq!(timer.timeout(), Duration::from_secs(5));
    }
}
