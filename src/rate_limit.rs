//! Pacing for outbound classification calls.
//!
//! [`RateLimiter::acquire`] holds each caller until the configured minimum
//! interval has elapsed since the previous caller was let through. Waiting
//! callers queue on a fair async mutex, so they are released in arrival
//! order. The limiter paces start times only; it does not bound how many
//! calls are in flight.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Default minimum interval between classification call starts.
pub const MIN_INTERVAL: Duration = Duration::from_millis(3_000);

/// Minimum-interval pacer owned by one classifier.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    /// Start of the most recently admitted call.
    last_request: Mutex<Option<Instant>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(MIN_INTERVAL)
    }
}

impl RateLimiter {
    /// Create a limiter that spaces call starts by `min_interval`.
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Configured minimum interval.
    #[must_use]
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until a call may start, then record the start time.
    ///
    /// Returns immediately when the interval has already elapsed. Never fails.
    pub async fn acquire(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.min_interval;
            if ready_at > Instant::now() {
                tracing::debug!(
                    wait_ms = whole_millis(ready_at.saturating_duration_since(Instant::now())),
                    "pacing classification call"
                );
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Milliseconds in `wait`, saturating at `u64::MAX`.
fn whole_millis(wait: Duration) -> u64 {
    u64::try_from(wait.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn first_acquire_is_immediate() {
        let limiter = RateLimiter::default();
        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn back_to_back_acquires_are_spaced() {
        let limiter = RateLimiter::default();
        limiter.acquire().await;
        let first = Instant::now();
        limiter.acquire().await;
        let second = Instant::now();
        assert!(second - first >= MIN_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_after_interval_is_immediate() {
        let limiter = RateLimiter::new(Duration::from_millis(100));
        limiter.acquire().await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        let before = Instant::now();
        limiter.acquire().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn partial_wait_covers_only_the_remainder() {
        let limiter = RateLimiter::new(Duration::from_millis(1_000));
        limiter.acquire().await;
        tokio::time::sleep(Duration::from_millis(400)).await;
        let before = Instant::now();
        limiter.acquire().await;
        let waited = before.elapsed();
        assert!(waited >= Duration::from_millis(600));
        assert!(waited < Duration::from_millis(700));
    }

    #[test]
    fn whole_millis_saturates_instead_of_wrapping() {
        assert_eq!(whole_millis(Duration::from_millis(600)), 600);
        assert_eq!(whole_millis(Duration::MAX), u64::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn very_long_interval_keeps_the_caller_waiting() {
        let limiter = RateLimiter::new(Duration::from_secs(60 * 60 * 24 * 365));
        limiter.acquire().await;
        let second = tokio::time::timeout(Duration::from_secs(60), limiter.acquire()).await;
        assert!(second.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_are_released_in_order() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(500)));
        let origin = Instant::now();
        let mut handles = Vec::new();
        for i in 0..3u64 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                // Stagger arrival so the queue order is deterministic.
                tokio::time::sleep(Duration::from_millis(i)).await;
                limiter.acquire().await;
                (i, Instant::now())
            }));
        }
        let mut starts = Vec::new();
        for handle in handles {
            starts.push(handle.await.unwrap());
        }
        starts.sort_by_key(|&(_, at)| at);
        let order: Vec<u64> = starts.iter().map(|&(i, _)| i).collect();
        assert_eq!(order, vec![0, 1, 2]);
        for pair in starts.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= Duration::from_millis(500));
        }
        assert!(starts[2].1 - origin >= Duration::from_millis(1_000));
    }
}
