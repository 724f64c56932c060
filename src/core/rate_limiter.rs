//! Publish rate limiting
//! A token bucket shared by every publish into the hub.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{HubError, Result};

#[derive(Debug)]
struct TokenBucket {
    capacity: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn refill(&mut self, now: Instant, refill_interval: Duration) {
        let elapsed = now.duration_since(self.last_refill);
        if elapsed.is_zero() {
            return;
        }
        let earned = elapsed.as_secs_f64() / refill_interval.as_secs_f64();
        self.tokens = (self.tokens + earned).min(self.capacity);
        self.last_refill = now;
    }
}

/// Token bucket: `capacity` tokens, one token earned per `refill_interval`
pub struct RateLimiter {
    bucket: Mutex<TokenBucket>,
    refill_interval: Duration,
}

impl RateLimiter {
    pub fn new(capacity: u32, refill_interval: Duration) -> Self {
        let capacity = f64::from(capacity.max(1));
        Self {
            bucket: Mutex::new(TokenBucket {
                capacity,
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            refill_interval,
        }
    }

    /// Wait until a token is available and take it.
    /// Dropping the future abandons the wait without consuming a token.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                bucket.refill(Instant::now(), self.refill_interval);
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                self.refill_interval.mul_f64(1.0 - bucket.tokens)
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// `acquire` bounded by a deadline
    pub async fn acquire_within(&self, limit: Duration) -> Result<()> {
        tokio::time::timeout(limit, self.acquire())
            .await
            .map_err(|_| HubError::RateLimited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_burst_then_empty() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            assert!(limiter.acquire_within(Duration::from_millis(5)).await.is_ok());
        }
        let result = limiter.acquire_within(Duration::from_millis(5)).await;
        assert!(matches!(result, Err(HubError::RateLimited)));
    }

    #[tokio::test]
    async fn test_acquire_waits_for_refill() {
        let limiter = RateLimiter::new(1, Duration::from_millis(40));
        limiter.acquire().await;

        let started = std::time::Instant::now();
        limiter.acquire().await;
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_acquire_within_times_out() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        limiter.acquire().await;

        let result = limiter.acquire_within(Duration::from_millis(20)).await;
        assert!(matches!(result, Err(HubError::RateLimited)));
    }

    #[tokio::test]
    async fn test_tokens_capped_at_capacity() {
        let limiter = RateLimiter::new(2, Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(limiter.acquire_within(Duration::from_millis(5)).await.is_ok());
        assert!(limiter.acquire_within(Duration::from_millis(5)).await.is_ok());
        let result = limiter.acquire_within(Duration::from_millis(5)).await;
        assert!(matches!(result, Err(HubError::RateLimited)));
    }
}
