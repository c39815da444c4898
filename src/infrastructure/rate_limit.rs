//! Token bucket rate limiting per venue and request category.
//!
//! Callers reserve a token before each REST call. When the bucket is empty
//! the reservation borrows against future refills and the caller sleeps until
//! its token exists, but never longer than the configured bounded wait. A
//! reservation that would exceed it fails with [`Error::RateLimited`] and
//! consumes nothing.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

use super::config::venue::{BucketConfig, VenueConfig};
use crate::domain::{RateCategory, Venue};
use crate::error::{Error, Result};

struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_rate: f64, // tokens per second
    last_update: Instant,
}

impl TokenBucket {
    fn new(config: BucketConfig) -> Self {
        let capacity = f64::from(config.capacity);
        TokenBucket {
            tokens: capacity,
            capacity,
            refill_rate: capacity / config.interval().as_secs_f64(),
            last_update: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_update);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.refill_rate).min(self.capacity);
        self.last_update = now;
    }

    /// Reserve one token. `Ok(wait)` until it is usable, `Err(wait)` if that exceeds `max_wait`.
    fn reserve(&mut self, now: Instant, max_wait: Duration) -> std::result::Result<Duration, Duration> {
        self.refill(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Ok(Duration::ZERO);
        }

        let deficit = 1.0 - self.tokens;
        let wait = Duration::from_secs_f64(deficit / self.refill_rate);
        if wait > max_wait {
            return Err(wait);
        }
        self.tokens -= 1.0;
        Ok(wait)
    }
}

/// Rate limiter for one venue, one bucket per category.
pub struct RateLimiter {
    venue: Venue,
    buckets: HashMap<RateCategory, Mutex<TokenBucket>>,
    max_wait: Duration,
}

impl RateLimiter {
    pub fn new(venue: Venue, limits: &[(RateCategory, BucketConfig)], max_wait: Duration) -> Self {
        let buckets = limits
            .iter()
            .map(|(category, config)| (*category, Mutex::new(TokenBucket::new(*config))))
            .collect();
        Self {
            venue,
            buckets,
            max_wait,
        }
    }

    pub fn from_config(config: &VenueConfig) -> Self {
        let limits: Vec<_> = RateCategory::ALL
            .iter()
            .map(|category| (*category, config.bucket(*category)))
            .collect();
        Self::new(config.kind, &limits, config.max_wait())
    }

    /// Wait for a token in `category`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RateLimited`] when the token would not be available
    /// within the bounded wait.
    pub async fn acquire(&self, category: RateCategory) -> Result<()> {
        let Some(bucket) = self.buckets.get(&category) else {
            return Ok(());
        };

        let reservation = bucket.lock().reserve(Instant::now(), self.max_wait);
        match reservation {
            Ok(wait) if wait.is_zero() => Ok(()),
            Ok(wait) => {
                debug!(
                    venue = %self.venue,
                    category = %category,
                    wait_ms = wait.as_millis() as u64,
                    "Rate limit reached, waiting for token"
                );
                sleep(wait).await;
                Ok(())
            }
            Err(retry_after) => Err(Error::RateLimited {
                category,
                retry_after,
            }),
        }
    }

    /// Tokens currently available in a category, rounded down.
    #[must_use]
    pub fn available(&self, category: RateCategory) -> Option<u32> {
        self.buckets.get(&category).map(|bucket| {
            let mut bucket = bucket.lock();
            bucket.refill(Instant::now());
            bucket.tokens.max(0.0) as u32
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(capacity: u32, interval_ms: u64, max_wait_ms: u64) -> RateLimiter {
        RateLimiter::new(
            Venue::Binance,
            &[(RateCategory::Order, BucketConfig::new(capacity, interval_ms))],
            Duration::from_millis(max_wait_ms),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_within_capacity_is_immediate() {
        let limiter = limiter(2, 1_000, 0);
        let start = Instant::now();

        limiter.acquire(RateCategory::Order).await.unwrap();
        limiter.acquire(RateCategory::Order).await.unwrap();

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.available(RateCategory::Order), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_bucket_fails_after_bounded_wait() {
        let limiter = limiter(2, 1_000, 100);
        limiter.acquire(RateCategory::Order).await.unwrap();
        limiter.acquire(RateCategory::Order).await.unwrap();

        let err = limiter.acquire(RateCategory::Order).await.unwrap_err();
        match err {
            Error::RateLimited {
                category,
                retry_after,
            } => {
                assert_eq!(category, RateCategory::Order);
                assert_eq!(retry_after, Duration::from_millis(500));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_bucket_blocks_until_refill() {
        let limiter = limiter(2, 1_000, 1_000);
        limiter.acquire(RateCategory::Order).await.unwrap();
        limiter.acquire(RateCategory::Order).await.unwrap();

        let start = Instant::now();
        limiter.acquire(RateCategory::Order).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_unlimited_category_passes() {
        let limiter = limiter(1, 1_000, 0);
        limiter.acquire(RateCategory::Query).await.unwrap();
        limiter.acquire(RateCategory::Query).await.unwrap();
        assert_eq!(limiter.available(RateCategory::Query), None);
    }
}
