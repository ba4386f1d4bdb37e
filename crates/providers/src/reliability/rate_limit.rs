//! Per-provider admission control.
//!
//! A token bucket refilled at the configured requests-per-minute. Callers
//! that can't be admitted immediately wait for a token; the number of
//! waiters is bounded and exported as a gauge. Beyond the bound, admission
//! fails fast with `RateLimited`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use pf_domain::error::{Error, Result};
use pf_domain::metrics::Metrics;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct RateLimiter {
    provider: String,
    /// Tokens added per second.
    rate_per_sec: f64,
    /// Maximum burst.
    capacity: f64,
    bucket: Mutex<Bucket>,
    waiters: AtomicUsize,
    max_queue: usize,
}

impl RateLimiter {
    pub fn new(provider: impl Into<String>, rpm: u32, max_queue: usize) -> Self {
        let rpm = rpm.max(1);
        // Burst of up to ten seconds of traffic, at least one request.
        let capacity = (rpm as f64 / 6.0).max(1.0);
        Self {
            provider: provider.into(),
            rate_per_sec: rpm as f64 / 60.0,
            capacity,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            waiters: AtomicUsize::new(0),
            max_queue,
        }
    }

    /// Wait for admission. Fails fast with `RateLimited` when the waiter
    /// queue is already at its cap.
    pub async fn acquire(&self, metrics: &Metrics) -> Result<()> {
        if self.try_take() {
            return Ok(());
        }

        let depth = self.waiters.fetch_add(1, Ordering::SeqCst) + 1;
        if depth > self.max_queue {
            self.waiters.fetch_sub(1, Ordering::SeqCst);
            tracing::warn!(
                provider = %self.provider,
                queue = self.max_queue,
                "rate limiter queue full, rejecting"
            );
            return Err(Error::RateLimited {
                provider: self.provider.clone(),
            });
        }
        self.update_gauge(metrics);

        loop {
            let wait = self.time_until_token();
            tokio::time::sleep(wait).await;
            if self.try_take() {
                break;
            }
        }

        self.waiters.fetch_sub(1, Ordering::SeqCst);
        self.update_gauge(metrics);
        Ok(())
    }

    /// Current waiter count (exported as the queue-depth gauge).
    pub fn queue_depth(&self) -> usize {
        self.waiters.load(Ordering::SeqCst)
    }

    fn update_gauge(&self, metrics: &Metrics) {
        metrics
            .rate_limiter_queue_depth
            .with_label_values(&[&self.provider])
            .set(self.queue_depth() as i64);
    }

    fn try_take(&self) -> bool {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn time_until_token(&self) -> Duration {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket);
        if bucket.tokens >= 1.0 {
            return Duration::ZERO;
        }
        let missing = 1.0 - bucket.tokens;
        Duration::from_secs_f64(missing / self.rate_per_sec)
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate_per_sec).min(self.capacity);
        bucket.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn burst_up_to_capacity_is_immediate() {
        let metrics = Metrics::new();
        // 60 rpm → capacity 10.
        let limiter = RateLimiter::new("openai", 60, 4);
        for _ in 0..10 {
            limiter.acquire(&metrics).await.unwrap();
        }
        assert_eq!(limiter.queue_depth(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn drained_bucket_waits_for_refill() {
        let metrics = Metrics::new();
        let limiter = RateLimiter::new("openai", 60, 4);
        for _ in 0..10 {
            limiter.acquire(&metrics).await.unwrap();
        }
        let start = Instant::now();
        // 60 rpm = 1 token/second; the paused clock auto-advances.
        limiter.acquire(&metrics).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(900));
    }

    #[tokio::test(start_paused = true)]
    async fn queue_overflow_rejects_immediately() {
        let metrics = Arc::new(Metrics::new());
        let limiter = Arc::new(RateLimiter::new("gemini", 15, 1));
        // Drain the burst capacity (15 rpm → 2.5 tokens).
        while limiter.try_take() {}

        // First waiter occupies the queue slot.
        let l = limiter.clone();
        let m = metrics.clone();
        let waiter = tokio::spawn(async move { l.acquire(&m).await });
        tokio::task::yield_now().await;
        assert_eq!(limiter.queue_depth(), 1);

        // Second caller is over the cap and fails fast.
        let err = limiter.acquire(&metrics).await.unwrap_err();
        assert_eq!(err.code(), "rate_limited");

        // The queued waiter eventually gets through.
        waiter.await.unwrap().unwrap();
        assert_eq!(limiter.queue_depth(), 0);
    }
}
