//! Retry with exponential backoff and jitter.
//!
//! Only transient failures are retried (HTTP 429/5xx, connection errors,
//! timeouts — see `Error::is_transient`). Delays double from the base,
//! cap at `max_delay_ms`, and carry ±20% jitter so synchronized callers
//! spread out. Jitter affects timing only, never payloads.

use std::future::Future;
use std::time::{Duration, SystemTime};

use pf_domain::config::ProviderConfig;
use pf_domain::error::{Error, Result};
use pf_domain::metrics::Metrics;
use pf_domain::trace::TraceEvent;

/// Smallest delay the backoff will produce.
const MIN_DELAY_MS: u64 = 100;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &ProviderConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            ..Self::default()
        }
    }

    /// Backoff delay for the 0-based `attempt`, jittered.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base_ms = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt.min(16)));
        let capped_ms = base_ms.min(self.max_delay_ms);
        Duration::from_millis(apply_jitter(capped_ms))
    }

    /// Bounds of the jittered delay for `attempt` (used by tests to check
    /// the envelope).
    pub fn backoff_bounds(&self, attempt: u32) -> (Duration, Duration) {
        let base_ms = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt.min(16)));
        let capped_ms = base_ms.min(self.max_delay_ms);
        let low = ((capped_ms as f64 * 0.8) as u64).max(MIN_DELAY_MS);
        let high = (capped_ms as f64 * 1.2) as u64 + 1;
        (Duration::from_millis(low), Duration::from_millis(high))
    }

    /// Run `op`, retrying transient failures up to `max_retries` times.
    ///
    /// When retries are exhausted the last timeout is kept as-is and any
    /// other transient error is reported as `ProviderUnavailable`.
    pub async fn run<T, F, Fut>(
        &self,
        provider: &str,
        model: &str,
        metrics: &Metrics,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = self.backoff_delay(attempt);
                    metrics
                        .llm_calls_total
                        .with_label_values(&[provider, model, "retry"])
                        .inc();
                    TraceEvent::LlmRetry {
                        provider: provider.to_string(),
                        attempt: attempt + 1,
                        delay_ms: delay.as_millis() as u64,
                        reason: e.code().to_string(),
                    }
                    .emit();
                    tracing::warn!(
                        provider,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient provider failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_transient() => {
                    return Err(match e {
                        Error::Timeout(msg) => Error::Timeout(msg),
                        other => Error::ProviderUnavailable(format!(
                            "provider '{provider}' failed after {} attempts: {other}",
                            attempt + 1
                        )),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Apply ±20% jitter. The jitter source is the system clock's nanosecond
/// field — cheap and unpredictable enough to spread retries.
fn apply_jitter(base_ms: u64) -> u64 {
    let jitter_range = (base_ms / 5) as i64;
    if jitter_range == 0 {
        return base_ms.max(MIN_DELAY_MS);
    }
    let offset = (rand_jitter() % (2 * jitter_range + 1)) - jitter_range;
    let result = base_ms as i64 + offset;
    result.max(MIN_DELAY_MS as i64) as u64
}

fn rand_jitter() -> i64 {
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as i64
}
