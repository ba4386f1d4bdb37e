//! Rolling error-ratio circuit breaker, one per provider.
//!
//! States:
//!   Closed    — traffic flows; samples accumulate in a rolling window.
//!   Open      — fail fast with `CircuitOpen` until the reset timeout.
//!   Half-open — exactly one probe request is allowed through.
//!
//! The breaker opens when the error ratio over the window reaches the
//! threshold and at least `min_requests` samples exist. A successful probe
//! closes it and clears the window; a failed probe reopens it.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use pf_domain::config::BreakerConfig;
use pf_domain::error::{Error, Result};
use pf_domain::trace::TraceEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    HalfOpen,
    Open,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::HalfOpen => "half_open",
            CircuitState::Open => "open",
        }
    }

    /// Gauge encoding: 0 closed, 0.5 half-open, 1 open.
    pub fn gauge_value(&self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 0.5,
            CircuitState::Open => 1.0,
        }
    }
}

struct Sample {
    at: Instant,
    ok: bool,
}

struct Inner {
    samples: VecDeque<Sample>,
    state: CircuitState,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

pub struct CircuitBreaker {
    provider: String,
    threshold_pct: u8,
    reset_timeout: Duration,
    window: Duration,
    min_requests: usize,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(provider: impl Into<String>, cfg: &BreakerConfig) -> Self {
        Self {
            provider: provider.into(),
            threshold_pct: cfg.error_threshold_pct,
            reset_timeout: Duration::from_millis(cfg.reset_timeout_ms),
            window: Duration::from_secs(cfg.window_secs),
            min_requests: cfg.min_requests,
            inner: Mutex::new(Inner {
                samples: VecDeque::new(),
                state: CircuitState::Closed,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Gate a request. `Ok(())` admits it; `Err(CircuitOpen)` must be
    /// returned to the caller without touching the network.
    pub fn admit(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.reset_timeout {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    inner.probe_in_flight = true;
                    Ok(())
                } else {
                    Err(Error::CircuitOpen {
                        provider: self.provider.clone(),
                    })
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    Err(Error::CircuitOpen {
                        provider: self.provider.clone(),
                    })
                } else {
                    inner.probe_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        self.push_sample(&mut inner, true);
        if inner.state == CircuitState::HalfOpen {
            // Probe succeeded: close and start from a clean window.
            inner.samples.clear();
            inner.opened_at = None;
            inner.probe_in_flight = false;
            self.transition(&mut inner, CircuitState::Closed);
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        self.push_sample(&mut inner, false);
        match inner.state {
            CircuitState::HalfOpen => {
                // Probe failed: reopen for another reset period.
                inner.opened_at = Some(Instant::now());
                inner.probe_in_flight = false;
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::Closed => {
                let total = inner.samples.len();
                if total >= self.min_requests {
                    let errors = inner.samples.iter().filter(|s| !s.ok).count();
                    let ratio_pct = errors * 100 / total;
                    if ratio_pct >= self.threshold_pct as usize {
                        inner.opened_at = Some(Instant::now());
                        self.transition(&mut inner, CircuitState::Open);
                    }
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn gauge_value(&self) -> f64 {
        self.state().gauge_value()
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Operator hook: trip the breaker open now.
    pub fn force_open(&self) {
        let mut inner = self.inner.lock();
        inner.opened_at = Some(Instant::now());
        inner.probe_in_flight = false;
        self.transition(&mut inner, CircuitState::Open);
    }

    /// Operator hook: close the breaker and clear its window.
    pub fn force_close(&self) {
        let mut inner = self.inner.lock();
        inner.samples.clear();
        inner.opened_at = None;
        inner.probe_in_flight = false;
        self.transition(&mut inner, CircuitState::Closed);
    }

    fn push_sample(&self, inner: &mut Inner, ok: bool) {
        let now = Instant::now();
        inner.samples.push_back(Sample { at: now, ok });
        let cutoff = now.checked_sub(self.window);
        if let Some(cutoff) = cutoff {
            while inner.samples.front().is_some_and(|s| s.at < cutoff) {
                inner.samples.pop_front();
            }
        }
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        if inner.state == to {
            return;
        }
        TraceEvent::CircuitTransition {
            provider: self.provider.clone(),
            from: inner.state.as_str().to_string(),
            to: to.as_str().to_string(),
        }
        .emit();
        inner.state = to;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new("openai", &BreakerConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn stays_closed_under_occasional_errors() {
        let b = breaker();
        // 1 error in 10 = 10% < 50%.
        for _ in 0..9 {
            b.admit().unwrap();
            b.record_success();
        }
        b.admit().unwrap();
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn opens_at_error_ratio_threshold() {
        let b = breaker();
        // 3 ok, 3 errors = 50% over 6 samples (min_requests = 5).
        for _ in 0..3 {
            b.record_success();
        }
        for _ in 0..3 {
            b.record_failure();
        }
        assert_eq!(b.state(), CircuitState::Open);
        assert_eq!(b.gauge_value(), 1.0);

        // Fail fast, no network.
        let err = b.admit().unwrap_err();
        assert_eq!(err.code(), "circuit_open");
    }

    #[tokio::test(start_paused = true)]
    async fn few_samples_never_open() {
        let b = breaker();
        // 100% errors but below min_requests.
        for _ in 0..4 {
            b.record_failure();
        }
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_timeout_allows_single_probe() {
        let b = breaker();
        for _ in 0..5 {
            b.record_failure();
        }
        assert_eq!(b.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(30_001)).await;

        // One probe goes through; a second concurrent caller is rejected.
        b.admit().unwrap();
        assert_eq!(b.state(), CircuitState::HalfOpen);
        assert_eq!(b.gauge_value(), 0.5);
        assert_eq!(b.admit().unwrap_err().code(), "circuit_open");

        // Successful probe closes the breaker.
        b.record_success();
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.gauge_value(), 0.0);
        b.admit().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_probe_reopens() {
        let b = breaker();
        for _ in 0..5 {
            b.record_failure();
        }
        tokio::time::advance(Duration::from_millis(30_001)).await;
        b.admit().unwrap();
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);

        // Still open until another reset period passes.
        assert!(b.admit().is_err());
        tokio::time::advance(Duration::from_millis(30_001)).await;
        b.admit().unwrap();
        assert_eq!(b.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_hooks() {
        let b = breaker();
        b.force_open();
        assert_eq!(b.state(), CircuitState::Open);
        assert!(b.admit().is_err());

        b.force_close();
        assert_eq!(b.state(), CircuitState::Closed);
        b.admit().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn old_samples_age_out_of_window() {
        let b = breaker();
        for _ in 0..4 {
            b.record_failure();
        }
        // Window is 60s; age the failures out.
        tokio::time::advance(Duration::from_secs(61)).await;
        for _ in 0..5 {
            b.record_success();
        }
        // One fresh failure among five successes stays under the threshold.
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Closed);
    }
}
