//! The reliability stack composed around every model call.
//!
//! Composition order, outermost first:
//! rate limit → retry → circuit breaker → timeout → provider call.
//!
//! [`ReliableProvider`] is itself a [`ChatProvider`], so callers never see
//! the layering — they invoke chat and get either a response or an error
//! from the taxonomy.

mod breaker;
mod rate_limit;
mod retry;

pub use breaker::{CircuitBreaker, CircuitState};
pub use rate_limit::RateLimiter;
pub use retry::RetryPolicy;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use pf_domain::config::ProviderConfig;
use pf_domain::error::{Error, Result};
use pf_domain::metrics::Metrics;
use pf_domain::trace::TraceEvent;
use pf_domain::usage::UsageSink;

use crate::traits::{ChatProvider, ChatRequest, ChatResponse, ProviderInfo};
use crate::usage;

pub struct ReliableProvider {
    inner: Arc<dyn ChatProvider>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
    timeout: Duration,
    metrics: Arc<Metrics>,
    usage_sink: Arc<dyn UsageSink>,
}

impl ReliableProvider {
    pub fn new(
        inner: Arc<dyn ChatProvider>,
        cfg: &ProviderConfig,
        metrics: Arc<Metrics>,
        usage_sink: Arc<dyn UsageSink>,
    ) -> Self {
        let provider_id = inner.provider_id().to_string();
        Self {
            inner,
            limiter: Arc::new(RateLimiter::new(
                provider_id.clone(),
                cfg.rpm_limit,
                cfg.max_queue,
            )),
            retry: RetryPolicy::from_config(cfg),
            breaker: Arc::new(CircuitBreaker::new(provider_id, &cfg.breaker)),
            timeout: Duration::from_millis(cfg.timeout_ms),
            metrics,
            usage_sink,
        }
    }

    /// The breaker instance, shared with health reporting and operator
    /// endpoints.
    pub fn breaker(&self) -> Arc<CircuitBreaker> {
        self.breaker.clone()
    }

    fn update_breaker_gauge(&self) {
        self.metrics
            .circuit_breaker_state
            .with_label_values(&[self.inner.provider_id()])
            .set(self.breaker.gauge_value());
    }

    /// Whether a failure counts against the provider's error ratio.
    /// Fast-fail admission errors never do.
    fn counts_as_breaker_failure(e: &Error) -> bool {
        e.is_transient()
    }
}

#[async_trait::async_trait]
impl ChatProvider for ReliableProvider {
    async fn invoke_chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let provider = self.inner.provider_id().to_string();
        let model = req
            .model
            .clone()
            .unwrap_or_else(|| self.inner.info().model);

        // 1. Rate limit.
        self.limiter.acquire(&self.metrics).await?;

        // 2. Retry wraps 3. breaker and 4. timeout around the call.
        let started = Instant::now();
        let result = self
            .retry
            .run(&provider, &model, &self.metrics, || {
                let inner = self.inner.clone();
                let breaker = self.breaker.clone();
                let timeout = self.timeout;
                let provider = provider.clone();
                async move {
                    breaker.admit()?;
                    let outcome = match tokio::time::timeout(timeout, inner.invoke_chat(req)).await
                    {
                        Ok(r) => r,
                        Err(_) => Err(Error::Timeout(format!(
                            "provider '{provider}' timed out after {}ms",
                            timeout.as_millis()
                        ))),
                    };
                    match &outcome {
                        Ok(_) => breaker.record_success(),
                        Err(e) if Self::counts_as_breaker_failure(e) => breaker.record_failure(),
                        Err(_) => {}
                    }
                    outcome
                }
            })
            .await;
        self.update_breaker_gauge();

        let duration = started.elapsed();
        match result {
            Ok(response) => {
                self.metrics
                    .llm_calls_total
                    .with_label_values(&[&provider, &response.model, "success"])
                    .inc();
                self.metrics
                    .llm_call_duration_seconds
                    .with_label_values(&[&provider])
                    .observe(duration.as_secs_f64());
                TraceEvent::LlmCall {
                    provider: provider.clone(),
                    model: response.model.clone(),
                    duration_ms: duration.as_millis() as u64,
                    prompt_tokens: response.usage.map(|u| u.prompt_tokens),
                    completion_tokens: response.usage.map(|u| u.completion_tokens),
                    tool_calls: response.tool_calls.len(),
                }
                .emit();
                usage::record_invocation(&self.metrics, &self.usage_sink, req, &response);
                Ok(response)
            }
            Err(e) => {
                self.metrics
                    .llm_calls_total
                    .with_label_values(&[&provider, &model, "error"])
                    .inc();
                Err(e)
            }
        }
    }

    fn info(&self) -> ProviderInfo {
        self.inner.info()
    }

    fn provider_id(&self) -> &str {
        self.inner.provider_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pf_domain::chat::ChatMessage;
    use pf_domain::usage::NullUsageSink;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Scripted inner provider: fails `failures` times, then succeeds.
    struct FlakyProvider {
        calls: AtomicU32,
        failures: u32,
    }

    #[async_trait::async_trait]
    impl ChatProvider for FlakyProvider {
        async fn invoke_chat(&self, _req: &ChatRequest) -> Result<ChatResponse> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(Error::Http {
                    provider: "openai".into(),
                    status: Some(429),
                    message: "slow down".into(),
                })
            } else {
                Ok(ChatResponse {
                    content: "ok".into(),
                    tool_calls: Vec::new(),
                    usage: None,
                    provider: "openai".into(),
                    model: "gpt-4o-mini".into(),
                })
            }
        }

        fn info(&self) -> ProviderInfo {
            ProviderInfo {
                provider: "openai".into(),
                model: "gpt-4o-mini".into(),
                capabilities: crate::traits::ProviderCapabilities {
                    supports_tools: true,
                    supports_parallel_tool_calls: true,
                    context_window_tokens: None,
                    max_output_tokens: None,
                },
            }
        }

        fn provider_id(&self) -> &str {
            "openai"
        }
    }

    fn reliable(failures: u32) -> (ReliableProvider, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::new());
        let cfg = pf_domain::config::LlmConfig::default().providers[0].clone();
        let provider = ReliableProvider::new(
            Arc::new(FlakyProvider {
                calls: AtomicU32::new(0),
                failures,
            }),
            &cfg,
            metrics.clone(),
            Arc::new(NullUsageSink),
        );
        (provider, metrics)
    }

    fn request() -> ChatRequest {
        ChatRequest {
            messages: vec![ChatMessage::user("hi")],
            ..ChatRequest::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn two_429s_then_success() {
        let (provider, metrics) = reliable(2);
        let resp = provider.invoke_chat(&request()).await.unwrap();
        assert_eq!(resp.content, "ok");
        assert_eq!(
            metrics
                .llm_calls_total
                .with_label_values(&["openai", "gpt-4o-mini", "retry"])
                .get(),
            2
        );
        assert_eq!(
            metrics
                .llm_calls_total
                .with_label_values(&["openai", "gpt-4o-mini", "success"])
                .get(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn open_breaker_fails_fast_without_calling_inner() {
        let (provider, metrics) = reliable(0);
        provider.breaker().force_open();

        let err = provider.invoke_chat(&request()).await.unwrap_err();
        assert_eq!(err.code(), "circuit_open");
        // The inner provider was never reached.
        assert_eq!(
            metrics
                .llm_calls_total
                .with_label_values(&["openai", "gpt-4o-mini", "success"])
                .get(),
            0
        );
        // Gauge reads fully open.
        assert_eq!(
            metrics
                .circuit_breaker_state
                .with_label_values(&["openai"])
                .get(),
            1.0
        );
    }

    #[tokio::test(start_paused = true)]
    async fn breaker_opens_under_sustained_errors_and_probes_after_reset() {
        let (provider, _metrics) = reliable(u32::MAX);
        // Each invoke makes up to 4 attempts, all failing; after enough
        // samples the breaker opens and subsequent calls fail fast.
        let _ = provider.invoke_chat(&request()).await;
        let _ = provider.invoke_chat(&request()).await;
        assert_eq!(provider.breaker().state(), CircuitState::Open);

        let err = provider.invoke_chat(&request()).await.unwrap_err();
        assert_eq!(err.code(), "circuit_open");

        // After the reset timeout one probe is permitted.
        tokio::time::advance(Duration::from_millis(30_001)).await;
        let _ = provider.invoke_chat(&request()).await;
        // The failed probe reopened it.
        assert_eq!(provider.breaker().state(), CircuitState::Open);
    }
}
