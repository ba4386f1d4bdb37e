//! Process-wide metrics registry.
//!
//! A [`Metrics`] instance owns its own `prometheus::Registry` and every
//! instrument the core emits. It is built once at bootstrap and injected
//! by constructor everywhere — tests create isolated instances, nothing is
//! global.

use prometheus::{
    CounterVec, Encoder, GaugeVec, Histogram, HistogramOpts, HistogramVec, IntCounter,
    IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};

/// All instruments emitted by the agent core, registered against one
/// registry. Metric names are part of the stable observability surface.
pub struct Metrics {
    registry: Registry,

    // ── Orchestrator ──────────────────────────────────────────────
    pub agent_requests_total: IntCounterVec,
    pub agent_request_duration_seconds: Histogram,
    pub agent_iterations_total: IntCounter,

    // ── Tool executor ─────────────────────────────────────────────
    pub agent_tool_calls_total: IntCounterVec,
    pub agent_tool_call_duration_seconds: HistogramVec,

    // ── Provider adapter ──────────────────────────────────────────
    pub llm_calls_total: IntCounterVec,
    pub llm_tokens_total: IntCounterVec,
    pub llm_cost_usd_total: CounterVec,
    pub llm_call_duration_seconds: HistogramVec,

    // ── Conversation manager ──────────────────────────────────────
    pub conversation_truncations_total: IntCounterVec,

    // ── Reliability stack ─────────────────────────────────────────
    pub rate_limiter_queue_depth: IntGaugeVec,
    pub circuit_breaker_state: GaugeVec,

    // ── Safety ────────────────────────────────────────────────────
    pub validation_errors_total: IntCounterVec,
    pub moderation_rejections_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let agent_requests_total = IntCounterVec::new(
            Opts::new("agent_requests_total", "Agent turns processed, by outcome"),
            &["status"],
        )
        .expect("agent_requests_total");

        let agent_request_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "agent_request_duration_seconds",
                "End-to-end duration of one agent turn",
            )
            .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        )
        .expect("agent_request_duration_seconds");

        let agent_iterations_total = IntCounter::new(
            "agent_iterations_total",
            "Model invocations across all turns",
        )
        .expect("agent_iterations_total");

        let agent_tool_calls_total = IntCounterVec::new(
            Opts::new("agent_tool_calls_total", "Tool executions, by tool and status"),
            &["tool", "status"],
        )
        .expect("agent_tool_calls_total");

        let agent_tool_call_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "agent_tool_call_duration_seconds",
                "Duration of one tool execution",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["tool"],
        )
        .expect("agent_tool_call_duration_seconds");

        let llm_calls_total = IntCounterVec::new(
            Opts::new("llm_calls_total", "Model calls, by provider, model, and status"),
            &["provider", "model", "status"],
        )
        .expect("llm_calls_total");

        let llm_tokens_total = IntCounterVec::new(
            Opts::new("llm_tokens_total", "Tokens consumed, by direction"),
            &["provider", "model", "direction"],
        )
        .expect("llm_tokens_total");

        let llm_cost_usd_total = CounterVec::new(
            Opts::new("llm_cost_usd_total", "Estimated spend in USD"),
            &["provider", "model"],
        )
        .expect("llm_cost_usd_total");

        let llm_call_duration_seconds = HistogramVec::new(
            HistogramOpts::new("llm_call_duration_seconds", "Duration of one model call")
                .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["provider"],
        )
        .expect("llm_call_duration_seconds");

        let conversation_truncations_total = IntCounterVec::new(
            Opts::new(
                "conversation_truncations_total",
                "History truncations, by reason",
            ),
            &["reason"],
        )
        .expect("conversation_truncations_total");

        let rate_limiter_queue_depth = IntGaugeVec::new(
            Opts::new(
                "rate_limiter_queue_depth",
                "Callers waiting for rate-limit admission",
            ),
            &["provider"],
        )
        .expect("rate_limiter_queue_depth");

        let circuit_breaker_state = GaugeVec::new(
            Opts::new(
                "circuit_breaker_state",
                "Breaker state: 0 closed, 0.5 half-open, 1 open",
            ),
            &["provider"],
        )
        .expect("circuit_breaker_state");

        let validation_errors_total = IntCounterVec::new(
            Opts::new("validation_errors_total", "Rejected requests, by reason"),
            &["reason"],
        )
        .expect("validation_errors_total");

        let moderation_rejections_total = IntCounterVec::new(
            Opts::new(
                "moderation_rejections_total",
                "Messages rejected by content moderation, by category",
            ),
            &["category"],
        )
        .expect("moderation_rejections_total");

        for collector in [
            Box::new(agent_requests_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(agent_request_duration_seconds.clone()),
            Box::new(agent_iterations_total.clone()),
            Box::new(agent_tool_calls_total.clone()),
            Box::new(agent_tool_call_duration_seconds.clone()),
            Box::new(llm_calls_total.clone()),
            Box::new(llm_tokens_total.clone()),
            Box::new(llm_cost_usd_total.clone()),
            Box::new(llm_call_duration_seconds.clone()),
            Box::new(conversation_truncations_total.clone()),
            Box::new(rate_limiter_queue_depth.clone()),
            Box::new(circuit_breaker_state.clone()),
            Box::new(validation_errors_total.clone()),
            Box::new(moderation_rejections_total.clone()),
        ] {
            registry.register(collector).expect("register metric");
        }

        Self {
            registry,
            agent_requests_total,
            agent_request_duration_seconds,
            agent_iterations_total,
            agent_tool_calls_total,
            agent_tool_call_duration_seconds,
            llm_calls_total,
            llm_tokens_total,
            llm_cost_usd_total,
            llm_call_duration_seconds,
            conversation_truncations_total,
            rate_limiter_queue_depth,
            circuit_breaker_state,
            validation_errors_total,
            moderation_rejections_total,
        }
    }

    /// Render the Prometheus text exposition format.
    pub fn gather_text(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            tracing::warn!(error = %e, "failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isolated_registries() {
        let a = Metrics::new();
        let b = Metrics::new();
        a.agent_requests_total.with_label_values(&["success"]).inc();
        assert_eq!(
            a.agent_requests_total.with_label_values(&["success"]).get(),
            1
        );
        assert_eq!(
            b.agent_requests_total.with_label_values(&["success"]).get(),
            0
        );
    }

    #[test]
    fn gather_text_contains_names() {
        let m = Metrics::new();
        m.agent_requests_total.with_label_values(&["success"]).inc();
        m.circuit_breaker_state.with_label_values(&["openai"]).set(0.5);
        let text = m.gather_text();
        assert!(text.contains("agent_requests_total"));
        assert!(text.contains("circuit_breaker_state"));
        assert!(text.contains("0.5"));
    }
}
