//! Cost estimation and post-invocation accounting.
//!
//! The rate table is static per (provider, model-prefix); unknown models
//! cost zero rather than guessing. After every successful invocation the
//! token counters, cost counter, and a best-effort usage record are
//! emitted.

use std::sync::Arc;

use chrono::Utc;

use pf_domain::chat::Usage;
use pf_domain::metrics::Metrics;
use pf_domain::trace::TraceEvent;
use pf_domain::usage::{TokenUsageRecord, UsageSink};

use crate::traits::{ChatRequest, ChatResponse};

/// USD per 1k tokens, input and output. Longest-prefix match wins.
const RATES: &[(&str, &str, f64, f64)] = &[
    ("openai", "gpt-4o-mini", 0.000_15, 0.000_6),
    ("openai", "gpt-4o", 0.002_5, 0.01),
    ("openai", "gpt-4.1-mini", 0.000_4, 0.001_6),
    ("openai", "gpt-4.1", 0.002, 0.008),
    ("openai", "gpt-3.5-turbo", 0.000_5, 0.001_5),
    ("gemini", "gemini-2.0-flash", 0.000_075, 0.000_3),
    ("gemini", "gemini-1.5-flash", 0.000_075, 0.000_3),
    ("gemini", "gemini-1.5-pro", 0.001_25, 0.005),
];

/// Estimated USD cost of one invocation. Unknown (provider, model) pairs
/// report zero.
pub fn cost_usd(provider: &str, model: &str, usage: &Usage) -> f64 {
    let rate = RATES
        .iter()
        .filter(|(p, prefix, _, _)| *p == provider && model.starts_with(prefix))
        .max_by_key(|(_, prefix, _, _)| prefix.len());
    match rate {
        Some((_, _, input_per_1k, output_per_1k)) => {
            (usage.prompt_tokens as f64 / 1000.0) * input_per_1k
                + (usage.completion_tokens as f64 / 1000.0) * output_per_1k
        }
        None => 0.0,
    }
}

/// Record counters and persist a usage record after a successful call.
/// The sink write is fire-and-forget: it runs on a spawned task and its
/// failures are the sink's problem.
pub fn record_invocation(
    metrics: &Metrics,
    sink: &Arc<dyn UsageSink>,
    req: &ChatRequest,
    response: &ChatResponse,
) {
    let Some(usage) = response.usage else {
        return;
    };
    let provider = response.provider.as_str();
    let model = response.model.as_str();

    metrics
        .llm_tokens_total
        .with_label_values(&[provider, model, "input"])
        .inc_by(usage.prompt_tokens as u64);
    metrics
        .llm_tokens_total
        .with_label_values(&[provider, model, "output"])
        .inc_by(usage.completion_tokens as u64);

    let cost = cost_usd(provider, model, &usage);
    metrics
        .llm_cost_usd_total
        .with_label_values(&[provider, model])
        .inc_by(cost);

    TraceEvent::UsageRecorded {
        provider: provider.to_string(),
        model: model.to_string(),
        total_tokens: usage.total_tokens,
        cost_usd: cost,
    }
    .emit();

    let record = TokenUsageRecord {
        user_id: req.user_id.clone(),
        conversation_id: req.conversation_id.clone(),
        provider: provider.to_string(),
        model: model.to_string(),
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
        cost_usd: cost,
        endpoint: "chat".into(),
        tool_calls: response.tool_calls.len() as u32,
        cached: false,
        created_at: Utc::now(),
    };
    let sink = sink.clone();
    tokio::spawn(async move {
        sink.record(record);
    });
}
