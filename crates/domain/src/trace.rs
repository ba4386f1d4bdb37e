use serde::Serialize;

/// Structured trace events emitted across all ProcureFlow crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    HistoryBuilt {
        conversation_id: String,
        total_tokens: usize,
        included_messages: usize,
        truncated_messages: usize,
    },
    HistoryTruncated {
        conversation_id: String,
        reason: String,
        dropped: usize,
    },
    LlmCall {
        provider: String,
        model: String,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
        tool_calls: usize,
    },
    LlmRetry {
        provider: String,
        attempt: u32,
        delay_ms: u64,
        reason: String,
    },
    CircuitTransition {
        provider: String,
        from: String,
        to: String,
    },
    ToolDispatched {
        tool: String,
        duration_ms: u64,
        success: bool,
    },
    TurnCompleted {
        conversation_id: String,
        iterations: u32,
        tool_calls: u32,
        duration_ms: u64,
        max_iterations_reached: bool,
    },
    ConversationAppended {
        conversation_id: String,
        messages: usize,
    },
    UsageRecorded {
        provider: String,
        model: String,
        total_tokens: u32,
        cost_usd: f64,
    },
    InjectionRejected {
        category: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "pf_event");
    }
}
