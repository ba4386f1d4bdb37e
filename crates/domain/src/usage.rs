//! Token-usage accounting records.
//!
//! One record is written best-effort per successful model invocation.
//! Sinks must never block the calling turn; failures are logged and
//! swallowed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One persisted token-usage record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsageRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub provider: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub cost_usd: f64,
    pub endpoint: String,
    pub tool_calls: u32,
    pub cached: bool,
    pub created_at: DateTime<Utc>,
}

/// Destination for usage records. Implementations must be cheap and
/// non-blocking from the caller's point of view.
pub trait UsageSink: Send + Sync {
    fn record(&self, record: TokenUsageRecord);
}

/// Sink that drops every record. Used when accounting is disabled and in
/// tests that don't observe usage.
#[derive(Debug, Default)]
pub struct NullUsageSink;

impl UsageSink for NullUsageSink {
    fn record(&self, _record: TokenUsageRecord) {}
}
