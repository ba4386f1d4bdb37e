use serde::{Deserialize, Serialize};

use super::env_parse;

/// Bounds on a single agent turn and its history budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Token budget for the history builder (system + cart + history + user).
    #[serde(default = "d_max_input_tokens")]
    pub max_input_tokens: usize,
    /// Hard cap on the built sequence. Exceeding it is a fatal error, not a
    /// truncation.
    #[serde(default = "d_max_total_tokens")]
    pub max_total_tokens: usize,
    /// Model calls per turn.
    #[serde(default = "d_max_iterations")]
    pub max_iterations: u32,
    /// Tool executions per turn.
    #[serde(default = "d_max_tool_calls_per_turn")]
    pub max_tool_calls_per_turn: u32,
    /// Per-tool execution deadline in milliseconds.
    #[serde(default = "d_tool_timeout_ms")]
    pub tool_timeout_ms: u64,
    /// Count cap on prior-turn messages selected into the history.
    #[serde(default = "d_max_history_messages")]
    pub max_history_messages: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_input_tokens: d_max_input_tokens(),
            max_total_tokens: d_max_total_tokens(),
            max_iterations: d_max_iterations(),
            max_tool_calls_per_turn: d_max_tool_calls_per_turn(),
            tool_timeout_ms: d_tool_timeout_ms(),
            max_history_messages: d_max_history_messages(),
        }
    }
}

impl AgentConfig {
    pub(super) fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse("AGENT_MAX_INPUT_TOKENS") {
            self.max_input_tokens = v;
        }
        if let Some(v) = env_parse("AGENT_MAX_TOTAL_TOKENS") {
            self.max_total_tokens = v;
        }
        if let Some(v) = env_parse("AGENT_MAX_ITERATIONS") {
            self.max_iterations = v;
        }
        if let Some(v) = env_parse("AGENT_MAX_TOOL_CALLS_PER_TURN") {
            self.max_tool_calls_per_turn = v;
        }
        if let Some(v) = env_parse("AGENT_TOOL_TIMEOUT_MS") {
            self.tool_timeout_ms = v;
        }
        if let Some(v) = env_parse("AGENT_MAX_HISTORY_MESSAGES") {
            self.max_history_messages = v;
        }
    }
}

fn d_max_input_tokens() -> usize {
    3000
}
fn d_max_total_tokens() -> usize {
    4000
}
fn d_max_iterations() -> u32 {
    10
}
fn d_max_tool_calls_per_turn() -> u32 {
    15
}
fn d_tool_timeout_ms() -> u64 {
    5000
}
fn d_max_history_messages() -> usize {
    50
}
