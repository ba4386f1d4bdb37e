use serde::Serialize;

use pf_domain::chat::{ChatMessage, ToolCall, ToolDefinition, Usage};
use pf_domain::error::Result;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A provider-agnostic chat completion request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// The conversation messages to send.
    pub messages: Vec<ChatMessage>,
    /// Tool definitions the model may invoke.
    pub tools: Vec<ToolDefinition>,
    /// Sampling temperature. `None` lets the provider choose.
    pub temperature: Option<f32>,
    /// Maximum tokens in the response. `None` lets the provider choose.
    pub max_tokens: Option<u32>,
    /// Model identifier override. When `None`, the provider uses its default.
    pub model: Option<String>,
    /// Attribution for token-usage accounting; never sent to the backend.
    pub user_id: Option<String>,
    /// Attribution for token-usage accounting; never sent to the backend.
    pub conversation_id: Option<String>,
}

/// A provider-agnostic chat completion response.
///
/// Both a backend's "single function call" and "parallel tool calls"
/// shapes land in the flat `tool_calls` vector.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Textual content of the response (may be empty on tool-call turns).
    pub content: String,
    /// Normalized tool calls emitted by the model.
    pub tool_calls: Vec<ToolCall>,
    /// Reported or tokenizer-estimated usage.
    pub usage: Option<Usage>,
    /// The provider id that served the request.
    pub provider: String,
    /// The model that actually produced the response.
    pub model: String,
}

/// What a provider/model combination can do.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderCapabilities {
    pub supports_tools: bool,
    pub supports_parallel_tool_calls: bool,
    pub context_window_tokens: Option<u32>,
    pub max_output_tokens: Option<u32>,
}

/// Descriptor surfaced by `getProviderInfo` / provider listings.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub provider: String,
    pub model: String,
    pub capabilities: ProviderCapabilities,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core provider trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait that every LLM adapter must implement.
///
/// Implementations translate between the internal message model and each
/// backend's wire format (OpenAI chat completions, Gemini generateContent).
#[async_trait::async_trait]
pub trait ChatProvider: Send + Sync {
    /// Send a chat completion request and wait for the full response.
    async fn invoke_chat(&self, req: &ChatRequest) -> Result<ChatResponse>;

    /// The advertised capabilities of this provider/model combination.
    fn info(&self) -> ProviderInfo;

    /// A unique identifier for this provider instance.
    fn provider_id(&self) -> &str;
}

impl std::fmt::Debug for dyn ChatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatProvider")
            .field("provider_id", &self.provider_id())
            .finish()
    }
}
