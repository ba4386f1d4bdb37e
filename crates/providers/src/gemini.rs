//! Google Gemini adapter.
//!
//! Implements the `generateContent` API. Auth is an API key passed as a
//! query parameter. Gemini has no tool-call ids, so the adapter mints
//! sequential ids when normalizing and addresses function responses by
//! tool name on the way back in.

use serde_json::Value;

use pf_domain::chat::{ChatMessage, Role, ToolCall, ToolDefinition, Usage};
use pf_domain::config::ProviderConfig;
use pf_domain::error::{Error, Result};

use crate::openai::{estimate_usage, from_reqwest, truncate_body};
use crate::traits::{ChatProvider, ChatRequest, ChatResponse, ProviderCapabilities, ProviderInfo};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct GeminiProvider {
    id: String,
    base_url: String,
    api_key: String,
    default_model: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    /// Create the adapter from config, resolving the API key env var.
    pub fn from_config(cfg: &ProviderConfig) -> Result<Self> {
        let api_key = std::env::var(&cfg.api_key_env).map_err(|_| {
            Error::ProviderUnavailable(format!(
                "provider '{}' requires the {} environment variable",
                cfg.id, cfg.api_key_env
            ))
        })?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| Error::Internal(format!("building HTTP client: {e}")))?;

        Ok(Self {
            id: cfg.id.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            default_model: cfg.default_model.clone(),
            client,
        })
    }

    fn effective_model(&self, req: &ChatRequest) -> String {
        req.model
            .clone()
            .unwrap_or_else(|| self.default_model.clone())
    }

    fn generate_url(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        )
    }

    fn build_body(&self, req: &ChatRequest) -> Value {
        let mut contents: Vec<Value> = Vec::new();
        let mut system_instruction: Option<Value> = None;

        for msg in &req.messages {
            match msg.role {
                Role::System => {
                    // Gemini takes one systemInstruction; later system
                    // blocks (cart context) are folded into it.
                    let text = match &system_instruction {
                        Some(existing) => {
                            let prior = existing["parts"][0]["text"].as_str().unwrap_or("");
                            format!("{prior}\n\n{}", msg.content)
                        }
                        None => msg.content.clone(),
                    };
                    system_instruction = Some(serde_json::json!({
                        "parts": [{"text": text}]
                    }));
                }
                Role::User => {
                    contents.push(serde_json::json!({
                        "role": "user",
                        "parts": [{"text": msg.content}],
                    }));
                }
                Role::Assistant => {
                    contents.push(assistant_to_gemini(msg));
                }
                Role::Tool => {
                    contents.push(tool_result_to_gemini(msg));
                }
            }
        }

        let mut body = serde_json::json!({
            "contents": contents,
        });

        if let Some(si) = system_instruction {
            body["systemInstruction"] = si;
        }

        if !req.tools.is_empty() {
            let declarations: Vec<Value> = req.tools.iter().map(tool_to_gemini).collect();
            body["tools"] = serde_json::json!([{
                "functionDeclarations": declarations,
            }]);
        }

        let mut gen_config = serde_json::json!({});
        if let Some(temp) = req.temperature {
            gen_config["temperature"] = serde_json::json!(temp);
        }
        if let Some(max) = req.max_tokens {
            gen_config["maxOutputTokens"] = serde_json::json!(max);
        }
        if gen_config.as_object().is_some_and(|o| !o.is_empty()) {
            body["generationConfig"] = gen_config;
        }

        body
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message serialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn assistant_to_gemini(msg: &ChatMessage) -> Value {
    let mut parts: Vec<Value> = Vec::new();
    if !msg.content.is_empty() {
        parts.push(serde_json::json!({"text": msg.content}));
    }
    for tc in &msg.tool_calls {
        parts.push(serde_json::json!({
            "functionCall": {
                "name": tc.name,
                "args": tc.arguments,
            }
        }));
    }
    if parts.is_empty() {
        parts.push(serde_json::json!({"text": ""}));
    }
    serde_json::json!({
        "role": "model",
        "parts": parts,
    })
}

fn tool_result_to_gemini(msg: &ChatMessage) -> Value {
    // functionResponse is addressed by function name; the loop records the
    // tool name on every result message.
    let name = msg
        .tool_name
        .as_deref()
        .or(msg.tool_call_id.as_deref())
        .unwrap_or("unknown");
    serde_json::json!({
        "role": "user",
        "parts": [{
            "functionResponse": {
                "name": name,
                "response": {
                    "content": msg.content,
                }
            }
        }]
    })
}

fn tool_to_gemini(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "name": tool.name,
        "description": tool.description,
        "parameters": tool.parameters,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_response(provider: &str, body: &Value) -> Result<(String, Vec<ToolCall>, Option<Usage>)> {
    let candidate = body
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .ok_or_else(|| Error::Http {
            provider: provider.to_string(),
            status: None,
            message: "no candidates in response".into(),
        })?;

    let parts = candidate
        .pointer("/content/parts")
        .and_then(|p| p.as_array())
        .cloned()
        .unwrap_or_default();

    let mut text = String::new();
    let mut tool_calls = Vec::new();

    // Single and parallel function calls both arrive as functionCall
    // parts; each gets a minted sequential id for correlation.
    for part in &parts {
        if let Some(t) = part.get("text").and_then(|v| v.as_str()) {
            text.push_str(t);
        }
        if let Some(fc) = part.get("functionCall") {
            let name = fc
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string();
            let arguments = fc.get("args").cloned().unwrap_or(Value::Object(Default::default()));
            tool_calls.push(ToolCall {
                id: format!("gemini-call-{}", tool_calls.len() + 1),
                name,
                arguments,
                parse_error: None,
            });
        }
    }

    let usage = body.get("usageMetadata").and_then(parse_usage_metadata);

    Ok((text, tool_calls, usage))
}

fn parse_usage_metadata(v: &Value) -> Option<Usage> {
    let prompt = v.get("promptTokenCount")?.as_u64()? as u32;
    let completion = v
        .get("candidatesTokenCount")
        .and_then(|c| c.as_u64())
        .unwrap_or(0) as u32;
    let total = v
        .get("totalTokenCount")
        .and_then(|c| c.as_u64())
        .unwrap_or((prompt + completion) as u64) as u32;
    Some(Usage {
        prompt_tokens: prompt,
        completion_tokens: completion,
        total_tokens: total,
        estimated: false,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl ChatProvider for GeminiProvider {
    async fn invoke_chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let model = self.effective_model(req);
        let url = self.generate_url(&model);
        let body = self.build_body(req);

        tracing::debug!(provider = %self.id, model = %model, "gemini chat request");

        let resp = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| from_reqwest(&self.id, e))?;

        let status = resp.status();
        let resp_text = resp.text().await.map_err(|e| from_reqwest(&self.id, e))?;

        if !status.is_success() {
            return Err(Error::Http {
                provider: self.id.clone(),
                status: Some(status.as_u16()),
                message: truncate_body(&resp_text),
            });
        }

        let resp_json: Value = serde_json::from_str(&resp_text)?;
        let (content, tool_calls, usage) = parse_response(&self.id, &resp_json)?;
        let usage = usage.or_else(|| Some(estimate_usage(&model, req, &content)));

        Ok(ChatResponse {
            content,
            tool_calls,
            usage,
            provider: self.id.clone(),
            model,
        })
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            provider: self.id.clone(),
            model: self.default_model.clone(),
            capabilities: ProviderCapabilities {
                supports_tools: true,
                supports_parallel_tool_calls: true,
                context_window_tokens: Some(1_000_000),
                max_output_tokens: Some(8_192),
            },
        }
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}
