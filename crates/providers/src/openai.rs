//! OpenAI chat-completions adapter.
//!
//! Translates the internal message model to the OpenAI wire format and
//! normalizes responses: tool calls land in the flat `tool_calls` vector,
//! string-encoded arguments are JSON-decoded (decode failures ride along
//! on the call as `parse_error`), and missing usage is estimated with the
//! tokenizer.

use serde_json::Value;

use pf_domain::chat::{ChatMessage, Role, ToolCall, ToolDefinition, Usage};
use pf_domain::config::ProviderConfig;
use pf_domain::error::{Error, Result};
use pf_domain::tokens;

use crate::traits::{ChatProvider, ChatRequest, ChatResponse, ProviderCapabilities, ProviderInfo};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct OpenAiProvider {
    id: String,
    base_url: String,
    api_key: String,
    default_model: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
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

    fn build_chat_body(&self, req: &ChatRequest) -> Value {
        let messages: Vec<Value> = req.messages.iter().map(msg_to_openai).collect();

        let mut body = serde_json::json!({
            "model": self.effective_model(req),
            "messages": messages,
        });

        if !req.tools.is_empty() {
            let tools: Vec<Value> = req.tools.iter().map(tool_to_openai).collect();
            body["tools"] = Value::Array(tools);
        }
        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(max) = req.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }
        body
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message serialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn msg_to_openai(msg: &ChatMessage) -> Value {
    match msg.role {
        Role::Tool => serde_json::json!({
            "role": "tool",
            "tool_call_id": msg.tool_call_id.as_deref().unwrap_or(""),
            "content": msg.content,
        }),
        Role::Assistant => assistant_to_openai(msg),
        _ => serde_json::json!({
            "role": msg.role.as_str(),
            "content": msg.content,
        }),
    }
}

fn assistant_to_openai(msg: &ChatMessage) -> Value {
    let mut obj = serde_json::json!({"role": "assistant"});
    if msg.content.is_empty() {
        obj["content"] = Value::Null;
    } else {
        obj["content"] = Value::String(msg.content.clone());
    }
    if !msg.tool_calls.is_empty() {
        let calls: Vec<Value> = msg
            .tool_calls
            .iter()
            .map(|tc| {
                serde_json::json!({
                    "id": tc.id,
                    "type": "function",
                    "function": {
                        "name": tc.name,
                        "arguments": tc.arguments.to_string(),
                    }
                })
            })
            .collect();
        obj["tool_calls"] = Value::Array(calls);
    }
    obj
}

fn tool_to_openai(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_chat_response(provider: &str, body: &Value) -> Result<(String, Vec<ToolCall>, Option<Usage>, String)> {
    let choice = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .ok_or_else(|| Error::Http {
            provider: provider.to_string(),
            status: None,
            message: "no choices in response".into(),
        })?;

    let message = choice.get("message").ok_or_else(|| Error::Http {
        provider: provider.to_string(),
        status: None,
        message: "no message in choice".into(),
    })?;

    let content = message
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let model = body
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    let tool_calls = parse_tool_calls(message);
    let usage = body.get("usage").and_then(parse_usage);

    Ok((content, tool_calls, usage, model))
}

/// Normalize the `tool_calls` array. Arguments arrive as a JSON-encoded
/// string; a string that fails to decode is NOT a provider error — the
/// parse failure is attached to the call for the executor to surface as a
/// structured tool result.
fn parse_tool_calls(message: &Value) -> Vec<ToolCall> {
    let arr = match message.get("tool_calls").and_then(|v| v.as_array()) {
        Some(a) => a,
        None => return Vec::new(),
    };
    arr.iter()
        .filter_map(|tc| {
            let id = tc.get("id")?.as_str()?.to_string();
            let func = tc.get("function")?;
            let name = func.get("name")?.as_str()?.to_string();
            let args_str = func.get("arguments").and_then(|v| v.as_str()).unwrap_or("{}");
            let (arguments, parse_error) = match serde_json::from_str::<Value>(args_str) {
                Ok(v) => (v, None),
                Err(e) => {
                    tracing::warn!(
                        call_id = %id,
                        tool = %name,
                        error = %e,
                        "tool call arguments are not valid JSON"
                    );
                    (Value::Object(Default::default()), Some(e.to_string()))
                }
            };
            Some(ToolCall {
                id,
                name,
                arguments,
                parse_error,
            })
        })
        .collect()
}

fn parse_usage(v: &Value) -> Option<Usage> {
    Some(Usage {
        prompt_tokens: v.get("prompt_tokens")?.as_u64()? as u32,
        completion_tokens: v.get("completion_tokens")?.as_u64()? as u32,
        total_tokens: v.get("total_tokens")?.as_u64()? as u32,
        estimated: false,
    })
}

/// Estimate usage with the tokenizer when the backend omitted it.
pub(crate) fn estimate_usage(model: &str, req: &ChatRequest, content: &str) -> Usage {
    let prompt: usize = req
        .messages
        .iter()
        .map(|m| tokens::count_message(model, &m.content))
        .sum();
    let completion = tokens::count(model, content);
    Usage {
        prompt_tokens: prompt as u32,
        completion_tokens: completion as u32,
        total_tokens: (prompt + completion) as u32,
        estimated: true,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl ChatProvider for OpenAiProvider {
    async fn invoke_chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_chat_body(req);

        tracing::debug!(provider = %self.id, url = %url, "openai chat request");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
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
        let (content, tool_calls, usage, model) = parse_chat_response(&self.id, &resp_json)?;
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
                context_window_tokens: Some(128_000),
                max_output_tokens: Some(16_384),
            },
        }
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

/// Map a transport failure to the error taxonomy, preserving the status
/// code for retry classification when one exists.
pub(crate) fn from_reqwest(provider: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        return Error::Timeout(format!("provider '{provider}': {e}"));
    }
    Error::Http {
        provider: provider.to_string(),
        status: e.status().map(|s| s.as_u16()),
        message: e.to_string(),
    }
}

/// Keep provider error bodies short enough for logs.
pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 600;
    if body.len() <= MAX {
        return body.to_string();
    }
    let boundary = (0..=MAX).rev().find(|i| body.is_char_boundary(*i)).unwrap_or(0);
    format!("{}…", &body[..boundary])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with(messages: Vec<ChatMessage>) -> ChatRequest {
        ChatRequest {
            messages,
            tools: vec![ToolDefinition {
                name: "search_catalog".into(),
                description: "Search the catalog".into(),
                parameters: serde_json::json!({"type": "object"}),
            }],
            temperature: Some(0.2),
            max_tokens: None,
            model: None,
            user_id: None,
            conversation_id: None,
        }
    }

    #[test]
    fn tool_result_message_serializes_with_call_id() {
        let msg = ChatMessage::tool_result("t1", "search_catalog", "{\"count\":0}");
        let v = msg_to_openai(&msg);
        assert_eq!(v["role"], "tool");
        assert_eq!(v["tool_call_id"], "t1");
        assert_eq!(v["content"], "{\"count\":0}");
    }

    #[test]
    fn assistant_with_tool_calls_serializes_arguments_as_string() {
        let msg = ChatMessage::assistant_with_tools(
            "",
            vec![ToolCall {
                id: "t1".into(),
                name: "add_to_cart".into(),
                arguments: serde_json::json!({"itemId": "i1", "quantity": 1}),
                parse_error: None,
            }],
        );
        let v = assistant_to_openai(&msg);
        assert!(v["content"].is_null());
        let args = v["tool_calls"][0]["function"]["arguments"].as_str().unwrap();
        let decoded: Value = serde_json::from_str(args).unwrap();
        assert_eq!(decoded["itemId"], "i1");
    }

    #[test]
    fn parses_parallel_tool_calls() {
        let body = serde_json::json!({
            "model": "gpt-4o-mini",
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [
                        {"id": "t1", "type": "function",
                         "function": {"name": "search_catalog", "arguments": "{\"query\":\"mouse\"}"}},
                        {"id": "t2", "type": "function",
                         "function": {"name": "get_cart", "arguments": "{}"}}
                    ]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 100, "completion_tokens": 20, "total_tokens": 120}
        });
        let (content, calls, usage, model) = parse_chat_response("openai", &body).unwrap();
        assert_eq!(content, "");
        assert_eq!(model, "gpt-4o-mini");
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "search_catalog");
        assert_eq!(calls[0].arguments["query"], "mouse");
        assert!(calls[0].parse_error.is_none());
        let usage = usage.unwrap();
        assert_eq!(usage.total_tokens, 120);
        assert!(!usage.estimated);
    }

    #[test]
    fn invalid_arguments_become_parse_error_not_failure() {
        let message = serde_json::json!({
            "tool_calls": [{
                "id": "t1", "type": "function",
                "function": {"name": "search_catalog", "arguments": "{not json"}
            }]
        });
        let calls = parse_tool_calls(&message);
        assert_eq!(calls.len(), 1);
        assert!(calls[0].parse_error.is_some());
        assert_eq!(calls[0].arguments, serde_json::json!({}));
    }

    #[test]
    fn missing_usage_is_estimated() {
        let req = request_with(vec![ChatMessage::user("hello there")]);
        let usage = estimate_usage("gpt-4o-mini", &req, "Hi! How can I help?");
        assert!(usage.estimated);
        assert!(usage.prompt_tokens > 0);
        assert!(usage.completion_tokens > 0);
        assert_eq!(
            usage.total_tokens,
            usage.prompt_tokens + usage.completion_tokens
        );
    }

    #[test]
    fn body_includes_tools_and_model() {
        let provider = OpenAiProvider {
            id: "openai".into(),
            base_url: "https://api.openai.com/v1".into(),
            api_key: "test".into(),
            default_model: "gpt-4o-mini".into(),
            client: reqwest::Client::new(),
        };
        let body = provider.build_chat_body(&request_with(vec![ChatMessage::user("hi")]));
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["tools"][0]["function"]["name"], "search_catalog");
        assert_eq!(body["temperature"], 0.2);
    }
}
