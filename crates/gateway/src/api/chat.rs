//! Chat endpoint — the entry point for agent turns.
//!
//! Authentication is owned by the deployment's session layer; this
//! surface trusts the `x-user-id` header it injects. Anonymous requests
//! are permitted and can still search the catalog.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pf_conversations::{Sender, StoredMessage};

use crate::api::error::ApiError;
use crate::runtime::{run_turn, TurnInput};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / response shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequestBody {
    /// User message text (1–5000 characters after trimming).
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Optional provider override ("openai" or "gemini").
    #[serde(default)]
    pub provider: Option<String>,
    /// Optional history token budget for this turn.
    #[serde(default)]
    pub max_tokens: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponseBody {
    pub conversation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub messages: Vec<ApiMessage>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiMessage {
    pub role: &'static str,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cart: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_confirmation: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_request: Option<serde_json::Value>,
}

impl ApiMessage {
    fn from_stored(message: StoredMessage) -> Self {
        let role = match message.sender {
            Sender::User => "user",
            Sender::Agent => "assistant",
            Sender::System => "system",
            Sender::Tool => "tool",
        };
        let metadata = message.metadata.unwrap_or_default();
        Self {
            role,
            content: message.content,
            timestamp: message.created_at,
            items: metadata.items,
            cart: metadata.cart,
            checkout_confirmation: metadata.checkout_confirmation,
            purchase_request: metadata.purchase_request,
        }
    }
}

/// Caller identity as injected by the session layer.
pub fn user_id_from(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/chat
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ChatRequestBody>,
) -> Result<Json<ChatResponseBody>, ApiError> {
    let user_id = user_id_from(&headers);

    let input = TurnInput {
        user_message: body.message,
        conversation_id: body.conversation_id,
        user_id,
        provider: body.provider,
        max_tokens: body.max_tokens,
    };

    // The turn tracks this token in the cancel map under its conversation
    // id, so `POST /v1/conversations/:id/cancel` can abort it mid-flight.
    let cancel = crate::runtime::CancelToken::new();
    let result = run_turn(&state, input, &cancel).await?;

    Ok(Json(ChatResponseBody {
        conversation_id: result.conversation_id,
        title: result.title,
        messages: result.messages.into_iter().map(ApiMessage::from_stored).collect(),
    }))
}
