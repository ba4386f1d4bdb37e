//! Conversation CRUD surface, delegated to the conversation manager.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use pf_conversations::Conversation;

use crate::api::chat::user_id_from;
use crate::api::error::ApiError;
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: usize = 20;
const MAX_LIST_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub limit: Option<usize>,
}

/// GET /v1/conversations?limit=N
pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Response, ApiError> {
    let Some(user_id) = user_id_from(&headers) else {
        // Anonymous callers have no listable history.
        return Ok(Json(serde_json::json!({ "conversations": [] })).into_response());
    };
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);

    let summaries = state.conversations.list_conversations(&user_id, limit).await?;
    Ok(Json(serde_json::json!({ "conversations": summaries })).into_response())
}

/// GET /v1/conversations/:id
pub async fn get_one(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let user_id = user_id_from(&headers);
    match state.conversations.get_full(user_id.as_deref(), &id).await? {
        Some(conversation) => Ok(Json(conversation).into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "code": "not_found",
                "message": "Conversation not found.",
            })),
        )
            .into_response()),
    }
}

/// POST /v1/conversations/:id/cancel
///
/// Signal the conversation's in-flight turn to stop. The loop honors the
/// signal at its next suspension point; nothing from the abandoned turn
/// is persisted. `cancelled: false` means no turn was running.
pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<serde_json::Value> {
    let cancelled = state.cancel_map.cancel(&id);
    Json(serde_json::json!({ "cancelled": cancelled }))
}

#[derive(Debug, Deserialize)]
pub struct CreateBody {
    #[serde(default)]
    pub title: Option<String>,
}

/// POST /v1/conversations
pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateBody>,
) -> Result<Response, ApiError> {
    let user_id = user_id_from(&headers);
    let title = body.title.unwrap_or_else(|| "New conversation".into());
    let conversation = Conversation::new(user_id, &title);
    let inserted = state.conversations.store().insert(conversation).await?;
    Ok((StatusCode::CREATED, Json(inserted.summary())).into_response())
}
