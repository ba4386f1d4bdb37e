//! The bounded reason-act loop for one turn.
//!
//! A turn takes one user message, runs at most `max_iterations` model
//! calls, fans tool calls out in parallel within each iteration, gathers
//! structured metadata from the results, and persists the finished turn
//! to the conversation log. Both the iteration count and the running
//! tool-call count are strictly increasing and bounded, so the loop
//! always terminates.

use futures_util::future::join_all;
use tokio::time::Instant;

use pf_conversations::{StoredMessage, TurnMetadata};
use pf_domain::chat::ChatMessage;
use pf_domain::error::{Error, Result};
use pf_domain::trace::TraceEvent;
use pf_providers::{ChatProvider, ChatRequest};
use pf_tools::{definitions, ExecuteToolRequest};

use crate::safety::{injection, redact, sanitize};
use crate::state::AppState;

use super::accumulator::MetadataAccumulator;
use super::cancel::CancelToken;

/// Reply when the tool-call cap is hit mid-turn.
pub const TOO_MANY_OPERATIONS_MESSAGE: &str =
    "I attempted too many operations while handling this request. Please break \
     it into smaller steps and try again.";

/// Reply when the iteration cap is hit with no usable agent text.
pub const OUT_OF_ITERATIONS_MESSAGE: &str =
    "I couldn't finish this request in time. Please break it into smaller \
     steps and try again.";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Input / output
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct TurnInput {
    pub user_message: String,
    pub conversation_id: Option<String>,
    pub user_id: Option<String>,
    /// Explicit provider override from the request.
    pub provider: Option<String>,
    /// History budget override; defaults to the configured input budget.
    pub max_tokens: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct TurnResult {
    pub conversation_id: String,
    /// Set when this turn created the conversation.
    pub title: Option<String>,
    /// Final agent reply text.
    pub content: String,
    pub iterations: u32,
    pub tool_calls_count: u32,
    /// The messages persisted for this turn (user + agent, in order).
    pub messages: Vec<StoredMessage>,
    pub max_iterations_reached: bool,
    pub metadata: Option<TurnMetadata>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run one turn end to end, recording request metrics on the way out.
pub async fn run_turn(
    state: &AppState,
    input: TurnInput,
    cancel: &CancelToken,
) -> Result<TurnResult> {
    let started = Instant::now();
    let result = run_turn_inner(state, input, cancel).await;
    let duration = started.elapsed();

    state
        .metrics
        .agent_request_duration_seconds
        .observe(duration.as_secs_f64());
    match &result {
        Ok(turn) => {
            state
                .metrics
                .agent_requests_total
                .with_label_values(&["success"])
                .inc();
            TraceEvent::TurnCompleted {
                conversation_id: turn.conversation_id.clone(),
                iterations: turn.iterations,
                tool_calls: turn.tool_calls_count,
                duration_ms: duration.as_millis() as u64,
                max_iterations_reached: turn.max_iterations_reached,
            }
            .emit();
        }
        Err(e) => {
            state
                .metrics
                .agent_requests_total
                .with_label_values(&[e.code()])
                .inc();
        }
    }
    result
}

async fn run_turn_inner(
    state: &AppState,
    input: TurnInput,
    cancel: &CancelToken,
) -> Result<TurnResult> {
    let agent_cfg = &state.config.agent;

    // ── Pre-flight: request shape ─────────────────────────────────
    let message = sanitize::sanitize_message(&input.user_message);
    if message.is_empty() {
        state
            .metrics
            .validation_errors_total
            .with_label_values(&["message_empty"])
            .inc();
        return Err(Error::ValidationFailed("message must not be empty".into()));
    }
    if message.chars().count() > state.config.safety.max_message_chars {
        state
            .metrics
            .validation_errors_total
            .with_label_values(&["message_length"])
            .inc();
        return Err(Error::ValidationFailed(format!(
            "message exceeds {} characters",
            state.config.safety.max_message_chars
        )));
    }

    // ── Pre-flight: injection heuristics ──────────────────────────
    if let Some(found) = injection::scan(&message) {
        if injection::is_rejecting(&found) {
            state
                .metrics
                .validation_errors_total
                .with_label_values(&["prompt_injection"])
                .inc();
            TraceEvent::InjectionRejected {
                category: found.category.to_string(),
            }
            .emit();
            return Err(Error::PromptInjectionRejected(found.category.to_string()));
        }
        tracing::warn!(
            category = found.category,
            severity = ?found.severity,
            "low-severity injection pattern observed, allowing"
        );
    }

    // ── Pre-flight: moderation (fail-open) ────────────────────────
    if let Some(categories) = state.moderation.check(&message).await {
        for category in &categories {
            state
                .metrics
                .moderation_rejections_total
                .with_label_values(&[category])
                .inc();
        }
        return Err(Error::ContentModerated(categories.join(", ")));
    }

    // ── Resolve provider and conversation ─────────────────────────
    let provider = state.providers.select(input.provider.as_deref())?;
    let model = provider.info().model;

    let (conversation, is_new) = state
        .conversations
        .load_or_create(
            input.conversation_id.as_deref(),
            input.user_id.as_deref(),
            &message,
        )
        .await?;

    // Serialize turns per conversation; a second queued caller is busy.
    let _turn_permit = state
        .turn_locks
        .acquire(&conversation.id)
        .await
        .map_err(|_| Error::RateLimited {
            provider: "conversation".into(),
        })?;

    // Make this turn's token reachable by the cancel endpoint for as long
    // as the turn runs.
    let _cancel_guard = state.cancel_map.track(&conversation.id, cancel.clone());

    tracing::debug!(
        conversation_id = %conversation.id,
        is_new,
        message = %redact::redact_text(&message),
        "turn started"
    );

    // ── Build the model input ─────────────────────────────────────
    let budget = input.max_tokens.unwrap_or(agent_cfg.max_input_tokens);
    let built = state
        .history
        .build(
            Some(&conversation),
            &message,
            input.user_id.as_deref(),
            budget,
            &model,
        )
        .await?;
    let mut working = built.messages;

    let tool_defs = definitions();
    let mut turn_messages: Vec<StoredMessage> = vec![StoredMessage::user(message.clone())];
    let mut accumulator = MetadataAccumulator::default();

    let mut iterations: u32 = 0;
    let mut tool_calls_count: u32 = 0;
    let mut last_agent_text = String::new();
    let mut max_iterations_reached = true;

    // ── The loop ──────────────────────────────────────────────────
    while iterations < agent_cfg.max_iterations {
        if cancel.is_cancelled() {
            return Err(Error::Timeout("turn cancelled".into()));
        }

        iterations += 1;
        state.metrics.agent_iterations_total.inc();

        let request = ChatRequest {
            messages: working.clone(),
            tools: tool_defs.clone(),
            temperature: Some(0.2),
            max_tokens: None,
            model: None,
            user_id: input.user_id.clone(),
            conversation_id: Some(conversation.id.clone()),
        };
        let response = provider.invoke_chat(&request).await?;

        let text = response.content.trim().to_string();
        if !text.is_empty() {
            last_agent_text = text.clone();
        }

        // No tool calls: this is the final answer.
        if response.tool_calls.is_empty() {
            turn_messages.push(StoredMessage::agent(text));
            max_iterations_reached = false;
            break;
        }

        // Tool-call cap: stop with a canned reply instead of fanning out.
        tool_calls_count += response.tool_calls.len() as u32;
        if tool_calls_count > agent_cfg.max_tool_calls_per_turn {
            tracing::warn!(
                conversation_id = %conversation.id,
                tool_calls = tool_calls_count,
                cap = agent_cfg.max_tool_calls_per_turn,
                "tool-call cap hit, stopping turn"
            );
            tool_calls_count = agent_cfg.max_tool_calls_per_turn;
            last_agent_text = TOO_MANY_OPERATIONS_MESSAGE.to_string();
            turn_messages.push(StoredMessage::agent(TOO_MANY_OPERATIONS_MESSAGE));
            max_iterations_reached = false;
            break;
        }

        working.push(ChatMessage::assistant_with_tools(
            text.clone(),
            response.tool_calls.clone(),
        ));
        turn_messages.push(StoredMessage::agent(text));

        if cancel.is_cancelled() {
            return Err(Error::Timeout("turn cancelled".into()));
        }

        // Fan out all tool calls for this iteration. join_all preserves
        // call order, keeping result grouping deterministic.
        let executions = response.tool_calls.iter().map(|tc| {
            state.tools.execute(ExecuteToolRequest {
                tool_name: tc.name.clone(),
                arguments: tc.arguments.clone(),
                tool_call_id: tc.id.clone(),
                parse_error: tc.parse_error.clone(),
                user_id: input.user_id.clone(),
                conversation_id: Some(conversation.id.clone()),
            })
        });
        let results = join_all(executions).await;

        for (tc, result) in response.tool_calls.iter().zip(results) {
            accumulator.absorb(&tc.name, &result.message.content);
            turn_messages.push(StoredMessage::tool(
                tc.id.clone(),
                result.message.content.clone(),
            ));
            working.push(result.message);
        }
    }

    // Iteration cap reached: reply with the most recent usable text, or
    // the canned fallback when the model never produced any.
    let content = if max_iterations_reached {
        let fallback = if last_agent_text.is_empty() {
            OUT_OF_ITERATIONS_MESSAGE.to_string()
        } else {
            last_agent_text.clone()
        };
        turn_messages.push(StoredMessage::agent(fallback.clone()));
        fallback
    } else {
        last_agent_text
    };

    // ── Post-flight: persist the turn ─────────────────────────────
    let metadata = accumulator.finish();
    if let Some(md) = &metadata {
        if let Ok(mut value) = serde_json::to_value(md) {
            redact::redact_keys(&mut value, &state.config.safety.redact_keys);
            tracing::debug!(
                conversation_id = %conversation.id,
                metadata = %value,
                "turn metadata gathered"
            );
        }
    }
    let persisted = state
        .conversations
        .append_turn(&conversation, turn_messages, metadata.clone())
        .await?;

    Ok(TurnResult {
        conversation_id: conversation.id.clone(),
        title: is_new.then(|| conversation.title.clone()),
        content,
        iterations,
        tool_calls_count,
        messages: persisted,
        max_iterations_reached,
        metadata,
    })
}
