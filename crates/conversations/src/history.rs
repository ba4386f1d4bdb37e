//! Token-budgeted history builder.
//!
//! Materializes the model input for one turn as
//! `[system, optional cart context, …selected history…, current user]`.
//! The system prompt, cart context, and current user message are reserved
//! first and never truncated; prior messages are selected newest→oldest
//! against the remaining budget and a count cap, then restored to
//! chronological order.

use std::sync::Arc;

use pf_domain::chat::{ChatMessage, Role};
use pf_domain::config::AgentConfig;
use pf_domain::error::{Error, Result};
use pf_domain::metrics::Metrics;
use pf_domain::procurement::CartService;
use pf_domain::tokens;
use pf_domain::trace::TraceEvent;

use crate::cart::format_cart_context;
use crate::types::{Conversation, Sender};

/// Smallest budget the builder accepts.
pub const MIN_HISTORY_BUDGET: usize = 512;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Report types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncationReason {
    /// The history count cap stopped selection.
    MessageCount,
    /// The remaining token budget stopped selection.
    TokenBudget,
    /// The requested budget exceeded the hard total cap (fatal).
    TotalTokens,
}

impl TruncationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TruncationReason::MessageCount => "message_count",
            TruncationReason::TokenBudget => "token_budget",
            TruncationReason::TotalTokens => "total_tokens",
        }
    }
}

/// Token accounting for one built sequence.
#[derive(Debug, Clone, Default)]
pub struct TokenBudgetReport {
    pub system_tokens: usize,
    pub cart_tokens: usize,
    pub history_tokens: usize,
    pub new_user_tokens: usize,
    pub total_tokens: usize,
    pub included_messages: usize,
    pub truncated_messages: usize,
    pub was_truncated: bool,
    pub reasons: Vec<TruncationReason>,
}

/// The built sequence plus its accounting.
#[derive(Debug, Clone)]
pub struct BuiltHistory {
    pub messages: Vec<ChatMessage>,
    pub report: TokenBudgetReport,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Builder
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct HistoryBuilder {
    system_prompt: String,
    max_total_tokens: usize,
    max_history_messages: usize,
    metrics: Arc<Metrics>,
    cart_service: Option<Arc<dyn CartService>>,
}

impl HistoryBuilder {
    pub fn new(
        system_prompt: impl Into<String>,
        agent: &AgentConfig,
        metrics: Arc<Metrics>,
        cart_service: Option<Arc<dyn CartService>>,
    ) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            max_total_tokens: agent.max_total_tokens,
            max_history_messages: agent.max_history_messages,
            metrics,
            cart_service,
        }
    }

    /// Build the message sequence for one turn.
    ///
    /// `max_tokens` is the caller's budget for the whole sequence; a
    /// budget above the hard total cap is a fatal `TokenLimitExceeded`,
    /// never a silent truncation. Cart context is included iff a user is
    /// present and their cart has at least one item — a cart fetch
    /// failure is logged and skipped without blocking the turn.
    pub async fn build(
        &self,
        conversation: Option<&Conversation>,
        new_user_message: &str,
        user_id: Option<&str>,
        max_tokens: usize,
        model: &str,
    ) -> Result<BuiltHistory> {
        let user_text = new_user_message.trim();
        if user_text.is_empty() {
            return Err(Error::ValidationFailed(
                "message must not be empty".into(),
            ));
        }
        if max_tokens < MIN_HISTORY_BUDGET {
            return Err(Error::ValidationFailed(format!(
                "history budget {max_tokens} is below the minimum {MIN_HISTORY_BUDGET}"
            )));
        }

        let conversation_id = conversation.map(|c| c.id.as_str()).unwrap_or("new");
        let mut report = TokenBudgetReport::default();

        // A budget beyond the hard cap can never be satisfied.
        if max_tokens > self.max_total_tokens {
            self.record_truncation(conversation_id, TruncationReason::TotalTokens, 0, &mut report);
            return Err(Error::TokenLimitExceeded {
                total_tokens: max_tokens,
                limit: self.max_total_tokens,
            });
        }
        let budget = max_tokens;

        // ── Reserved sections ─────────────────────────────────────
        report.system_tokens = tokens::count_message(model, &self.system_prompt);
        report.new_user_tokens = tokens::count_message(model, user_text);

        let cart_context = self.fetch_cart_context(user_id).await;
        if let Some(block) = &cart_context {
            report.cart_tokens = tokens::count_message(model, block);
        }

        let reserved = report.system_tokens + report.cart_tokens + report.new_user_tokens;
        if reserved > budget {
            return Err(Error::TokenLimitExceeded {
                total_tokens: reserved,
                limit: budget,
            });
        }

        // ── History selection, newest → oldest ────────────────────
        let prior: &[crate::types::StoredMessage] =
            conversation.map(|c| c.messages.as_slice()).unwrap_or(&[]);
        let mut remaining = budget - reserved;
        let mut selected: Vec<ChatMessage> = Vec::new();

        for message in prior.iter().rev() {
            let Some(chat) = stored_to_chat(message) else {
                continue;
            };
            if selected.len() >= self.max_history_messages {
                self.record_truncation(
                    conversation_id,
                    TruncationReason::MessageCount,
                    prior.len() - selected.len(),
                    &mut report,
                );
                break;
            }
            let cost = tokens::count_message(model, &chat.content);
            if cost > remaining {
                self.record_truncation(
                    conversation_id,
                    TruncationReason::TokenBudget,
                    prior.len() - selected.len(),
                    &mut report,
                );
                break;
            }
            remaining -= cost;
            report.history_tokens += cost;
            selected.push(chat);
        }
        selected.reverse();

        report.included_messages = selected.len();
        report.truncated_messages = prior.len().saturating_sub(selected.len());
        report.total_tokens = reserved + report.history_tokens;

        // ── Assemble ──────────────────────────────────────────────
        let mut messages = Vec::with_capacity(selected.len() + 3);
        messages.push(ChatMessage::system(self.system_prompt.clone()));
        if let Some(block) = cart_context {
            messages.push(ChatMessage::system(block));
        }
        messages.extend(selected);
        messages.push(ChatMessage::user(user_text));

        TraceEvent::HistoryBuilt {
            conversation_id: conversation_id.to_string(),
            total_tokens: report.total_tokens,
            included_messages: report.included_messages,
            truncated_messages: report.truncated_messages,
        }
        .emit();

        Ok(BuiltHistory { messages, report })
    }

    async fn fetch_cart_context(&self, user_id: Option<&str>) -> Option<String> {
        let user = user_id?;
        let service = self.cart_service.as_ref()?;
        match service.get_cart(user).await {
            Ok(cart) if !cart.is_empty() => Some(format_cart_context(&cart)),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "cart fetch failed, building history without cart context");
                None
            }
        }
    }

    fn record_truncation(
        &self,
        conversation_id: &str,
        reason: TruncationReason,
        dropped: usize,
        report: &mut TokenBudgetReport,
    ) {
        report.was_truncated = true;
        report.reasons.push(reason);
        self.metrics
            .conversation_truncations_total
            .with_label_values(&[reason.as_str()])
            .inc();
        TraceEvent::HistoryTruncated {
            conversation_id: conversation_id.to_string(),
            reason: reason.as_str().to_string(),
            dropped,
        }
        .emit();
    }
}

/// Map a persisted log entry to its in-loop shape. Tool entries are
/// internal to past loops and are not replayed to the model.
fn stored_to_chat(message: &crate::types::StoredMessage) -> Option<ChatMessage> {
    let role = match message.sender {
        Sender::User => Role::User,
        Sender::Agent => Role::Assistant,
        Sender::System => Role::System,
        Sender::Tool => return None,
    };
    Some(ChatMessage {
        role,
        content: message.content.clone(),
        tool_calls: Vec::new(),
        tool_call_id: None,
        tool_name: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StoredMessage;
    use pf_domain::procurement::{CartLine, CartSnapshot};

    // "plain" resolves to the chars/4 estimator, which makes budget math
    // easy to predict in tests.
    const MODEL: &str = "plain-test-model";
    const SYSTEM: &str = "You are a procurement assistant.";

    fn builder(metrics: Arc<Metrics>) -> HistoryBuilder {
        HistoryBuilder::new(SYSTEM, &AgentConfig::default(), metrics, None)
    }

    fn conversation_with(n: usize, content: &str) -> Conversation {
        let mut conv = Conversation::new(Some("u1".into()), "first");
        for i in 0..n {
            let msg = if i % 2 == 0 {
                StoredMessage::user(content)
            } else {
                StoredMessage::agent(content)
            };
            conv.messages.push(msg);
        }
        conv
    }

    #[tokio::test]
    async fn empty_message_is_rejected() {
        let b = builder(Arc::new(Metrics::new()));
        let err = b.build(None, "   \n ", None, 3000, MODEL).await.unwrap_err();
        assert_eq!(err.code(), "validation_failed");
    }

    #[tokio::test]
    async fn budget_below_minimum_is_rejected() {
        let b = builder(Arc::new(Metrics::new()));
        let err = b.build(None, "hi", None, 256, MODEL).await.unwrap_err();
        assert_eq!(err.code(), "validation_failed");
    }

    #[tokio::test]
    async fn sequence_starts_with_system_and_ends_with_user() {
        let b = builder(Arc::new(Metrics::new()));
        let built = b.build(None, "hi", None, 3000, MODEL).await.unwrap();
        assert_eq!(built.messages.first().unwrap().role, Role::System);
        let last = built.messages.last().unwrap();
        assert_eq!(last.role, Role::User);
        assert_eq!(last.content, "hi");
        assert!(!built.report.was_truncated);
    }

    #[tokio::test]
    async fn long_history_is_truncated_within_budget() {
        let metrics = Arc::new(Metrics::new());
        let b = builder(metrics.clone());
        // 80 messages of ~100 tokens each (400 chars / 4 + overhead).
        let content = "m".repeat(400);
        let conv = conversation_with(80, &content);

        let built = b
            .build(Some(&conv), "what did we decide?", Some("u1"), 3000, MODEL)
            .await
            .unwrap();

        assert!(built.report.was_truncated);
        assert!(built.report.truncated_messages >= 30);
        assert!(built.report.total_tokens <= 3000);
        assert_eq!(built.messages.first().unwrap().role, Role::System);
        assert_eq!(built.messages.last().unwrap().content, "what did we decide?");
        // Exactly one counter increment, labeled with the stop reason.
        assert_eq!(
            metrics
                .conversation_truncations_total
                .with_label_values(&["token_budget"])
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn selection_keeps_newest_messages_in_order() {
        let b = builder(Arc::new(Metrics::new()));
        let mut conv = Conversation::new(Some("u1".into()), "first");
        for i in 0..10 {
            conv.messages.push(StoredMessage::user(format!("message {i}")));
        }
        // Budget that fits only some of the history.
        let built = b
            .build(Some(&conv), "latest", Some("u1"), 600, MODEL)
            .await
            .unwrap();

        let history: Vec<_> = built.messages[1..built.messages.len() - 1]
            .iter()
            .map(|m| m.content.clone())
            .collect();
        // Chronological order, ending at the newest prior message.
        assert!(!history.is_empty());
        assert_eq!(history.last().unwrap(), "message 9");
        let mut sorted = history.clone();
        sorted.sort_by_key(|s| {
            s.rsplit(' ').next().and_then(|n| n.parse::<u32>().ok()).unwrap_or(0)
        });
        assert_eq!(history, sorted);
    }

    #[tokio::test]
    async fn message_count_cap_applies() {
        let metrics = Arc::new(Metrics::new());
        let b = builder(metrics.clone());
        let conv = conversation_with(80, "short");

        let built = b
            .build(Some(&conv), "hello", Some("u1"), 4000, MODEL)
            .await
            .unwrap();

        assert_eq!(built.report.included_messages, 50);
        assert!(built
            .report
            .reasons
            .contains(&TruncationReason::MessageCount));
        assert_eq!(
            metrics
                .conversation_truncations_total
                .with_label_values(&["message_count"])
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn budget_above_total_cap_is_fatal() {
        let metrics = Arc::new(Metrics::new());
        let b = builder(metrics.clone());
        let err = b.build(None, "hi", None, 50_000, MODEL).await.unwrap_err();
        assert_eq!(err.code(), "token_limit_exceeded");
        assert_eq!(
            metrics
                .conversation_truncations_total
                .with_label_values(&["total_tokens"])
                .get(),
            1
        );

        // The cap itself is still a usable budget.
        assert!(b.build(None, "hi", None, 4000, MODEL).await.is_ok());
    }

    #[tokio::test]
    async fn oversized_reserved_sections_fail_hard() {
        let metrics = Arc::new(Metrics::new());
        let huge_prompt = "p".repeat(20_000);
        let b = HistoryBuilder::new(huge_prompt, &AgentConfig::default(), metrics, None);
        let err = b.build(None, "hi", None, 3000, MODEL).await.unwrap_err();
        assert_eq!(err.code(), "token_limit_exceeded");
    }

    #[tokio::test]
    async fn build_is_deterministic() {
        let b = builder(Arc::new(Metrics::new()));
        let conv = conversation_with(20, "some earlier context about keyboards");
        let one = b
            .build(Some(&conv), "and mice?", Some("u1"), 2000, MODEL)
            .await
            .unwrap();
        let two = b
            .build(Some(&conv), "and mice?", Some("u1"), 2000, MODEL)
            .await
            .unwrap();
        assert_eq!(one.report.total_tokens, two.report.total_tokens);
        assert_eq!(one.messages.len(), two.messages.len());
        for (a, b) in one.messages.iter().zip(two.messages.iter()) {
            assert_eq!(a.content, b.content);
        }
    }

    // ── Cart context ────────────────────────────────────────────────

    struct FixedCart(CartSnapshot);

    #[async_trait::async_trait]
    impl CartService for FixedCart {
        async fn add_item(&self, _: &str, _: &str, _: u32) -> pf_domain::Result<CartSnapshot> {
            Ok(self.0.clone())
        }
        async fn remove_item(&self, _: &str, _: &str) -> pf_domain::Result<CartSnapshot> {
            Ok(self.0.clone())
        }
        async fn get_cart(&self, _: &str) -> pf_domain::Result<CartSnapshot> {
            Ok(self.0.clone())
        }
    }

    struct FailingCart;

    #[async_trait::async_trait]
    impl CartService for FailingCart {
        async fn add_item(&self, _: &str, _: &str, _: u32) -> pf_domain::Result<CartSnapshot> {
            Err(pf_domain::Error::Internal("cart down".into()))
        }
        async fn remove_item(&self, _: &str, _: &str) -> pf_domain::Result<CartSnapshot> {
            Err(pf_domain::Error::Internal("cart down".into()))
        }
        async fn get_cart(&self, _: &str) -> pf_domain::Result<CartSnapshot> {
            Err(pf_domain::Error::Internal("cart down".into()))
        }
    }

    fn one_item_cart() -> CartSnapshot {
        CartSnapshot {
            items: vec![CartLine {
                item_id: "i1".into(),
                item_name: "Wireless Mouse".into(),
                item_price: 19.99,
                quantity: 1,
            }],
            total_cost: 19.99,
            item_count: 1,
        }
    }

    #[tokio::test]
    async fn cart_context_included_for_user_with_items() {
        let b = HistoryBuilder::new(
            SYSTEM,
            &AgentConfig::default(),
            Arc::new(Metrics::new()),
            Some(Arc::new(FixedCart(one_item_cart()))),
        );
        let built = b.build(None, "checkout please", Some("u1"), 3000, MODEL).await.unwrap();
        assert!(built.messages[1].content.contains("Wireless Mouse"));
        assert!(built.report.cart_tokens > 0);
    }

    #[tokio::test]
    async fn cart_context_skipped_for_anonymous() {
        let b = HistoryBuilder::new(
            SYSTEM,
            &AgentConfig::default(),
            Arc::new(Metrics::new()),
            Some(Arc::new(FixedCart(one_item_cart()))),
        );
        let built = b.build(None, "hello", None, 3000, MODEL).await.unwrap();
        assert_eq!(built.report.cart_tokens, 0);
        assert_eq!(built.messages.len(), 2);
    }

    #[tokio::test]
    async fn empty_cart_is_not_injected() {
        let b = HistoryBuilder::new(
            SYSTEM,
            &AgentConfig::default(),
            Arc::new(Metrics::new()),
            Some(Arc::new(FixedCart(CartSnapshot::default()))),
        );
        let built = b.build(None, "hello", Some("u1"), 3000, MODEL).await.unwrap();
        assert_eq!(built.report.cart_tokens, 0);
    }

    #[tokio::test]
    async fn cart_fetch_failure_is_non_blocking() {
        let b = HistoryBuilder::new(
            SYSTEM,
            &AgentConfig::default(),
            Arc::new(Metrics::new()),
            Some(Arc::new(FailingCart)),
        );
        let built = b.build(None, "hello", Some("u1"), 3000, MODEL).await.unwrap();
        assert_eq!(built.report.cart_tokens, 0);
        assert_eq!(built.messages.last().unwrap().content, "hello");
    }

    #[tokio::test]
    async fn tool_entries_are_not_replayed() {
        let b = builder(Arc::new(Metrics::new()));
        let mut conv = Conversation::new(Some("u1".into()), "first");
        conv.messages.push(StoredMessage::user("find mice"));
        conv.messages.push(StoredMessage::tool("t1", "{\"items\":[]}"));
        conv.messages.push(StoredMessage::agent("No mice found."));

        let built = b.build(Some(&conv), "try again", Some("u1"), 3000, MODEL).await.unwrap();
        assert!(built.messages.iter().all(|m| m.role != Role::Tool));
    }
}
