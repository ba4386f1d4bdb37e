use std::sync::Arc;

use pf_conversations::{ConversationManager, HistoryBuilder};
use pf_domain::config::Config;
use pf_domain::metrics::Metrics;
use pf_providers::ProviderRegistry;
use pf_tools::ToolExecutor;

use crate::runtime::cancel::CancelMap;
use crate::runtime::conversation_lock::ConversationLockMap;
use crate::safety::moderation::ModerationClient;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub metrics: Arc<Metrics>,

    // ── Conversation management ───────────────────────────────────
    pub conversations: Arc<ConversationManager>,
    pub history: Arc<HistoryBuilder>,
    pub turn_locks: Arc<ConversationLockMap>,
    pub cancel_map: Arc<CancelMap>,

    // ── Model + tools ─────────────────────────────────────────────
    pub providers: Arc<ProviderRegistry>,
    pub tools: Arc<ToolExecutor>,
    pub moderation: Arc<ModerationClient>,
}
