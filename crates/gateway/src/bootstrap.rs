//! Startup wiring: tracing, config, stores, providers, and the shared
//! application state.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use pf_conversations::usage_store::FileUsageSink;
use pf_conversations::{ConversationManager, FileConversationStore, HistoryBuilder};
use pf_domain::config::Config;
use pf_domain::metrics::Metrics;
use pf_domain::procurement::CartService;
use pf_providers::ProviderRegistry;
use pf_tools::{MemoryCartService, MemoryCatalog, MemoryCheckoutService, ToolExecutor};

use crate::runtime::cancel::CancelMap;
use crate::runtime::conversation_lock::ConversationLockMap;
use crate::runtime::prompt::SYSTEM_PROMPT;
use crate::safety::moderation::ModerationClient;
use crate::state::AppState;

/// Initialize structured JSON tracing.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,pf_gateway=debug")),
        )
        .json()
        .init();
}

/// Build the full application state from config.
///
/// Domain services here are the in-memory reference implementations;
/// a production deployment swaps in its own catalog/cart/checkout
/// services behind the same traits.
pub fn build_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    let metrics = Arc::new(Metrics::new());

    // ── Stores ────────────────────────────────────────────────────
    let store = Arc::new(
        FileConversationStore::new(&config.storage.state_dir)
            .context("initializing conversation store")?,
    );
    let conversations = Arc::new(ConversationManager::new(store));

    let usage_sink = Arc::new(
        FileUsageSink::new(&config.storage.state_dir).context("initializing usage sink")?,
    );

    // ── Domain services ───────────────────────────────────────────
    let catalog = Arc::new(MemoryCatalog::with_sample_items());
    let cart = Arc::new(MemoryCartService::new(catalog.clone()));
    let checkout = Arc::new(MemoryCheckoutService::new(cart.clone()));

    // ── Providers ─────────────────────────────────────────────────
    let providers = Arc::new(ProviderRegistry::from_config(
        &config.llm,
        metrics.clone(),
        usage_sink,
    ));
    if providers.is_empty() {
        tracing::warn!(
            "no LLM providers initialized — the gateway will run but chat \
             requests will fail until credentials are configured"
        );
    } else {
        tracing::info!(providers = providers.len(), "LLM provider registry ready");
    }

    // ── History builder + tools ───────────────────────────────────
    let history = Arc::new(HistoryBuilder::new(
        SYSTEM_PROMPT,
        &config.agent,
        metrics.clone(),
        Some(cart.clone() as Arc<dyn CartService>),
    ));
    let tools = Arc::new(ToolExecutor::new(
        catalog,
        cart,
        checkout,
        &config.agent,
        metrics.clone(),
    ));

    let moderation = Arc::new(ModerationClient::from_config(&config));
    if moderation.is_enabled() {
        tracing::info!("content moderation enabled");
    }

    Ok(AppState {
        config,
        metrics,
        conversations,
        history,
        turn_locks: Arc::new(ConversationLockMap::new()),
        cancel_map: Arc::new(CancelMap::new()),
        providers,
        tools,
        moderation,
    })
}
