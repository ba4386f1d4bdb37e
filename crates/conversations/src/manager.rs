//! Conversation lifecycle: create on first message, append completed
//! turns, list and fetch with owner scoping.

use std::sync::Arc;

use pf_domain::error::Result;
use pf_domain::trace::TraceEvent;

use crate::store::{ConversationMetaUpdate, ConversationStore};
use crate::types::{
    derive_preview, Conversation, ConversationSummary, Sender, StoredMessage, TurnMetadata,
};

pub struct ConversationManager {
    store: Arc<dyn ConversationStore>,
}

impl ConversationManager {
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    /// Resolve the conversation for a turn. A missing or foreign id starts
    /// a fresh conversation rather than failing. Returns `(conversation,
    /// is_new)`.
    pub async fn load_or_create(
        &self,
        conversation_id: Option<&str>,
        user_id: Option<&str>,
        first_message: &str,
    ) -> Result<(Conversation, bool)> {
        if let Some(id) = conversation_id {
            if let Some(existing) = self.store.find(id, user_id).await? {
                return Ok((existing, false));
            }
        }
        let conversation = Conversation::new(user_id.map(String::from), first_message);
        let inserted = self.store.insert(conversation).await?;
        Ok((inserted, true))
    }

    /// Persist one completed turn. Returns the messages actually kept.
    ///
    /// Tool messages are loop-internal and are dropped; agent messages
    /// whose trimmed content is empty are dropped; the turn's aggregated
    /// metadata is attached to the last surviving agent message. The
    /// conversation preview and `updated_at` reflect the final content.
    pub async fn append_turn(
        &self,
        conversation: &Conversation,
        turn_messages: Vec<StoredMessage>,
        metadata: Option<TurnMetadata>,
    ) -> Result<Vec<StoredMessage>> {
        let mut kept: Vec<StoredMessage> = turn_messages
            .into_iter()
            .filter(|m| match m.sender {
                Sender::Tool => false,
                Sender::Agent => !m.content.trim().is_empty(),
                _ => true,
            })
            .collect();

        if let Some(metadata) = metadata.filter(|m| !m.is_empty()) {
            if let Some(last_agent) = kept
                .iter_mut()
                .rev()
                .find(|m| m.sender == Sender::Agent)
            {
                last_agent.metadata = Some(metadata);
            }
        }

        if kept.is_empty() {
            return Ok(kept);
        }

        let preview = kept
            .last()
            .map(|m| derive_preview(&m.content))
            .unwrap_or_default();
        let appended = kept.len();

        self.store
            .append_messages(&conversation.id, kept.clone())
            .await?;
        self.store
            .update_metadata(
                &conversation.id,
                ConversationMetaUpdate {
                    last_message_preview: Some(preview),
                    ..Default::default()
                },
            )
            .await?;

        TraceEvent::ConversationAppended {
            conversation_id: conversation.id.clone(),
            messages: appended,
        }
        .emit();

        Ok(kept)
    }

    pub async fn list_conversations(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationSummary>> {
        self.store.list_by_user(user_id, limit).await
    }

    pub async fn get_summary(
        &self,
        user_id: Option<&str>,
        conversation_id: &str,
    ) -> Result<Option<ConversationSummary>> {
        Ok(self
            .store
            .find(conversation_id, user_id)
            .await?
            .map(|c| c.summary()))
    }

    pub async fn get_full(
        &self,
        user_id: Option<&str>,
        conversation_id: &str,
    ) -> Result<Option<Conversation>> {
        self.store.find(conversation_id, user_id).await
    }

    /// Refresh the preview and `updated_at` without appending.
    pub async fn touch(&self, conversation_id: &str, preview: &str) -> Result<()> {
        self.store
            .update_metadata(
                conversation_id,
                ConversationMetaUpdate {
                    last_message_preview: Some(derive_preview(preview)),
                    ..Default::default()
                },
            )
            .await
    }
}
