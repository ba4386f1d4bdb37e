//! Conversation persistence boundary.
//!
//! Modeled as a document store with one document per conversation. The
//! core only needs the five operations on [`ConversationStore`]; a real
//! deployment can back them with any document database. Two
//! implementations ship here: a JSON-file-per-conversation store and an
//! in-memory store for tests.
//!
//! Reads are owner-scoped: a conversation owned by a different user and a
//! conversation that does not exist are indistinguishable to callers, and
//! malformed identifiers read as absent rather than failing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::RwLock;

use pf_domain::error::{Error, Result};

use crate::types::{Conversation, ConversationStatus, ConversationSummary, StoredMessage};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fields updatable without touching the message log. `updated_at` is
/// always refreshed by the store.
#[derive(Debug, Clone, Default)]
pub struct ConversationMetaUpdate {
    pub title: Option<String>,
    pub last_message_preview: Option<String>,
    pub status: Option<ConversationStatus>,
}

#[async_trait::async_trait]
pub trait ConversationStore: Send + Sync {
    /// Fetch a conversation by id, scoped to `user_id`. Owner mismatch and
    /// malformed ids both read as `None`.
    async fn find(&self, conversation_id: &str, user_id: Option<&str>)
        -> Result<Option<Conversation>>;

    async fn insert(&self, conversation: Conversation) -> Result<Conversation>;

    /// Append messages to one conversation, atomically with respect to
    /// other appends on the same conversation.
    async fn append_messages(
        &self,
        conversation_id: &str,
        messages: Vec<StoredMessage>,
    ) -> Result<()>;

    async fn update_metadata(
        &self,
        conversation_id: &str,
        update: ConversationMetaUpdate,
    ) -> Result<()>;

    /// Summaries for one user, most recently updated first.
    async fn list_by_user(&self, user_id: &str, limit: usize) -> Result<Vec<ConversationSummary>>;
}

/// Whether `id` has the shape of a stored conversation id.
fn is_valid_id(id: &str) -> bool {
    uuid::Uuid::parse_str(id).is_ok()
}

/// Owner scoping: anonymous conversations are readable with the id alone;
/// owned conversations require the matching user.
fn owner_matches(conversation: &Conversation, user_id: Option<&str>) -> bool {
    match &conversation.user_id {
        Some(owner) => user_id == Some(owner.as_str()),
        None => true,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Conversation store backed by a process-local map. Used by tests and
/// ephemeral deployments.
#[derive(Default)]
pub struct MemoryConversationStore {
    inner: RwLock<HashMap<String, Conversation>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn find(
        &self,
        conversation_id: &str,
        user_id: Option<&str>,
    ) -> Result<Option<Conversation>> {
        if !is_valid_id(conversation_id) {
            return Ok(None);
        }
        let inner = self.inner.read();
        Ok(inner
            .get(conversation_id)
            .filter(|c| owner_matches(c, user_id))
            .cloned())
    }

    async fn insert(&self, conversation: Conversation) -> Result<Conversation> {
        self.inner
            .write()
            .insert(conversation.id.clone(), conversation.clone());
        Ok(conversation)
    }

    async fn append_messages(
        &self,
        conversation_id: &str,
        messages: Vec<StoredMessage>,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        let conversation = inner
            .get_mut(conversation_id)
            .ok_or_else(|| Error::PersistenceFailed(format!(
                "conversation {conversation_id} not found for append"
            )))?;
        conversation.messages.extend(messages);
        conversation.updated_at = Utc::now();
        Ok(())
    }

    async fn update_metadata(
        &self,
        conversation_id: &str,
        update: ConversationMetaUpdate,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        let conversation = inner
            .get_mut(conversation_id)
            .ok_or_else(|| Error::PersistenceFailed(format!(
                "conversation {conversation_id} not found for update"
            )))?;
        apply_update(conversation, update);
        Ok(())
    }

    async fn list_by_user(&self, user_id: &str, limit: usize) -> Result<Vec<ConversationSummary>> {
        let inner = self.inner.read();
        let mut summaries: Vec<ConversationSummary> = inner
            .values()
            .filter(|c| c.user_id.as_deref() == Some(user_id))
            .map(|c| c.summary())
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        summaries.truncate(limit);
        Ok(summaries)
    }
}

fn apply_update(conversation: &mut Conversation, update: ConversationMetaUpdate) {
    if let Some(title) = update.title {
        conversation.title = title;
    }
    if let Some(preview) = update.last_message_preview {
        conversation.last_message_preview = preview;
    }
    if let Some(status) = update.status {
        conversation.status = status;
    }
    conversation.updated_at = Utc::now();
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// File store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One JSON document per conversation under `state_dir/conversations/`.
/// The full set is kept in memory behind a `RwLock`; every mutation is
/// flushed to the conversation's own file while the write lock is held,
/// which makes appends atomic per conversation.
pub struct FileConversationStore {
    dir: PathBuf,
    inner: RwLock<HashMap<String, Conversation>>,
}

impl FileConversationStore {
    /// Load or create the store at `state_path/conversations`.
    pub fn new(state_path: &Path) -> Result<Self> {
        let dir = state_path.join("conversations");
        std::fs::create_dir_all(&dir)?;

        let mut conversations = HashMap::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_none_or(|e| e != "json") {
                continue;
            }
            match std::fs::read_to_string(&path)
                .map_err(Error::Io)
                .and_then(|raw| serde_json::from_str::<Conversation>(&raw).map_err(Error::Json))
            {
                Ok(conversation) => {
                    conversations.insert(conversation.id.clone(), conversation);
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "skipping unreadable conversation document"
                    );
                }
            }
        }

        tracing::info!(
            conversations = conversations.len(),
            path = %dir.display(),
            "conversation store loaded"
        );

        Ok(Self {
            dir,
            inner: RwLock::new(conversations),
        })
    }

    fn persist(&self, conversation: &Conversation) -> Result<()> {
        let path = self.dir.join(format!("{}.json", conversation.id));
        let json = serde_json::to_string_pretty(conversation)?;
        std::fs::write(&path, json)
            .map_err(|e| Error::PersistenceFailed(format!("{}: {e}", path.display())))
    }
}

#[async_trait::async_trait]
impl ConversationStore for FileConversationStore {
    async fn find(
        &self,
        conversation_id: &str,
        user_id: Option<&str>,
    ) -> Result<Option<Conversation>> {
        if !is_valid_id(conversation_id) {
            return Ok(None);
        }
        let inner = self.inner.read();
        Ok(inner
            .get(conversation_id)
            .filter(|c| owner_matches(c, user_id))
            .cloned())
    }

    async fn insert(&self, conversation: Conversation) -> Result<Conversation> {
        let mut inner = self.inner.write();
        self.persist(&conversation)?;
        inner.insert(conversation.id.clone(), conversation.clone());
        Ok(conversation)
    }

    async fn append_messages(
        &self,
        conversation_id: &str,
        messages: Vec<StoredMessage>,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        let conversation = inner
            .get_mut(conversation_id)
            .ok_or_else(|| Error::PersistenceFailed(format!(
                "conversation {conversation_id} not found for append"
            )))?;
        conversation.messages.extend(messages);
        conversation.updated_at = Utc::now();
        let snapshot = conversation.clone();
        self.persist(&snapshot)
    }

    async fn update_metadata(
        &self,
        conversation_id: &str,
        update: ConversationMetaUpdate,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        let conversation = inner
            .get_mut(conversation_id)
            .ok_or_else(|| Error::PersistenceFailed(format!(
                "conversation {conversation_id} not found for update"
            )))?;
        apply_update(conversation, update);
        let snapshot = conversation.clone();
        self.persist(&snapshot)
    }

    async fn list_by_user(&self, user_id: &str, limit: usize) -> Result<Vec<ConversationSummary>> {
        let inner = self.inner.read();
        let mut summaries: Vec<ConversationSummary> = inner
            .values()
            .filter(|c| c.user_id.as_deref() == Some(user_id))
            .map(|c| c.summary())
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        summaries.truncate(limit);
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(user: Option<&str>) -> Conversation {
        Conversation::new(user.map(String::from), "need a standing desk")
    }

    #[tokio::test]
    async fn memory_find_scopes_by_owner() {
        let store = MemoryConversationStore::new();
        let conv = store.insert(sample(Some("alice"))).await.unwrap();

        // Owner sees it.
        assert!(store.find(&conv.id, Some("alice")).await.unwrap().is_some());
        // A different user gets "not found", not an error.
        assert!(store.find(&conv.id, Some("bob")).await.unwrap().is_none());
        // Anonymous caller cannot read an owned conversation.
        assert!(store.find(&conv.id, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn anonymous_conversation_is_readable_by_id() {
        let store = MemoryConversationStore::new();
        let conv = store.insert(sample(None)).await.unwrap();
        assert!(store.find(&conv.id, None).await.unwrap().is_some());
        assert!(store.find(&conv.id, Some("anyone")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn malformed_id_reads_as_absent() {
        let store = MemoryConversationStore::new();
        assert!(store.find("not-a-uuid", None).await.unwrap().is_none());
        assert!(store.find("", Some("alice")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn append_preserves_order() {
        let store = MemoryConversationStore::new();
        let conv = store.insert(sample(Some("alice"))).await.unwrap();
        store
            .append_messages(
                &conv.id,
                vec![StoredMessage::user("one"), StoredMessage::agent("two")],
            )
            .await
            .unwrap();
        store
            .append_messages(&conv.id, vec![StoredMessage::user("three")])
            .await
            .unwrap();

        let loaded = store.find(&conv.id, Some("alice")).await.unwrap().unwrap();
        let contents: Vec<_> = loaded.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn list_sorts_by_updated_desc_and_limits() {
        let store = MemoryConversationStore::new();
        let first = store.insert(sample(Some("alice"))).await.unwrap();
        let second = store.insert(sample(Some("alice"))).await.unwrap();
        let _other = store.insert(sample(Some("bob"))).await.unwrap();

        // Touch the first so it becomes most recent.
        store
            .update_metadata(
                &first.id,
                ConversationMetaUpdate {
                    last_message_preview: Some("newest".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let listed = store.list_by_user("alice", 10).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, first.id);
        assert_eq!(listed[1].id, second.id);

        let limited = store.list_by_user("alice", 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn file_store_survives_reload() {
        let dir = tempfile::tempdir().unwrap();

        let conv_id = {
            let store = FileConversationStore::new(dir.path()).unwrap();
            let conv = store.insert(sample(Some("alice"))).await.unwrap();
            store
                .append_messages(
                    &conv.id,
                    vec![StoredMessage::user("hello"), StoredMessage::agent("hi there")],
                )
                .await
                .unwrap();
            conv.id
        };

        // Reopen from disk and verify the same ordered messages come back.
        let reopened = FileConversationStore::new(dir.path()).unwrap();
        let loaded = reopened.find(&conv_id, Some("alice")).await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.messages[0].content, "hello");
        assert_eq!(loaded.messages[1].content, "hi there");
    }

    #[tokio::test]
    async fn append_to_missing_conversation_is_persistence_error() {
        let store = MemoryConversationStore::new();
        let err = store
            .append_messages(
                &uuid::Uuid::new_v4().to_string(),
                vec![StoredMessage::user("orphan")],
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "persistence_failed");
    }
}
