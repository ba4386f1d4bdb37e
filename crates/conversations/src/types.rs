use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum title length, derived from the first user message.
pub const TITLE_MAX_CHARS: usize = 120;

/// Maximum stored preview length, derived from the latest message content.
pub const PREVIEW_MAX_CHARS: usize = 100;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message model
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Who produced a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Agent,
    System,
    Tool,
}

/// Structured result metadata gathered over one turn and attached to the
/// turn's final agent message. Payloads are schema-free at this boundary;
/// the executor and UI type them at the edges.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TurnMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cart: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkout_confirmation: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_request: Option<serde_json::Value>,
}

impl TurnMetadata {
    pub fn is_empty(&self) -> bool {
        self.items.is_none()
            && self.cart.is_none()
            && self.checkout_confirmation.is_none()
            && self.purchase_request.is_none()
    }
}

/// One atomic entry of the conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub sender: Sender,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Present iff `sender == Tool`, correlating with a prior agent
    /// tool-call id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<TurnMetadata>,
}

impl StoredMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            content: content.into(),
            created_at: Utc::now(),
            tool_call_id: None,
            metadata: None,
        }
    }

    pub fn agent(content: impl Into<String>) -> Self {
        Self {
            sender: Sender::Agent,
            content: content.into(),
            created_at: Utc::now(),
            tool_call_id: None,
            metadata: None,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            sender: Sender::Tool,
            content: content.into(),
            created_at: Utc::now(),
            tool_call_id: Some(tool_call_id.into()),
            metadata: None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    InProgress,
    Completed,
    Abandoned,
}

/// Ordered append-only message log owned by at most one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub title: String,
    pub last_message_preview: String,
    pub status: ConversationStatus,
    pub messages: Vec<StoredMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Start a new conversation from its first user message. The message
    /// itself is appended later, together with the rest of the turn.
    pub fn new(user_id: Option<String>, first_message: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            title: derive_title(first_message),
            last_message_preview: String::new(),
            status: ConversationStatus::InProgress,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn summary(&self) -> ConversationSummary {
        ConversationSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            last_message_preview: self.last_message_preview.clone(),
            status: self.status,
            message_count: self.messages.len(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Listing row without the message payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub last_message_preview: String,
    pub status: ConversationStatus,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Derive a conversation title from the first user message.
pub fn derive_title(first_message: &str) -> String {
    truncate_chars(first_message.trim(), TITLE_MAX_CHARS)
}

/// Derive the stored preview from the latest message content.
pub fn derive_preview(content: &str) -> String {
    truncate_chars(content.trim(), PREVIEW_MAX_CHARS)
}

/// Char-boundary-safe truncation.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_is_capped_at_120_chars() {
        let long = "x".repeat(500);
        let title = derive_title(&long);
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS);
    }

    #[test]
    fn title_trims_whitespace() {
        assert_eq!(derive_title("  hello  "), "hello");
    }

    #[test]
    fn preview_is_capped_at_100_chars() {
        let long = "y".repeat(300);
        assert_eq!(derive_preview(&long).chars().count(), PREVIEW_MAX_CHARS);
    }

    #[test]
    fn truncate_respects_multibyte_boundaries() {
        let s = "héllo wörld ünïcode";
        let t = truncate_chars(s, 7);
        assert_eq!(t, "héllo w");
    }

    #[test]
    fn metadata_is_empty_by_default() {
        assert!(TurnMetadata::default().is_empty());
        let md = TurnMetadata {
            cart: Some(serde_json::json!({"items": []})),
            ..TurnMetadata::default()
        };
        assert!(!md.is_empty());
    }

    #[test]
    fn conversation_roundtrips_through_json() {
        let mut conv = Conversation::new(Some("u1".into()), "Find me a laptop");
        conv.messages.push(StoredMessage::user("Find me a laptop"));
        conv.messages.push(StoredMessage::agent("Here are some options."));
        let json = serde_json::to_string(&conv).unwrap();
        let back: Conversation = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, conv.id);
        assert_eq!(back.messages.len(), 2);
        assert_eq!(back.title, "Find me a laptop");
    }
}
