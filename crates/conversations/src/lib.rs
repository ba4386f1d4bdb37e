//! Conversation management: the append-only conversation log, its stores,
//! and the token-budgeted history builder that materializes the model
//! input for one turn.

pub mod cart;
pub mod history;
pub mod manager;
pub mod store;
pub mod types;
pub mod usage_store;

pub use history::{BuiltHistory, HistoryBuilder, TokenBudgetReport, TruncationReason};
pub use manager::ConversationManager;
pub use store::{ConversationMetaUpdate, ConversationStore, FileConversationStore, MemoryConversationStore};
pub use types::{Conversation, ConversationStatus, ConversationSummary, Sender, StoredMessage, TurnMetadata};
