//! Per-conversation cancellation tokens.
//!
//! Each running turn gets a `CancelToken`. Calling `cancel()` signals the
//! loop to stop before its next model call or tool dispatch; nothing from
//! the abandoned turn is persisted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// A cancellation token checked by the turn loop at its suspension points.
#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Tracks the active cancellation token per conversation id.
#[derive(Default)]
pub struct CancelMap {
    tokens: Mutex<HashMap<String, CancelToken>>,
}

impl CancelMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a new cancel token for a conversation.
    pub fn register(&self, conversation_id: &str) -> CancelToken {
        let token = CancelToken::new();
        self.tokens
            .lock()
            .insert(conversation_id.to_owned(), token.clone());
        token
    }

    /// Cancel a running turn. Returns true if a token was found.
    pub fn cancel(&self, conversation_id: &str) -> bool {
        match self.tokens.lock().get(conversation_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Remove the token (called when a turn completes).
    pub fn remove(&self, conversation_id: &str) {
        self.tokens.lock().remove(conversation_id);
    }

    /// Whether a conversation has an in-flight turn.
    pub fn is_running(&self, conversation_id: &str) -> bool {
        self.tokens.lock().contains_key(conversation_id)
    }

    /// Track an existing token under a conversation id so the cancel
    /// endpoint can reach it. The returned guard removes the entry when
    /// the turn ends, on every exit path.
    pub fn track(&self, conversation_id: &str, token: CancelToken) -> CancelGuard<'_> {
        self.tokens
            .lock()
            .insert(conversation_id.to_owned(), token);
        CancelGuard {
            map: self,
            conversation_id: conversation_id.to_owned(),
        }
    }
}

/// Removes a tracked token on drop.
pub struct CancelGuard<'a> {
    map: &'a CancelMap,
    conversation_id: String,
}

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        self.map.remove(&self.conversation_id);
    }
}
