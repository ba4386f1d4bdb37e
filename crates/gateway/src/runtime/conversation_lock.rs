//! Per-conversation concurrency control.
//!
//! Appends within one conversation are totally ordered, so only one turn
//! runs per conversation at a time. A second message arriving while a
//! turn is in flight waits (queue depth 1); anything beyond that is
//! rejected as busy so queues stay bounded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

struct Entry {
    sem: Arc<Semaphore>,
    waiters: Arc<AtomicUsize>,
}

/// Manages per-conversation turn locks.
#[derive(Default)]
pub struct ConversationLockMap {
    locks: Mutex<HashMap<String, Entry>>,
}

/// Error returned when a conversation already has a running turn and a
/// queued waiter.
#[derive(Debug)]
pub struct ConversationBusy;

impl std::fmt::Display for ConversationBusy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conversation is busy — a turn is already in progress")
    }
}

impl std::error::Error for ConversationBusy {}

impl ConversationLockMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the turn lock for a conversation.
    ///
    /// Holds for the duration of the turn — the permit auto-releases on
    /// drop. At most one caller waits behind the running turn.
    pub async fn acquire(
        &self,
        conversation_id: &str,
    ) -> Result<OwnedSemaphorePermit, ConversationBusy> {
        let (sem, waiters) = {
            let mut locks = self.locks.lock();
            let entry = locks.entry(conversation_id.to_owned()).or_insert_with(|| Entry {
                sem: Arc::new(Semaphore::new(1)),
                waiters: Arc::new(AtomicUsize::new(0)),
            });
            (entry.sem.clone(), entry.waiters.clone())
        };

        if let Ok(permit) = sem.clone().try_acquire_owned() {
            return Ok(permit);
        }

        // Someone is running; allow exactly one waiter.
        if waiters.fetch_add(1, Ordering::SeqCst) >= 1 {
            waiters.fetch_sub(1, Ordering::SeqCst);
            return Err(ConversationBusy);
        }

        let permit = sem.acquire_owned().await.map_err(|_| ConversationBusy);
        waiters.fetch_sub(1, Ordering::SeqCst);
        permit
    }

    /// Number of tracked conversations (for monitoring).
    pub fn conversation_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Drop lock entries for conversations with no running turn.
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, entry| {
            entry.sem.available_permits() == 0 || entry.waiters.load(Ordering::SeqCst) > 0
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequential_access() {
        let map = ConversationLockMap::new();
        let p1 = map.acquire("c1").await.unwrap();
        drop(p1);
        let p2 = map.acquire("c1").await.unwrap();
        drop(p2);
    }

    #[tokio::test]
    async fn different_conversations_run_concurrently() {
        let map = ConversationLockMap::new();
        let _p1 = map.acquire("c1").await.unwrap();
        let _p2 = map.acquire("c2").await.unwrap();
        assert_eq!(map.conversation_count(), 2);
    }

    #[tokio::test]
    async fn same_conversation_waits() {
        let map = Arc::new(ConversationLockMap::new());
        let map2 = map.clone();

        let p1 = map.acquire("c1").await.unwrap();
        let handle = tokio::spawn(async move {
            let _p2 = map2.acquire("c1").await.unwrap();
            42
        });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        drop(p1);
        assert_eq!(handle.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn second_waiter_is_rejected() {
        let map = Arc::new(ConversationLockMap::new());
        let _p1 = map.acquire("c1").await.unwrap();

        let map2 = map.clone();
        let _waiting = tokio::spawn(async move {
            let _p = map2.acquire("c1").await;
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert!(map.acquire("c1").await.is_err());
    }

    #[tokio::test]
    async fn prune_keeps_active_locks() {
        let map = ConversationLockMap::new();
        let _held = map.acquire("busy").await.unwrap();
        drop(map.acquire("idle").await.unwrap());

        map.prune_idle();
        assert_eq!(map.conversation_count(), 1);
    }
}
