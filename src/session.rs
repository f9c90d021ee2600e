//! Per-session conversation state.
//!
//! Each session id maps to a [`Session`]: its [`HistoryStore`] plus a turn
//! lock. A turn holds the turn lock from its history snapshot through the
//! append, so two turns in the same session cannot interleave. The history
//! itself is only locked long enough to copy or append, so reading a
//! conversation never waits on a backend call.
//!
//! Sessions are created by turns, never by reads.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

use crate::history::HistoryStore;
use crate::models::ConversationTurn;

/// Session used when a request names none.
pub const DEFAULT_SESSION: &str = "default";

pub type SessionHandle = Arc<Session>;

#[derive(Debug, Default)]
pub struct Session {
    turn: AsyncMutex<()>,
    history: Mutex<HistoryStore>,
}

impl Session {
    /// Wait for any in-flight turn in this session, then hold the session
    /// until the guard drops.
    pub async fn begin_turn(&self) -> MutexGuard<'_, ()> {
        self.turn.lock().await
    }

    pub fn snapshot(&self) -> Vec<ConversationTurn> {
        self.history().snapshot()
    }

    pub fn record_exchange(&self, user: &str, assistant: &str) {
        self.history().record_exchange(user, assistant);
    }

    pub fn len(&self) -> usize {
        self.history().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn history(&self) -> std::sync::MutexGuard<'_, HistoryStore> {
        // A poisoned history is still append-only and readable.
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, SessionHandle>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The session, created empty on first use. A blank id maps to
    /// [`DEFAULT_SESSION`].
    pub fn session(&self, id: Option<&str>) -> SessionHandle {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(sessions.entry(session_key(id).to_string()).or_default())
    }

    /// The session if it already exists.
    pub fn get(&self, id: Option<&str>) -> Option<SessionHandle> {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.get(session_key(id)).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn session_key(id: Option<&str>) -> &str {
    match id.map(str::trim) {
        Some(id) if !id.is_empty() => id,
        _ => DEFAULT_SESSION,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_same_id_shares_history() {
        let store = SessionStore::new();
        store.session(Some("a")).record_exchange("hi", "hello");
        assert_eq!(store.session(Some("a")).len(), 2);
    }

    #[test]
    fn test_sessions_are_isolated() {
        let store = SessionStore::new();
        store.session(Some("a")).record_exchange("hi", "hello");
        assert!(store.session(Some("b")).is_empty());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_missing_or_blank_id_is_default() {
        let store = SessionStore::new();
        store.session(None).record_exchange("hi", "hello");
        assert_eq!(store.session(Some("  ")).len(), 2);
        assert_eq!(store.session(Some(DEFAULT_SESSION)).len(), 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_never_creates() {
        let store = SessionStore::new();
        for i in 0..100 {
            assert!(store.get(Some(&format!("s{}", i))).is_none());
        }
        assert!(store.get(None).is_none());
        assert!(store.is_empty());

        store.session(Some("s1")).record_exchange("hi", "hello");
        assert_eq!(store.get(Some(" s1 ")).map(|s| s.len()), Some(2));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_reads_do_not_wait_for_turn() {
        let store = SessionStore::new();
        let session = store.session(None);
        let _turn = session.begin_turn().await;

        // Another turn must wait...
        let second = tokio::time::timeout(Duration::from_millis(50), session.begin_turn()).await;
        assert!(second.is_err());
        // ...but the history is readable and writable meanwhile.
        session.record_exchange("hi", "hello");
        assert_eq!(session.snapshot().len(), 2);
    }
}
