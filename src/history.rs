//! Append-only conversation history.

use crate::models::{ConversationTurn, Role};

/// Chronological record of one conversation.
///
/// Turns are only ever appended. There is no size bound.
#[derive(Debug, Default, Clone)]
pub struct HistoryStore {
    turns: Vec<ConversationTurn>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, role: Role, content: impl Into<String>) {
        self.turns.push(ConversationTurn {
            role,
            content: content.into(),
        });
    }

    /// Record a user message and the reply it received.
    pub fn record_exchange(&mut self, user: &str, assistant: &str) {
        self.append(Role::User, user);
        self.append(Role::Assistant, assistant);
    }

    pub fn snapshot(&self) -> Vec<ConversationTurn> {
        self.turns.clone()
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
