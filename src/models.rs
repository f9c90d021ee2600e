//! Core data types shared by both chat pipelines and the indexer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Who spoke a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One completed message in a conversation. Never edited after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

/// A passage returned by a [`Retriever`](crate::retriever::Retriever).
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedDocument {
    pub content: String,
    /// Where the passage came from; only used for diagnostics.
    pub source: Option<String>,
}

impl RetrievedDocument {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source: None,
        }
    }
}

/// The merged retrieval context for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextBlock(String);

impl ContextBlock {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role of a message sent to a generation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl From<Role> for MessageRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => MessageRole::User,
            Role::Assistant => MessageRole::Assistant,
        }
    }
}

/// A single wire message in the OpenAI/Ollama chat shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptMessage {
    pub role: MessageRole,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Everything a backend needs to produce one reply.
///
/// Built fresh per request by [`crate::prompt`]; see
/// [`ModelRequest::to_messages`] for the wire ordering.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    /// Empty for single-turn requests.
    pub system_instructions: String,
    pub history: Vec<ConversationTurn>,
    pub user_input: String,
    pub context: Option<ContextBlock>,
}

impl ModelRequest {
    /// A bare user message with no instructions, history or context.
    pub fn single_turn(user_input: impl Into<String>) -> Self {
        Self {
            system_instructions: String::new(),
            history: Vec::new(),
            user_input: user_input.into(),
            context: None,
        }
    }

    /// Flatten into backend messages: system preamble, prior turns, the new
    /// user message, then a closing context reminder.
    pub fn to_messages(&self) -> Vec<PromptMessage> {
        let mut messages = Vec::with_capacity(self.history.len() + 3);
        if !self.system_instructions.is_empty() {
            messages.push(PromptMessage::new(
                MessageRole::System,
                self.system_instructions.as_str(),
            ));
        }
        for turn in &self.history {
            messages.push(PromptMessage::new(turn.role.into(), turn.content.as_str()));
        }
        messages.push(PromptMessage::new(MessageRole::User, self.user_input.as_str()));
        if let Some(ref context) = self.context {
            messages.push(PromptMessage::new(
                MessageRole::System,
                format!("Use the following context: {}", context),
            ));
        }
        messages
    }
}

/// Mood bucket derived from a polarity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Negative,
    Neutral,
    Positive,
}

impl Mood {
    /// Strict thresholds: exactly ±0.3 is neutral.
    pub fn from_score(score: f64) -> Self {
        if score < -0.3 {
            Mood::Negative
        } else if score > 0.3 {
            Mood::Positive
        } else {
            Mood::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Negative => "negative",
            Mood::Neutral => "neutral",
            Mood::Positive => "positive",
        }
    }
}

/// Canonical reply handed back to callers.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelReply {
    pub text: String,
    pub mood: Option<Mood>,
}

impl ModelReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            mood: None,
        }
    }

    pub fn with_mood(mut self, mood: Mood) -> Self {
        self.mood = Some(mood);
        self
    }
}

/// A stored slice of a knowledge document.
#[derive(Debug, Clone)]
pub struct Passage {
    pub id: String,
    pub source_path: String,
    pub passage_index: i64,
    pub text: String,
    pub hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mood_thresholds_are_strict() {
        assert_eq!(Mood::from_score(0.3), Mood::Neutral);
        assert_eq!(Mood::from_score(-0.3), Mood::Neutral);
        assert_eq!(Mood::from_score(0.0), Mood::Neutral);
        assert_eq!(Mood::from_score(0.3001), Mood::Positive);
        assert_eq!(Mood::from_score(-0.3001), Mood::Negative);
        assert_eq!(Mood::from_score(1.0), Mood::Positive);
        assert_eq!(Mood::from_score(-1.0), Mood::Negative);
    }

    #[test]
    fn test_mood_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Mood::Negative).unwrap(), "\"negative\"");
        assert_eq!(Mood::Positive.as_str(), "positive");
    }

    #[test]
    fn test_turn_serializes_role_and_content() {
        let turn = ConversationTurn {
            role: Role::Assistant,
            content: "hi".to_string(),
        };
        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(json, serde_json::json!({"role": "assistant", "content": "hi"}));
    }

    #[test]
    fn test_single_turn_messages() {
        let req = ModelRequest::single_turn("hello");
        let msgs = req.to_messages();
        assert_eq!(msgs, vec![PromptMessage::new(MessageRole::User, "hello")]);
    }
}
