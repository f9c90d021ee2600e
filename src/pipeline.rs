//! The two conversation pipelines.
//!
//! **Retrieval-augmented** ([`RagPipeline`]): exit check → retrieve →
//! assemble context → build request → generate → append to history.
//!
//! **Sentiment** ([`SentimentPipeline`]): score the message → generate a
//! single-turn reply → tag it with the mood.
//!
//! Neither pipeline returns an error. Retrieval and generation failures are
//! logged and answered with [`FALLBACK_REPLY`]; in the retrieval-augmented
//! pipeline the failed turn is still recorded in history.

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use crate::commands::{is_exit_command, FAREWELL};
use crate::config::{Config, GenerationConfig};
use crate::context::assemble_context;
use crate::error::TurnError;
use crate::generation::{create_backend, ResponseGenerator};
use crate::history::HistoryStore;
use crate::models::{ConversationTurn, ModelReply, ModelRequest};
use crate::prompt::build_request;
use crate::retriever::{Retriever, SqliteRetriever};
use crate::sentiment::{LexiconScorer, SentimentScorer};

/// Sent when the backend or retrieval fails.
pub const FALLBACK_REPLY: &str =
    "I'm here to support you. Can you share more about how you're feeling today?";

/// Result of one retrieval-augmented turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatOutcome {
    pub response: String,
    /// The user asked to end the conversation.
    pub exit: bool,
}

pub struct RagPipeline {
    retriever: Arc<dyn Retriever>,
    generator: ResponseGenerator,
    top_k: usize,
}

impl RagPipeline {
    pub fn new(retriever: Arc<dyn Retriever>, generator: ResponseGenerator, top_k: usize) -> Self {
        Self {
            retriever,
            generator,
            top_k,
        }
    }

    /// Open the index and construct the configured backend.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let retriever = SqliteRetriever::open(config).await?;
        let backend = create_backend(&config.generation)?;
        info!(
            backend = backend.name(),
            mode = %config.retrieval.mode,
            top_k = config.retrieval.top_k,
            "retrieval pipeline ready"
        );
        Ok(Self::new(
            Arc::new(retriever),
            ResponseGenerator::new(backend),
            config.retrieval.top_k,
        ))
    }

    /// Handle one user message against `history`.
    ///
    /// Exit commands return the farewell and leave history untouched. Every
    /// other input, including failed turns, appends exactly two turns.
    pub async fn respond(&self, history: &mut HistoryStore, input: &str) -> ChatOutcome {
        let outcome = self.reply(history.turns(), input).await;
        if !outcome.exit {
            history.record_exchange(input, &outcome.response);
        }
        outcome
    }

    /// Answer `input` given the prior turns, without recording anything.
    ///
    /// Callers that keep their own history (the HTTP sessions) record the
    /// exchange themselves unless `exit` is set.
    pub async fn reply(&self, history: &[ConversationTurn], input: &str) -> ChatOutcome {
        if is_exit_command(input) {
            return ChatOutcome {
                response: FAREWELL.to_string(),
                exit: true,
            };
        }

        let response = match self.answer(history, input).await {
            Ok(reply) => reply.text,
            Err(e) => {
                warn!(error = %e, backend = self.generator.backend_name(), "turn failed, sending fallback reply");
                FALLBACK_REPLY.to_string()
            }
        };
        ChatOutcome {
            response,
            exit: false,
        }
    }

    async fn answer(
        &self,
        history: &[ConversationTurn],
        input: &str,
    ) -> Result<ModelReply, TurnError> {
        let docs = if input.trim().is_empty() {
            Vec::new()
        } else {
            self.retriever
                .retrieve(input, self.top_k)
                .await
                .map_err(TurnError::Retrieval)?
        };
        let context = assemble_context(&docs);
        let request = build_request(history, input, context);
        Ok(self.generator.generate(&request).await?)
    }
}

pub struct SentimentPipeline {
    scorer: Arc<dyn SentimentScorer>,
    generator: ResponseGenerator,
}

impl SentimentPipeline {
    pub fn new(scorer: Arc<dyn SentimentScorer>, generator: ResponseGenerator) -> Self {
        Self { scorer, generator }
    }

    /// Lexicon scorer plus the backend named in `[sentiment.generation]`.
    pub fn from_config(config: &GenerationConfig) -> Result<Self> {
        let backend = create_backend(config)?;
        info!(backend = backend.name(), "sentiment pipeline ready");
        Ok(Self::new(
            Arc::new(LexiconScorer::new()),
            ResponseGenerator::new(backend),
        ))
    }

    /// Reply to a single message. The mood is always set.
    pub async fn respond(&self, message: &str) -> ModelReply {
        let mood = self.scorer.mood(message);
        let request = ModelRequest::single_turn(message);
        let reply = match self.generator.generate(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, backend = self.generator.backend_name(), "generation failed, sending fallback reply");
                ModelReply::text(FALLBACK_REPLY)
            }
        };
        reply.with_mood(mood)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NO_CONTEXT;
    use crate::error::GenerationError;
    use crate::generation::{BackendReply, GenerationBackend};
    use crate::models::{MessageRole, Mood, RetrievedDocument, Role};
    use crate::retriever::InMemoryRetriever;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every request and answers with a canned reply.
    struct Scripted {
        reply: Result<BackendReply, u16>,
        seen: Mutex<Vec<ModelRequest>>,
    }

    impl Scripted {
        fn ok(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(BackendReply::PlainText(text.to_string())),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing(status: u16) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(status),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl GenerationBackend for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }
        async fn complete(&self, request: &ModelRequest) -> Result<BackendReply, GenerationError> {
            self.seen.lock().unwrap().push(request.clone());
            match &self.reply {
                Ok(reply) => Ok(reply.clone()),
                Err(status) => Err(GenerationError::Status {
                    status: *status,
                    body: "unavailable".to_string(),
                }),
            }
        }
    }

    struct BrokenRetriever;

    #[async_trait]
    impl Retriever for BrokenRetriever {
        async fn retrieve(&self, _query: &str, _top_k: usize) -> Result<Vec<RetrievedDocument>> {
            anyhow::bail!("index is locked")
        }
    }

    fn rag(retriever: Arc<dyn Retriever>, backend: Arc<Scripted>) -> RagPipeline {
        RagPipeline::new(retriever, ResponseGenerator::new(backend), 4)
    }

    #[tokio::test]
    async fn test_exit_command_skips_everything() {
        let backend = Scripted::ok("unused");
        let pipeline = rag(Arc::new(InMemoryRetriever::empty()), backend.clone());
        let mut history = HistoryStore::new();

        let outcome = pipeline.respond(&mut history, " Bye ").await;
        assert_eq!(outcome.response, "Goodbye! Take care. 💙");
        assert!(outcome.exit);
        assert!(history.is_empty());
        assert!(backend.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reply_uses_history_without_recording() {
        let backend = Scripted::ok("noted");
        let pipeline = rag(Arc::new(InMemoryRetriever::empty()), backend.clone());
        let mut prior = HistoryStore::new();
        prior.record_exchange("earlier", "reply");

        let outcome = pipeline.reply(prior.turns(), "now").await;
        assert_eq!(outcome.response, "noted");
        assert_eq!(prior.len(), 2);
        assert_eq!(backend.seen.lock().unwrap()[0].history, prior.snapshot());
    }

    #[tokio::test]
    async fn test_turn_appends_two_entries() {
        let backend = Scripted::ok("That sounds hard. Try a slow breath.");
        let pipeline = rag(Arc::new(InMemoryRetriever::empty()), backend.clone());
        let mut history = HistoryStore::new();

        let outcome = pipeline.respond(&mut history, "I feel anxious today").await;
        assert!(!outcome.exit);
        assert_eq!(outcome.response, "That sounds hard. Try a slow breath.");
        assert_eq!(history.len(), 2);
        assert_eq!(history.turns()[0].role, Role::User);
        assert_eq!(history.turns()[0].content, "I feel anxious today");
        assert_eq!(history.turns()[1].content, outcome.response);

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0].context.as_ref().unwrap().as_str(), NO_CONTEXT);
    }

    #[tokio::test]
    async fn test_second_turn_sees_first_in_history() {
        let backend = Scripted::ok("ok");
        let pipeline = rag(Arc::new(InMemoryRetriever::empty()), backend.clone());
        let mut history = HistoryStore::new();
        pipeline.respond(&mut history, "first").await;
        pipeline.respond(&mut history, "second").await;

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[1].history.len(), 2);
        let messages = seen[1].to_messages();
        let user_turns: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(user_turns, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_retrieved_passages_reach_the_prompt() {
        let retriever = InMemoryRetriever::new(vec![
            RetrievedDocument::new("Anxiety eases with paced breathing."),
            RetrievedDocument::new("Unrelated cooking tip."),
        ]);
        let backend = Scripted::ok("ok");
        let pipeline = rag(Arc::new(retriever), backend.clone());
        pipeline
            .respond(&mut HistoryStore::new(), "what helps anxiety")
            .await;

        let seen = backend.seen.lock().unwrap();
        assert_eq!(
            seen[0].context.as_ref().unwrap().as_str(),
            "Anxiety eases with paced breathing."
        );
        assert!(seen[0].system_instructions.contains("paced breathing"));
    }

    #[tokio::test]
    async fn test_backend_failure_falls_back_and_records() {
        let pipeline = rag(Arc::new(InMemoryRetriever::empty()), Scripted::failing(503));
        let mut history = HistoryStore::new();

        let outcome = pipeline.respond(&mut history, "hello").await;
        assert_eq!(outcome.response, FALLBACK_REPLY);
        assert!(!outcome.exit);
        assert_eq!(history.len(), 2);
        assert_eq!(history.turns()[1].content, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn test_retrieval_failure_falls_back_without_calling_backend() {
        let backend = Scripted::ok("unused");
        let pipeline = rag(Arc::new(BrokenRetriever), backend.clone());
        let mut history = HistoryStore::new();

        let outcome = pipeline.respond(&mut history, "hello").await;
        assert_eq!(outcome.response, FALLBACK_REPLY);
        assert_eq!(history.len(), 2);
        assert!(backend.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_input_skips_retrieval() {
        let backend = Scripted::ok("Take your time.");
        let pipeline = rag(Arc::new(BrokenRetriever), backend);
        let mut history = HistoryStore::new();

        let outcome = pipeline.respond(&mut history, "").await;
        assert_eq!(outcome.response, "Take your time.");
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn test_unrecognized_reply_shape_is_not_a_failure() {
        let backend = Arc::new(Scripted {
            reply: Ok(BackendReply::from_json(serde_json::json!({"tokens": [1, 2]}))),
            seen: Mutex::new(Vec::new()),
        });
        let pipeline = rag(Arc::new(InMemoryRetriever::empty()), backend);
        let outcome = pipeline.respond(&mut HistoryStore::new(), "hi").await;
        assert_eq!(outcome.response, crate::generation::UNRECOGNIZED_REPLY);
    }

    #[tokio::test]
    async fn test_sentiment_reply_carries_mood() {
        let backend = Scripted::ok("I'm sorry it feels that way.");
        let pipeline = SentimentPipeline::new(
            Arc::new(LexiconScorer::new()),
            ResponseGenerator::new(backend.clone()),
        );

        let reply = pipeline.respond("I hate everything").await;
        assert_eq!(reply.mood, Some(Mood::Negative));
        assert_eq!(reply.text, "I'm sorry it feels that way.");

        let seen = backend.seen.lock().unwrap();
        assert!(seen[0].system_instructions.is_empty());
        assert!(seen[0].history.is_empty());
        assert!(seen[0].context.is_none());
    }

    #[tokio::test]
    async fn test_sentiment_failure_keeps_mood() {
        let pipeline = SentimentPipeline::new(
            Arc::new(LexiconScorer::new()),
            ResponseGenerator::new(Scripted::failing(500)),
        );
        let reply = pipeline.respond("I am so happy today").await;
        assert_eq!(reply.text, FALLBACK_REPLY);
        assert_eq!(reply.mood, Some(Mood::Positive));
    }
}
