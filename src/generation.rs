//! Generation backends and reply normalization.
//!
//! A [`GenerationBackend`] adapter turns a [`ModelRequest`] into a tagged
//! [`BackendReply`]. [`ResponseGenerator`] normalizes that into the canonical
//! [`ModelReply`], checking shapes in a fixed priority order:
//!
//! | Shape | Extracted text |
//! |-------|----------------|
//! | `Structured` with a string `"text"` field | that field |
//! | `Structured` with a string `"output_text"` field | that field |
//! | `PlainText` | the text |
//! | anything else | [`UNRECOGNIZED_REPLY`] |
//!
//! An unrecognized shape is logged, not raised. Transport and HTTP failures
//! surface as [`GenerationError`]; mapping those to the user-facing fallback
//! is the pipeline's job (see [`crate::pipeline`]).
//!
//! # Providers
//!
//! | Config Value | Backend | Endpoint |
//! |-------------|---------|----------|
//! | `"groq"` | [`ChatCompletionsBackend`] | `POST https://api.groq.com/openai/v1/chat/completions` |
//! | `"openai"` | [`ChatCompletionsBackend`] | `POST https://api.openai.com/v1/chat/completions` |
//! | `"ollama"` | [`OllamaBackend`] | `POST http://localhost:11434/api/chat` |
//!
//! Both backends retry transient failures through
//! [`post_json_with_retry`](crate::http::post_json_with_retry).

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{require_env, GenerationConfig};
use crate::error::GenerationError;
use crate::http::post_json_with_retry;
use crate::models::{ModelReply, ModelRequest};

/// Used when a backend answers in a shape we cannot read.
pub const UNRECOGNIZED_REPLY: &str =
    "I'm here to listen and support you. Could you tell me more about what's on your mind?";

/// Raw reply from a backend adapter, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendReply {
    PlainText(String),
    Structured(Map<String, Value>),
}

impl BackendReply {
    /// Wrap an arbitrary JSON value. Objects stay structured, strings become
    /// plain text, and anything else is kept under a `"raw"` key.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(fields) => BackendReply::Structured(fields),
            Value::String(text) => BackendReply::PlainText(text),
            other => {
                let mut fields = Map::new();
                fields.insert("raw".to_string(), other);
                BackendReply::Structured(fields)
            }
        }
    }

    /// The reply text, if the shape is one we recognize.
    pub fn extract_text(&self) -> Option<&str> {
        match self {
            BackendReply::Structured(fields) => ["text", "output_text"]
                .iter()
                .find_map(|key| fields.get(*key).and_then(Value::as_str)),
            BackendReply::PlainText(text) => Some(text.as_str()),
        }
    }
}

/// Normalize any backend reply into a [`ModelReply`]. Never fails.
pub fn normalize_reply(reply: &BackendReply) -> ModelReply {
    match reply.extract_text() {
        Some(text) => ModelReply::text(text.trim()),
        None => {
            warn!(reply = ?reply, "unexpected generation reply shape");
            ModelReply::text(UNRECOGNIZED_REPLY)
        }
    }
}

/// A text-generation backend.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Short identifier used in logs (e.g. `"groq:llama3-8b-8192"`).
    fn name(&self) -> &str;

    async fn complete(&self, request: &ModelRequest) -> Result<BackendReply, GenerationError>;
}

/// Invokes a backend and normalizes its reply.
#[derive(Clone)]
pub struct ResponseGenerator {
    backend: Arc<dyn GenerationBackend>,
}

impl ResponseGenerator {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub async fn generate(&self, request: &ModelRequest) -> Result<ModelReply, GenerationError> {
        let reply = self.backend.complete(request).await?;
        Ok(normalize_reply(&reply))
    }
}

// ============ OpenAI-compatible chat completions ============

/// Hosted chat-completions backend (Groq, OpenAI, or any compatible API).
pub struct ChatCompletionsBackend {
    name: String,
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    max_retries: u32,
}

impl ChatCompletionsBackend {
    /// # Errors
    ///
    /// Fails when the provider's API key variable is not set, or the HTTP
    /// client cannot be built.
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = match config.api_key_var() {
            Some(var) => Some(require_env(
                var,
                &format!("The '{}' generation provider", config.provider),
            )?),
            None => None,
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            name: format!("{}:{}", config.provider, config.model_name()),
            client,
            url: format!("{}/chat/completions", config.base_url()),
            api_key,
            model: config.model_name().to_string(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
        })
    }

    fn request_body(&self, request: &ModelRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": request.to_messages(),
            "temperature": self.temperature,
            "stream": false,
        });
        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        body
    }
}

#[async_trait]
impl GenerationBackend for ChatCompletionsBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &ModelRequest) -> Result<BackendReply, GenerationError> {
        let body = self.request_body(request);
        debug!(url = %self.url, model = %self.model, messages = request.history.len() + 1, "sending chat completion request");
        let json = post_json_with_retry(
            &self.client,
            &self.url,
            self.api_key.as_deref(),
            &body,
            self.max_retries,
        )
        .await?;
        Ok(parse_chat_completion(json))
    }
}

/// Read `choices[0].message.content` into a structured reply carrying the
/// text, finish reason and model. Other shapes pass through untouched.
pub fn parse_chat_completion(json: Value) -> BackendReply {
    let choice = json
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first());
    let content = choice
        .and_then(|c| c.pointer("/message/content"))
        .and_then(Value::as_str);

    match content {
        Some(text) => {
            let mut fields = Map::new();
            fields.insert("text".to_string(), Value::String(text.to_string()));
            if let Some(reason) = choice.and_then(|c| c.get("finish_reason")) {
                fields.insert("finish_reason".to_string(), reason.clone());
            }
            if let Some(model) = json.get("model") {
                fields.insert("model".to_string(), model.clone());
            }
            BackendReply::Structured(fields)
        }
        None => BackendReply::from_json(json),
    }
}

// ============ Ollama ============

/// Locally served model via Ollama's chat endpoint.
pub struct OllamaBackend {
    name: String,
    client: reqwest::Client,
    url: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    max_retries: u32,
}

impl OllamaBackend {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            name: format!("ollama:{}", config.model_name()),
            client,
            url: format!("{}/api/chat", config.base_url()),
            model: config.model_name().to_string(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
        })
    }

    fn request_body(&self, request: &ModelRequest) -> Value {
        let mut options = json!({ "temperature": self.temperature });
        if let Some(max_tokens) = self.max_tokens {
            options["num_predict"] = json!(max_tokens);
        }
        json!({
            "model": self.model,
            "messages": request.to_messages(),
            "stream": false,
            "options": options,
        })
    }
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &ModelRequest) -> Result<BackendReply, GenerationError> {
        let body = self.request_body(request);
        debug!(url = %self.url, model = %self.model, "sending ollama chat request");
        let json =
            post_json_with_retry(&self.client, &self.url, None, &body, self.max_retries).await?;
        Ok(parse_ollama_chat(json))
    }
}

/// Ollama answers `{"message": {"role": "assistant", "content": "..."}}`.
pub fn parse_ollama_chat(json: Value) -> BackendReply {
    if let Some(Value::String(text)) = json.pointer("/message/content") {
        return BackendReply::PlainText(text.clone());
    }
    if let Some(err) = json.get("error").and_then(Value::as_str) {
        warn!(error = %err, "ollama reported an error in a successful response");
    }
    BackendReply::from_json(json)
}

/// Create the backend named by `config.provider`.
///
/// # Errors
///
/// Unknown providers, or a hosted provider whose API key variable is unset.
pub fn create_backend(config: &GenerationConfig) -> Result<Arc<dyn GenerationBackend>> {
    match config.provider.as_str() {
        "groq" | "openai" => Ok(Arc::new(ChatCompletionsBackend::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaBackend::new(config)?)),
        other => anyhow::bail!("Unknown generation provider: {}", other),
    }
}
