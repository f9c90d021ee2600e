//! TOML configuration for the `mindful` binary and both chat services.
//!
//! Every section has defaults, so a config file only needs to name what it
//! changes. Credentials are never stored in the file: the file names the
//! environment variables that hold them, and [`load_config`] fails fast when
//! a required variable is missing.
//!
//! ```toml
//! [index]
//! path = "./data/index.sqlite"
//!
//! [retrieval]
//! top_k = 4
//! mode = "vector"
//!
//! [embedding]
//! provider = "local"
//! model = "all-minilm-l6-v2"
//!
//! [generation]
//! provider = "groq"
//! model = "llama3-8b-8192"
//!
//! [sentiment.generation]
//! provider = "ollama"
//! model = "llama3.2"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sentiment: SentimentConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("./data/index.sqlite")
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_overlap")]
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            overlap_tokens: default_overlap(),
        }
    }
}

fn default_max_tokens() -> usize {
    256
}
fn default_overlap() -> usize {
    32
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// `vector` (embedding similarity) or `keyword` (FTS5).
    #[serde(default = "default_retrieval_mode")]
    pub mode: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            mode: default_retrieval_mode(),
        }
    }
}

fn default_top_k() -> usize {
    4
}
fn default_retrieval_mode() -> String {
    "vector".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    /// Environment variable holding a model-hub token. When set, the
    /// variable must be present at startup.
    #[serde(default)]
    pub token_env: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            token_env: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

fn default_embedding_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    3
}
fn default_embedding_timeout() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// `groq`, `openai`, or `ollama`.
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Overrides the provider's base URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Overrides the provider's API key variable.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_generation_retries")]
    pub max_retries: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: None,
            url: None,
            api_key_env: None,
            temperature: default_temperature(),
            max_tokens: None,
            timeout_secs: default_generation_timeout(),
            max_retries: default_generation_retries(),
        }
    }
}

fn default_generation_provider() -> String {
    "groq".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_generation_timeout() -> u64 {
    60
}
fn default_generation_retries() -> u32 {
    2
}

impl GenerationConfig {
    pub fn model_name(&self) -> &str {
        match (&self.model, self.provider.as_str()) {
            (Some(model), _) => model,
            (None, "openai") => "gpt-4o-mini",
            (None, "ollama") => "llama3.2",
            (None, _) => "llama3-8b-8192",
        }
    }

    pub fn base_url(&self) -> &str {
        match (&self.url, self.provider.as_str()) {
            (Some(url), _) => url.trim_end_matches('/'),
            (None, "openai") => "https://api.openai.com/v1",
            (None, "ollama") => "http://localhost:11434",
            (None, _) => "https://api.groq.com/openai/v1",
        }
    }

    /// The environment variable holding the API key, or `None` for
    /// providers that need no credential.
    pub fn api_key_var(&self) -> Option<&str> {
        match (&self.api_key_env, self.provider.as_str()) {
            (Some(var), _) => Some(var),
            (None, "openai") => Some("OPENAI_API_KEY"),
            (None, "groq") => Some("GROQ_API_KEY"),
            (None, _) => None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_rag_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_rag_bind(),
        }
    }
}

fn default_rag_bind() -> String {
    "127.0.0.1:5000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SentimentConfig {
    #[serde(default = "default_sentiment_bind")]
    pub bind: String,
    #[serde(default = "default_sentiment_generation")]
    pub generation: GenerationConfig,
}

impl Default for SentimentConfig {
    fn default() -> Self {
        Self {
            bind: default_sentiment_bind(),
            generation: default_sentiment_generation(),
        }
    }
}

fn default_sentiment_bind() -> String {
    "127.0.0.1:5001".to_string()
}

fn default_sentiment_generation() -> GenerationConfig {
    GenerationConfig {
        provider: "ollama".to_string(),
        ..GenerationConfig::default()
    }
}

impl Config {
    /// A configuration with every section at its default.
    pub fn minimal() -> Self {
        Self {
            index: IndexConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            server: ServerConfig::default(),
            sentiment: SentimentConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.chunking.max_tokens == 0 {
        bail!("chunking.max_tokens must be > 0");
    }
    if config.chunking.overlap_tokens >= config.chunking.max_tokens {
        bail!("chunking.overlap_tokens must be smaller than chunking.max_tokens");
    }

    if config.retrieval.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }
    match config.retrieval.mode.as_str() {
        "vector" | "keyword" => {}
        other => bail!(
            "Unknown retrieval mode: '{}'. Must be vector or keyword.",
            other
        ),
    }
    if config.retrieval.mode == "vector" && !config.embedding.is_enabled() {
        bail!("retrieval.mode = \"vector\" requires an [embedding] provider; use mode = \"keyword\" or enable embeddings");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }
    if matches!(config.embedding.provider.as_str(), "openai" | "ollama") {
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    validate_generation("generation", &config.generation)?;
    validate_generation("sentiment.generation", &config.sentiment.generation)?;

    Ok(config)
}

fn validate_generation(section: &str, gen: &GenerationConfig) -> Result<()> {
    match gen.provider.as_str() {
        "groq" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown {}.provider: '{}'. Must be groq, openai, or ollama.",
            section,
            other
        ),
    }
    if !(0.0..=2.0).contains(&gen.temperature) {
        bail!("{}.temperature must be in [0.0, 2.0]", section);
    }
    Ok(())
}

/// Read a required credential from the environment.
///
/// Called when a backend is constructed so that a missing key stops the
/// process at startup instead of failing on the first request.
pub fn require_env(var: &str, purpose: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => bail!(
            "{} requires the {} environment variable to be set",
            purpose,
            var
        ),
    }
}
