//! Embedding providers and vector utilities.
//!
//! | Config Value | Provider | Notes |
//! |-------------|----------|-------|
//! | `"disabled"` | [`DisabledProvider`] | every call errors; keyword retrieval only |
//! | `"openai"` | [`OpenAIProvider`] | `POST /v1/embeddings`, needs `OPENAI_API_KEY` |
//! | `"ollama"` | [`OllamaProvider`] | `POST /api/embed` on a local Ollama |
//! | `"local"` | `LocalProvider` | fastembed, offline after the first model download |
//!
//! Vectors are stored as little-endian `f32` BLOBs ([`vec_to_blob`],
//! [`blob_to_vec`]) and compared with [`cosine_similarity`].
//!
//! Remote providers retry transient failures through
//! [`post_json_with_retry`](crate::http::post_json_with_retry).
//!
//! `embedding.token_env` names the variable holding a model-hub token. Its
//! value is exported as [`HUB_TOKEN_VAR`], which the hub client reads when
//! downloading gated models.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::{require_env, EmbeddingConfig};
use crate::http::post_json_with_retry;

/// Turns text into fixed-length vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier stored next to each vector.
    fn model_name(&self) -> &str;
    fn dims(&self) -> usize;

    /// Embed a batch, returning one vector per input in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single query string.
pub async fn embed_query(provider: &dyn EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
    provider
        .embed(&[text.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Empty embedding response"))
}

// ============ Disabled ============

pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled")
    }
}

// ============ OpenAI ============

pub struct OpenAIProvider {
    model: String,
    dims: usize,
    api_key: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = remote_model(config, "OpenAI")?;
        let api_key = require_env("OPENAI_API_KEY", "The 'openai' embedding provider")?;
        Ok(Self {
            model,
            dims,
            api_key,
            client: http_client(config)?,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({ "model": self.model, "input": texts });
        let json = post_json_with_retry(
            &self.client,
            "https://api.openai.com/v1/embeddings",
            Some(&self.api_key),
            &body,
            self.max_retries,
        )
        .await?;
        parse_openai_embeddings(&json)
    }
}

/// Read `data[].embedding`, ordered by each item's `index`.
pub fn parse_openai_embeddings(json: &Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(Value::as_u64)
            .map(|i| i as usize)
            .unwrap_or(position);
        let vector = item
            .get("embedding")
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))
            .and_then(json_to_vector)?;
        indexed.push((index, vector));
    }
    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama ============

pub struct OllamaProvider {
    model: String,
    dims: usize,
    url: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = remote_model(config, "Ollama")?;
        let base = config
            .url
            .as_deref()
            .unwrap_or("http://localhost:11434")
            .trim_end_matches('/');
        Ok(Self {
            model,
            dims,
            url: format!("{}/api/embed", base),
            client: http_client(config)?,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({ "model": self.model, "input": texts });
        let json = post_json_with_retry(&self.client, &self.url, None, &body, self.max_retries)
            .await
            .map_err(|e| anyhow!("Ollama embedding failed (is Ollama running at {}?): {}", self.url, e))?;
        parse_ollama_embeddings(&json)
    }
}

pub fn parse_ollama_embeddings(json: &Value) -> Result<Vec<Vec<f32>>> {
    json.get("embeddings")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?
        .iter()
        .map(json_to_vector)
        .collect()
}

// ============ Local (fastembed) ============

/// In-process embeddings via fastembed.
///
/// The model is loaded on first use and kept for the life of the provider.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalProvider {
    model_name: String,
    dims: usize,
    batch_size: usize,
    model: Arc<std::sync::Mutex<Option<fastembed::TextEmbedding>>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model_name, dims) = resolve_local_model(config);
        // Reject unknown names up front rather than on first embed.
        fastembed_model(&model_name)?;
        Ok(Self {
            model_name,
            dims,
            batch_size: config.batch_size,
            model: Arc::new(std::sync::Mutex::new(None)),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let slot = Arc::clone(&self.model);
        let model_name = self.model_name.clone();
        let batch_size = self.batch_size;
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut guard = slot
                .lock()
                .map_err(|_| anyhow!("Local embedding model lock poisoned"))?;
            if guard.is_none() {
                let options = fastembed::InitOptions::new(fastembed_model(&model_name)?)
                    .with_show_download_progress(false);
                let loaded = fastembed::TextEmbedding::try_new(options).map_err(|e| {
                    anyhow!("Failed to initialize local embedding model: {}", e)
                })?;
                *guard = Some(loaded);
            }
            let model = guard
                .as_mut()
                .ok_or_else(|| anyhow!("Local embedding model not loaded"))?;
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| anyhow!("Local embedding failed: {}", e))
        })
        .await?
    }
}

fn resolve_local_model(config: &EmbeddingConfig) -> (String, usize) {
    let model_name = config
        .model
        .clone()
        .unwrap_or_else(|| "all-minilm-l6-v2".to_string());
    let dims = config.dims.unwrap_or(match model_name.as_str() {
        "bge-base-en-v1.5" | "nomic-embed-text-v1.5" | "multilingual-e5-base" => 768,
        "bge-large-en-v1.5" | "multilingual-e5-large" => 1024,
        _ => 384,
    });
    (model_name, dims)
}

#[cfg(feature = "local-embeddings-fastembed")]
fn fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    use fastembed::EmbeddingModel as M;
    match name {
        "all-minilm-l6-v2" => Ok(M::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(M::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(M::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(M::BGELargeENV15),
        "nomic-embed-text-v1.5" => Ok(M::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(M::MultilingualE5Small),
        "multilingual-e5-base" => Ok(M::MultilingualE5Base),
        "multilingual-e5-large" => Ok(M::MultilingualE5Large),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported: all-minilm-l6-v2, \
             bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, nomic-embed-text-v1.5, \
             multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
            other
        ),
    }
}

// ============ Shared ============

fn remote_model(config: &EmbeddingConfig, label: &str) -> Result<(String, usize)> {
    let model = config
        .model
        .clone()
        .ok_or_else(|| anyhow!("embedding.model required for {} provider", label))?;
    let dims = config
        .dims
        .ok_or_else(|| anyhow!("embedding.dims required for {} provider", label))?;
    Ok((model, dims))
}

fn http_client(config: &EmbeddingConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

fn json_to_vector(value: &Value) -> Result<Vec<f32>> {
    value
        .as_array()
        .ok_or_else(|| anyhow!("embedding is not an array"))?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| anyhow!("embedding contains a non-numeric value"))
        })
        .collect()
}

/// Variable the model-hub client reads its access token from.
pub const HUB_TOKEN_VAR: &str = "HF_TOKEN";

/// Copy the token named by `embedding.token_env` into [`HUB_TOKEN_VAR`].
///
/// Returns the exported token, or `None` when no token variable is
/// configured. Must run before the first local model is loaded.
pub fn export_hub_token(config: &EmbeddingConfig) -> Result<Option<String>> {
    let Some(var) = config.token_env.as_deref() else {
        return Ok(None);
    };
    let token = require_env(var, "embedding.token_env")?;
    if var != HUB_TOKEN_VAR {
        std::env::set_var(HUB_TOKEN_VAR, &token);
    }
    debug!(from = var, to = HUB_TOKEN_VAR, "exported model hub token");
    Ok(Some(token))
}

/// Build the provider named by `config.provider`.
///
/// When `embedding.token_env` is set, that variable must be present; its
/// value is exported for the model-hub client (see [`export_hub_token`]).
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    export_hub_token(config)?;
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Little-endian `f32` bytes, 4 per component.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine of the angle between `a` and `b`. Zero for empty, mismatched or
/// zero-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(d, na, nb), (x, y)| {
            (d + x * y, na + x * x, nb + y * y)
        });
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_blob_layout() {
        let v = vec![1.0f32, -2.5, 3.125];
        let blob = vec_to_blob(&v);
        assert_eq!(blob.len(), 12);
        assert_eq!(&blob[..4], &1.0f32.to_le_bytes());
        assert_eq!(blob_to_vec(&blob), v);
    }

    #[test]
    fn test_cosine() {
        assert!((cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_parse_openai_orders_by_index() {
        let json = json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        });
        let vectors = parse_openai_embeddings(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_parse_openai_missing_data() {
        assert!(parse_openai_embeddings(&json!({"error": "bad key"})).is_err());
    }

    #[test]
    fn test_parse_ollama() {
        let json = json!({"model": "nomic-embed-text", "embeddings": [[0.5, 0.25], [1.0, 2.0]]});
        let vectors = parse_ollama_embeddings(&json).unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[1], vec![1.0, 2.0]);
        assert!(parse_ollama_embeddings(&json!({"embeddings": [["x"]]})).is_err());
    }

    #[tokio::test]
    async fn test_disabled_provider_errors() {
        let provider = create_provider(&EmbeddingConfig::default()).unwrap();
        assert_eq!(provider.model_name(), "disabled");
        assert!(embed_query(provider.as_ref(), "hello").await.is_err());
    }

    #[test]
    fn test_token_env_must_be_present() {
        let config = EmbeddingConfig {
            token_env: Some("MINDFUL_TEST_UNSET_HF_TOKEN".to_string()),
            ..EmbeddingConfig::default()
        };
        let err = create_provider(&config).err().unwrap();
        assert!(err.to_string().contains("MINDFUL_TEST_UNSET_HF_TOKEN"));
    }

    #[test]
    fn test_token_env_is_exported_for_hub_client() {
        std::env::set_var("MINDFUL_TEST_HUB_TOKEN", "hf_test_token");
        let config = EmbeddingConfig {
            token_env: Some("MINDFUL_TEST_HUB_TOKEN".to_string()),
            ..EmbeddingConfig::default()
        };

        create_provider(&config).unwrap();
        assert_eq!(std::env::var(HUB_TOKEN_VAR).unwrap(), "hf_test_token");
        assert_eq!(
            export_hub_token(&config).unwrap().as_deref(),
            Some("hf_test_token")
        );
    }

    #[test]
    fn test_no_token_env_exports_nothing() {
        let config = EmbeddingConfig::default();
        assert_eq!(export_hub_token(&config).unwrap(), None);
    }

    #[test]
    fn test_local_model_dims() {
        let mut config = EmbeddingConfig::default();
        assert_eq!(resolve_local_model(&config), ("all-minilm-l6-v2".to_string(), 384));
        config.model = Some("bge-base-en-v1.5".to_string());
        assert_eq!(resolve_local_model(&config).1, 768);
        config.dims = Some(512);
        assert_eq!(resolve_local_model(&config).1, 512);
    }
}
