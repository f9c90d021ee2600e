//! Fetch the passages most relevant to a query.
//!
//! [`SqliteRetriever`] serves from the index written by `mindful index`, in
//! one of two modes:
//!
//! - **vector**: embed the query and rank stored vectors by cosine
//!   similarity. Only vectors produced by the configured model are compared.
//! - **keyword**: FTS5 `MATCH` over passage text, ranked by BM25.
//!
//! [`InMemoryRetriever`] ranks a fixed list of passages by word overlap. It
//! backs tests and small embedded knowledge sets.
//!
//! Blank queries return no documents without touching the index.

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::config::Config;
use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, create_provider, embed_query, EmbeddingProvider};
use crate::models::RetrievedDocument;

#[async_trait]
pub trait Retriever: Send + Sync {
    /// At most `top_k` documents, most relevant first. An empty result is
    /// not an error.
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedDocument>>;
}

enum Mode {
    Vector(Arc<dyn EmbeddingProvider>),
    Keyword,
}

pub struct SqliteRetriever {
    pool: SqlitePool,
    mode: Mode,
}

impl SqliteRetriever {
    /// Open the index read-only in the configured retrieval mode.
    pub async fn open(config: &Config) -> Result<Self> {
        let mode = match config.retrieval.mode.as_str() {
            "vector" => Mode::Vector(create_provider(&config.embedding)?),
            "keyword" => Mode::Keyword,
            other => bail!("Unknown retrieval mode: {}", other),
        };
        let pool = db::connect_read_only(&config.index.path).await?;
        Ok(Self { pool, mode })
    }

    pub fn from_parts(pool: SqlitePool, provider: Option<Arc<dyn EmbeddingProvider>>) -> Self {
        let mode = match provider {
            Some(p) => Mode::Vector(p),
            None => Mode::Keyword,
        };
        Self { pool, mode }
    }

    async fn keyword(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedDocument>> {
        let Some(fts_query) = fts_query(query) else {
            return Ok(Vec::new());
        };
        let rows = sqlx::query(
            r#"
            SELECT passages.text, passages.source_path
            FROM passages_fts
            JOIN passages ON passages.id = passages_fts.passage_id
            WHERE passages_fts MATCH ?
            ORDER BY passages_fts.rank
            LIMIT ?
            "#,
        )
        .bind(&fts_query)
        .bind(top_k as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| RetrievedDocument {
                content: row.get("text"),
                source: Some(row.get("source_path")),
            })
            .collect())
    }

    async fn vector(
        &self,
        provider: &dyn EmbeddingProvider,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedDocument>> {
        let query_vec = embed_query(provider, query).await?;
        let rows = sqlx::query(
            r#"
            SELECT p.text, p.source_path, v.embedding
            FROM passage_vectors v
            JOIN passages p ON p.id = v.passage_id
            WHERE v.model = ?
            "#,
        )
        .bind(provider.model_name())
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<(f32, RetrievedDocument)> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let score = cosine_similarity(&query_vec, &blob_to_vec(&blob));
                let doc = RetrievedDocument {
                    content: row.get("text"),
                    source: Some(row.get("source_path")),
                };
                (score, doc)
            })
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(top_k);

        Ok(scored.into_iter().map(|(_, doc)| doc).collect())
    }
}

#[async_trait]
impl Retriever for SqliteRetriever {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedDocument>> {
        if query.trim().is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        let docs = match &self.mode {
            Mode::Vector(provider) => self.vector(provider.as_ref(), query, top_k).await?,
            Mode::Keyword => self.keyword(query, top_k).await?,
        };
        debug!(found = docs.len(), top_k, "retrieved passages");
        Ok(docs)
    }
}

/// Build an FTS5 query that ORs the query's words together.
///
/// Every term is quoted, so operators and punctuation in user input cannot
/// produce a syntax error. Returns `None` when no word survives.
pub fn fts_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t.to_lowercase()))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

/// Ranks a fixed set of passages by how many distinct query words each
/// contains. Ties keep insertion order; passages sharing no word are dropped.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRetriever {
    documents: Vec<RetrievedDocument>,
}

impl InMemoryRetriever {
    pub fn new(documents: Vec<RetrievedDocument>) -> Self {
        Self { documents }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

fn words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl Retriever for InMemoryRetriever {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedDocument>> {
        let wanted = words(query);
        if wanted.is_empty() {
            return Ok(Vec::new());
        }
        let mut scored: Vec<(usize, &RetrievedDocument)> = self
            .documents
            .iter()
            .map(|doc| (words(&doc.content).intersection(&wanted).count(), doc))
            .filter(|(hits, _)| *hits > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(_, doc)| doc.clone())
            .collect())
    }
}
