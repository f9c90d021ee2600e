//! Build and refresh the passage index.
//!
//! The index is a single SQLite file holding:
//!
//! | Table | Contents |
//! |-------|----------|
//! | `sources` | one row per indexed file with its body hash |
//! | `passages` | passage text keyed by `(source_path, passage_index)` |
//! | `passages_fts` | FTS5 mirror of `passages.text` for keyword retrieval |
//! | `passage_vectors` | one embedding BLOB per passage |
//!
//! `mindful index <dir>` walks `dir`, skips files whose body hash has not
//! changed, replaces the passages of everything else, and embeds the new
//! passages when an embedding provider is configured. Embedding failures are
//! counted and reported but never abort the run.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use sqlx::SqlitePool;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::chunk::{content_hash, split_passages};
use crate::config::{Config, IndexConfig};
use crate::db;
use crate::embedding::{create_provider, vec_to_blob, EmbeddingProvider};
use crate::models::Passage;

/// A knowledge file read from disk.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path relative to the indexed directory, `/`-separated.
    pub path: String,
    pub body: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexSummary {
    pub files_scanned: u64,
    pub files_indexed: u64,
    pub files_unchanged: u64,
    pub passages_written: u64,
    pub embeddings_written: u64,
    pub embeddings_failed: u64,
}

/// Create every table the index needs. Safe to run repeatedly.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sources (
            path TEXT PRIMARY KEY,
            hash TEXT NOT NULL,
            indexed_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS passages (
            id TEXT PRIMARY KEY,
            source_path TEXT NOT NULL,
            passage_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            indexed_at INTEGER NOT NULL,
            UNIQUE(source_path, passage_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS passage_vectors (
            passage_id TEXT PRIMARY KEY,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            FOREIGN KEY (passage_id) REFERENCES passages(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='passages_fts'",
    )
    .fetch_one(pool)
    .await?;
    if !fts_exists {
        sqlx::query(
            "CREATE VIRTUAL TABLE passages_fts USING fts5(passage_id UNINDEXED, text)",
        )
        .execute(pool)
        .await?;
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_passages_source ON passages(source_path)")
        .execute(pool)
        .await?;

    Ok(())
}

/// `mindful init`
pub async fn run_init(config: &Config) -> Result<()> {
    let pool = db::connect(&config.index.path).await?;
    init_schema(&pool).await?;
    pool.close().await;
    println!("Index initialized at {}", config.index.path.display());
    Ok(())
}

/// `mindful index <dir> [--full]`
pub async fn run_index(config: &Config, dir: &Path, full: bool) -> Result<IndexSummary> {
    let files = scan_directory(dir, &config.index)?;
    let provider = if config.embedding.is_enabled() {
        Some(create_provider(&config.embedding)?)
    } else {
        None
    };

    let pool = db::connect(&config.index.path).await?;
    init_schema(&pool).await?;

    let mut summary = IndexSummary {
        files_scanned: files.len() as u64,
        ..IndexSummary::default()
    };

    for file in &files {
        let hash = content_hash(&file.body);
        if !full && stored_hash(&pool, &file.path).await?.as_deref() == Some(hash.as_str()) {
            debug!(path = %file.path, "unchanged, skipping");
            summary.files_unchanged += 1;
            continue;
        }

        let passages = split_passages(&file.path, &file.body, &config.chunking);
        replace_passages(&pool, &file.path, &hash, &passages).await?;
        summary.files_indexed += 1;
        summary.passages_written += passages.len() as u64;

        if let Some(provider) = provider.as_deref() {
            let (written, failed) =
                embed_passages(&pool, provider, &passages, config.embedding.batch_size).await;
            summary.embeddings_written += written;
            summary.embeddings_failed += failed;
        }
        debug!(path = %file.path, passages = passages.len(), "indexed");
    }

    pool.close().await;

    println!("index {}", dir.display());
    println!("  files scanned: {}", summary.files_scanned);
    println!("  files indexed: {}", summary.files_indexed);
    println!("  files unchanged: {}", summary.files_unchanged);
    println!("  passages written: {}", summary.passages_written);
    if provider.is_some() {
        println!("  embeddings written: {}", summary.embeddings_written);
        println!("  embeddings failed: {}", summary.embeddings_failed);
    }
    println!("ok");

    Ok(summary)
}

/// Walk `root` and read every file the include/exclude globs admit, sorted
/// by relative path. Files that are not valid UTF-8 are skipped.
pub fn scan_directory(root: &Path, settings: &IndexConfig) -> Result<Vec<SourceFile>> {
    if !root.is_dir() {
        bail!("Knowledge directory does not exist: {}", root.display());
    }

    let include = build_globset(&settings.include_globs)?;
    let mut excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    excludes.extend(settings.exclude_globs.iter().cloned());
    let exclude = build_globset(&excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(settings.follow_symlinks) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let rel = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if exclude.is_match(&rel) || !include.is_match(&rel) {
            continue;
        }

        match std::fs::read_to_string(entry.path()) {
            Ok(body) => files.push(SourceFile { path: rel, body }),
            Err(e) => warn!(path = %rel, error = %e, "skipping unreadable file"),
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

async fn stored_hash(pool: &SqlitePool, path: &str) -> Result<Option<String>> {
    Ok(sqlx::query_scalar("SELECT hash FROM sources WHERE path = ?")
        .bind(path)
        .fetch_optional(pool)
        .await?)
}

async fn replace_passages(
    pool: &SqlitePool,
    source_path: &str,
    source_hash: &str,
    passages: &[Passage],
) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    let mut tx = pool.begin().await?;

    sqlx::query(
        "DELETE FROM passage_vectors WHERE passage_id IN (SELECT id FROM passages WHERE source_path = ?)",
    )
    .bind(source_path)
    .execute(&mut *tx)
    .await?;
    sqlx::query(
        "DELETE FROM passages_fts WHERE passage_id IN (SELECT id FROM passages WHERE source_path = ?)",
    )
    .bind(source_path)
    .execute(&mut *tx)
    .await?;
    sqlx::query("DELETE FROM passages WHERE source_path = ?")
        .bind(source_path)
        .execute(&mut *tx)
        .await?;

    for passage in passages {
        sqlx::query(
            "INSERT INTO passages (id, source_path, passage_index, text, hash, indexed_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&passage.id)
        .bind(&passage.source_path)
        .bind(passage.passage_index)
        .bind(&passage.text)
        .bind(&passage.hash)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO passages_fts (passage_id, text) VALUES (?, ?)")
            .bind(&passage.id)
            .bind(&passage.text)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query(
        r#"
        INSERT INTO sources (path, hash, indexed_at) VALUES (?, ?, ?)
        ON CONFLICT(path) DO UPDATE SET hash = excluded.hash, indexed_at = excluded.indexed_at
        "#,
    )
    .bind(source_path)
    .bind(source_hash)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Returns `(written, failed)`.
async fn embed_passages(
    pool: &SqlitePool,
    provider: &dyn EmbeddingProvider,
    passages: &[Passage],
    batch_size: usize,
) -> (u64, u64) {
    let mut written = 0u64;
    let mut failed = 0u64;

    for batch in passages.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|p| p.text.clone()).collect();
        let vectors = match provider.embed(&texts).await {
            Ok(v) if v.len() == batch.len() => v,
            Ok(v) => {
                warn!(expected = batch.len(), got = v.len(), "embedding count mismatch");
                failed += batch.len() as u64;
                continue;
            }
            Err(e) => {
                warn!(error = %e, "embedding batch failed");
                failed += batch.len() as u64;
                continue;
            }
        };

        for (passage, vector) in batch.iter().zip(vectors) {
            let result = sqlx::query(
                r#"
                INSERT INTO passage_vectors (passage_id, model, dims, embedding) VALUES (?, ?, ?, ?)
                ON CONFLICT(passage_id) DO UPDATE SET
                    model = excluded.model, dims = excluded.dims, embedding = excluded.embedding
                "#,
            )
            .bind(&passage.id)
            .bind(provider.model_name())
            .bind(vector.len() as i64)
            .bind(vec_to_blob(&vector))
            .execute(pool)
            .await;
            match result {
                Ok(_) => written += 1,
                Err(e) => {
                    warn!(passage = %passage.id, error = %e, "failed to store embedding");
                    failed += 1;
                }
            }
        }
    }

    (written, failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, body: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[test]
    fn test_scan_applies_globs_and_default_excludes() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "coping/breathing.md", "Box breathing.");
        write(tmp.path(), "notes.txt", "Journal daily.");
        write(tmp.path(), "image.png", "not text");
        write(tmp.path(), "node_modules/pkg/readme.md", "ignored");
        write(tmp.path(), "drafts/wip.md", "draft");

        let settings = IndexConfig {
            exclude_globs: vec!["drafts/**".to_string()],
            ..IndexConfig::default()
        };
        let files = scan_directory(tmp.path(), &settings).unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["coping/breathing.md", "notes.txt"]);
        assert_eq!(files[0].body, "Box breathing.");
    }

    #[test]
    fn test_scan_missing_dir() {
        let err = scan_directory(Path::new("/definitely/not/here"), &IndexConfig::default())
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[tokio::test]
    async fn test_index_is_incremental() {
        let tmp = TempDir::new().unwrap();
        let kb = tmp.path().join("kb");
        write(&kb, "a.md", "Grounding: name five things you can see.");
        write(&kb, "b.md", "Sleep: keep a regular bedtime.");

        let mut config = Config::minimal();
        config.retrieval.mode = "keyword".to_string();
        config.index.path = tmp.path().join("index.sqlite");

        let first = run_index(&config, &kb, false).await.unwrap();
        assert_eq!(first.files_scanned, 2);
        assert_eq!(first.files_indexed, 2);
        assert_eq!(first.passages_written, 2);

        let second = run_index(&config, &kb, false).await.unwrap();
        assert_eq!(second.files_indexed, 0);
        assert_eq!(second.files_unchanged, 2);

        write(&kb, "b.md", "Sleep: avoid screens an hour before bed.");
        let third = run_index(&config, &kb, false).await.unwrap();
        assert_eq!(third.files_indexed, 1);
        assert_eq!(third.files_unchanged, 1);

        let full = run_index(&config, &kb, true).await.unwrap();
        assert_eq!(full.files_indexed, 2);

        let pool = db::connect(&config.index.path).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM passages")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 2);
        let fts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM passages_fts")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(fts, 2);
        let body: String =
            sqlx::query_scalar("SELECT text FROM passages WHERE source_path = 'b.md'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert!(body.contains("screens"));
    }

    #[tokio::test]
    async fn test_init_schema_idempotent() {
        let tmp = TempDir::new().unwrap();
        let pool = db::connect(&tmp.path().join("i.sqlite")).await.unwrap();
        init_schema(&pool).await.unwrap();
        init_schema(&pool).await.unwrap();
    }
}
