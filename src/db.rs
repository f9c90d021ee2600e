//! SQLite connection pools for the passage index.
//!
//! The indexer opens the database read-write ([`connect`]), creating the file
//! and its parent directory if needed, in WAL mode. The chat services open it
//! read-only ([`connect_read_only`]) and refuse to start without one.

use anyhow::{bail, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Open the passage index for writing, creating the file and its parent
/// directory if needed.
pub async fn connect(path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Open an existing index read-only. The chat services never write to it.
pub async fn connect_read_only(path: &Path) -> Result<SqlitePool> {
    if !path.exists() {
        bail!(
            "Passage index not found at {}. Run `mindful index <dir>` first.",
            path.display()
        );
    }

    let options =
        SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?.read_only(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}
