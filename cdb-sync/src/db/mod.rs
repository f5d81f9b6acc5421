//! SQLite database for the aggregate store, media objects and labels

use cdb_common::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

const BUSY_TIMEOUT_MS: u64 = 250;

/// Open (creating if needed) the database file and its tables
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePoolOptions::new()
        .connect_with(
            SqliteConnectOptions::from_str(&db_url)?
                .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))
                .journal_mode(SqliteJournalMode::Wal)
                .create_if_missing(true),
        )
        .await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database
///
/// Every pooled `:memory:` connection would see its own empty database, so
/// the pool is capped at one connection.
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
        .await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create bridge tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    // One row per domain message; the primary key is the optimistic
    // concurrency guard
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS domain_events (
            aggregate_kind TEXT NOT NULL,
            aggregate_id TEXT NOT NULL,
            playhead INTEGER NOT NULL,
            message_id TEXT NOT NULL,
            event_type TEXT NOT NULL,
            payload TEXT NOT NULL,
            metadata TEXT NOT NULL,
            recorded_on TEXT NOT NULL,
            PRIMARY KEY (aggregate_kind, aggregate_id, playhead)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS media_objects (
            id TEXT PRIMARY KEY,
            mime_type TEXT NOT NULL,
            description TEXT NOT NULL,
            copyright_holder TEXT NOT NULL,
            source_location TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS labels (
            name_folded TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            visible INTEGER NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
