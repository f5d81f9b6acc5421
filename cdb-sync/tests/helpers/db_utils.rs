//! Database Test Utilities

use anyhow::Result;
use cdb_common::{AggregateKind, ExternalId};
use sqlx::SqlitePool;
use tempfile::TempDir;

/// Create temporary test database with tables created
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test_bridge.db");
    let pool = cdb_sync::db::init_database_pool(&db_path).await?;
    Ok((temp_dir, pool))
}

/// Number of persisted events of one aggregate stream
pub async fn count_events(pool: &SqlitePool, kind: AggregateKind, id: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM domain_events WHERE aggregate_kind = ? AND aggregate_id = ?")
        .bind(kind.as_str())
        .bind(id)
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Event types of one aggregate stream, in playhead order
pub async fn event_types(pool: &SqlitePool, kind: AggregateKind, id: &ExternalId) -> Vec<String> {
    sqlx::query_scalar(
        "SELECT event_type FROM domain_events WHERE aggregate_kind = ? AND aggregate_id = ? ORDER BY playhead",
    )
    .bind(kind.as_str())
    .bind(id.as_str())
    .fetch_all(pool)
    .await
    .unwrap()
}

/// Get all table names in database
pub async fn get_table_names(pool: &SqlitePool) -> Result<Vec<String>> {
    let tables = sqlx::query_scalar::<_, String>(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(pool)
    .await?;
    Ok(tables)
}
