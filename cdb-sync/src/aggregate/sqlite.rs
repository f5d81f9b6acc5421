use async_trait::async_trait;
use cdb_common::events::{DomainEvent, DomainMessage, Metadata};
use cdb_common::{AggregateKind, ExternalId};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::{Aggregate, Repository, RepositoryError};

/// Event store for one aggregate kind, backed by the `domain_events` table
#[derive(Clone)]
pub struct SqliteEventStore {
    db: SqlitePool,
    kind: AggregateKind,
}

impl SqliteEventStore {
    pub fn new(db: SqlitePool, kind: AggregateKind) -> Self {
        Self { db, kind }
    }

    fn map_insert_error(&self, err: sqlx::Error, aggregate: &Aggregate) -> RepositoryError {
        let unique_violation = match &err {
            sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
            _ => false,
        };

        if !unique_violation {
            return RepositoryError::Database(err);
        }

        if aggregate.is_new() {
            RepositoryError::AlreadyExists {
                kind: self.kind,
                id: aggregate.id().clone(),
            }
        } else {
            RepositoryError::Conflict {
                kind: self.kind,
                id: aggregate.id().clone(),
                expected_version: aggregate.version(),
            }
        }
    }
}

#[async_trait]
impl Repository for SqliteEventStore {
    fn kind(&self) -> AggregateKind {
        self.kind
    }

    async fn load(&self, id: &ExternalId) -> Result<Aggregate, RepositoryError> {
        let rows: Vec<(String, i64, String, String, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT message_id, playhead, payload, metadata, recorded_on
            FROM domain_events
            WHERE aggregate_kind = ? AND aggregate_id = ?
            ORDER BY playhead
            "#,
        )
        .bind(self.kind.as_str())
        .bind(id.as_str())
        .fetch_all(&self.db)
        .await?;

        if rows.is_empty() {
            return Err(RepositoryError::NotFound {
                kind: self.kind,
                id: id.clone(),
            });
        }

        let mut history = Vec::with_capacity(rows.len());
        for (message_id, playhead, payload, metadata, recorded_on) in rows {
            let message_id = uuid::Uuid::parse_str(&message_id)
                .map_err(|e| RepositoryError::Backend(format!("Stored message id is invalid: {}", e)))?;
            let payload: DomainEvent = serde_json::from_str(&payload)?;
            let metadata: Metadata = serde_json::from_str(&metadata)?;

            history.push(DomainMessage {
                id: message_id,
                aggregate_id: id.clone(),
                aggregate_kind: self.kind,
                playhead,
                metadata,
                payload,
                recorded_on,
            });
        }

        tracing::debug!(kind = %self.kind, id = %id, version = history.len(), "Loaded aggregate");
        Ok(Aggregate::from_history(self.kind, id.clone(), &history))
    }

    async fn save(&self, aggregate: &mut Aggregate) -> Result<(), RepositoryError> {
        if aggregate.uncommitted().is_empty() {
            return Ok(());
        }

        let mut tx = self.db.begin().await?;

        for message in aggregate.uncommitted() {
            // Credentials are per message and must not be persisted
            let mut stored_metadata = message.metadata.clone();
            stored_metadata.credentials = None;

            let result = sqlx::query(
                r#"
                INSERT INTO domain_events
                    (aggregate_kind, aggregate_id, playhead, message_id, event_type, payload, metadata, recorded_on)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(self.kind.as_str())
            .bind(message.aggregate_id.as_str())
            .bind(message.playhead)
            .bind(message.id.to_string())
            .bind(message.event_type())
            .bind(serde_json::to_string(&message.payload)?)
            .bind(serde_json::to_string(&stored_metadata)?)
            .bind(message.recorded_on)
            .execute(&mut *tx)
            .await;

            if let Err(e) = result {
                // Dropping the transaction rolls back the messages inserted so far
                return Err(self.map_insert_error(e, aggregate));
            }
        }

        tx.commit().await?;

        let committed = aggregate.mark_committed();
        tracing::debug!(
            kind = %self.kind,
            id = %aggregate.id(),
            events = committed.len(),
            version = aggregate.version(),
            "Saved aggregate"
        );

        Ok(())
    }

    async fn exists(&self, id: &ExternalId) -> Result<bool, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM domain_events WHERE aggregate_kind = ? AND aggregate_id = ?",
        )
        .bind(self.kind.as_str())
        .bind(id.as_str())
        .fetch_one(&self.db)
        .await?;

        Ok(count > 0)
    }
}
