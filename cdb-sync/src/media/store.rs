//! Media object store

use async_trait::async_trait;
use cdb_common::events::MediaAsset;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::MediaError;

/// Registry of media objects, idempotent on id
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Register `asset`; returns false when the id was already known
    async fn create(&self, asset: &MediaAsset) -> Result<bool, MediaError>;

    async fn get(&self, id: Uuid) -> Result<Option<MediaAsset>, MediaError>;
}

pub struct SqliteMediaStore {
    db: SqlitePool,
}

impl SqliteMediaStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MediaStore for SqliteMediaStore {
    async fn create(&self, asset: &MediaAsset) -> Result<bool, MediaError> {
        let result = sqlx::query(
            r#"
            INSERT INTO media_objects (id, mime_type, description, copyright_holder, source_location)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(asset.id.to_string())
        .bind(&asset.mime_type)
        .bind(&asset.description)
        .bind(&asset.copyright_holder)
        .bind(&asset.source_location)
        .execute(&self.db)
        .await?;

        let created = result.rows_affected() > 0;
        if created {
            tracing::debug!(media_id = %asset.id, source = %asset.source_location, "Registered media object");
        }
        Ok(created)
    }

    async fn get(&self, id: Uuid) -> Result<Option<MediaAsset>, MediaError> {
        let row: Option<(String, String, String, String)> = sqlx::query_as(
            "SELECT mime_type, description, copyright_holder, source_location FROM media_objects WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|(mime_type, description, copyright_holder, source_location)| MediaAsset {
            id,
            mime_type,
            description,
            copyright_holder,
            source_location,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(id: Uuid, description: &str) -> MediaAsset {
        MediaAsset {
            id,
            mime_type: "image/jpeg".to_string(),
            description: description.to_string(),
            copyright_holder: "Someone".to_string(),
            source_location: "http://example.com/a.jpg".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_is_idempotent_on_id() {
        let pool = crate::db::init_memory_pool().await.unwrap();
        let store = SqliteMediaStore::new(pool);
        let id = Uuid::new_v4();

        assert!(store.create(&asset(id, "first")).await.unwrap());
        assert!(!store.create(&asset(id, "second")).await.unwrap());

        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.description, "first");
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }
}
