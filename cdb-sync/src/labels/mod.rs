//! Label/keyword synchronization
//!
//! Legacy keywords become the complete label set of the local aggregate.
//! Each sync is a full replacement: a keyword dropped in the legacy system
//! disappears locally too. Importers run the sync right after each save.

use async_trait::async_trait;
use cdb_common::events::Metadata;
use cdb_common::{AggregateKind, ExternalId, Label, LabelSet};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::aggregate::Repository;
use crate::import::{save_with_retry, RetryPolicy, SaveError};
use crate::legacy::Keyword;

#[derive(Debug, Error)]
pub enum LabelError {
    #[error("Label registry error: {0}")]
    Registry(#[from] sqlx::Error),

    #[error(transparent)]
    Save(#[from] SaveError),

    #[error("No repository for {0} aggregates")]
    UnknownKind(AggregateKind),
}

/// Command replacing the labels of one aggregate
#[derive(Debug, Clone, PartialEq)]
pub struct SyncLabels {
    pub kind: AggregateKind,
    pub id: ExternalId,
    pub labels: LabelSet,
}

/// Catalogue of known label names
#[async_trait]
pub trait LabelRegistry: Send + Sync {
    /// Register `name` unless a label with the same name (any case) exists.
    /// Returns true when registered.
    async fn create_label_if_new(&self, name: &str, visible: bool) -> Result<bool, LabelError>;
}

#[async_trait]
pub trait CommandBus: Send + Sync {
    async fn dispatch(&self, command: SyncLabels) -> Result<(), LabelError>;
}

pub struct SqliteLabelRegistry {
    db: SqlitePool,
}

impl SqliteLabelRegistry {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LabelRegistry for SqliteLabelRegistry {
    async fn create_label_if_new(&self, name: &str, visible: bool) -> Result<bool, LabelError> {
        let label = Label::new(name, visible);
        let result = sqlx::query(
            "INSERT INTO labels (name_folded, name, visible) VALUES (?, ?, ?) ON CONFLICT(name_folded) DO NOTHING",
        )
        .bind(label.folded_name())
        .bind(label.name())
        .bind(label.is_visible())
        .execute(&self.db)
        .await?;

        let created = result.rows_affected() > 0;
        if created {
            tracing::info!(label = %label, visible, "Registered new label");
        }
        Ok(created)
    }
}

/// Applies [`SyncLabels`] commands to aggregates through the save loop
pub struct RepositoryCommandBus {
    repositories: HashMap<AggregateKind, Arc<dyn Repository>>,
    policy: RetryPolicy,
}

impl RepositoryCommandBus {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            repositories: HashMap::new(),
            policy,
        }
    }

    pub fn with_repository(mut self, repository: Arc<dyn Repository>) -> Self {
        self.repositories.insert(repository.kind(), repository);
        self
    }
}

#[async_trait]
impl CommandBus for RepositoryCommandBus {
    async fn dispatch(&self, command: SyncLabels) -> Result<(), LabelError> {
        let repository = self
            .repositories
            .get(&command.kind)
            .ok_or(LabelError::UnknownKind(command.kind))?;

        let aggregate = repository.load(&command.id).await.map_err(SaveError::from)?;
        let labels = command.labels;

        save_with_retry(
            repository.as_ref(),
            aggregate,
            |aggregate| {
                aggregate.sync_labels(labels.clone(), Metadata::new());
            },
            &self.policy,
        )
        .await?;

        Ok(())
    }
}

pub struct LabelSynchronizer {
    registry: Arc<dyn LabelRegistry>,
    commands: Arc<dyn CommandBus>,
}

impl LabelSynchronizer {
    pub fn new(registry: Arc<dyn LabelRegistry>, commands: Arc<dyn CommandBus>) -> Self {
        Self { registry, commands }
    }

    /// Replace the labels of aggregate `id` with `keywords`
    pub async fn sync_labels(
        &self,
        id: &ExternalId,
        kind: AggregateKind,
        keywords: &[Keyword],
    ) -> Result<SyncLabels, LabelError> {
        let labels: LabelSet = keywords
            .iter()
            .map(|keyword| Label::new(keyword.value.clone(), keyword.visible))
            .collect();

        for label in labels.iter() {
            self.registry
                .create_label_if_new(label.name(), label.is_visible())
                .await?;
        }

        let command = SyncLabels {
            kind,
            id: id.clone(),
            labels,
        };

        tracing::debug!(kind = %kind, id = %id, labels = ?command.labels.names(), "Syncing labels");
        self.commands.dispatch(command.clone()).await?;
        Ok(command)
    }
}
