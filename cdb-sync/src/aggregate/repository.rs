use async_trait::async_trait;
use cdb_common::{AggregateKind, ExternalId};
use thiserror::Error;

use super::Aggregate;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{kind} {id} not found")]
    NotFound { kind: AggregateKind, id: ExternalId },

    /// A new aggregate was saved under an id that is already taken
    #[error("{kind} {id} already exists")]
    AlreadyExists { kind: AggregateKind, id: ExternalId },

    /// Another writer saved the aggregate since it was loaded
    #[error("{kind} {id} was modified concurrently (expected version {expected_version})")]
    Conflict {
        kind: AggregateKind,
        id: ExternalId,
        expected_version: i64,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failure in a wrapping repository (for instance an on-demand import)
    #[error("{0}")]
    Backend(String),
}

impl RepositoryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, RepositoryError::Conflict { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, RepositoryError::AlreadyExists { .. })
    }
}

/// Store of one aggregate kind
#[async_trait]
pub trait Repository: Send + Sync {
    fn kind(&self) -> AggregateKind;

    async fn load(&self, id: &ExternalId) -> Result<Aggregate, RepositoryError>;

    /// Persist the uncommitted messages of `aggregate`
    ///
    /// Fails with `AlreadyExists` for a new aggregate whose id is taken and
    /// with `Conflict` when the stored version moved since load.
    async fn save(&self, aggregate: &mut Aggregate) -> Result<(), RepositoryError>;

    async fn exists(&self, id: &ExternalId) -> Result<bool, RepositoryError>;
}
