//! cdb-sync library interface
//!
//! Bridges a legacy XML system of record and local event-sourced aggregates:
//! legacy notifications are imported into aggregates (with create/update
//! reconciliation, media and label synchronization) and local changes are
//! written back to the legacy system.

pub mod aggregate;
pub mod api;
pub mod db;
pub mod error;
pub mod import;
pub mod labels;
pub mod legacy;
pub mod media;
pub mod sync_back;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use cdb_common::config::BridgeConfig;
use cdb_common::events::EventBus;
use cdb_common::{AggregateKind, ConsumerCredentials, RecordKind};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;

use crate::aggregate::{Repository, SqliteEventStore};
use crate::import::{DependencyImporter, ReconciliationImporter, RetryPolicy};
use crate::labels::{LabelSynchronizer, RepositoryCommandBus, SqliteLabelRegistry};
use crate::legacy::RecordFetcher;
use crate::media::{MediaImporter, SqliteMediaStore};
use crate::sync_back::{LegacyClientFactory, SyncBackMode, SyncBackRepository, SyncBackStats};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    pub event_importer: Arc<ReconciliationImporter>,
    pub place_importer: Arc<ReconciliationImporter>,
    pub organizer_importer: Arc<ReconciliationImporter>,
    pub sync_back_mode: SyncBackMode,
    pub sync_back_stats: Arc<Vec<(AggregateKind, Arc<SyncBackStats>)>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Importers a notification about a `kind` record is dispatched to, in order
    pub fn importers_for(&self, kind: RecordKind) -> Vec<Arc<ReconciliationImporter>> {
        match kind {
            RecordKind::Event => vec![Arc::clone(&self.event_importer)],
            RecordKind::Actor => vec![
                Arc::clone(&self.place_importer),
                Arc::clone(&self.organizer_importer),
            ],
        }
    }
}

/// Fully wired bridge components
pub struct Bridge {
    pub state: AppState,
    /// Sync-back wrapped repositories for local writes, by aggregate kind
    pub repositories: HashMap<AggregateKind, Arc<dyn Repository>>,
}

impl Bridge {
    /// Wire importers, repositories and the label synchronizer on `db`
    ///
    /// Importers and the label synchronizer write through the plain stores:
    /// what they record came from the legacy system and is never written back.
    pub fn assemble(
        config: &BridgeConfig,
        db: SqlitePool,
        fetcher: Arc<dyn RecordFetcher>,
        client_factory: Arc<dyn LegacyClientFactory>,
        event_bus: EventBus,
    ) -> cdb_common::Result<Self> {
        let policy = RetryPolicy::from_config(&config.import);
        let media = Arc::new(
            MediaImporter::new(Arc::new(SqliteMediaStore::new(db.clone())), &config.media)
                .map_err(|e| cdb_common::Error::Config(e.to_string()))?,
        );

        let store = |kind| Arc::new(SqliteEventStore::new(db.clone(), kind)) as Arc<dyn Repository>;
        let (event_store, place_store, organizer_store) = (
            store(AggregateKind::Event),
            store(AggregateKind::Place),
            store(AggregateKind::Organizer),
        );

        let commands = RepositoryCommandBus::new(policy)
            .with_repository(Arc::clone(&event_store))
            .with_repository(Arc::clone(&place_store))
            .with_repository(Arc::clone(&organizer_store));
        let labels = Arc::new(LabelSynchronizer::new(
            Arc::new(SqliteLabelRegistry::new(db.clone())),
            Arc::new(commands),
        ));

        let place_importer = Arc::new(
            ReconciliationImporter::for_places(place_store, Arc::clone(&fetcher), event_bus.clone())
                .with_media_importer(Arc::clone(&media))
                .with_label_synchronizer(Arc::clone(&labels))
                .with_retry_policy(policy),
        );
        let organizer_importer = Arc::new(
            ReconciliationImporter::for_organizers(
                organizer_store,
                Arc::clone(&fetcher),
                event_bus.clone(),
            )
            .with_media_importer(Arc::clone(&media))
            .with_label_synchronizer(Arc::clone(&labels))
            .with_retry_policy(policy),
        );
        let event_importer = Arc::new(
            ReconciliationImporter::for_events(event_store, Arc::clone(&fetcher), event_bus.clone())
                .with_location_importer(Arc::clone(&place_importer) as Arc<dyn DependencyImporter>)
                .with_organizer_importer(Arc::clone(&organizer_importer) as Arc<dyn DependencyImporter>)
                .with_media_importer(Arc::clone(&media))
                .with_label_synchronizer(labels)
                .with_retry_policy(policy),
        );

        let mode = SyncBackMode::from(config.sync_back.enabled);
        let consumer = match (&config.legacy.consumer_key, &config.legacy.consumer_secret) {
            (Some(key), Some(secret)) => Some(ConsumerCredentials::new(key.as_str(), secret.as_str())),
            _ => None,
        };

        let mut repositories = HashMap::new();
        let mut sync_back_stats = Vec::new();
        for importer in [&event_importer, &place_importer, &organizer_importer] {
            let kind = importer.kind();
            let repository = SyncBackRepository::new(SqliteEventStore::new(db.clone(), kind), Arc::clone(&client_factory))
                .with_mode(mode)
                .with_consumer(consumer.clone())
                .with_importer(Arc::clone(importer))
                .with_event_bus(event_bus.clone());

            sync_back_stats.push((kind, repository.stats()));
            repositories.insert(kind, Arc::new(repository) as Arc<dyn Repository>);
        }

        tracing::info!(sync_back = ?mode, "Bridge components wired");

        Ok(Self {
            state: AppState {
                event_bus,
                event_importer,
                place_importer,
                organizer_importer,
                sync_back_mode: mode,
                sync_back_stats: Arc::new(sync_back_stats),
                startup_time: Utc::now(),
            },
            repositories,
        })
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::notification_routes())
        .route("/events", get(api::bridge_event_stream))
        .merge(api::health_routes())
        .with_state(state)
}
