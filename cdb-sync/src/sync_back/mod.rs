//! Write-through sync-back
//!
//! [`SyncBackRepository`] wraps a local repository. When enabled, every local
//! change is replayed against the legacy write API before the local save,
//! so both systems see it. A failed write-back is logged, counted and
//! published; it never fails the local save (the stores drift instead).

pub mod calls;
pub mod client;
pub mod decorator;

pub use calls::{call_for, with_cdbid_attribute, LegacyWriteCall, WriteAction};
pub use client::{
    HttpLegacyClientFactory, HttpLegacyWriteApi, LegacyClientFactory, LegacyWriteApi, ResolvedCredentials,
};
pub use decorator::{EventStreamDecorator, MetadataEnricher};

use async_trait::async_trait;
use cdb_common::events::{BridgeEvent, ChangeKind, DomainMessage, EventBus};
use cdb_common::{AggregateKind, ConsumerCredentials, ExternalId};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::aggregate::{Aggregate, Repository, RepositoryError};
use crate::import::{ImportOutcome, ReconciliationImporter};

#[derive(Debug, Error)]
pub enum SyncBackError {
    /// Configuration problem; retrying cannot help
    #[error("Missing credentials: {0}")]
    MissingCredentials(&'static str),

    #[error("Remote call failed: {0}")]
    RemoteCall(String),

    #[error("Legacy system rejected the call (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid document: {0}")]
    InvalidDocument(String),
}

/// Whether local changes are written back, fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncBackMode {
    Enabled,
    Disabled,
}

impl From<bool> for SyncBackMode {
    fn from(enabled: bool) -> Self {
        if enabled {
            SyncBackMode::Enabled
        } else {
            SyncBackMode::Disabled
        }
    }
}

/// Write-back counters
#[derive(Debug, Default)]
pub struct SyncBackStats {
    attempted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncBackStatsSnapshot {
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl SyncBackStats {
    pub fn snapshot(&self) -> SyncBackStatsSnapshot {
        SyncBackStatsSnapshot {
            attempted: self.attempted.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

pub struct SyncBackRepository<R: Repository> {
    inner: R,
    mode: SyncBackMode,
    factory: Arc<dyn LegacyClientFactory>,
    consumer: Option<ConsumerCredentials>,
    decorators: Vec<Box<dyn EventStreamDecorator>>,
    importer: Option<Arc<ReconciliationImporter>>,
    event_bus: Option<EventBus>,
    stats: Arc<SyncBackStats>,
}

impl<R: Repository> SyncBackRepository<R> {
    /// Disabled until [`with_mode`](Self::with_mode) says otherwise
    pub fn new(inner: R, factory: Arc<dyn LegacyClientFactory>) -> Self {
        Self {
            inner,
            mode: SyncBackMode::Disabled,
            factory,
            consumer: None,
            decorators: Vec::new(),
            importer: None,
            event_bus: None,
            stats: Arc::new(SyncBackStats::default()),
        }
    }

    pub fn with_mode(mut self, mode: SyncBackMode) -> Self {
        self.mode = mode;
        self
    }

    /// Application credentials used when a message carries none
    pub fn with_consumer(mut self, consumer: Option<ConsumerCredentials>) -> Self {
        self.consumer = consumer;
        self
    }

    pub fn with_decorator(mut self, decorator: impl EventStreamDecorator + 'static) -> Self {
        self.decorators.push(Box::new(decorator));
        self
    }

    /// Import aggregates the local store does not have yet on load
    pub fn with_importer(mut self, importer: Arc<ReconciliationImporter>) -> Self {
        self.importer = Some(importer);
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn mode(&self) -> SyncBackMode {
        self.mode
    }

    pub fn stats(&self) -> Arc<SyncBackStats> {
        Arc::clone(&self.stats)
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    async fn write_back(&self, aggregate: &Aggregate) {
        // Snapshot: the wrapped save clears the uncommitted messages
        let mut stream: Vec<DomainMessage> = aggregate.uncommitted().to_vec();
        for decorator in &self.decorators {
            stream = decorator.decorate_for_write(aggregate.kind(), aggregate.id(), stream);
        }

        for message in &stream {
            self.handle(message).await;
        }
    }

    async fn handle(&self, message: &DomainMessage) {
        let call = match call_for(message) {
            Ok(Some(call)) => call,
            Ok(None) => {
                tracing::debug!(
                    id = %message.aggregate_id,
                    event_type = message.event_type(),
                    "Event not written back"
                );
                return;
            }
            Err(e) => {
                self.stats.attempted.fetch_add(1, Ordering::Relaxed);
                self.record_failure(message, &e);
                return;
            }
        };

        self.stats.attempted.fetch_add(1, Ordering::Relaxed);

        let result = match ResolvedCredentials::resolve(message.metadata.credentials.as_ref(), self.consumer.as_ref()) {
            Ok(credentials) => self.factory.client_for(&credentials).send(&call).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                self.stats.succeeded.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    id = %message.aggregate_id,
                    event_type = message.event_type(),
                    action = call.action.name(),
                    "Wrote change back to legacy system"
                );
            }
            Err(e) => self.record_failure(message, &e),
        }
    }

    fn record_failure(&self, message: &DomainMessage, error: &SyncBackError) {
        self.stats.failed.fetch_add(1, Ordering::Relaxed);
        tracing::error!(
            id = %message.aggregate_id,
            event_type = message.event_type(),
            error = %error,
            "Sync-back failed, legacy system and local store have drifted"
        );

        if let Some(bus) = &self.event_bus {
            bus.emit_lossy(BridgeEvent::SyncBackFailed {
                id: message.aggregate_id.clone(),
                event_type: message.event_type().to_string(),
                error: error.to_string(),
                timestamp: chrono::Utc::now(),
            });
        }
    }
}

#[async_trait]
impl<R: Repository> Repository for SyncBackRepository<R> {
    fn kind(&self) -> AggregateKind {
        self.inner.kind()
    }

    async fn load(&self, id: &ExternalId) -> Result<Aggregate, RepositoryError> {
        match self.inner.load(id).await {
            Err(RepositoryError::NotFound { kind, id: missing }) => {
                let Some(importer) = &self.importer else {
                    return Err(RepositoryError::NotFound { kind, id: missing });
                };

                tracing::info!(kind = %kind, id = %missing, "Aggregate missing locally, importing from legacy system");
                let outcome = importer
                    .import(&missing, ChangeKind::Created)
                    .await
                    .map_err(|e| RepositoryError::Backend(e.to_string()))?;

                if outcome == ImportOutcome::Rejected {
                    return Err(RepositoryError::NotFound { kind, id: missing });
                }
                self.inner.load(&missing).await
            }
            other => other,
        }
    }

    async fn save(&self, aggregate: &mut Aggregate) -> Result<(), RepositoryError> {
        if self.mode == SyncBackMode::Enabled {
            self.write_back(aggregate).await;
        }
        self.inner.save(aggregate).await
    }

    async fn exists(&self, id: &ExternalId) -> Result<bool, RepositoryError> {
        self.inner.exists(id).await
    }
}
