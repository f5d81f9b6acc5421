//! Reconciliation importer
//!
//! Materializes legacy records as local aggregates. Notifications from the
//! legacy system say "created" or "updated", but neither is reliable: a
//! "created" record may already exist locally (replayed notification) and an
//! "updated" one may never have been seen. Both entry points therefore fall
//! back to the other operation.
//!
//! ```text
//! import(id, change)
//!   fetch (first source kind with a document)
//!   created -> create_with_update_fallback
//!   updated -> update_with_create_fallback
//!
//! both entry points
//!   parse -> admission predicate -> Rejected
//!   ensure location / organizer present (failures logged, ignored)
//!   save, then sync labels from keywords
//! ```

use async_trait::async_trait;
use cdb_common::events::{BridgeEvent, ChangeKind, EventBus, Metadata};
use cdb_common::{AggregateKind, ExternalId, RecordKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use super::save_loop::{save_with_retry, RetryPolicy, SaveError};
use crate::aggregate::{Aggregate, Repository, RepositoryError};
use crate::labels::{LabelError, LabelSynchronizer};
use crate::legacy::{
    self, AcceptAll, AdmissionPredicate, AllOf, AnyOf, ExternalDocument, ExternalRecord, ExtractError,
    FetchError, LabeledAsPlace, NotManagedElsewhere, OfKind, ParseError, QualifiesAsPlace, RecordFetcher,
};
use crate::media::{ImageCollection, MediaError, MediaImporter};

/// Result of a successful import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportOutcome {
    Created,
    Updated,
    /// The admission predicate refused the record; nothing was written
    Rejected,
}

impl ImportOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportOutcome::Created => "created",
            ImportOutcome::Updated => "updated",
            ImportOutcome::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ImportOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Save(#[from] SaveError),

    #[error("Media import failed: {0}")]
    Media(#[from] MediaError),

    #[error("Label sync failed: {0}")]
    Labels(#[from] LabelError),

    #[error("Importer for {0} has no source record kinds")]
    NoSources(AggregateKind),
}

impl ImportError {
    /// True when the legacy system has no record for the id
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ImportError::Fetch(FetchError::RecordNotFound { .. })
                | ImportError::Fetch(FetchError::Extract(ExtractError::NotFound { .. }))
        )
    }
}

/// Makes sure an aggregate referenced by another one exists locally
#[async_trait]
pub trait DependencyImporter: Send + Sync {
    async fn ensure_present(&self, id: &ExternalId) -> Result<(), ImportError>;
}

/// A fetched and parsed legacy record
struct Incoming {
    document: ExternalDocument,
    record: ExternalRecord,
}

pub struct ReconciliationImporter {
    kind: AggregateKind,
    repository: Arc<dyn Repository>,
    fetcher: Arc<dyn RecordFetcher>,
    predicate: Box<dyn AdmissionPredicate>,
    sources: Vec<RecordKind>,
    location_importer: Option<Arc<dyn DependencyImporter>>,
    organizer_importer: Option<Arc<dyn DependencyImporter>>,
    media: Option<Arc<MediaImporter>>,
    labels: Option<Arc<LabelSynchronizer>>,
    event_bus: EventBus,
    policy: RetryPolicy,
}

impl ReconciliationImporter {
    /// Importer admitting everything, reading the record kind that matches
    /// `kind` (actors for places and organizers)
    pub fn new(
        kind: AggregateKind,
        repository: Arc<dyn Repository>,
        fetcher: Arc<dyn RecordFetcher>,
        event_bus: EventBus,
    ) -> Self {
        let sources = match kind {
            AggregateKind::Event => vec![RecordKind::Event],
            AggregateKind::Place | AggregateKind::Organizer => vec![RecordKind::Actor],
        };

        Self {
            kind,
            repository,
            fetcher,
            predicate: Box::new(AcceptAll),
            sources,
            location_importer: None,
            organizer_importer: None,
            media: None,
            labels: None,
            event_bus,
            policy: RetryPolicy::default(),
        }
    }

    /// Events not owned by another system
    pub fn for_events(repository: Arc<dyn Repository>, fetcher: Arc<dyn RecordFetcher>, event_bus: EventBus) -> Self {
        Self::new(AggregateKind::Event, repository, fetcher, event_bus).with_predicate(NotManagedElsewhere)
    }

    /// Places: actors with the place category, or events carrying the place
    /// keyword. Actors are tried first.
    pub fn for_places(repository: Arc<dyn Repository>, fetcher: Arc<dyn RecordFetcher>, event_bus: EventBus) -> Self {
        Self::new(AggregateKind::Place, repository, fetcher, event_bus)
            .with_sources(vec![RecordKind::Actor, RecordKind::Event])
            .with_predicate(AllOf(vec![
                Box::new(NotManagedElsewhere),
                Box::new(AnyOf(vec![
                    Box::new(QualifiesAsPlace),
                    Box::new(AllOf(vec![Box::new(OfKind(RecordKind::Event)), Box::new(LabeledAsPlace)])),
                ])),
            ]))
    }

    /// Organizers: any actor not owned by another system
    pub fn for_organizers(
        repository: Arc<dyn Repository>,
        fetcher: Arc<dyn RecordFetcher>,
        event_bus: EventBus,
    ) -> Self {
        Self::new(AggregateKind::Organizer, repository, fetcher, event_bus).with_predicate(NotManagedElsewhere)
    }

    pub fn with_predicate(mut self, predicate: impl AdmissionPredicate + 'static) -> Self {
        self.predicate = Box::new(predicate);
        self
    }

    pub fn with_sources(mut self, sources: Vec<RecordKind>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_location_importer(mut self, importer: Arc<dyn DependencyImporter>) -> Self {
        self.location_importer = Some(importer);
        self
    }

    pub fn with_organizer_importer(mut self, importer: Arc<dyn DependencyImporter>) -> Self {
        self.organizer_importer = Some(importer);
        self
    }

    pub fn with_media_importer(mut self, media: Arc<MediaImporter>) -> Self {
        self.media = Some(media);
        self
    }

    /// Sync the record's keywords as labels after every successful save
    pub fn with_label_synchronizer(mut self, labels: Arc<LabelSynchronizer>) -> Self {
        self.labels = Some(labels);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn kind(&self) -> AggregateKind {
        self.kind
    }

    /// Handle a legacy notification for `id`
    pub async fn import(&self, id: &ExternalId, change: ChangeKind) -> Result<ImportOutcome, ImportError> {
        tracing::debug!(kind = %self.kind, id = %id, change = ?change, "Importing legacy record");

        let (document, source) = self.fetch_document(id).await?;

        match change {
            ChangeKind::Created => self.create_with_update_fallback(id, &document, source).await,
            ChangeKind::Updated => self.update_with_create_fallback(id, &document, source).await,
        }
    }

    /// Create the aggregate; if it turns out to exist already, update it
    pub async fn create_with_update_fallback(
        &self,
        id: &ExternalId,
        document: &ExternalDocument,
        source: RecordKind,
    ) -> Result<ImportOutcome, ImportError> {
        match self.admit(id, document, source).await? {
            Some(incoming) => self.create_inner(id, incoming).await,
            None => Ok(ImportOutcome::Rejected),
        }
    }

    /// Update the aggregate; if it does not exist yet, create it
    pub async fn update_with_create_fallback(
        &self,
        id: &ExternalId,
        document: &ExternalDocument,
        source: RecordKind,
    ) -> Result<ImportOutcome, ImportError> {
        match self.admit(id, document, source).await? {
            Some(incoming) => self.update_inner(id, incoming).await,
            None => Ok(ImportOutcome::Rejected),
        }
    }

    /// Parse and evaluate the admission predicate, then make sure referenced
    /// aggregates exist. `None` when the record is rejected.
    async fn admit(
        &self,
        id: &ExternalId,
        document: &ExternalDocument,
        source: RecordKind,
    ) -> Result<Option<Incoming>, ImportError> {
        let record = legacy::parse(source, document)?;

        if !self.predicate.admits(&record) {
            tracing::debug!(
                kind = %self.kind,
                id = %id,
                source = %source,
                predicate = %self.predicate.describe(),
                "Record rejected by admission predicate"
            );
            self.event_bus.emit_lossy(BridgeEvent::RecordRejected {
                aggregate_kind: self.kind,
                id: id.clone(),
                reason: self.predicate.describe(),
                timestamp: chrono::Utc::now(),
            });
            return Ok(None);
        }

        self.resolve_dependencies(id, &record).await;

        Ok(Some(Incoming {
            document: document.clone(),
            record,
        }))
    }

    /// First source kind the legacy system has a record of
    async fn fetch_document(&self, id: &ExternalId) -> Result<(ExternalDocument, RecordKind), ImportError> {
        let mut last_error = None;

        for source in &self.sources {
            match self.fetcher.fetch(id, *source).await {
                Ok(document) => return Ok((document, *source)),
                Err(e @ FetchError::RecordNotFound { .. })
                | Err(e @ FetchError::Extract(ExtractError::NotFound { .. })) => {
                    tracing::debug!(kind = %self.kind, id = %id, source = %source, error = %e, "No record of this kind");
                    last_error = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        match last_error {
            Some(e) => Err(e.into()),
            None => Err(ImportError::NoSources(self.kind)),
        }
    }

    async fn resolve_dependencies(&self, id: &ExternalId, record: &ExternalRecord) {
        let dependencies = [
            ("location", record.location_id.as_ref(), self.location_importer.as_ref()),
            ("organizer", record.organizer_id.as_ref(), self.organizer_importer.as_ref()),
        ];

        for (role, dependency_id, importer) in dependencies {
            let (Some(dependency_id), Some(importer)) = (dependency_id, importer) else {
                continue;
            };

            if let Err(e) = importer.ensure_present(dependency_id).await {
                tracing::error!(
                    id = %id,
                    role,
                    dependency_id = %dependency_id,
                    error = %e,
                    "Could not import dependency, continuing without it"
                );
            }
        }
    }

    async fn import_images(&self, record: &ExternalRecord) -> Result<Option<ImageCollection>, ImportError> {
        match &self.media {
            Some(media) => Ok(Some(media.import_media(record).await?)),
            None => Ok(None),
        }
    }

    fn metadata(source: RecordKind) -> Metadata {
        Metadata::new().with_value("imported_from", serde_json::json!(source.element_name()))
    }

    async fn create_inner(&self, id: &ExternalId, incoming: Incoming) -> Result<ImportOutcome, ImportError> {
        let source = incoming.record.kind;
        let images = self.import_images(&incoming.record).await?;

        let mut aggregate = Aggregate::new(self.kind, id.clone());
        aggregate.import_from_legacy(&incoming.document, source, Self::metadata(source));
        if let Some(collection) = images.as_ref().filter(|c| !c.is_empty()) {
            aggregate.import_images(collection, Self::metadata(source));
        }

        match self.repository.save(&mut aggregate).await {
            Ok(()) => {
                tracing::info!(kind = %self.kind, id = %id, source = %source, "Created aggregate from legacy record");
                self.finish(id, ChangeKind::Created, &incoming).await?;
                Ok(ImportOutcome::Created)
            }
            Err(RepositoryError::AlreadyExists { .. }) => {
                tracing::info!(
                    kind = %self.kind,
                    id = %id,
                    "Aggregate already exists, updating instead of creating"
                );
                let existing = self.repository.load(id).await?;
                self.apply_update(existing, incoming, images).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_inner(&self, id: &ExternalId, incoming: Incoming) -> Result<ImportOutcome, ImportError> {
        match self.repository.load(id).await {
            Ok(existing) => {
                let images = self.import_images(&incoming.record).await?;
                self.apply_update(existing, incoming, images).await
            }
            Err(RepositoryError::NotFound { .. }) => {
                tracing::info!(
                    kind = %self.kind,
                    id = %id,
                    "Aggregate not found, creating instead of updating"
                );
                self.create_inner(id, incoming).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn apply_update(
        &self,
        existing: Aggregate,
        incoming: Incoming,
        images: Option<ImageCollection>,
    ) -> Result<ImportOutcome, ImportError> {
        let source = incoming.record.kind;
        let document = &incoming.document;

        let saved = save_with_retry(
            self.repository.as_ref(),
            existing,
            |aggregate| {
                aggregate.update_from_legacy(document, source, Self::metadata(source));
                if let Some(collection) = &images {
                    aggregate.import_images(collection, Self::metadata(source));
                }
            },
            &self.policy,
        )
        .await?;

        tracing::info!(
            kind = %self.kind,
            id = %saved.id(),
            version = saved.version(),
            "Updated aggregate from legacy record"
        );
        self.finish(saved.id(), ChangeKind::Updated, &incoming).await?;
        Ok(ImportOutcome::Updated)
    }

    /// Labels follow every saved import; only then is the import announced
    async fn finish(&self, id: &ExternalId, change: ChangeKind, incoming: &Incoming) -> Result<(), ImportError> {
        if let Some(labels) = &self.labels {
            labels
                .sync_labels(id, self.kind, &incoming.record.keywords)
                .await
                .map_err(|e| {
                    tracing::error!(kind = %self.kind, id = %id, error = %e, "Label sync failed after import");
                    e
                })?;
        }

        self.publish(id, change, incoming);
        Ok(())
    }

    fn publish(&self, id: &ExternalId, change: ChangeKind, incoming: &Incoming) {
        self.event_bus.emit_lossy(BridgeEvent::RecordImported {
            aggregate_kind: self.kind,
            id: id.clone(),
            change,
            source: incoming.record.kind,
            document_xml: incoming.document.xml().to_string(),
            namespace_uri: incoming.document.namespace_uri().to_string(),
            timestamp: chrono::Utc::now(),
        });
    }
}

#[async_trait]
impl DependencyImporter for ReconciliationImporter {
    async fn ensure_present(&self, id: &ExternalId) -> Result<(), ImportError> {
        if self.repository.exists(id).await? {
            return Ok(());
        }

        let outcome = self.import(id, ChangeKind::Created).await?;
        tracing::debug!(kind = %self.kind, id = %id, outcome = %outcome, "Dependency import finished");
        Ok(())
    }
}
