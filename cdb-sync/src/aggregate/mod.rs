//! Event-sourced local aggregates
//!
//! An [`Aggregate`] is rebuilt from its persisted domain messages and records
//! new ones as uncommitted until a [`Repository`] saves them. The state kept
//! here is what the bridge reads back (document, labels, images); richer
//! projections live elsewhere.

mod repository;
mod sqlite;

pub use repository::{Repository, RepositoryError};
pub use sqlite::SqliteEventStore;

use cdb_common::events::{DomainEvent, DomainMessage, MediaAsset, Metadata};
use cdb_common::{AggregateKind, ExternalId, LabelSet, RecordKind};
use uuid::Uuid;

use crate::legacy::ExternalDocument;
use crate::media::ImageCollection;

/// State folded from an aggregate's events
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateState {
    pub document: Option<ExternalDocument>,
    pub source: Option<RecordKind>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub labels: LabelSet,
    pub images: Vec<MediaAsset>,
    pub main_image: Option<Uuid>,
    pub deleted: bool,
}

#[derive(Debug, Clone)]
pub struct Aggregate {
    kind: AggregateKind,
    id: ExternalId,
    /// Number of persisted events
    version: i64,
    state: AggregateState,
    uncommitted: Vec<DomainMessage>,
}

impl Aggregate {
    /// A new, not yet persisted aggregate
    pub fn new(kind: AggregateKind, id: ExternalId) -> Self {
        Self {
            kind,
            id,
            version: 0,
            state: AggregateState::default(),
            uncommitted: Vec::new(),
        }
    }

    /// Rebuild from persisted messages, in playhead order
    pub fn from_history(kind: AggregateKind, id: ExternalId, history: &[DomainMessage]) -> Self {
        let mut aggregate = Self::new(kind, id);
        for message in history {
            aggregate.state.apply(&message.payload);
            aggregate.version += 1;
        }
        aggregate
    }

    pub fn kind(&self) -> AggregateKind {
        self.kind
    }

    pub fn id(&self) -> &ExternalId {
        &self.id
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    /// True until the first save
    pub fn is_new(&self) -> bool {
        self.version == 0
    }

    pub fn state(&self) -> &AggregateState {
        &self.state
    }

    pub fn uncommitted(&self) -> &[DomainMessage] {
        &self.uncommitted
    }

    /// Record a new event: applied immediately, persisted on save
    pub fn record(&mut self, payload: DomainEvent, metadata: Metadata) {
        let playhead = self.version + self.uncommitted.len() as i64;
        self.state.apply(&payload);
        self.uncommitted.push(DomainMessage::record_now(
            self.id.clone(),
            self.kind,
            playhead,
            metadata,
            payload,
        ));
    }

    /// Called by repositories once the uncommitted messages are stored
    pub(crate) fn mark_committed(&mut self) -> Vec<DomainMessage> {
        let committed = std::mem::take(&mut self.uncommitted);
        self.version += committed.len() as i64;
        committed
    }

    pub fn import_from_legacy(&mut self, document: &ExternalDocument, source: RecordKind, metadata: Metadata) {
        self.record(
            DomainEvent::ImportedFromLegacy {
                document_xml: document.xml().to_string(),
                namespace_uri: document.namespace_uri().to_string(),
                source,
            },
            metadata,
        );
    }

    pub fn update_from_legacy(&mut self, document: &ExternalDocument, source: RecordKind, metadata: Metadata) {
        self.record(
            DomainEvent::UpdatedFromLegacy {
                document_xml: document.xml().to_string(),
                namespace_uri: document.namespace_uri().to_string(),
                source,
            },
            metadata,
        );
    }

    /// Replace all labels; records nothing when the set is unchanged
    pub fn sync_labels(&mut self, labels: LabelSet, metadata: Metadata) -> bool {
        if self.state.labels == labels {
            return false;
        }
        self.record(DomainEvent::LabelsSynced { labels }, metadata);
        true
    }

    /// Replace all images; records nothing when the collection is unchanged
    pub fn import_images(&mut self, collection: &ImageCollection, metadata: Metadata) -> bool {
        if self.state.images == collection.images && self.state.main_image == collection.main {
            return false;
        }
        self.record(
            DomainEvent::ImagesImportedFromLegacy {
                images: collection.images.clone(),
                main_image: collection.main,
            },
            metadata,
        );
        true
    }
}

impl AggregateState {
    fn apply(&mut self, event: &DomainEvent) {
        match event {
            DomainEvent::ImportedFromLegacy { document_xml, namespace_uri, source }
            | DomainEvent::UpdatedFromLegacy { document_xml, namespace_uri, source } => {
                self.document = Some(ExternalDocument::new(document_xml.clone(), namespace_uri.clone()));
                self.source = Some(*source);
                self.deleted = false;
            }
            DomainEvent::CreatedFromCdbXml { document_xml, namespace_uri }
            | DomainEvent::UpdatedFromCdbXml { document_xml, namespace_uri } => {
                self.document = Some(ExternalDocument::new(document_xml.clone(), namespace_uri.clone()));
            }
            DomainEvent::Created { title, .. } | DomainEvent::MajorInfoUpdated { title, .. } => {
                self.title = Some(title.clone());
            }
            DomainEvent::Deleted => self.deleted = true,
            DomainEvent::DescriptionUpdated { description } => {
                self.description = Some(description.clone()).filter(|d| !d.is_empty());
            }
            DomainEvent::LabelsSynced { labels } => self.labels = labels.clone(),
            DomainEvent::LabelsMerged { labels } => {
                for label in labels.iter() {
                    self.labels.insert(label.clone());
                }
            }
            DomainEvent::LabelAdded { label } => {
                self.labels.insert(label.clone());
            }
            DomainEvent::LabelDeleted { label } => {
                self.labels.remove(label.name());
            }
            DomainEvent::ImagesImportedFromLegacy { images, main_image } => {
                self.images = images.clone();
                self.main_image = *main_image;
            }
            DomainEvent::ImageAdded { image } => {
                if !self.images.iter().any(|i| i.id == image.id) {
                    self.images.push(image.clone());
                }
                if self.main_image.is_none() {
                    self.main_image = Some(image.id);
                }
            }
            DomainEvent::ImageUpdated {
                media_object_id,
                description,
                copyright_holder,
            } => {
                if let Some(image) = self.images.iter_mut().find(|i| i.id == *media_object_id) {
                    image.description = description.clone();
                    image.copyright_holder = copyright_holder.clone();
                }
            }
            DomainEvent::ImageRemoved { image } => {
                self.images.retain(|i| i.id != image.id);
                if self.main_image == Some(image.id) {
                    self.main_image = self.images.first().map(|i| i.id);
                }
            }
            DomainEvent::MainImageSelected { image } => self.main_image = Some(image.id),
            _ => {}
        }
    }
}
