//! Domain events recorded on local aggregates
//!
//! Two families share this enum:
//! - events that record a change received *from* the legacy system
//!   (`ImportedFromLegacy`, `UpdatedFromLegacy`, `LabelsSynced`,
//!   `ImagesImportedFromLegacy`); these are never written back
//! - events that record a local change; these are replayed against the legacy
//!   system by the sync-back decorator

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::payloads::{BookingInfo, Category, ContactPoint, LocationRef, MediaAsset};
use crate::{Label, LabelSet, RecordKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    /// Aggregate materialized from a legacy document
    ImportedFromLegacy {
        document_xml: String,
        namespace_uri: String,
        source: RecordKind,
    },

    /// Aggregate state replaced by a newer legacy document
    UpdatedFromLegacy {
        document_xml: String,
        namespace_uri: String,
        source: RecordKind,
    },

    /// Full replacement of labels from the legacy keyword list
    LabelsSynced { labels: LabelSet },

    /// Images referenced by the legacy document, main image first-wins
    ImagesImportedFromLegacy {
        images: Vec<MediaAsset>,
        main_image: Option<Uuid>,
    },

    /// Created locally
    Created {
        title: String,
        event_type: Option<Category>,
        theme: Option<Category>,
        location: Option<LocationRef>,
    },

    Deleted,

    MajorInfoUpdated {
        title: String,
        event_type: Option<Category>,
        theme: Option<Category>,
        location: Option<LocationRef>,
    },

    /// An empty description means "delete the description"
    DescriptionUpdated { description: String },

    /// Range in the form `min-max` (either side may be empty)
    TypicalAgeRangeUpdated { range: String },

    TypicalAgeRangeDeleted,

    OrganizerUpdated { organizer_id: String, organizer_name: String },

    OrganizerDeleted { organizer_id: String },

    ContactPointUpdated { contact_point: ContactPoint },

    BookingInfoUpdated { booking_info: BookingInfo },

    LabelAdded { label: Label },

    LabelDeleted { label: Label },

    LabelsMerged { labels: LabelSet },

    TitleTranslated { language: String, title: String },

    DescriptionTranslated { language: String, description: String },

    TranslationApplied {
        language: String,
        title: Option<String>,
        short_description: Option<String>,
        long_description: Option<String>,
    },

    TranslationDeleted { language: String },

    ImageAdded { image: MediaAsset },

    ImageUpdated {
        media_object_id: Uuid,
        description: String,
        copyright_holder: String,
    },

    ImageRemoved { image: MediaAsset },

    MainImageSelected { image: MediaAsset },

    /// Created locally from a raw legacy XML document
    CreatedFromCdbXml { document_xml: String, namespace_uri: String },

    /// Updated locally from a raw legacy XML document
    UpdatedFromCdbXml { document_xml: String, namespace_uri: String },
}

impl DomainEvent {
    /// Stable name used in storage and logs
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::ImportedFromLegacy { .. } => "ImportedFromLegacy",
            DomainEvent::UpdatedFromLegacy { .. } => "UpdatedFromLegacy",
            DomainEvent::LabelsSynced { .. } => "LabelsSynced",
            DomainEvent::ImagesImportedFromLegacy { .. } => "ImagesImportedFromLegacy",
            DomainEvent::Created { .. } => "Created",
            DomainEvent::Deleted => "Deleted",
            DomainEvent::MajorInfoUpdated { .. } => "MajorInfoUpdated",
            DomainEvent::DescriptionUpdated { .. } => "DescriptionUpdated",
            DomainEvent::TypicalAgeRangeUpdated { .. } => "TypicalAgeRangeUpdated",
            DomainEvent::TypicalAgeRangeDeleted => "TypicalAgeRangeDeleted",
            DomainEvent::OrganizerUpdated { .. } => "OrganizerUpdated",
            DomainEvent::OrganizerDeleted { .. } => "OrganizerDeleted",
            DomainEvent::ContactPointUpdated { .. } => "ContactPointUpdated",
            DomainEvent::BookingInfoUpdated { .. } => "BookingInfoUpdated",
            DomainEvent::LabelAdded { .. } => "LabelAdded",
            DomainEvent::LabelDeleted { .. } => "LabelDeleted",
            DomainEvent::LabelsMerged { .. } => "LabelsMerged",
            DomainEvent::TitleTranslated { .. } => "TitleTranslated",
            DomainEvent::DescriptionTranslated { .. } => "DescriptionTranslated",
            DomainEvent::TranslationApplied { .. } => "TranslationApplied",
            DomainEvent::TranslationDeleted { .. } => "TranslationDeleted",
            DomainEvent::ImageAdded { .. } => "ImageAdded",
            DomainEvent::ImageUpdated { .. } => "ImageUpdated",
            DomainEvent::ImageRemoved { .. } => "ImageRemoved",
            DomainEvent::MainImageSelected { .. } => "MainImageSelected",
            DomainEvent::CreatedFromCdbXml { .. } => "CreatedFromCdbXml",
            DomainEvent::UpdatedFromCdbXml { .. } => "UpdatedFromCdbXml",
        }
    }

    /// True for events that mirror a change made in the legacy system.
    ///
    /// Writing these back would create a feedback loop.
    pub fn is_legacy_originated(&self) -> bool {
        matches!(
            self,
            DomainEvent::ImportedFromLegacy { .. }
                | DomainEvent::UpdatedFromLegacy { .. }
                | DomainEvent::LabelsSynced { .. }
                | DomainEvent::ImagesImportedFromLegacy { .. }
        )
    }

    /// True for events that bring an aggregate into existence
    pub fn is_creation(&self) -> bool {
        matches!(
            self,
            DomainEvent::ImportedFromLegacy { .. }
                | DomainEvent::Created { .. }
                | DomainEvent::CreatedFromCdbXml { .. }
        )
    }
}
