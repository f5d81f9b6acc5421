//! Mapping of local domain events onto legacy write calls

use cdb_common::events::{BookingInfo, Category, ContactPoint, DomainEvent, DomainMessage, LocationRef, MediaAsset};
use cdb_common::{AggregateKind, ExternalId, Label};
use quick_xml::events::Event;
use quick_xml::{Reader, Writer};
use serde::Serialize;
use uuid::Uuid;

use super::SyncBackError;

/// Language of untranslated descriptions
pub const DEFAULT_LANGUAGE: &str = "nl";

/// One call against the legacy write API
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegacyWriteCall {
    pub kind: AggregateKind,
    pub id: ExternalId,
    pub action: WriteAction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum WriteAction {
    CreateItem {
        title: String,
        event_type: Option<Category>,
        theme: Option<Category>,
        location: Option<LocationRef>,
    },
    DeleteItem,
    UpdateMajorInfo {
        title: String,
        event_type: Option<Category>,
        theme: Option<Category>,
        location: Option<LocationRef>,
    },
    UpdateDescription { language: String, description: String },
    DeleteDescription { language: String },
    UpdateAgeRange { range: String },
    DeleteAgeRange,
    UpdateOrganizer { organizer_name: String },
    DeleteOrganizer,
    UpdateContactInfo { contact_point: ContactPoint },
    UpdateBookingInfo { booking_info: BookingInfo },
    AddKeywords { labels: Vec<Label> },
    DeleteKeyword { keyword: String },
    TranslateTitle { language: String, title: String },
    TranslateDescription { language: String, description: String },
    Translate {
        language: String,
        title: Option<String>,
        short_description: Option<String>,
        long_description: Option<String>,
    },
    DeleteTranslation { language: String },
    AddImage { image: MediaAsset },
    UpdateImage {
        media_object_id: Uuid,
        description: String,
        copyright_holder: String,
    },
    RemoveImage { media_object_id: Uuid },
    SelectMainImage { media_object_id: Uuid },
    CreateFromRawXml { xml: String },
    UpdateFromRawXml { xml: String },
}

impl WriteAction {
    pub fn name(&self) -> &'static str {
        match self {
            WriteAction::CreateItem { .. } => "create_item",
            WriteAction::DeleteItem => "delete_item",
            WriteAction::UpdateMajorInfo { .. } => "update_major_info",
            WriteAction::UpdateDescription { .. } => "update_description",
            WriteAction::DeleteDescription { .. } => "delete_description",
            WriteAction::UpdateAgeRange { .. } => "update_age_range",
            WriteAction::DeleteAgeRange => "delete_age_range",
            WriteAction::UpdateOrganizer { .. } => "update_organizer",
            WriteAction::DeleteOrganizer => "delete_organizer",
            WriteAction::UpdateContactInfo { .. } => "update_contact_info",
            WriteAction::UpdateBookingInfo { .. } => "update_booking_info",
            WriteAction::AddKeywords { .. } => "add_keywords",
            WriteAction::DeleteKeyword { .. } => "delete_keyword",
            WriteAction::TranslateTitle { .. } => "translate_title",
            WriteAction::TranslateDescription { .. } => "translate_description",
            WriteAction::Translate { .. } => "translate",
            WriteAction::DeleteTranslation { .. } => "delete_translation",
            WriteAction::AddImage { .. } => "add_image",
            WriteAction::UpdateImage { .. } => "update_image",
            WriteAction::RemoveImage { .. } => "remove_image",
            WriteAction::SelectMainImage { .. } => "select_main_image",
            WriteAction::CreateFromRawXml { .. } => "create_from_raw_xml",
            WriteAction::UpdateFromRawXml { .. } => "update_from_raw_xml",
        }
    }
}

/// The legacy call replaying `message`, or None when the event is not
/// written back
///
/// Creation events only produce a call when they open the stream; a
/// creation recorded on an existing aggregate has nothing to create.
pub fn call_for(message: &DomainMessage) -> Result<Option<LegacyWriteCall>, SyncBackError> {
    let id = &message.aggregate_id;

    let action = match &message.payload {
        event if event.is_legacy_originated() => return Ok(None),
        event if event.is_creation() && message.playhead != 0 => return Ok(None),

        DomainEvent::Created {
            title,
            event_type,
            theme,
            location,
        } => WriteAction::CreateItem {
            title: title.clone(),
            event_type: event_type.clone(),
            theme: theme.clone(),
            location: location.clone(),
        },
        DomainEvent::Deleted => WriteAction::DeleteItem,
        DomainEvent::MajorInfoUpdated {
            title,
            event_type,
            theme,
            location,
        } => WriteAction::UpdateMajorInfo {
            title: title.clone(),
            event_type: event_type.clone(),
            theme: theme.clone(),
            location: location.clone(),
        },
        DomainEvent::DescriptionUpdated { description } if description.trim().is_empty() => {
            WriteAction::DeleteDescription {
                language: DEFAULT_LANGUAGE.to_string(),
            }
        }
        DomainEvent::DescriptionUpdated { description } => WriteAction::UpdateDescription {
            language: DEFAULT_LANGUAGE.to_string(),
            description: description.clone(),
        },
        DomainEvent::TypicalAgeRangeUpdated { range } => WriteAction::UpdateAgeRange { range: range.clone() },
        DomainEvent::TypicalAgeRangeDeleted => WriteAction::DeleteAgeRange,
        DomainEvent::OrganizerUpdated { organizer_name, .. } => WriteAction::UpdateOrganizer {
            organizer_name: organizer_name.clone(),
        },
        DomainEvent::OrganizerDeleted { .. } => WriteAction::DeleteOrganizer,
        DomainEvent::ContactPointUpdated { contact_point } => WriteAction::UpdateContactInfo {
            contact_point: contact_point.clone(),
        },
        DomainEvent::BookingInfoUpdated { booking_info } => WriteAction::UpdateBookingInfo {
            booking_info: booking_info.clone(),
        },
        DomainEvent::LabelAdded { label } => WriteAction::AddKeywords {
            labels: vec![label.clone()],
        },
        DomainEvent::LabelDeleted { label } => WriteAction::DeleteKeyword {
            keyword: label.name().to_string(),
        },
        DomainEvent::LabelsMerged { labels } => WriteAction::AddKeywords {
            labels: labels.iter().cloned().collect(),
        },
        DomainEvent::TitleTranslated { language, title } => WriteAction::TranslateTitle {
            language: language.clone(),
            title: title.clone(),
        },
        DomainEvent::DescriptionTranslated { language, description } => WriteAction::TranslateDescription {
            language: language.clone(),
            description: description.clone(),
        },
        DomainEvent::TranslationApplied {
            language,
            title,
            short_description,
            long_description,
        } => WriteAction::Translate {
            language: language.clone(),
            title: title.clone(),
            short_description: short_description.clone(),
            long_description: long_description.clone(),
        },
        DomainEvent::TranslationDeleted { language } => WriteAction::DeleteTranslation {
            language: language.clone(),
        },
        DomainEvent::ImageAdded { image } => WriteAction::AddImage { image: image.clone() },
        DomainEvent::ImageUpdated {
            media_object_id,
            description,
            copyright_holder,
        } => WriteAction::UpdateImage {
            media_object_id: *media_object_id,
            description: description.clone(),
            copyright_holder: copyright_holder.clone(),
        },
        DomainEvent::ImageRemoved { image } => WriteAction::RemoveImage {
            media_object_id: image.id,
        },
        DomainEvent::MainImageSelected { image } => WriteAction::SelectMainImage {
            media_object_id: image.id,
        },
        DomainEvent::CreatedFromCdbXml { document_xml, .. } => WriteAction::CreateFromRawXml {
            xml: with_cdbid_attribute(document_xml, id)?,
        },
        DomainEvent::UpdatedFromCdbXml { document_xml, .. } => WriteAction::UpdateFromRawXml {
            xml: with_cdbid_attribute(document_xml, id)?,
        },
        DomainEvent::ImportedFromLegacy { .. }
        | DomainEvent::UpdatedFromLegacy { .. }
        | DomainEvent::LabelsSynced { .. }
        | DomainEvent::ImagesImportedFromLegacy { .. } => return Ok(None),
    };

    Ok(Some(LegacyWriteCall {
        kind: message.aggregate_kind,
        id: id.clone(),
        action,
    }))
}

/// Set the `cdbid` attribute of the root element of `xml` to `id`
pub fn with_cdbid_attribute(xml: &str, id: &ExternalId) -> Result<String, SyncBackError> {
    let malformed = |e: &dyn std::fmt::Display| SyncBackError::InvalidDocument(e.to_string());

    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());
    let mut root_seen = false;

    loop {
        let event = reader.read_event().map_err(|e| malformed(&e))?;
        match event {
            Event::Eof => break,
            Event::Start(start) if !root_seen => {
                root_seen = true;
                let root = set_attribute(&start, id).map_err(|e| malformed(&e))?;
                writer.write_event(Event::Start(root)).map_err(|e| malformed(&e))?;
            }
            Event::Empty(start) if !root_seen => {
                root_seen = true;
                let root = set_attribute(&start, id).map_err(|e| malformed(&e))?;
                writer.write_event(Event::Empty(root)).map_err(|e| malformed(&e))?;
            }
            other => writer.write_event(other).map_err(|e| malformed(&e))?,
        }
    }

    if !root_seen {
        return Err(SyncBackError::InvalidDocument("document has no root element".to_string()));
    }

    String::from_utf8(writer.into_inner()).map_err(|e| malformed(&e))
}

fn set_attribute(
    start: &quick_xml::events::BytesStart<'_>,
    id: &ExternalId,
) -> Result<quick_xml::events::BytesStart<'static>, quick_xml::events::attributes::AttrError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut root = quick_xml::events::BytesStart::new(name);

    for attr in start.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() == b"cdbid" {
            continue;
        }
        root.push_attribute(attr);
    }
    root.push_attribute(("cdbid", id.as_str()));
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdb_common::events::Metadata;
    use cdb_common::LabelSet;

    fn message(playhead: i64, payload: DomainEvent) -> DomainMessage {
        DomainMessage::record_now(
            ExternalId::new("e-1").unwrap(),
            AggregateKind::Event,
            playhead,
            Metadata::new(),
            payload,
        )
    }

    #[test]
    fn test_legacy_originated_events_are_skipped() {
        let msg = message(
            3,
            DomainEvent::LabelsSynced {
                labels: LabelSet::from_labels(vec![Label::visible("x")]),
            },
        );
        assert!(call_for(&msg).unwrap().is_none());
    }

    #[test]
    fn test_creation_only_when_opening_the_stream() {
        let created = DomainEvent::Created {
            title: "Concert".to_string(),
            event_type: None,
            theme: None,
            location: None,
        };

        let first = call_for(&message(0, created.clone())).unwrap().unwrap();
        assert_eq!(first.action.name(), "create_item");
        assert!(call_for(&message(4, created)).unwrap().is_none());
    }

    #[test]
    fn test_empty_description_deletes() {
        let call = call_for(&message(2, DomainEvent::DescriptionUpdated { description: " ".into() }))
            .unwrap()
            .unwrap();
        assert_eq!(
            call.action,
            WriteAction::DeleteDescription {
                language: DEFAULT_LANGUAGE.to_string()
            }
        );
    }

    #[test]
    fn test_labels_merged_adds_keywords() {
        let labels = LabelSet::from_labels(vec![Label::visible("a"), Label::hidden("b")]);
        let call = call_for(&message(1, DomainEvent::LabelsMerged { labels })).unwrap().unwrap();
        match call.action {
            WriteAction::AddKeywords { labels } => assert_eq!(labels.len(), 2),
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn test_raw_xml_gets_cdbid() {
        let payload = DomainEvent::UpdatedFromCdbXml {
            document_xml: r#"<?xml version="1.0"?><event cdbid="old" private="false"><title>T</title></event>"#.into(),
            namespace_uri: "urn:ns".into(),
        };
        let call = call_for(&message(5, payload)).unwrap().unwrap();
        match call.action {
            WriteAction::UpdateFromRawXml { xml } => {
                assert!(xml.contains(r#"cdbid="e-1""#));
                assert!(!xml.contains("old"));
                assert!(xml.contains(r#"private="false""#));
                assert!(xml.contains("<title>T</title>"));
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn test_cdbid_injection_rejects_empty_document() {
        let id = ExternalId::new("x").unwrap();
        assert!(matches!(with_cdbid_attribute("", &id), Err(SyncBackError::InvalidDocument(_))));
        assert_eq!(
            with_cdbid_attribute("<actor/>", &id).unwrap(),
            r#"<actor cdbid="x"/>"#
        );
    }
}
