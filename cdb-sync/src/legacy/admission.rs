//! Admission predicates
//!
//! Decide whether a fetched legacy record should become (or update) a local
//! aggregate. Rejection is not an error.

use super::record::ExternalRecord;

/// Legacy category marking an actor as a place
pub const PLACE_CATEGORY_ID: &str = "8.15.0.0.0";
/// Legacy keyword marking a record as a place
pub const PLACE_KEYWORD: &str = "UDB3 place";

pub trait AdmissionPredicate: Send + Sync {
    fn admits(&self, record: &ExternalRecord) -> bool;

    /// Short name for logs
    fn describe(&self) -> String;
}

/// Admits everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl AdmissionPredicate for AcceptAll {
    fn admits(&self, _record: &ExternalRecord) -> bool {
        true
    }

    fn describe(&self) -> String {
        "accept all".to_string()
    }
}

/// Actor carrying the place category
#[derive(Debug, Clone, Copy, Default)]
pub struct QualifiesAsPlace;

impl AdmissionPredicate for QualifiesAsPlace {
    fn admits(&self, record: &ExternalRecord) -> bool {
        record.kind == cdb_common::RecordKind::Actor && record.has_category(PLACE_CATEGORY_ID)
    }

    fn describe(&self) -> String {
        format!("actor with category {}", PLACE_CATEGORY_ID)
    }
}

/// Record carrying the place keyword (any kind, case-insensitive)
#[derive(Debug, Clone, Copy, Default)]
pub struct LabeledAsPlace;

impl AdmissionPredicate for LabeledAsPlace {
    fn admits(&self, record: &ExternalRecord) -> bool {
        record.has_keyword(PLACE_KEYWORD)
    }

    fn describe(&self) -> String {
        format!("keyword '{}'", PLACE_KEYWORD)
    }
}

/// Record not owned by another system (no `externalurl`)
#[derive(Debug, Clone, Copy, Default)]
pub struct NotManagedElsewhere;

impl AdmissionPredicate for NotManagedElsewhere {
    fn admits(&self, record: &ExternalRecord) -> bool {
        !record.is_managed_elsewhere()
    }

    fn describe(&self) -> String {
        "not managed elsewhere".to_string()
    }
}

/// Record of the given legacy kind
#[derive(Debug, Clone, Copy)]
pub struct OfKind(pub cdb_common::RecordKind);

impl AdmissionPredicate for OfKind {
    fn admits(&self, record: &ExternalRecord) -> bool {
        record.kind == self.0
    }

    fn describe(&self) -> String {
        format!("{} record", self.0)
    }
}

pub struct Not<P>(pub P);

impl<P: AdmissionPredicate> AdmissionPredicate for Not<P> {
    fn admits(&self, record: &ExternalRecord) -> bool {
        !self.0.admits(record)
    }

    fn describe(&self) -> String {
        format!("not ({})", self.0.describe())
    }
}

/// Admits when every inner predicate does; empty admits everything
pub struct AllOf(pub Vec<Box<dyn AdmissionPredicate>>);

impl AdmissionPredicate for AllOf {
    fn admits(&self, record: &ExternalRecord) -> bool {
        self.0.iter().all(|p| p.admits(record))
    }

    fn describe(&self) -> String {
        let parts: Vec<String> = self.0.iter().map(|p| p.describe()).collect();
        format!("all of [{}]", parts.join(", "))
    }
}

/// Admits when any inner predicate does; empty admits nothing
pub struct AnyOf(pub Vec<Box<dyn AdmissionPredicate>>);

impl AdmissionPredicate for AnyOf {
    fn admits(&self, record: &ExternalRecord) -> bool {
        self.0.iter().any(|p| p.admits(record))
    }

    fn describe(&self) -> String {
        let parts: Vec<String> = self.0.iter().map(|p| p.describe()).collect();
        format!("any of [{}]", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::legacy::record::{CategoryRef, Keyword};
    use cdb_common::{ExternalId, RecordKind};

    fn record(kind: RecordKind) -> ExternalRecord {
        ExternalRecord {
            id: ExternalId::new("r-1").unwrap(),
            kind,
            external_url: None,
            title: None,
            categories: Vec::new(),
            keywords: Vec::new(),
            location_id: None,
            organizer_id: None,
            media: Vec::new(),
        }
    }

    #[test]
    fn test_qualifies_as_place_requires_actor_with_category() {
        let mut actor = record(RecordKind::Actor);
        assert!(!QualifiesAsPlace.admits(&actor));

        actor.categories.push(CategoryRef {
            id: PLACE_CATEGORY_ID.to_string(),
            category_type: Some("actortype".to_string()),
        });
        assert!(QualifiesAsPlace.admits(&actor));

        let mut event = record(RecordKind::Event);
        event.categories = actor.categories.clone();
        assert!(!QualifiesAsPlace.admits(&event));
    }

    #[test]
    fn test_labeled_as_place_is_case_insensitive() {
        let mut event = record(RecordKind::Event);
        event.keywords.push(Keyword {
            value: "udb3 PLACE".to_string(),
            visible: false,
        });
        assert!(LabeledAsPlace.admits(&event));
    }

    #[test]
    fn test_combinators() {
        let mut actor = record(RecordKind::Actor);
        actor.external_url = Some("http://elsewhere/1".to_string());

        assert!(AcceptAll.admits(&actor));
        assert!(!NotManagedElsewhere.admits(&actor));
        assert!(Not(NotManagedElsewhere).admits(&actor));

        let all = AllOf(vec![Box::new(AcceptAll), Box::new(NotManagedElsewhere)]);
        assert!(!all.admits(&actor));
        assert!(all.describe().contains("not managed elsewhere"));

        let any = AnyOf(vec![Box::new(QualifiesAsPlace), Box::new(AcceptAll)]);
        assert!(any.admits(&actor));
        assert!(!AnyOf(Vec::new()).admits(&actor));

        assert!(OfKind(RecordKind::Actor).admits(&actor));
        assert!(!OfKind(RecordKind::Event).admits(&actor));
    }
}
