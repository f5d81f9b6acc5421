//! Legacy system access: fetching, element extraction, parsing and admission

pub mod admission;
pub mod extractor;
pub mod fetcher;
pub mod record;

pub use admission::{
    AcceptAll, AdmissionPredicate, AllOf, AnyOf, LabeledAsPlace, Not, NotManagedElsewhere, OfKind,
    QualifiesAsPlace,
};
pub use extractor::{extract, ExtractError, Selector};
pub use fetcher::{id_from_notification_url, FetchError, HttpRecordFetcher, RecordFetcher};
pub use record::{parse, ExternalDocument, ExternalRecord, Keyword, MediaFile, ParseError};
