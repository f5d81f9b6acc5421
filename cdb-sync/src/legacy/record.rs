//! Legacy documents and the typed view reconciliation needs of them
//!
//! The full legacy schema (calendars, addresses, prices, ...) is mapped by
//! the aggregates themselves. This module only reads what drives import
//! control flow: identity, admission markers, dependencies, keywords and
//! media references.

use cdb_common::{ExternalId, RecordKind};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::extractor::attribute;

/// A legacy XML payload and the schema namespace it was produced under
///
/// The two always travel together: parsing depends on the schema version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalDocument {
    xml: String,
    namespace_uri: String,
}

impl ExternalDocument {
    pub fn new(xml: impl Into<String>, namespace_uri: impl Into<String>) -> Self {
        Self {
            xml: xml.into(),
            namespace_uri: namespace_uri.into(),
        }
    }

    pub fn xml(&self) -> &str {
        &self.xml
    }

    pub fn namespace_uri(&self) -> &str {
        &self.namespace_uri
    }
}

/// A legacy keyword
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyword {
    pub value: String,
    pub visible: bool,
}

/// A category reference on a legacy record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRef {
    pub id: String,
    pub category_type: Option<String>,
}

/// A media entry of the first detail of a legacy record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFile {
    pub hlink: String,
    pub media_type: String,
    pub file_type: String,
    pub is_main: bool,
    pub description: Option<String>,
    pub copyright: Option<String>,
}

/// Parsed view of a legacy record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalRecord {
    pub id: ExternalId,
    pub kind: RecordKind,
    /// Set when another system owns the record
    pub external_url: Option<String>,
    pub title: Option<String>,
    pub categories: Vec<CategoryRef>,
    pub keywords: Vec<Keyword>,
    pub location_id: Option<ExternalId>,
    pub organizer_id: Option<ExternalId>,
    pub media: Vec<MediaFile>,
}

impl ExternalRecord {
    pub fn has_category(&self, id: &str) -> bool {
        self.categories.iter().any(|c| c.id == id)
    }

    /// Case-insensitive keyword lookup, visible or not
    pub fn has_keyword(&self, value: &str) -> bool {
        let wanted = value.trim().to_lowercase();
        self.keywords
            .iter()
            .any(|k| k.value.trim().to_lowercase() == wanted)
    }

    pub fn is_managed_elsewhere(&self) -> bool {
        self.external_url
            .as_deref()
            .map(|url| !url.trim().is_empty())
            .unwrap_or(false)
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Malformed XML: {0}")]
    Malformed(String),

    #[error("Expected a {expected} document, found root element '{found}'")]
    UnexpectedRoot { expected: RecordKind, found: String },

    #[error("{0} document has no cdbid attribute")]
    MissingId(RecordKind),

    #[error("Document has no root element")]
    Empty,
}

fn malformed(err: impl std::fmt::Display) -> ParseError {
    ParseError::Malformed(err.to_string())
}

/// Parse an extracted legacy record of `kind`
pub fn parse(kind: RecordKind, document: &ExternalDocument) -> Result<ExternalRecord, ParseError> {
    let mut reader = Reader::from_reader(document.xml().as_bytes());
    let mut state: Option<ParseState> = None;
    let mut stack: Vec<String> = Vec::new();
    let mut text = String::new();

    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(start) => {
                let name = local_name(&start);
                match state.as_mut() {
                    None => state = Some(ParseState::from_root(kind, &name, &start)?),
                    Some(s) => s.on_start(&stack, &name, &start)?,
                }
                stack.push(name);
                text.clear();
            }
            Event::Empty(start) => {
                let name = local_name(&start);
                match state.as_mut() {
                    None => {
                        // A self-closing root carries no content beyond its attributes
                        let s = ParseState::from_root(kind, &name, &start)?;
                        return Ok(s.finish());
                    }
                    Some(s) => {
                        s.on_start(&stack, &name, &start)?;
                        stack.push(name);
                        s.on_end(&stack, "");
                        stack.pop();
                    }
                }
                text.clear();
            }
            Event::Text(t) => text.push_str(&t.unescape().map_err(malformed)?),
            Event::CData(c) => text.push_str(&String::from_utf8_lossy(&c.into_inner())),
            Event::End(_) => {
                if let Some(s) = state.as_mut() {
                    s.on_end(&stack, text.trim());
                }
                stack.pop();
                text.clear();
                if stack.is_empty() {
                    break;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    state.map(ParseState::finish).ok_or(ParseError::Empty)
}

fn local_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).into_owned()
}

fn attr(start: &BytesStart<'_>, name: &str) -> Result<Option<String>, ParseError> {
    attribute(start, name.as_bytes()).map_err(malformed)
}

fn ends_with(stack: &[String], suffix: &[&str]) -> bool {
    stack.len() >= suffix.len()
        && stack[stack.len() - suffix.len()..]
            .iter()
            .zip(suffix)
            .all(|(a, b)| a == b)
}

fn parse_flag(value: Option<String>, default: bool) -> bool {
    match value.as_deref().map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) if v == "true" || v == "1" => true,
        Some(v) if v == "false" || v == "0" => false,
        _ => default,
    }
}

struct ParseState {
    record: ExternalRecord,
    details_seen: usize,
    keyword_visible: bool,
    keyword_children: bool,
    current_file: Option<MediaFile>,
}

impl ParseState {
    fn from_root(kind: RecordKind, name: &str, start: &BytesStart<'_>) -> Result<Self, ParseError> {
        if name != kind.element_name() {
            return Err(ParseError::UnexpectedRoot {
                expected: kind,
                found: name.to_string(),
            });
        }

        let id = attr(start, "cdbid")?
            .and_then(|v| ExternalId::new(v).ok())
            .ok_or(ParseError::MissingId(kind))?;

        Ok(Self {
            record: ExternalRecord {
                id,
                kind,
                external_url: attr(start, "externalurl")?.filter(|u| !u.trim().is_empty()),
                title: None,
                categories: Vec::new(),
                keywords: Vec::new(),
                location_id: None,
                organizer_id: None,
                media: Vec::new(),
            },
            details_seen: 0,
            keyword_visible: true,
            keyword_children: false,
            current_file: None,
        })
    }

    /// Names of the detail list / detail elements for this record kind
    fn detail_names(&self) -> (&'static str, &'static str) {
        match self.record.kind {
            RecordKind::Event => ("details", "detail"),
            RecordKind::Actor => ("actordetails", "actordetail"),
        }
    }

    /// True while inside the first detail element; `stack` excludes the
    /// element being opened or closed
    fn in_first_detail(&self, stack: &[String]) -> bool {
        let (_, detail) = self.detail_names();
        self.details_seen == 1 && stack.iter().any(|n| n == detail)
    }

    fn on_start(&mut self, stack: &[String], name: &str, start: &BytesStart<'_>) -> Result<(), ParseError> {
        let (details, detail) = self.detail_names();
        let parent = stack.last().map(String::as_str);

        match (parent, name) {
            (Some(p), n) if p == details && n == detail => self.details_seen += 1,
            (Some("categories"), "category") => {
                if let Some(id) = attr(start, "catid")? {
                    self.record.categories.push(CategoryRef {
                        id,
                        category_type: attr(start, "type")?,
                    });
                }
            }
            (Some("keywords"), "keyword") => {
                self.keyword_children = true;
                self.keyword_visible = parse_flag(attr(start, "visible")?, true);
            }
            (Some("keywords"), _) => self.keyword_children = true,
            (_, "keywords") if stack.len() == 1 => {
                self.keyword_children = false;
            }
            (Some("media"), "file") if self.in_first_detail(stack) => {
                self.current_file = Some(MediaFile {
                    is_main: parse_flag(attr(start, "main")?, false),
                    ..MediaFile::default()
                });
            }
            (Some("location"), "label") | (Some("location"), "actor") if stack.len() == 2 => {
                if self.record.location_id.is_none() {
                    self.record.location_id =
                        attr(start, "cdbid")?.and_then(|v| ExternalId::new(v).ok());
                }
            }
            (Some("organiser"), "label") | (Some("organiser"), "actor") if stack.len() == 2 => {
                if self.record.organizer_id.is_none() {
                    self.record.organizer_id =
                        attr(start, "cdbid")?.and_then(|v| ExternalId::new(v).ok());
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// `stack` includes the element being closed
    fn on_end(&mut self, stack: &[String], text: &str) {
        let closing = &stack[..stack.len() - 1];
        let (_, detail) = self.detail_names();

        if ends_with(stack, &["keywords", "keyword"]) {
            if !text.is_empty() {
                self.record.keywords.push(Keyword {
                    value: text.to_string(),
                    visible: self.keyword_visible,
                });
            }
            return;
        }

        if stack.len() == 2 && stack[1] == "keywords" {
            // Older schema versions list keywords as `a;b;c` text
            if !self.keyword_children {
                self.record.keywords.extend(
                    text.split(';')
                        .map(str::trim)
                        .filter(|v| !v.is_empty())
                        .map(|v| Keyword {
                            value: v.to_string(),
                            visible: true,
                        }),
                );
            }
            return;
        }

        if !self.in_first_detail(closing) {
            return;
        }

        if ends_with(stack, &[detail, "title"]) {
            if self.record.title.is_none() && !text.is_empty() {
                self.record.title = Some(text.to_string());
            }
            return;
        }

        if ends_with(stack, &["media", "file"]) {
            if let Some(file) = self.current_file.take() {
                if !file.hlink.is_empty() {
                    self.record.media.push(file);
                }
            }
            return;
        }

        if let Some(file) = self.current_file.as_mut() {
            if ends_with(closing, &["media", "file"]) {
                let value = text.to_string();
                match stack.last().map(String::as_str) {
                    Some("hlink") => file.hlink = value,
                    Some("mediatype") => file.media_type = value,
                    Some("filetype") => file.file_type = value,
                    Some("copyright") => file.copyright = Some(value).filter(|v| !v.is_empty()),
                    Some("title") => file.description = Some(value).filter(|v| !v.is_empty()),
                    Some("description") if file.description.is_none() => {
                        file.description = Some(value).filter(|v| !v.is_empty())
                    }
                    _ => {}
                }
            }
        }
    }

    fn finish(self) -> ExternalRecord {
        self.record
    }
}
