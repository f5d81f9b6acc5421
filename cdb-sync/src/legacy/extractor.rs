//! Element extraction from multi-record legacy documents
//!
//! Legacy responses wrap the record of interest in an envelope that may hold
//! many sibling records. The extractor makes one forward pass with a pull
//! parser, copies only the first matching subtree into a standalone document
//! and never materializes the rest.

use cdb_common::{ExternalId, RecordKind};
use quick_xml::events::{BytesDecl, BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::fmt;
use thiserror::Error;

/// Attribute holding the legacy identifier of a record
pub const ID_ATTRIBUTE: &[u8] = b"cdbid";

/// What to extract: the record kind and, optionally, its identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub kind: RecordKind,
    pub id: Option<ExternalId>,
}

impl Selector {
    pub fn new(kind: RecordKind, id: ExternalId) -> Self {
        Self { kind, id: Some(id) }
    }

    /// Match the first element of `kind`, whatever its id
    pub fn first_of(kind: RecordKind) -> Self {
        Self { kind, id: None }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{} with cdbid '{}'", self.kind, id),
            None => write!(f, "first {}", self.kind),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("No {selector} found in document")]
    NotFound { selector: Selector },

    #[error("Malformed XML: {0}")]
    Malformed(String),
}

/// Extract the first element matching `selector` as a standalone XML document
///
/// Namespace declarations in scope at the matched element are copied onto the
/// extracted root so the result parses the same way it did in context.
pub fn extract(document: &[u8], selector: &Selector) -> Result<String, ExtractError> {
    let mut reader = Reader::from_reader(document);
    // Namespace declarations per open ancestor element
    let mut ns_scopes: Vec<Vec<(String, String)>> = Vec::new();

    loop {
        let event = reader.read_event().map_err(malformed)?;
        match event {
            Event::Start(start) => {
                if matches(&start, selector)? {
                    return copy_subtree(&mut reader, &start, &ns_scopes, false);
                }
                ns_scopes.push(namespace_declarations(&start)?);
            }
            Event::Empty(start) => {
                if matches(&start, selector)? {
                    return copy_subtree(&mut reader, &start, &ns_scopes, true);
                }
            }
            Event::End(_) => {
                ns_scopes.pop();
            }
            Event::Eof => {
                return Err(ExtractError::NotFound {
                    selector: selector.clone(),
                })
            }
            _ => {}
        }
    }
}

fn malformed(err: impl fmt::Display) -> ExtractError {
    ExtractError::Malformed(err.to_string())
}

fn matches(start: &BytesStart<'_>, selector: &Selector) -> Result<bool, ExtractError> {
    if start.local_name().as_ref() != selector.kind.element_name().as_bytes() {
        return Ok(false);
    }

    match &selector.id {
        None => Ok(true),
        Some(id) => Ok(attribute(start, ID_ATTRIBUTE)?.as_deref() == Some(id.as_str())),
    }
}

/// Value of the first attribute whose local name is `name`
pub(crate) fn attribute(start: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, ExtractError> {
    for attr in start.attributes() {
        let attr = attr.map_err(malformed)?;
        if attr.key.local_name().as_ref() == name {
            let value = attr.unescape_value().map_err(malformed)?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn namespace_declarations(start: &BytesStart<'_>) -> Result<Vec<(String, String)>, ExtractError> {
    let mut decls = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(malformed)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        if key == "xmlns" || key.starts_with("xmlns:") {
            let value = attr.unescape_value().map_err(malformed)?.into_owned();
            decls.push((key, value));
        }
    }
    Ok(decls)
}

fn copy_subtree(
    reader: &mut Reader<&[u8]>,
    start: &BytesStart<'_>,
    ns_scopes: &[Vec<(String, String)>],
    empty: bool,
) -> Result<String, ExtractError> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(malformed)?;

    let root = with_inherited_namespaces(start, ns_scopes)?;
    if empty {
        writer.write_event(Event::Empty(root)).map_err(malformed)?;
        return finish(writer);
    }
    writer.write_event(Event::Start(root)).map_err(malformed)?;

    let mut depth = 1usize;
    while depth > 0 {
        let event = reader.read_event().map_err(malformed)?;
        match &event {
            Event::Start(_) => depth += 1,
            Event::End(_) => depth -= 1,
            Event::Eof => {
                return Err(ExtractError::Malformed(
                    "document ended inside the extracted element".to_string(),
                ))
            }
            _ => {}
        }
        writer.write_event(event).map_err(malformed)?;
    }

    finish(writer)
}

fn finish(writer: Writer<Vec<u8>>) -> Result<String, ExtractError> {
    String::from_utf8(writer.into_inner()).map_err(malformed)
}

/// Copy of `start` carrying every in-scope namespace declaration it lacks
fn with_inherited_namespaces(
    start: &BytesStart<'_>,
    ns_scopes: &[Vec<(String, String)>],
) -> Result<BytesStart<'static>, ExtractError> {
    let own: Vec<String> = namespace_declarations(start)?
        .into_iter()
        .map(|(key, _)| key)
        .collect();

    // Innermost declaration of a prefix wins
    let mut inherited: Vec<(String, String)> = Vec::new();
    for (key, value) in ns_scopes.iter().flatten() {
        if own.contains(key) {
            continue;
        }
        match inherited.iter_mut().find(|(k, _)| k == key) {
            Some(existing) => existing.1 = value.clone(),
            None => inherited.push((key.clone(), value.clone())),
        }
    }

    let mut root = start.to_owned();
    for (key, value) in &inherited {
        root.push_attribute((key.as_str(), value.as_str()));
    }
    Ok(root)
}
