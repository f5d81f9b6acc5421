//! Identifiers shared by the legacy system and the aggregate store

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Opaque key a legacy record is addressed by (the legacy `cdbid`)
///
/// The same value addresses the local aggregate, so one external id maps to
/// at most one local aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalId(String);

impl ExternalId {
    /// Create an identifier, rejecting empty or whitespace-only values
    pub fn new(value: impl Into<String>) -> crate::Result<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("external id must not be empty".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ExternalId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for ExternalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The two disjoint shapes of legacy documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Actor,
    Event,
}

impl RecordKind {
    /// Local element name of the record in legacy XML
    pub fn element_name(&self) -> &'static str {
        match self {
            RecordKind::Actor => "actor",
            RecordKind::Event => "event",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.element_name())
    }
}

impl FromStr for RecordKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "actor" => Ok(RecordKind::Actor),
            "event" => Ok(RecordKind::Event),
            other => Err(Error::InvalidInput(format!("unknown record kind: {}", other))),
        }
    }
}

/// Local aggregate types fed from the legacy system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateKind {
    Event,
    Place,
    Organizer,
}

impl AggregateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateKind::Event => "event",
            AggregateKind::Place => "place",
            AggregateKind::Organizer => "organizer",
        }
    }
}

impl fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregateKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "event" => Ok(AggregateKind::Event),
            "place" => Ok(AggregateKind::Place),
            "organizer" => Ok(AggregateKind::Organizer),
            other => Err(Error::InvalidInput(format!("unknown aggregate kind: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_id_trims_and_rejects_blank() {
        assert_eq!(ExternalId::new("  abc ").unwrap().as_str(), "abc");
        assert!(ExternalId::new("   ").is_err());
    }

    #[test]
    fn test_record_kind_parse() {
        assert_eq!("Actor".parse::<RecordKind>().unwrap(), RecordKind::Actor);
        assert_eq!("event".parse::<RecordKind>().unwrap(), RecordKind::Event);
        assert!("place".parse::<RecordKind>().is_err());
    }

    #[test]
    fn test_aggregate_kind_roundtrip_str() {
        for kind in [AggregateKind::Event, AggregateKind::Place, AggregateKind::Organizer] {
            assert_eq!(kind.as_str().parse::<AggregateKind>().unwrap(), kind);
        }
    }
}
