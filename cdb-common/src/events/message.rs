//! Domain messages: a domain event plus the metadata it was recorded with

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::domain::DomainEvent;
use crate::{AggregateKind, CredentialContext, ExternalId};

/// Metadata travelling with a domain message
///
/// Credentials are explicit rather than hidden in the free-form values so
/// that write-back handlers can resolve them without string lookups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<CredentialContext>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<String, serde_json::Value>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(mut self, credentials: CredentialContext) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_value(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    /// Merge `other` into `self`; values and credentials in `other` win
    pub fn merge(mut self, other: Metadata) -> Self {
        if other.credentials.is_some() {
            self.credentials = other.credentials;
        }
        self.values.extend(other.values);
        self
    }
}

/// One recorded domain event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainMessage {
    pub id: Uuid,
    pub aggregate_id: ExternalId,
    pub aggregate_kind: AggregateKind,
    /// Zero-based position of this event in the aggregate's stream
    pub playhead: i64,
    pub metadata: Metadata,
    pub payload: DomainEvent,
    pub recorded_on: DateTime<Utc>,
}

impl DomainMessage {
    pub fn record_now(
        aggregate_id: ExternalId,
        aggregate_kind: AggregateKind,
        playhead: i64,
        metadata: Metadata,
        payload: DomainEvent,
    ) -> Self {
        Self {
            id: crate::uuid_utils::generate(),
            aggregate_id,
            aggregate_kind,
            playhead,
            metadata,
            payload,
            recorded_on: Utc::now(),
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TokenCredentials;

    #[test]
    fn test_merge_prefers_other() {
        let base = Metadata::new()
            .with_value("a", serde_json::json!(1))
            .with_value("b", serde_json::json!(2));
        let other = Metadata::new()
            .with_value("b", serde_json::json!(3))
            .with_credentials(CredentialContext::new(TokenCredentials::new("t", "s")));

        let merged = base.merge(other);
        assert_eq!(merged.get("a"), Some(&serde_json::json!(1)));
        assert_eq!(merged.get("b"), Some(&serde_json::json!(3)));
        assert!(merged.credentials.is_some());
    }

    #[test]
    fn test_merge_keeps_credentials_when_other_has_none() {
        let base = Metadata::new()
            .with_credentials(CredentialContext::new(TokenCredentials::new("t", "s")));
        let merged = base.merge(Metadata::new().with_value("x", serde_json::json!("y")));
        assert_eq!(merged.credentials.unwrap().token.token, "t");
    }
}
