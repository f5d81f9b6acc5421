use cdb_common::events::{DomainMessage, Metadata};
use cdb_common::{AggregateKind, ExternalId};

/// Transforms the outgoing message stream before it is written back
pub trait EventStreamDecorator: Send + Sync {
    fn decorate_for_write(
        &self,
        kind: AggregateKind,
        id: &ExternalId,
        stream: Vec<DomainMessage>,
    ) -> Vec<DomainMessage>;
}

/// Adds fixed metadata to every message; values already on a message win
pub struct MetadataEnricher {
    metadata: Metadata,
}

impl MetadataEnricher {
    pub fn new(metadata: Metadata) -> Self {
        Self { metadata }
    }
}

impl EventStreamDecorator for MetadataEnricher {
    fn decorate_for_write(
        &self,
        _kind: AggregateKind,
        _id: &ExternalId,
        stream: Vec<DomainMessage>,
    ) -> Vec<DomainMessage> {
        stream
            .into_iter()
            .map(|mut message| {
                let own = std::mem::take(&mut message.metadata);
                message.metadata = self.metadata.clone().merge(own);
                message
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdb_common::events::DomainEvent;
    use cdb_common::{CredentialContext, TokenCredentials};

    #[test]
    fn test_enricher_keeps_message_values_and_credentials() {
        let service = CredentialContext::new(TokenCredentials::new("service", "s"));
        let user = CredentialContext::new(TokenCredentials::new("user", "u"));
        let enricher = MetadataEnricher::new(
            Metadata::new()
                .with_credentials(service)
                .with_value("origin", serde_json::json!("bridge"))
                .with_value("user_id", serde_json::json!("default")),
        );

        let id = ExternalId::new("e-1").unwrap();
        let with_user = DomainMessage::record_now(
            id.clone(),
            AggregateKind::Event,
            0,
            Metadata::new()
                .with_credentials(user)
                .with_value("user_id", serde_json::json!("u-7")),
            DomainEvent::Deleted,
        );
        let bare = DomainMessage::record_now(id.clone(), AggregateKind::Event, 1, Metadata::new(), DomainEvent::Deleted);

        let out = enricher.decorate_for_write(AggregateKind::Event, &id, vec![with_user, bare]);

        assert_eq!(out[0].metadata.credentials.as_ref().unwrap().token.token, "user");
        assert_eq!(out[0].metadata.get("user_id"), Some(&serde_json::json!("u-7")));
        assert_eq!(out[0].metadata.get("origin"), Some(&serde_json::json!("bridge")));
        assert_eq!(out[1].metadata.credentials.as_ref().unwrap().token.token, "service");
    }
}
