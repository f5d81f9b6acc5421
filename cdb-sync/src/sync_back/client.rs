//! Legacy write API clients

use async_trait::async_trait;
use cdb_common::config::LegacyConfig;
use cdb_common::{AggregateKind, ConsumerCredentials, CredentialContext, TokenCredentials};
use reqwest::Method;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::calls::{LegacyWriteCall, WriteAction};
use super::SyncBackError;

/// Credentials a call is made with, after resolving message and configured
/// application credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCredentials {
    pub token: TokenCredentials,
    pub consumer: ConsumerCredentials,
}

impl ResolvedCredentials {
    /// Message consumer credentials win over the configured ones; a message
    /// without a token cannot be written back
    pub fn resolve(
        context: Option<&CredentialContext>,
        configured: Option<&ConsumerCredentials>,
    ) -> Result<Self, SyncBackError> {
        let context = context.ok_or(SyncBackError::MissingCredentials("no user token on message"))?;
        let consumer = context
            .consumer
            .as_ref()
            .or(configured)
            .ok_or(SyncBackError::MissingCredentials("no consumer credentials configured"))?;

        Ok(Self {
            token: context.token.clone(),
            consumer: consumer.clone(),
        })
    }
}

/// Write surface of the legacy system
#[async_trait]
pub trait LegacyWriteApi: Send + Sync {
    async fn send(&self, call: &LegacyWriteCall) -> Result<(), SyncBackError>;
}

/// Builds write clients acting on behalf of given credentials
pub trait LegacyClientFactory: Send + Sync {
    fn client_for(&self, credentials: &ResolvedCredentials) -> Arc<dyn LegacyWriteApi>;
}

/// HTTP factory sharing one connection pool across clients
pub struct HttpLegacyClientFactory {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpLegacyClientFactory {
    pub fn new(config: &LegacyConfig) -> Result<Self, SyncBackError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| SyncBackError::RemoteCall(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.write_base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl LegacyClientFactory for HttpLegacyClientFactory {
    fn client_for(&self, credentials: &ResolvedCredentials) -> Arc<dyn LegacyWriteApi> {
        Arc::new(HttpLegacyWriteApi {
            http_client: self.http_client.clone(),
            base_url: self.base_url.clone(),
            credentials: credentials.clone(),
        })
    }
}

pub struct HttpLegacyWriteApi {
    http_client: reqwest::Client,
    base_url: String,
    credentials: ResolvedCredentials,
}

enum Body {
    None,
    Json(serde_json::Value),
    Xml(String),
}

/// Legacy path segment for an aggregate kind: places and organizers are actors
fn entity_path(kind: AggregateKind) -> &'static str {
    match kind {
        AggregateKind::Event => "event",
        AggregateKind::Place | AggregateKind::Organizer => "actor",
    }
}

fn json<T: serde::Serialize>(value: &T) -> Result<Body, SyncBackError> {
    serde_json::to_value(value)
        .map(Body::Json)
        .map_err(|e| SyncBackError::RemoteCall(e.to_string()))
}

/// HTTP method, path (relative to the base URL), query and body of a call
fn route(call: &LegacyWriteCall) -> Result<(Method, String, Vec<(&'static str, String)>, Body), SyncBackError> {
    let entity = entity_path(call.kind);
    let item = format!("/{}/{}", entity, call.id);
    let mut query = Vec::new();

    let (method, path, body) = match &call.action {
        WriteAction::CreateItem { .. } => (Method::POST, format!("/{}", entity), json(&call.action)?),
        WriteAction::CreateFromRawXml { xml } => (Method::POST, format!("/{}", entity), Body::Xml(xml.clone())),
        WriteAction::UpdateFromRawXml { xml } => (Method::PUT, item, Body::Xml(xml.clone())),
        WriteAction::DeleteItem => (Method::DELETE, item, Body::None),
        WriteAction::UpdateMajorInfo { .. } => (Method::PUT, item, json(&call.action)?),
        WriteAction::UpdateDescription { language, description } => {
            query.push(("lang", language.clone()));
            (
                Method::PUT,
                format!("{}/description", item),
                json(&serde_json::json!({ "description": description }))?,
            )
        }
        WriteAction::DeleteDescription { language } => {
            query.push(("lang", language.clone()));
            (Method::DELETE, format!("{}/description", item), Body::None)
        }
        WriteAction::UpdateAgeRange { range } => (
            Method::PUT,
            format!("{}/age", item),
            json(&serde_json::json!({ "age": range }))?,
        ),
        WriteAction::DeleteAgeRange => (Method::DELETE, format!("{}/age", item), Body::None),
        WriteAction::UpdateOrganizer { organizer_name } => (
            Method::PUT,
            format!("{}/organiser", item),
            json(&serde_json::json!({ "organiser": organizer_name }))?,
        ),
        WriteAction::DeleteOrganizer => (Method::DELETE, format!("{}/organiser", item), Body::None),
        WriteAction::UpdateContactInfo { contact_point } => {
            (Method::PUT, format!("{}/contactinfo", item), json(contact_point)?)
        }
        WriteAction::UpdateBookingInfo { booking_info } => {
            (Method::PUT, format!("{}/bookinginfo", item), json(booking_info)?)
        }
        WriteAction::AddKeywords { labels } => (Method::POST, format!("{}/keywords", item), json(labels)?),
        WriteAction::DeleteKeyword { keyword } => {
            query.push(("keyword", keyword.clone()));
            (Method::DELETE, format!("{}/keywords", item), Body::None)
        }
        WriteAction::TranslateTitle { language, .. }
        | WriteAction::TranslateDescription { language, .. }
        | WriteAction::Translate { language, .. } => (
            Method::POST,
            format!("{}/translations/{}", item, language),
            json(&call.action)?,
        ),
        WriteAction::DeleteTranslation { language } => (
            Method::DELETE,
            format!("{}/translations/{}", item, language),
            Body::None,
        ),
        WriteAction::AddImage { image } => (Method::POST, format!("{}/images", item), json(image)?),
        WriteAction::UpdateImage { media_object_id, .. } => (
            Method::PUT,
            format!("{}/images/{}", item, media_object_id),
            json(&call.action)?,
        ),
        WriteAction::RemoveImage { media_object_id } => (
            Method::DELETE,
            format!("{}/images/{}", item, media_object_id),
            Body::None,
        ),
        WriteAction::SelectMainImage { media_object_id } => (
            Method::PUT,
            format!("{}/images/main/{}", item, media_object_id),
            Body::None,
        ),
    };

    Ok((method, path, query, body))
}

#[async_trait]
impl LegacyWriteApi for HttpLegacyWriteApi {
    async fn send(&self, call: &LegacyWriteCall) -> Result<(), SyncBackError> {
        let (method, path, query, body) = route(call)?;
        let url = format!("{}{}", self.base_url, path);

        let mut request = self
            .http_client
            .request(method.clone(), &url)
            .bearer_auth(&self.credentials.token.token)
            .header("X-Consumer-Key", &self.credentials.consumer.key);

        if !query.is_empty() {
            request = request.query(&query);
        }

        request = match body {
            Body::None => request,
            Body::Json(value) => request.json(&value),
            Body::Xml(xml) => request
                .header(reqwest::header::CONTENT_TYPE, "application/xml")
                .body(xml),
        };

        let started = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|e| SyncBackError::RemoteCall(e.to_string()))?;
        let status = response.status();

        tracing::debug!(
            id = %call.id,
            action = call.action.name(),
            method = %method,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Legacy write call completed"
        );

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SyncBackError::Rejected {
                status: status.as_u16(),
                message: error_text,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdb_common::ExternalId;

    fn call(kind: AggregateKind, action: WriteAction) -> LegacyWriteCall {
        LegacyWriteCall {
            kind,
            id: ExternalId::new("i-1").unwrap(),
            action,
        }
    }

    #[test]
    fn test_resolve_prefers_message_consumer() {
        let configured = ConsumerCredentials::new("app", "app-secret");
        let context = CredentialContext::new(TokenCredentials::new("tok", "s"))
            .with_consumer(ConsumerCredentials::new("other-app", "x"));

        let resolved = ResolvedCredentials::resolve(Some(&context), Some(&configured)).unwrap();
        assert_eq!(resolved.consumer.key, "other-app");

        let plain = CredentialContext::new(TokenCredentials::new("tok", "s"));
        let resolved = ResolvedCredentials::resolve(Some(&plain), Some(&configured)).unwrap();
        assert_eq!(resolved.consumer.key, "app");
    }

    #[test]
    fn test_resolve_requires_token_and_consumer() {
        assert!(matches!(
            ResolvedCredentials::resolve(None, Some(&ConsumerCredentials::new("a", "b"))),
            Err(SyncBackError::MissingCredentials(_))
        ));

        let plain = CredentialContext::new(TokenCredentials::new("tok", "s"));
        assert!(matches!(
            ResolvedCredentials::resolve(Some(&plain), None),
            Err(SyncBackError::MissingCredentials(_))
        ));
    }

    #[test]
    fn test_routes() {
        let (method, path, _, _) = route(&call(AggregateKind::Place, WriteAction::DeleteItem)).unwrap();
        assert_eq!((method, path.as_str()), (Method::DELETE, "/actor/i-1"));

        let (method, path, query, _) = route(&call(
            AggregateKind::Event,
            WriteAction::DeleteKeyword {
                keyword: "Jazz".to_string(),
            },
        ))
        .unwrap();
        assert_eq!(method, Method::DELETE);
        assert_eq!(path, "/event/i-1/keywords");
        assert_eq!(query, vec![("keyword", "Jazz".to_string())]);

        let (method, path, _, body) = route(&call(
            AggregateKind::Event,
            WriteAction::CreateFromRawXml {
                xml: "<event/>".to_string(),
            },
        ))
        .unwrap();
        assert_eq!((method, path.as_str()), (Method::POST, "/event"));
        assert!(matches!(body, Body::Xml(_)));
    }
}
