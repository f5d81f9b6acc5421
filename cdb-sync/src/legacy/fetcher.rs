//! Legacy record fetcher
//!
//! Retrieves one record by id and kind from the legacy system and hands back
//! a standalone [`ExternalDocument`]. No retries at this layer: callers decide
//! what a failed fetch means.

use async_trait::async_trait;
use cdb_common::config::LegacyConfig;
use cdb_common::{ExternalId, RecordKind};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

use super::extractor::{self, ExtractError, Selector};
use super::record::ExternalDocument;

const USER_AGENT: &str = concat!("cdb-sync/", env!("CARGO_PKG_VERSION"));
const ID_PLACEHOLDER: &str = "{id}";

/// Everything outside the RFC 3986 unreserved set is escaped
const ID_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Any non-200 answer. The legacy system is not consistent about 404
    /// vs. other codes for missing records.
    #[error("{kind} {id} not found at {url} (HTTP {status})")]
    RecordNotFound {
        url: String,
        kind: RecordKind,
        id: ExternalId,
        status: u16,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error(transparent)]
    Extract(#[from] ExtractError),
}

/// Source of legacy documents
#[async_trait]
pub trait RecordFetcher: Send + Sync {
    async fn fetch(&self, id: &ExternalId, kind: RecordKind) -> Result<ExternalDocument, FetchError>;
}

/// Minimum spacing between consecutive requests
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    async fn wait(&self) {
        if self.min_interval.is_zero() {
            return;
        }

        let mut last = self.last_request.lock().await;
        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// [`RecordFetcher`] over HTTP
pub struct HttpRecordFetcher {
    http_client: reqwest::Client,
    event_url_template: String,
    actor_url_template: String,
    namespace_uri: String,
    rate_limiter: Arc<RateLimiter>,
}

impl HttpRecordFetcher {
    pub fn new(config: &LegacyConfig, fetch_min_interval_ms: u64) -> Result<Self, FetchError> {
        for template in [&config.event_url_template, &config.actor_url_template] {
            if !template.contains(ID_PLACEHOLDER) {
                return Err(FetchError::Configuration(format!(
                    "URL template has no {} placeholder: {}",
                    ID_PLACEHOLDER, template
                )));
            }
        }

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            event_url_template: config.event_url_template.clone(),
            actor_url_template: config.actor_url_template.clone(),
            namespace_uri: config.namespace_uri.clone(),
            rate_limiter: Arc::new(RateLimiter::new(fetch_min_interval_ms)),
        })
    }

    /// URL of record `id` of `kind`
    pub fn url_for(&self, id: &ExternalId, kind: RecordKind) -> String {
        let template = match kind {
            RecordKind::Event => &self.event_url_template,
            RecordKind::Actor => &self.actor_url_template,
        };
        template.replace(ID_PLACEHOLDER, &utf8_percent_encode(id.as_str(), ID_SEGMENT).to_string())
    }
}

#[async_trait]
impl RecordFetcher for HttpRecordFetcher {
    async fn fetch(&self, id: &ExternalId, kind: RecordKind) -> Result<ExternalDocument, FetchError> {
        self.rate_limiter.wait().await;

        let url = self.url_for(id, kind);
        tracing::debug!(id = %id, kind = %kind, url = %url, "Fetching legacy record");

        let started = Instant::now();
        let response = self
            .http_client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/xml")
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        tracing::debug!(id = %id, status = status.as_u16(), elapsed_ms, "Legacy fetch completed");

        if status != reqwest::StatusCode::OK {
            tracing::error!(
                id = %id,
                kind = %kind,
                url = %url,
                status = status.as_u16(),
                "Legacy record could not be retrieved"
            );
            return Err(FetchError::RecordNotFound {
                url,
                kind,
                id: id.clone(),
                status: status.as_u16(),
            });
        }

        let xml = extractor::extract(&body, &Selector::new(kind, id.clone()))?;
        Ok(ExternalDocument::new(xml, self.namespace_uri.clone()))
    }
}

/// Identifier of the record a notification URL points at (its last path
/// segment, unescaped)
pub fn id_from_notification_url(url: &str) -> Option<ExternalId> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let id = percent_decode_str(segment).decode_utf8().ok()?;
    ExternalId::new(id.into_owned()).ok()
}
