//! Mock legacy system (wiremock) and legacy XML fixtures

use cdb_common::config::BridgeConfig;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cdb_sync::legacy::HttpRecordFetcher;
use cdb_sync::sync_back::HttpLegacyClientFactory;

pub const NS: &str = "http://www.cultuurdatabank.com/XMLSchema/CdbXSD/3.3/FINAL";

/// Wrap records in the legacy multi-record envelope
pub fn envelope(records: &[String]) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<cdbxml xmlns="{}">
{}
</cdbxml>"#,
        NS,
        records.join("\n")
    )
}

/// Event record with two keywords and an optional location reference
pub fn event_xml(id: &str, title: &str, location: Option<&str>) -> String {
    let location = location
        .map(|l| format!(r#"<location><label cdbid="{}">Zaal</label></location>"#, l))
        .unwrap_or_default();
    format!(
        r#"<event cdbid="{id}">
  <details><detail lang="nl"><title>{title}</title></detail></details>
  <keywords><keyword visible="true">Zomer</keyword><keyword visible="false">Intern</keyword></keywords>
  {location}
</event>"#
    )
}

/// Actor record; `place` adds the place category
pub fn actor_xml(id: &str, title: &str, place: bool) -> String {
    let categories = if place {
        r#"<categories><category catid="8.15.0.0.0" type="actortype">Locatie</category></categories>"#
    } else {
        ""
    };
    format!(
        r#"<actor cdbid="{id}">
  <actordetails><actordetail lang="nl"><title>{title}</title></actordetail></actordetails>
  {categories}
</actor>"#
    )
}

pub struct LegacyMock {
    pub server: MockServer,
}

impl LegacyMock {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Configuration pointing every legacy URL at the mock server
    pub fn config(&self) -> BridgeConfig {
        let uri = self.server.uri();
        let mut config = BridgeConfig::default();
        config.legacy.event_url_template = format!("{}/event/{{id}}", uri);
        config.legacy.actor_url_template = format!("{}/actor/{{id}}", uri);
        config.legacy.write_base_url = format!("{}/write", uri);
        config.legacy.namespace_uri = NS.to_string();
        config.legacy.consumer_key = Some("app-key".to_string());
        config.legacy.consumer_secret = Some("app-secret".to_string());
        config.legacy.request_timeout_secs = 5;
        config.import.fetch_min_interval_ms = 0;
        config
    }

    pub fn fetcher(&self) -> Arc<HttpRecordFetcher> {
        Arc::new(HttpRecordFetcher::new(&self.config().legacy, 0).unwrap())
    }

    pub fn client_factory(&self) -> Arc<HttpLegacyClientFactory> {
        Arc::new(HttpLegacyClientFactory::new(&self.config().legacy).unwrap())
    }

    /// Serve `body` for GET /event/{id}
    pub async fn mount_event(&self, id: &str, body: String) {
        self.mount(format!("/event/{}", id), body).await;
    }

    /// Serve `body` for GET /actor/{id}
    pub async fn mount_actor(&self, id: &str, body: String) {
        self.mount(format!("/actor/{}", id), body).await;
    }

    async fn mount(&self, route: String, body: String) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/xml")
                    .set_body_string(body),
            )
            .mount(&self.server)
            .await;
    }
}
