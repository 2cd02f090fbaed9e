// src/source/battlemetrics.rs
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;

use crate::config::Config;
use crate::models::server::{SearchHit, ServerSnapshot, ServerStatus};
use super::{ServerSource, SourceError};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Attributes {
    #[serde(default)]
    players: Option<u32>,
    #[serde(default)]
    max_players: Option<u32>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    ip: Option<String>,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    rank: Option<u32>,
    #[serde(default)]
    game: Option<String>,
}

impl From<Attributes> for ServerSnapshot {
    fn from(a: Attributes) -> Self {
        Self {
            players: a.players.unwrap_or(0),
            max_players: a.max_players.unwrap_or(0),
            name: a.name.unwrap_or_else(|| "Unknown".to_string()),
            status: ServerStatus::parse(a.status.as_deref().unwrap_or("offline")),
            ip: a.ip,
            port: a.port,
            country: a.country,
            rank: a.rank,
            game: a.game,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Resource {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    attributes: Attributes,
}

#[derive(Debug, Deserialize)]
struct Document<T> {
    data: T,
}

/// BattleMetrics REST client. One instance per process; the inner
/// `reqwest::Client` pools connections across every call.
pub struct BattleMetricsClient {
    http: Client,
    base_url: String,
}

impl BattleMetricsClient {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(config.fetch_timeout())
            .user_agent(concat!("bmsync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: config.battlemetrics_url.trim_end_matches('/').to_string(),
        })
    }

    fn authorized(&self, request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn try_fetch(&self, server_id: &str, token: Option<&str>) -> Result<ServerSnapshot, SourceError> {
        let url = format!("{}/servers/{}", self.base_url, server_id);
        let response = self.authorized(self.http.get(&url), token).send().await?;

        match response.status() {
            StatusCode::OK => {
                let doc = response.json::<Document<Resource>>().await?;
                Ok(doc.data.attributes.into())
            }
            StatusCode::TOO_MANY_REQUESTS => Err(SourceError::RateLimited),
            status => Err(SourceError::Status(status.as_u16())),
        }
    }
}

#[async_trait]
impl ServerSource for BattleMetricsClient {
    async fn fetch(&self, server_id: &str, token: Option<&str>) -> Option<ServerSnapshot> {
        match self.try_fetch(server_id, token).await {
            Ok(snapshot) => {
                debug!("Fetched server {}: {}/{} {}", server_id, snapshot.players, snapshot.max_players, snapshot.status);
                Some(snapshot)
            }
            Err(SourceError::Http(e)) if e.is_timeout() => {
                warn!("Timeout fetching server {}", server_id);
                None
            }
            Err(e) => {
                warn!("Error fetching server {}: {}", server_id, e);
                None
            }
        }
    }

    async fn search(
        &self,
        query: &str,
        game: &str,
        page_size: u32,
        token: Option<&str>,
    ) -> Result<Vec<SearchHit>, SourceError> {
        let url = format!("{}/servers", self.base_url);
        let page_size = page_size.to_string();
        let request = self.http.get(&url).query(&[
            ("filter[search]", query),
            ("filter[game]", game),
            ("page[size]", page_size.as_str()),
        ]);
        let response = self.authorized(request, token).send().await?;

        match response.status() {
            StatusCode::OK => {
                let doc = response.json::<Document<Vec<Resource>>>().await?;
                Ok(doc
                    .data
                    .into_iter()
                    .map(|r| SearchHit {
                        id: r.id.unwrap_or_else(|| "Unknown".to_string()),
                        snapshot: r.attributes.into(),
                    })
                    .collect())
            }
            StatusCode::TOO_MANY_REQUESTS => Err(SourceError::RateLimited),
            status => Err(SourceError::Status(status.as_u16())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, timeout_secs: u64) -> BattleMetricsClient {
        let config = Config {
            battlemetrics_url: server.uri(),
            fetch_timeout_secs: timeout_secs,
            ..Config::default()
        };
        BattleMetricsClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn parses_attributes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/servers/123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "id": "123", "attributes": {
                    "players": 12, "maxPlayers": 64, "name": "Alpha", "status": "online",
                    "ip": "1.2.3.4", "port": 7787, "country": "DE", "rank": 42
                }}
            })))
            .mount(&server)
            .await;

        let snapshot = client_for(&server, 30).fetch("123", None).await.unwrap();
        assert_eq!(snapshot.players, 12);
        assert_eq!(snapshot.max_players, 64);
        assert_eq!(snapshot.name, "Alpha");
        assert_eq!(snapshot.status, ServerStatus::Online);
        assert_eq!(snapshot.port, Some(7787));
        assert_eq!(snapshot.rank, Some(42));
    }

    #[tokio::test]
    async fn missing_fields_fall_back_to_sentinels() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/servers/9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "attributes": { "players": null } }
            })))
            .mount(&server)
            .await;

        let snapshot = client_for(&server, 30).fetch("9", None).await.unwrap();
        assert_eq!(snapshot.players, 0);
        assert_eq!(snapshot.max_players, 0);
        assert_eq!(snapshot.name, "Unknown");
        assert!(snapshot.is_offline());
    }

    #[tokio::test]
    async fn sends_bearer_token_when_configured() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/servers/1"))
            .and(header("Authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "attributes": { "name": "Authed", "status": "online" } }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let snapshot = client_for(&server, 30).fetch("1", Some("secret")).await.unwrap();
        assert_eq!(snapshot.name, "Authed");
    }

    #[tokio::test]
    async fn rate_limit_and_errors_are_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/servers/limited"))
            .respond_with(ResponseTemplate::new(429))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/servers/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/servers/garbage"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = client_for(&server, 30);
        assert!(client.fetch("limited", None).await.is_none());
        assert!(client.fetch("broken", None).await.is_none());
        assert!(client.fetch("garbage", None).await.is_none());
    }

    #[tokio::test]
    async fn timeout_is_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/servers/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        assert!(client_for(&server, 1).fetch("slow", None).await.is_none());
    }

    #[tokio::test]
    async fn search_maps_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/servers"))
            .and(query_param("filter[search]", "alpha"))
            .and(query_param("filter[game]", "squad"))
            .and(query_param("page[size]", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "id": "1", "attributes": { "name": "Alpha 1", "players": 3, "maxPlayers": 80, "status": "online" } },
                    { "id": "2", "attributes": { "name": "Alpha 2", "status": "dead" } }
                ]
            })))
            .mount(&server)
            .await;

        let hits = client_for(&server, 30).search("alpha", "squad", 10, None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "1");
        assert_eq!(hits[0].snapshot.max_players, 80);
        assert_eq!(hits[1].snapshot.status, ServerStatus::Dead);
    }

    #[tokio::test]
    async fn search_surfaces_status_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/servers"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server, 30).search("x", "squad", 10, None).await.unwrap_err();
        assert!(matches!(err, SourceError::Status(503)));
    }
}
