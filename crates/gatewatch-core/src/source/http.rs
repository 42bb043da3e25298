//! HTTP metrics source
//!
//! Posts the [`FetchRequest`] as JSON to a warehouse gateway and expects a
//! JSON array of [`RawEvent`]s back.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::config::SourceConfig;
use crate::error::{Error, Result};
use crate::models::RawEvent;

use super::{FetchRequest, MetricsSource};

/// Metrics source backed by an HTTP endpoint
#[derive(Clone)]
pub struct HttpMetricsSource {
    client: Client,
    url: String,
    api_key: Option<String>,
}

impl HttpMetricsSource {
    /// Create a source posting to `url`
    pub fn new(client: Client, url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            url: url.into(),
            api_key,
        }
    }

    /// Create a source from configuration
    pub fn from_config(config: &SourceConfig, timeout: Duration) -> Result<Self> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| Error::config("source.url is required for the http source"))?;
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self::new(client, url, config.api_key.clone()))
    }
}

#[async_trait]
impl MetricsSource for HttpMetricsSource {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<RawEvent>> {
        let mut call = self.client.post(&self.url).json(request);
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }

        let response = call
            .send()
            .await
            .map_err(|e| Error::upstream("metrics source", e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::upstream(
                "metrics source",
                format!("{} returned {}: {}", self.url, status, body),
            ));
        }

        let rows: Vec<RawEvent> = response.json().await?;
        debug!(service = %request.service, project = %request.project, rows = rows.len(), "Fetched readings");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DateRange, Granularity, ProjectFilter, ServiceType};
    use chrono::{NaiveDate, TimeZone, Utc};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> FetchRequest {
        FetchRequest {
            service: ServiceType::AccessControl,
            project: ProjectFilter::All,
            range: DateRange::day(NaiveDate::from_ymd_opt(2024, 5, 2).unwrap()),
            group_by: Granularity::Day,
        }
    }

    #[tokio::test]
    async fn test_fetch_posts_request_and_parses_rows() {
        let server = MockServer::start().await;
        let ts = Utc.with_ymd_and_hms(2024, 5, 2, 12, 0, 0).unwrap();
        let rows = vec![RawEvent::new("Plaza", "open", ts, 12)];

        Mock::given(method("POST"))
            .and(path("/readings"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(serde_json::json!({
                "service": "access_control",
                "project": "all",
                "group_by": "day",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(&rows))
            .expect(1)
            .mount(&server)
            .await;

        let source = HttpMetricsSource::new(
            Client::new(),
            format!("{}/readings", server.uri()),
            Some("secret".to_string()),
        );

        let fetched = source.fetch(&request()).await.unwrap();

        assert_eq!(fetched, rows);
    }

    #[tokio::test]
    async fn test_server_error_is_upstream_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("warehouse busy"))
            .mount(&server)
            .await;

        let source = HttpMetricsSource::new(Client::new(), server.uri(), None);

        let err = source.fetch(&request()).await.unwrap_err();

        assert!(matches!(err, Error::UpstreamUnavailable { .. }));
        assert!(err.is_transient());
    }
}
