//! Live status provider backed by a JSON status sidecar.
//!
//! The sidecar owns the platform scraping; this adapter only speaks
//! `GET {endpoint}/{id}` and maps every failure to "not live".

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{LiveStatusProvider, StreamSource};
use crate::utils::http_client;

/// Response body of the status sidecar.
#[derive(Debug, Clone, Default, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    live: bool,
    #[serde(default)]
    title: String,
    #[serde(default)]
    playback_url: Option<String>,
    #[serde(default)]
    quality: Option<String>,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    headers: HashMap<String, String>,
}

impl StatusResponse {
    fn into_source(self) -> Option<StreamSource> {
        if !self.live {
            return None;
        }
        let url = self.playback_url.filter(|u| !u.trim().is_empty())?;
        Some(StreamSource {
            playback_url: url,
            quality: self.quality,
            format: self.format,
            headers: self.headers,
        })
    }
}

/// HTTP client for the status sidecar.
pub struct HttpStatusProvider {
    endpoint: String,
    client: Client,
}

impl HttpStatusProvider {
    /// Create a provider for `endpoint` (trailing slashes are ignored).
    pub fn new(endpoint: impl Into<String>, timeout: Duration, user_agent: Option<&str>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client: http_client::build_client(timeout, user_agent),
        }
    }

    fn url_for(&self, id: u64) -> String {
        format!("{}/{}", self.endpoint, id)
    }

    async fn fetch(&self, id: u64) -> Option<StatusResponse> {
        let url = self.url_for(id);
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(entity_id = id, error = %e, "Status request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(entity_id = id, status = %response.status(), "Status request rejected");
            return None;
        }

        match response.json::<StatusResponse>().await {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(entity_id = id, error = %e, "Malformed status response");
                None
            }
        }
    }
}

#[async_trait]
impl LiveStatusProvider for HttpStatusProvider {
    async fn is_live(&self, id: u64) -> bool {
        let live = self.fetch(id).await.map(|s| s.live).unwrap_or(false);
        debug!(entity_id = id, live, "Polled live status");
        live
    }

    async fn resolve_stream_source(&self, id: u64) -> Option<StreamSource> {
        self.fetch(id).await.and_then(StatusResponse::into_source)
    }

    async fn current_title(&self, id: u64) -> String {
        self.fetch(id).await.map(|s| s.title).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_trailing_slash_is_trimmed() {
        let provider =
            HttpStatusProvider::new("http://localhost:9000/status/", Duration::from_secs(1), None);
        assert_eq!(provider.url_for(12), "http://localhost:9000/status/12");
    }

    #[test]
    fn offline_response_has_no_source() {
        let status: StatusResponse =
            serde_json::from_str(r#"{"live": false, "playback_url": "http://x/y.flv"}"#).unwrap();
        assert!(status.into_source().is_none());
    }

    #[test]
    fn live_response_without_url_has_no_source() {
        let status: StatusResponse =
            serde_json::from_str(r#"{"live": true, "playback_url": "  "}"#).unwrap();
        assert!(status.into_source().is_none());
    }

    #[test]
    fn live_response_maps_variant_metadata() {
        let status: StatusResponse = serde_json::from_str(
            r#"{"live": true, "title": "hi", "playback_url": "http://cdn/a.flv",
                "quality": "origin", "format": "flv", "headers": {"Referer": "http://site"}}"#,
        )
        .unwrap();
        let source = status.into_source().unwrap();
        assert_eq!(source.playback_url, "http://cdn/a.flv");
        assert_eq!(source.quality.as_deref(), Some("origin"));
        assert_eq!(source.headers.get("Referer").map(String::as_str), Some("http://site"));
    }

    #[tokio::test]
    async fn unreachable_sidecar_reports_offline() {
        // Port 9 (discard) on localhost is closed in test environments.
        let provider =
            HttpStatusProvider::new("http://127.0.0.1:9", Duration::from_millis(500), None);
        assert!(!provider.is_live(1).await);
        assert!(provider.resolve_stream_source(1).await.is_none());
        assert_eq!(provider.current_title(1).await, "");
    }
}
