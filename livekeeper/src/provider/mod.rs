//! Live status provider interface.
//!
//! The provider is an external collaborator: the core polls it and never
//! owns it. Implementations must surface failures as `false` / `None` /
//! empty strings rather than errors, so a flaky platform can never crash a
//! supervisor.

mod http;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use http::HttpStatusProvider;

/// A playable stream source resolved for a live entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSource {
    /// URL handed to the recorder.
    pub playback_url: String,
    /// Quality label of the chosen variant (e.g. "origin", "1080p").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    /// Container format of the variant (e.g. "flv", "hls").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// HTTP headers the recorder must send (user agent, referer, ...).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

impl StreamSource {
    pub fn new(playback_url: impl Into<String>) -> Self {
        Self {
            playback_url: playback_url.into(),
            ..Default::default()
        }
    }
}

/// Polled source of live status for subscribed entities.
#[async_trait]
pub trait LiveStatusProvider: Send + Sync + 'static {
    /// Whether the entity is currently broadcasting.
    async fn is_live(&self, id: u64) -> bool;

    /// Resolve a playable source, or `None` when offline or unresolvable.
    async fn resolve_stream_source(&self, id: u64) -> Option<StreamSource>;

    /// Current stream title, empty when unknown.
    async fn current_title(&self, id: u64) -> String;
}
