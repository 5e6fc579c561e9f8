//! OneBot-style chat bot notification channel.
//!
//! Pushes plain-text messages through the bot's HTTP API:
//! `POST {endpoint}/send_private_msg` for the entity's `user_id` and
//! `POST {endpoint}/send_group_msg` for its `group_id`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::NotificationChannel;
use crate::notification::events::NotificationEvent;
use crate::utils::http_client;
use crate::{Error, Result};

/// Chat message length cap (characters).
const MESSAGE_LIMIT: usize = 2000;

/// Chat bot channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatBotConfig {
    pub enabled: bool,
    /// Base URL of the bot HTTP API.
    pub endpoint: String,
    /// Bearer token, sent when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for ChatBotConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            access_token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Chat bot notification channel.
pub struct ChatBotChannel {
    config: ChatBotConfig,
    client: Client,
}

impl ChatBotChannel {
    pub fn new(config: ChatBotConfig) -> Self {
        let client = http_client::build_client(Duration::from_secs(config.timeout_secs), None);
        Self { config, client }
    }

    /// Build the message text for an event.
    fn build_message(event: &NotificationEvent) -> String {
        let text = format!("{}\n{}", event.title(), event.description());
        truncate_message(&text, MESSAGE_LIMIT)
    }

    fn url(&self, action: &str) -> String {
        format!("{}/{}", self.config.endpoint.trim_end_matches('/'), action)
    }

    async fn post(&self, action: &str, payload: serde_json::Value) -> Result<()> {
        let mut request = self.client.post(self.url(action)).json(&payload);
        if let Some(token) = &self.config.access_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Other(format!("Chat bot request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(Error::Other(format!(
            "Chat bot {} failed: {} - {}",
            action, status, body
        )))
    }
}

#[async_trait]
impl NotificationChannel for ChatBotChannel {
    fn channel_type(&self) -> &'static str {
        "chat_bot"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.endpoint.is_empty()
    }

    async fn send(&self, event: &NotificationEvent) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        let targets = event.targets();
        if targets.is_empty() {
            debug!(
                entity_id = event.entity_id(),
                "No chat targets for {}, skipping",
                event.event_type()
            );
            return Ok(());
        }

        let message = Self::build_message(event);
        let mut first_error = None;

        if let Some(user_id) = targets.user_id {
            let payload = json!({ "user_id": user_id, "message": message });
            if let Err(e) = self.post("send_private_msg", payload).await {
                first_error.get_or_insert(e);
            }
        }
        if let Some(group_id) = targets.group_id {
            let payload = json!({ "group_id": group_id, "message": message });
            if let Err(e) = self.post("send_group_msg", payload).await {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn truncate_message(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut out: String = text.chars().take(limit.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NotifyTargets;
    use chrono::Utc;

    fn event(targets: NotifyTargets) -> NotificationEvent {
        NotificationEvent::LiveStarted {
            entity_id: 3,
            entity_name: "carol".into(),
            title: "hello".into(),
            targets,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn disabled_without_endpoint() {
        let channel = ChatBotChannel::new(ChatBotConfig {
            enabled: true,
            ..Default::default()
        });
        assert!(!channel.is_enabled());
    }

    #[test]
    fn url_joins_action() {
        let channel = ChatBotChannel::new(ChatBotConfig {
            enabled: true,
            endpoint: "http://127.0.0.1:5700/".into(),
            ..Default::default()
        });
        assert_eq!(
            channel.url("send_group_msg"),
            "http://127.0.0.1:5700/send_group_msg"
        );
    }

    #[test]
    fn message_contains_title_and_body() {
        let text = ChatBotChannel::build_message(&event(NotifyTargets::default()));
        assert_eq!(text, "carol is live\nStream started: hello");
    }

    #[test]
    fn long_messages_are_truncated() {
        let long = "x".repeat(MESSAGE_LIMIT + 10);
        let out = truncate_message(&long, MESSAGE_LIMIT);
        assert_eq!(out.chars().count(), MESSAGE_LIMIT);
        assert!(out.ends_with("..."));
    }

    #[tokio::test]
    async fn no_targets_is_a_noop() {
        let channel = ChatBotChannel::new(ChatBotConfig {
            enabled: true,
            endpoint: "http://127.0.0.1:9".into(),
            timeout_secs: 1,
            ..Default::default()
        });
        channel.send(&event(NotifyTargets::default())).await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_bot_reports_error() {
        let channel = ChatBotChannel::new(ChatBotConfig {
            enabled: true,
            endpoint: "http://127.0.0.1:9".into(),
            timeout_secs: 1,
            ..Default::default()
        });
        let result = channel
            .send(&event(NotifyTargets {
                user_id: Some(1),
                group_id: None,
            }))
            .await;
        assert!(result.is_err());
    }
}
