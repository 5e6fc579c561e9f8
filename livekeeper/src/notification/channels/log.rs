//! Log-only notification channel.

use async_trait::async_trait;
use tracing::info;

use super::NotificationChannel;
use crate::Result;
use crate::notification::events::NotificationEvent;

/// Emits every event as a structured `info` line.
#[derive(Debug, Clone, Default)]
pub struct LogChannel {
    enabled: bool,
}

impl LogChannel {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

#[async_trait]
impl NotificationChannel for LogChannel {
    fn channel_type(&self) -> &'static str {
        "log"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn send(&self, event: &NotificationEvent) -> Result<()> {
        info!(
            target: "livekeeper::notify",
            event_type = event.event_type(),
            entity_id = event.entity_id(),
            title = %event.title(),
            at = %event.timestamp(),
            "{}",
            event.description()
        );
        Ok(())
    }
}
