//! Notification channels.
//!
//! - Structured log lines (desktop toast stand-in)
//! - OneBot-style chat bot HTTP API

mod chat_bot;
mod log;

pub use chat_bot::{ChatBotChannel, ChatBotConfig};
pub use log::LogChannel;

use async_trait::async_trait;

use super::events::NotificationEvent;
use crate::Result;

/// Trait for notification channels.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Get the channel type name.
    fn channel_type(&self) -> &'static str;

    /// Check if the channel is enabled.
    fn is_enabled(&self) -> bool;

    /// Send a notification through this channel.
    async fn send(&self, event: &NotificationEvent) -> Result<()>;
}
