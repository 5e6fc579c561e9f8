//! Notification events, channels and dispatch.

pub mod channels;
pub mod events;
mod service;

pub use channels::{ChatBotChannel, ChatBotConfig, LogChannel, NotificationChannel};
pub use events::NotificationEvent;
pub use service::NotificationService;
