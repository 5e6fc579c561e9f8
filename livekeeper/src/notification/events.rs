//! Notification event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::NotifyTargets;

/// Events that can trigger notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// Entity went live.
    LiveStarted {
        entity_id: u64,
        entity_name: String,
        title: String,
        targets: NotifyTargets,
        timestamp: DateTime<Utc>,
    },
    /// Entity went offline (confirmed).
    WentOffline {
        entity_id: u64,
        entity_name: String,
        targets: NotifyTargets,
        timestamp: DateTime<Utc>,
    },
    RecordingStarted {
        entity_id: u64,
        entity_name: String,
        session_id: u64,
        file_name: String,
        targets: NotifyTargets,
        timestamp: DateTime<Utc>,
    },
    RecordingEnded {
        entity_id: u64,
        entity_name: String,
        session_id: u64,
        file_name: String,
        duration_secs: f64,
        targets: NotifyTargets,
        timestamp: DateTime<Utc>,
    },
    /// Recording could not be started or finalized.
    RecordingFailed {
        entity_id: u64,
        entity_name: String,
        error_message: String,
        targets: NotifyTargets,
        timestamp: DateTime<Utc>,
    },
}

impl NotificationEvent {
    /// Stable event type key.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::LiveStarted { .. } => "live_started",
            Self::WentOffline { .. } => "went_offline",
            Self::RecordingStarted { .. } => "recording_started",
            Self::RecordingEnded { .. } => "recording_ended",
            Self::RecordingFailed { .. } => "recording_failed",
        }
    }

    pub fn entity_id(&self) -> u64 {
        match self {
            Self::LiveStarted { entity_id, .. }
            | Self::WentOffline { entity_id, .. }
            | Self::RecordingStarted { entity_id, .. }
            | Self::RecordingEnded { entity_id, .. }
            | Self::RecordingFailed { entity_id, .. } => *entity_id,
        }
    }

    /// Chat destinations attached to the entity at dispatch time.
    pub fn targets(&self) -> NotifyTargets {
        match self {
            Self::LiveStarted { targets, .. }
            | Self::WentOffline { targets, .. }
            | Self::RecordingStarted { targets, .. }
            | Self::RecordingEnded { targets, .. }
            | Self::RecordingFailed { targets, .. } => *targets,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::LiveStarted { timestamp, .. }
            | Self::WentOffline { timestamp, .. }
            | Self::RecordingStarted { timestamp, .. }
            | Self::RecordingEnded { timestamp, .. }
            | Self::RecordingFailed { timestamp, .. } => *timestamp,
        }
    }

    /// Short human-readable title.
    pub fn title(&self) -> String {
        match self {
            Self::LiveStarted { entity_name, .. } => format!("{} is live", entity_name),
            Self::WentOffline { entity_name, .. } => format!("{} went offline", entity_name),
            Self::RecordingStarted { entity_name, .. } => {
                format!("Recording started: {}", entity_name)
            }
            Self::RecordingEnded { entity_name, .. } => {
                format!("Recording finished: {}", entity_name)
            }
            Self::RecordingFailed { entity_name, .. } => {
                format!("Recording failed: {}", entity_name)
            }
        }
    }

    /// Longer message body.
    pub fn description(&self) -> String {
        match self {
            Self::LiveStarted { title, .. } if title.is_empty() => "Stream started".to_string(),
            Self::LiveStarted { title, .. } => format!("Stream started: {}", title),
            Self::WentOffline { .. } => "Stream ended".to_string(),
            Self::RecordingStarted { file_name, .. } => format!("Writing to {}", file_name),
            Self::RecordingEnded {
                file_name,
                duration_secs,
                ..
            } => format!("Saved {} ({:.0}s)", file_name, duration_secs),
            Self::RecordingFailed { error_message, .. } => error_message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_started_text() {
        let event = NotificationEvent::LiveStarted {
            entity_id: 5,
            entity_name: "alice".into(),
            title: "late night".into(),
            targets: NotifyTargets::default(),
            timestamp: Utc::now(),
        };
        assert_eq!(event.event_type(), "live_started");
        assert_eq!(event.title(), "alice is live");
        assert_eq!(event.description(), "Stream started: late night");
        assert_eq!(event.entity_id(), 5);
    }

    #[test]
    fn serialized_event_is_tagged() {
        let event = NotificationEvent::WentOffline {
            entity_id: 1,
            entity_name: "bob".into(),
            targets: NotifyTargets {
                user_id: Some(9),
                group_id: None,
            },
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "went_offline");
        assert_eq!(json["targets"]["user_id"], 9);
    }
}
