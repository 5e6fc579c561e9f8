//! Subscribed broadcaster records.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Entity id reserved for the spawn mailbox of the control plane.
pub const SPAWN_MAILBOX_ID: u64 = 0;

/// Desired-state flags of a subscription.
///
/// Each flag is independently togglable; add/remove commands OR them in and
/// mask them out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionFlags {
    #[serde(default)]
    pub notify_live: bool,
    #[serde(default)]
    pub notify_offline: bool,
    #[serde(default)]
    pub record: bool,
    #[serde(default)]
    pub capture_chat: bool,
}

impl SubscriptionFlags {
    pub const NONE: Self = Self {
        notify_live: false,
        notify_offline: false,
        record: false,
        capture_chat: false,
    };

    pub const ALL: Self = Self {
        notify_live: true,
        notify_offline: true,
        record: true,
        capture_chat: true,
    };

    /// No flag is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::NONE
    }

    /// At least one flag requires a polling supervisor.
    pub fn wants_monitoring(&self) -> bool {
        !self.is_empty()
    }

    /// Set every flag that is set in `other`.
    pub fn insert(&mut self, other: SubscriptionFlags) {
        self.notify_live |= other.notify_live;
        self.notify_offline |= other.notify_offline;
        self.record |= other.record;
        self.capture_chat |= other.capture_chat;
    }

    /// Clear every flag that is set in `other`.
    pub fn remove(&mut self, other: SubscriptionFlags) {
        self.notify_live &= !other.notify_live;
        self.notify_offline &= !other.notify_offline;
        self.record &= !other.record;
        self.capture_chat &= !other.capture_chat;
    }
}

impl std::fmt::Display for SubscriptionFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names = Vec::new();
        if self.notify_live {
            names.push("notify_live");
        }
        if self.notify_offline {
            names.push("notify_offline");
        }
        if self.record {
            names.push("record");
        }
        if self.capture_chat {
            names.push("capture_chat");
        }
        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

/// Chat-push destinations for one entity (zero or one of each).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotifyTargets {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<u64>,
}

impl NotifyTargets {
    pub fn is_empty(&self) -> bool {
        self.user_id.is_none() && self.group_id.is_none()
    }
}

/// One subscribed broadcaster.
///
/// Two records are "unchanged" for the reconciler iff every field is equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub flags: SubscriptionFlags,
    #[serde(flatten)]
    pub targets: NotifyTargets,
}

impl Entity {
    pub fn new(id: u64, flags: SubscriptionFlags) -> Self {
        Self {
            id,
            name: None,
            flags,
            targets: NotifyTargets::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_targets(mut self, targets: NotifyTargets) -> Self {
        self.targets = targets;
        self
    }

    /// Name used in filenames and notification text.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => self.id.to_string(),
        }
    }

    /// Reject ids that collide with the reserved spawn mailbox.
    pub fn validate_id(id: u64) -> Result<()> {
        if id == SPAWN_MAILBOX_ID {
            return Err(Error::validation("entity id 0 is reserved"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_insert_and_remove() {
        let mut flags = SubscriptionFlags {
            record: true,
            ..Default::default()
        };
        flags.insert(SubscriptionFlags {
            notify_live: true,
            ..Default::default()
        });
        assert!(flags.record && flags.notify_live);

        flags.remove(SubscriptionFlags {
            record: true,
            ..Default::default()
        });
        assert!(!flags.record);
        assert!(flags.notify_live);
        assert!(flags.wants_monitoring());

        flags.remove(SubscriptionFlags::ALL);
        assert!(flags.is_empty());
    }

    #[test]
    fn flags_display() {
        assert_eq!(SubscriptionFlags::NONE.to_string(), "none");
        let flags = SubscriptionFlags {
            notify_live: true,
            record: true,
            ..Default::default()
        };
        assert_eq!(flags.to_string(), "notify_live|record");
    }

    #[test]
    fn entity_json_is_flat() {
        let entity = Entity::new(
            7,
            SubscriptionFlags {
                record: true,
                ..Default::default()
            },
        )
        .with_name("alice")
        .with_targets(NotifyTargets {
            user_id: Some(42),
            group_id: None,
        });

        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["record"], true);
        assert_eq!(json["user_id"], 42);
        assert!(json.get("group_id").is_none());

        let back: Entity = serde_json::from_value(json).unwrap();
        assert_eq!(back, entity);
    }

    #[test]
    fn missing_flags_default_to_false() {
        let entity: Entity = serde_json::from_str(r#"{"id": 3}"#).unwrap();
        assert!(entity.flags.is_empty());
        assert!(entity.targets.is_empty());
        assert_eq!(entity.display_name(), "3");
    }

    #[test]
    fn reserved_id_is_rejected() {
        assert!(Entity::validate_id(0).is_err());
        assert!(Entity::validate_id(1).is_ok());
    }
}
