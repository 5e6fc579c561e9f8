//! Domain types shared by every component.

mod entity;

pub use entity::{Entity, NotifyTargets, SPAWN_MAILBOX_ID, SubscriptionFlags};
