//! In-memory subscription list backed by a [`RegistryStore`].

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::store::RegistryStore;
use crate::domain::{Entity, NotifyTargets, SubscriptionFlags};
use crate::recording::SessionMap;
use crate::{Error, Result};

/// Result of clearing flags from a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RemoveOutcome {
    /// Some flags remain.
    Updated(Entity),
    /// No flags remained and nothing was in flight; the entity is gone.
    Deleted,
    /// No flags remain, deletion waits for its sessions to finish.
    Deferred(Entity),
    NotFound,
}

/// State of record for desired subscriptions.
///
/// The async mutex spans read-modify-write and the file write, so the
/// stored file always matches memory.
pub struct EntityRegistry {
    store: Arc<dyn RegistryStore>,
    sessions: Arc<SessionMap>,
    entities: Mutex<Vec<Entity>>,
}

impl EntityRegistry {
    /// Load the initial snapshot from `store`.
    pub async fn load(store: Arc<dyn RegistryStore>, sessions: Arc<SessionMap>) -> Result<Self> {
        let entities = store.load_snapshot().await?;
        info!(count = entities.len(), "Subscriptions loaded");
        Ok(Self {
            store,
            sessions,
            entities: Mutex::new(entities),
        })
    }

    pub fn store(&self) -> &Arc<dyn RegistryStore> {
        &self.store
    }

    pub async fn snapshot(&self) -> Vec<Entity> {
        self.entities.lock().await.clone()
    }

    pub async fn get(&self, id: u64) -> Option<Entity> {
        self.entities.lock().await.iter().find(|e| e.id == id).cloned()
    }

    /// Create `id` or OR `flags` into it. Targets given here replace the old ones.
    pub async fn add_subscription(
        &self,
        id: u64,
        flags: SubscriptionFlags,
        targets: Option<NotifyTargets>,
        name: Option<String>,
    ) -> Result<Entity> {
        Entity::validate_id(id)?;
        if flags.is_empty() {
            return Err(Error::validation("at least one flag must be set"));
        }

        let mut entities = self.entities.lock().await;
        let mut updated = entities.clone();

        let entity = match updated.iter_mut().find(|e| e.id == id) {
            Some(entity) => {
                entity.flags.insert(flags);
                if let Some(targets) = targets {
                    entity.targets = targets;
                }
                if name.is_some() {
                    entity.name = name;
                }
                entity.clone()
            }
            None => {
                let mut entity = Entity::new(id, flags);
                entity.targets = targets.unwrap_or_default();
                entity.name = name;
                updated.push(entity.clone());
                entity
            }
        };

        self.store.save_snapshot(&updated).await?;
        *entities = updated;
        info!(entity_id = id, flags = %entity.flags, "Subscription added");
        Ok(entity)
    }

    /// Clear `flags` from `id`, deleting it once nothing is left and idle.
    pub async fn remove_subscription(
        &self,
        id: u64,
        flags: SubscriptionFlags,
    ) -> Result<RemoveOutcome> {
        let mut entities = self.entities.lock().await;
        let Some(index) = entities.iter().position(|e| e.id == id) else {
            return Ok(RemoveOutcome::NotFound);
        };

        let mut updated = entities.clone();
        updated[index].flags.remove(flags);
        let entity = updated[index].clone();

        let outcome = if !entity.flags.is_empty() {
            RemoveOutcome::Updated(entity)
        } else {
            let removed = self.sessions.run_if_idle(id, || {
                updated.remove(index);
            });
            match removed {
                Some(()) => RemoveOutcome::Deleted,
                None => RemoveOutcome::Deferred(entity),
            }
        };

        self.store.save_snapshot(&updated).await?;
        *entities = updated;
        info!(entity_id = id, ?outcome, "Subscription flags removed");
        Ok(outcome)
    }

    /// Delete `id` if it has no flags left and no session is in flight.
    pub async fn try_reap(&self, id: u64) -> Result<bool> {
        let mut entities = self.entities.lock().await;
        let Some(index) = entities
            .iter()
            .position(|e| e.id == id && e.flags.is_empty())
        else {
            return Ok(false);
        };

        let mut updated = entities.clone();
        if self
            .sessions
            .run_if_idle(id, || {
                updated.remove(index);
            })
            .is_none()
        {
            debug!(entity_id = id, "Reap deferred, session still active");
            return Ok(false);
        }

        self.store.save_snapshot(&updated).await?;
        *entities = updated;
        info!(entity_id = id, "Deferred deletion completed");
        Ok(true)
    }

    /// Replace memory with the stored list. Returns the new snapshot.
    pub async fn reload_from_store(&self) -> Result<Vec<Entity>> {
        let mut entities = self.entities.lock().await;
        let loaded = self.store.load_snapshot().await?;
        *entities = loaded.clone();
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FileRegistryStore;
    use tempfile::TempDir;

    const RECORD: SubscriptionFlags = SubscriptionFlags {
        notify_live: false,
        notify_offline: false,
        record: true,
        capture_chat: false,
    };

    const NOTIFY: SubscriptionFlags = SubscriptionFlags {
        notify_live: true,
        notify_offline: true,
        record: false,
        capture_chat: false,
    };

    async fn registry(temp: &TempDir) -> EntityRegistry {
        let store = Arc::new(FileRegistryStore::new(temp.path().join("subs.json")).unwrap());
        EntityRegistry::load(store, Arc::new(SessionMap::new()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn add_creates_then_merges_flags() {
        let temp = TempDir::new().unwrap();
        let registry = registry(&temp).await;

        registry.add_subscription(5, RECORD, None, None).await.unwrap();
        let merged = registry
            .add_subscription(5, NOTIFY, None, Some("eve".into()))
            .await
            .unwrap();

        assert!(merged.flags.record && merged.flags.notify_live);
        assert_eq!(merged.name.as_deref(), Some("eve"));
        assert_eq!(registry.snapshot().await.len(), 1);

        let stored = registry.store().load_snapshot().await.unwrap();
        assert_eq!(stored, vec![merged]);
    }

    #[tokio::test]
    async fn add_rejects_reserved_id_and_empty_flags() {
        let temp = TempDir::new().unwrap();
        let registry = registry(&temp).await;
        assert!(registry.add_subscription(0, RECORD, None, None).await.is_err());
        assert!(
            registry
                .add_subscription(1, SubscriptionFlags::NONE, None, None)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn remove_updates_then_deletes() {
        let temp = TempDir::new().unwrap();
        let registry = registry(&temp).await;
        let mut flags = RECORD;
        flags.insert(NOTIFY);
        registry.add_subscription(3, flags, None, None).await.unwrap();

        let outcome = registry.remove_subscription(3, NOTIFY).await.unwrap();
        assert!(matches!(outcome, RemoveOutcome::Updated(ref e) if e.flags == RECORD));

        let outcome = registry.remove_subscription(3, RECORD).await.unwrap();
        assert_eq!(outcome, RemoveOutcome::Deleted);
        assert!(registry.get(3).await.is_none());

        let outcome = registry.remove_subscription(3, RECORD).await.unwrap();
        assert_eq!(outcome, RemoveOutcome::NotFound);
    }

    #[tokio::test]
    async fn reap_ignores_entities_with_flags() {
        let temp = TempDir::new().unwrap();
        let registry = registry(&temp).await;
        registry.add_subscription(8, RECORD, None, None).await.unwrap();
        assert!(!registry.try_reap(8).await.unwrap());
        assert!(!registry.try_reap(99).await.unwrap());
    }

    #[tokio::test]
    async fn reload_picks_up_external_edits() {
        let temp = TempDir::new().unwrap();
        let registry = registry(&temp).await;
        registry.add_subscription(1, RECORD, None, None).await.unwrap();

        let external = FileRegistryStore::new(temp.path().join("subs.json")).unwrap();
        external
            .save_snapshot(&[Entity::new(2, NOTIFY)])
            .await
            .unwrap();

        let reloaded = registry.reload_from_store().await.unwrap();
        assert_eq!(reloaded, vec![Entity::new(2, NOTIFY)]);
        assert_eq!(registry.snapshot().await, reloaded);
    }
}
