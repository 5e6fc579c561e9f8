//! Global entity id to mailbox mapping.
//!
//! The lock only covers insert, lookup and delete. Sends clone the handle
//! under the lock and deliver after it is released.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::handle::{ActorHandle, ActorMetadata, DEFAULT_MAILBOX_CAPACITY};
use super::messages::Command;
use crate::domain::SPAWN_MAILBOX_ID;
use crate::{Error, Result};

/// The receiving half of a fresh registration.
#[derive(Debug)]
pub struct Registration {
    pub id: u64,
    pub generation: u64,
    pub receiver: mpsc::Receiver<Command>,
    pub cancellation_token: CancellationToken,
}

/// Registered mailboxes keyed by entity id.
pub struct MailboxMap {
    handles: Mutex<HashMap<u64, ActorHandle<Command>>>,
    next_generation: AtomicU64,
    capacity: usize,
}

impl MailboxMap {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAILBOX_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            capacity: capacity.max(1),
        }
    }

    /// Register a mailbox for `id`. Returns `None` if one already exists.
    pub fn register(&self, id: u64) -> Option<Registration> {
        let mut handles = self.handles.lock();
        if handles.contains_key(&id) {
            return None;
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.capacity);
        let token = CancellationToken::new();
        handles.insert(
            id,
            ActorHandle::new(tx, token.clone(), ActorMetadata::new(id, generation)),
        );
        drop(handles);

        debug!(entity_id = id, generation, "Mailbox registered");
        Some(Registration {
            id,
            generation,
            receiver: rx,
            cancellation_token: token,
        })
    }

    /// Remove the mailbox for `id` if it still belongs to `generation`.
    pub fn unregister(&self, id: u64, generation: u64) -> bool {
        let mut handles = self.handles.lock();
        match handles.get(&id) {
            Some(handle) if handle.metadata.generation == generation => {
                handles.remove(&id);
                drop(handles);
                debug!(entity_id = id, generation, "Mailbox unregistered");
                true
            }
            Some(handle) => {
                trace!(
                    entity_id = id,
                    generation,
                    current = handle.metadata.generation,
                    "Skipping unregister of newer mailbox"
                );
                false
            }
            None => false,
        }
    }

    pub fn contains(&self, id: u64) -> bool {
        self.handles.lock().contains_key(&id)
    }

    /// Registered entity ids, excluding the spawn mailbox.
    pub fn entity_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .handles
            .lock()
            .keys()
            .copied()
            .filter(|id| *id != SPAWN_MAILBOX_ID)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.handles.lock().is_empty()
    }

    fn handle(&self, id: u64) -> Option<ActorHandle<Command>> {
        self.handles.lock().get(&id).cloned()
    }

    /// Deliver `command` to the mailbox of `id`.
    pub async fn send(&self, id: u64, command: Command) -> Result<()> {
        let handle = self.handle(id).ok_or(Error::NotFound(id))?;
        trace!(entity_id = id, command = command.name(), "Sending command");
        handle
            .send(command)
            .await
            .map_err(|e| Error::mailbox(id, e))
    }

    /// Deliver `command` without waiting for mailbox capacity.
    pub fn try_send(&self, id: u64, command: Command) -> Result<()> {
        let handle = self.handle(id).ok_or(Error::NotFound(id))?;
        handle.try_send(command).map_err(|e| Error::mailbox(id, e))
    }

    /// Send Quit to every entity mailbox without waiting on full ones.
    /// Returns how many accepted it; the rest are cancelled instead.
    pub fn broadcast_quit(&self) -> usize {
        let handles: Vec<_> = self
            .handles
            .lock()
            .iter()
            .filter(|(id, _)| **id != SPAWN_MAILBOX_ID)
            .map(|(_, h)| h.clone())
            .collect();

        let mut delivered = 0;
        for handle in handles {
            match handle.try_send(Command::Quit) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    // A full mailbox still gets the cancellation signal.
                    handle.cancel();
                    warn!(entity_id = handle.metadata.id, error = %e, "Quit not delivered");
                }
            }
        }
        delivered
    }
}

impl Default for MailboxMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Entity, SubscriptionFlags};

    #[test]
    fn duplicate_registration_is_refused() {
        let map = MailboxMap::new();
        let first = map.register(5).unwrap();
        assert!(map.register(5).is_none());
        assert!(map.unregister(5, first.generation));
        assert!(!map.contains(5));
    }

    #[test]
    fn stale_generation_cannot_unregister_successor() {
        let map = MailboxMap::new();
        let old = map.register(5).unwrap();
        assert!(map.unregister(5, old.generation));

        let new = map.register(5).unwrap();
        assert_ne!(old.generation, new.generation);
        assert!(!map.unregister(5, old.generation));
        assert!(map.contains(5));
    }

    #[tokio::test]
    async fn send_to_unknown_id_is_not_found() {
        let map = MailboxMap::new();
        let err = map.send(9, Command::Stop).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(9)));
    }

    #[tokio::test]
    async fn send_delivers_in_order() {
        let map = MailboxMap::new();
        let mut reg = map.register(3).unwrap();
        let entity = Entity::new(3, SubscriptionFlags::ALL);

        map.send(3, Command::Update(entity.clone())).await.unwrap();
        map.send(3, Command::Stop).await.unwrap();

        assert_eq!(reg.receiver.recv().await, Some(Command::Update(entity)));
        assert_eq!(reg.receiver.recv().await, Some(Command::Stop));
    }

    #[tokio::test]
    async fn broadcast_skips_spawn_mailbox() {
        let map = MailboxMap::new();
        let mut spawn = map.register(SPAWN_MAILBOX_ID).unwrap();
        let mut a = map.register(1).unwrap();
        let mut b = map.register(2).unwrap();

        assert_eq!(map.broadcast_quit(), 2);
        assert_eq!(a.receiver.recv().await, Some(Command::Quit));
        assert_eq!(b.receiver.recv().await, Some(Command::Quit));
        assert!(spawn.receiver.try_recv().is_err());
        assert_eq!(map.entity_ids(), vec![1, 2]);
    }

    #[test]
    fn broadcast_cancels_full_mailboxes_without_waiting() {
        let map = MailboxMap::with_capacity(1);
        let stuck: Vec<_> = (1..=20).map(|id| map.register(id).unwrap()).collect();
        for id in 1..=20 {
            map.try_send(id, Command::Stop).unwrap();
        }
        let mut idle = map.register(21).unwrap();

        assert_eq!(map.broadcast_quit(), 1);
        assert_eq!(idle.receiver.try_recv().ok(), Some(Command::Quit));
        assert!(stuck.iter().all(|reg| reg.cancellation_token.is_cancelled()));
        assert!(!idle.cancellation_token.is_cancelled());
    }

    #[test]
    fn full_mailbox_rejects_try_send() {
        let map = MailboxMap::with_capacity(1);
        let _reg = map.register(4).unwrap();
        map.try_send(4, Command::Stop).unwrap();
        let err = map.try_send(4, Command::Stop).unwrap_err();
        assert!(err.is_transient());
    }
}
