//! Snapshot diffing.

use std::collections::HashMap;

use crate::domain::Entity;

/// What the reconciler must tell a supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleCommand {
    /// Fields changed; hot-update the running supervisor.
    Update(Entity),
    /// New entity; spawn a supervisor through mailbox 0.
    Start(Entity),
    /// Entity disappeared; stop its supervisor.
    Stop(u64),
}

impl LifecycleCommand {
    pub fn entity_id(&self) -> u64 {
        match self {
            Self::Update(entity) | Self::Start(entity) => entity.id,
            Self::Stop(id) => *id,
        }
    }
}

/// Compare two snapshots matched by id.
///
/// Updates and starts follow the order of `new`; stops follow the order
/// of `old`. Unchanged entities produce nothing.
pub fn diff_snapshots(old: &[Entity], new: &[Entity]) -> Vec<LifecycleCommand> {
    let old_by_id: HashMap<u64, &Entity> = old.iter().map(|e| (e.id, e)).collect();
    let new_by_id: HashMap<u64, &Entity> = new.iter().map(|e| (e.id, e)).collect();

    let mut commands = Vec::new();
    for entity in new {
        match old_by_id.get(&entity.id) {
            Some(previous) if *previous != entity => {
                commands.push(LifecycleCommand::Update(entity.clone()))
            }
            Some(_) => {}
            None => commands.push(LifecycleCommand::Start(entity.clone())),
        }
    }
    for entity in old {
        if !new_by_id.contains_key(&entity.id) {
            commands.push(LifecycleCommand::Stop(entity.id));
        }
    }
    commands
}
