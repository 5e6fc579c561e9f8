//! Lifecycle commands routed through entity mailboxes.

use crate::domain::Entity;

/// Why a supervisor is being started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartReason {
    /// Entity appeared in the registry.
    New,
    /// Previous supervisor for this entity crashed; `was_live` if it had
    /// already handled the live edge.
    Recovered { was_live: bool },
}

/// Commands accepted by entity mailboxes and the spawn mailbox.
///
/// `Start` and `Reap` are only meaningful on mailbox 0; the rest are
/// addressed to an entity's own mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Spawn a supervisor for `entity`.
    Start { entity: Entity, reason: StartReason },
    /// Replace the desired state of a running supervisor.
    Update(Entity),
    /// Stop the supervisor and its recording.
    Stop,
    /// Exit immediately (shutdown).
    Quit,
    /// A session for this entity has finished; deferred deletion may proceed.
    Reap(u64),
}

impl Command {
    pub fn start(entity: Entity) -> Self {
        Self::Start {
            entity,
            reason: StartReason::New,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Update(_) => "update",
            Self::Stop => "stop",
            Self::Quit => "quit",
            Self::Reap(_) => "reap",
        }
    }
}
