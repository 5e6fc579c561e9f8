//! Crash wrapper around [`EntitySupervisor`].
//!
//! A panic or fault in the tick loop unregisters the mailbox, drains what
//! was queued, backs off, and re-queues a `Start` on mailbox 0 so the entity
//! resumes under a fresh task.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error, info, warn};

use super::SupervisorContext;
use super::actor::{EntitySupervisor, SupervisorExit};
use crate::control::{Command, Registration, StartReason};
use crate::domain::{Entity, SPAWN_MAILBOX_ID};
use crate::reconciler::panic_message;

/// How a supervisor task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Exited(SupervisorExit),
    /// Crashed; a Start was queued on mailbox 0.
    Restarting,
    /// Crashed; a queued Stop/Quit or shutdown cancelled the restart.
    RestartCancelled,
    /// Crashed too often inside the failure window.
    GaveUp,
}

/// Result returned by a supervisor task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorTaskResult {
    pub entity_id: u64,
    pub outcome: TaskOutcome,
}

impl SupervisorTaskResult {
    pub fn is_crash(&self) -> bool {
        !matches!(self.outcome, TaskOutcome::Exited(_))
    }
}

/// Run a supervisor for `entity` on `registration` until it exits.
pub async fn run_supervisor(
    ctx: Arc<SupervisorContext>,
    entity: Entity,
    reason: StartReason,
    registration: Registration,
) -> SupervisorTaskResult {
    let Registration {
        id,
        generation,
        receiver,
        cancellation_token,
    } = registration;

    let mut supervisor =
        EntitySupervisor::new(entity, reason, Arc::clone(&ctx), receiver, cancellation_token);

    let fault = match AssertUnwindSafe(supervisor.run()).catch_unwind().await {
        Ok(Ok(exit)) => {
            ctx.mailboxes.unregister(id, generation);
            ctx.board.clear(id);
            debug!(entity_id = id, ?exit, "Supervisor exited");
            return SupervisorTaskResult {
                entity_id: id,
                outcome: TaskOutcome::Exited(exit),
            };
        }
        Ok(Err(e)) => e.to_string(),
        Err(panic) => format!("panic: {}", panic_message(&*panic)),
    };

    error!(entity_id = id, fault = %fault, "Supervisor crashed");
    let outcome = recover(&ctx, &mut supervisor, generation).await;
    SupervisorTaskResult {
        entity_id: id,
        outcome,
    }
}

async fn recover(
    ctx: &SupervisorContext,
    supervisor: &mut EntitySupervisor,
    generation: u64,
) -> TaskOutcome {
    let id = supervisor.entity().id;
    let was_live = supervisor.state().live_flag;
    ctx.board.clear(id);
    ctx.mailboxes.unregister(id, generation);

    // Nothing new can arrive after unregistering; see what was queued.
    let mut latest = supervisor.entity().clone();
    let mut cancelled = false;
    let mailbox = supervisor.mailbox_mut();
    mailbox.close();
    while let Ok(command) = mailbox.try_recv() {
        match command {
            Command::Stop => {
                ctx.recordings.stop_recording(id);
                cancelled = true;
            }
            Command::Quit => cancelled = true,
            Command::Update(entity) => latest = entity,
            other => debug!(entity_id = id, command = other.name(), "Dropping queued command"),
        }
    }

    if cancelled || ctx.shutdown.is_cancelled() {
        info!(entity_id = id, "Restart cancelled");
        return TaskOutcome::RestartCancelled;
    }

    let (extra, allowed, total) = {
        let mut restarts = ctx.restarts.lock();
        let extra = restarts.record_failure(id);
        (extra, restarts.should_restart(id), restarts.total_restarts(id))
    };
    if !allowed {
        error!(entity_id = id, total_restarts = total, "Supervisor keeps crashing, giving up");
        return TaskOutcome::GaveUp;
    }

    let backoff = ctx.config.crash_backoff.max(extra);
    info!(entity_id = id, ?backoff, "Restarting supervisor after backoff");
    tokio::select! {
        _ = ctx.shutdown.cancelled() => return TaskOutcome::RestartCancelled,
        _ = tokio::time::sleep(backoff) => {}
    }

    let command = Command::Start {
        entity: latest,
        reason: StartReason::Recovered { was_live },
    };
    match ctx.mailboxes.send(SPAWN_MAILBOX_ID, command).await {
        Ok(()) => TaskOutcome::Restarting,
        Err(e) => {
            warn!(entity_id = id, error = %e, "Could not queue supervisor restart");
            TaskOutcome::GaveUp
        }
    }
}
