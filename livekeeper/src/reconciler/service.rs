//! Reconcile loop: registry snapshots in, lifecycle commands out.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::diff::{LifecycleCommand, diff_snapshots};
use crate::Error;
use crate::control::{Command, MailboxMap, StartReason};
use crate::domain::{Entity, SPAWN_MAILBOX_ID};
use crate::registry::EntityRegistry;

/// Drives supervisors toward the registry's desired state.
pub struct Reconciler {
    registry: Arc<EntityRegistry>,
    mailboxes: Arc<MailboxMap>,
    /// Last reconciled snapshot. Held for the whole diff-and-send pass.
    previous: Mutex<Vec<Entity>>,
}

impl Reconciler {
    pub fn new(registry: Arc<EntityRegistry>, mailboxes: Arc<MailboxMap>) -> Self {
        Self {
            registry,
            mailboxes,
            previous: Mutex::new(Vec::new()),
        }
    }

    /// Diff `new` against the previous snapshot and deliver the commands.
    ///
    /// Returns the number of commands delivered.
    pub async fn reconcile(&self, new: Vec<Entity>) -> usize {
        let mut previous = self.previous.lock().await;
        let commands = diff_snapshots(&previous, &new);
        if commands.is_empty() {
            *previous = new;
            return 0;
        }

        debug!(count = commands.len(), "Reconciling subscriptions");
        let mut delivered = 0;
        for command in commands {
            if self.deliver(command).await {
                delivered += 1;
            }
        }
        *previous = new;
        delivered
    }

    /// Reconcile against the registry's in-memory list.
    pub async fn reconcile_registry(&self) -> usize {
        let snapshot = self.registry.snapshot().await;
        self.reconcile(snapshot).await
    }

    /// One polling pass: reload and reconcile if the store changed externally.
    pub async fn poll_once(&self) -> usize {
        match self.registry.store().poll_for_external_change().await {
            Ok(true) => {}
            Ok(false) => return 0,
            Err(e) => {
                warn!(error = %e, "Registry change check failed");
                return 0;
            }
        }

        match self.registry.reload_from_store().await {
            Ok(snapshot) => {
                info!(count = snapshot.len(), "Registry changed externally, reconciling");
                self.reconcile(snapshot).await
            }
            Err(e) => {
                warn!(error = %e, "Registry reload skipped, previous state stands");
                0
            }
        }
    }

    async fn deliver(&self, command: LifecycleCommand) -> bool {
        let id = command.entity_id();
        let result = match command {
            LifecycleCommand::Start(entity) => self.start(entity).await,
            LifecycleCommand::Update(entity) => {
                match self.mailboxes.send(id, Command::Update(entity.clone())).await {
                    // No supervisor yet (or it gave up); spawn one with the new state.
                    Err(Error::NotFound(_)) => self.start(entity).await,
                    other => other,
                }
            }
            LifecycleCommand::Stop(id) => match self.mailboxes.send(id, Command::Stop).await {
                Err(Error::NotFound(_)) => {
                    debug!(entity_id = id, "No supervisor to stop");
                    return false;
                }
                other => other,
            },
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(entity_id = id, error = %e, "Lifecycle command not delivered");
                false
            }
        }
    }

    async fn start(&self, entity: Entity) -> crate::Result<()> {
        self.mailboxes
            .send(
                SPAWN_MAILBOX_ID,
                Command::Start {
                    entity,
                    reason: StartReason::New,
                },
            )
            .await
    }

    /// Reconcile the registry once, then poll it every `interval` until
    /// `token` is cancelled.
    ///
    /// A panicking pass is logged and the loop resumes after `restart_delay`.
    pub async fn run(
        self: Arc<Self>,
        interval: Duration,
        restart_delay: Duration,
        token: CancellationToken,
    ) {
        let started = self.reconcile_registry().await;
        info!(commands = started, "Initial reconcile complete");

        loop {
            let pass = AssertUnwindSafe(Arc::clone(&self).poll_loop(interval, token.clone()));
            match pass.catch_unwind().await {
                Ok(()) => break,
                Err(panic) => {
                    error!(
                        panic = %panic_message(&*panic),
                        "Reconcile loop crashed, restarting in {:?}", restart_delay
                    );
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(restart_delay) => {}
                    }
                }
            }
        }
        debug!("Reconcile loop stopped");
    }

    async fn poll_loop(self: Arc<Self>, interval: Duration, token: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; startup already reconciled.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
            }
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
