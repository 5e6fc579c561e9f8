//! Control plane: the spawn mailbox loop and global shutdown.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::mailbox::Registration;
use super::messages::{Command, StartReason};
use crate::domain::{Entity, SPAWN_MAILBOX_ID};
use crate::reconciler::Reconciler;
use crate::recording::RecordingManager;
use crate::registry::EntityRegistry;
use crate::supervisor::{SupervisorContext, SupervisorTaskResult, run_supervisor};
use crate::{Error, Result};

/// How long killed sessions get to finalize their files after the grace period.
const FORCED_STOP_WAIT: Duration = Duration::from_secs(2);

/// How long the cancelled reconcile loop gets before it is aborted.
const RECONCILE_STOP_WAIT: Duration = Duration::from_secs(1);

/// Control plane settings.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    pub registry_poll_interval: Duration,
    /// Delay before a crashed reconcile loop resumes.
    pub reconcile_restart_delay: Duration,
    /// Upper bound for tasks and sessions to stop after Quit.
    pub shutdown_grace: Duration,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            registry_poll_interval: Duration::from_secs(60),
            reconcile_restart_delay: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

/// Summary of a completed shutdown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Supervisors that finished within the grace period.
    pub supervisors_stopped: usize,
    /// Supervisors aborted after the grace period.
    pub supervisors_aborted: usize,
    /// Sessions that received Quit.
    pub sessions_signalled: usize,
    /// Sessions killed after the grace period.
    pub sessions_killed: usize,
    pub timed_out: bool,
    pub elapsed_ms: u64,
}

/// Owner of mailbox 0.
pub struct ControlPlane {
    config: ControlConfig,
    ctx: Arc<SupervisorContext>,
    registry: Arc<EntityRegistry>,
    reconciler: Arc<Reconciler>,
    spawn: Registration,
    supervisors: JoinSet<SupervisorTaskResult>,
    background: JoinSet<()>,
    reconcile_token: CancellationToken,
    shutting_down: bool,
}

impl ControlPlane {
    /// Register mailbox 0. Fails if another control plane owns it.
    pub fn new(
        config: ControlConfig,
        ctx: Arc<SupervisorContext>,
        registry: Arc<EntityRegistry>,
        reconciler: Arc<Reconciler>,
    ) -> Result<Self> {
        let spawn = ctx
            .mailboxes
            .register(SPAWN_MAILBOX_ID)
            .ok_or_else(|| Error::Other("spawn mailbox already registered".to_string()))?;

        Ok(Self {
            config,
            ctx,
            registry,
            reconciler,
            spawn,
            supervisors: JoinSet::new(),
            background: JoinSet::new(),
            reconcile_token: CancellationToken::new(),
            shutting_down: false,
        })
    }

    fn recordings(&self) -> &Arc<RecordingManager> {
        &self.ctx.recordings
    }

    /// Run until Quit arrives on mailbox 0, then shut everything down.
    pub async fn run(mut self) -> ShutdownReport {
        info!("Control plane starting");
        let reconcile_task = tokio::spawn(Arc::clone(&self.reconciler).run(
            self.config.registry_poll_interval,
            self.config.reconcile_restart_delay,
            self.reconcile_token.clone(),
        ));

        loop {
            tokio::select! {
                command = self.spawn.receiver.recv() => match command {
                    Some(Command::Start { entity, reason }) => self.handle_start(entity, reason).await,
                    Some(Command::Reap(id)) => self.handle_reap(id),
                    Some(Command::Quit) | None => break,
                    Some(other) => debug!(command = other.name(), "Ignoring command on spawn mailbox"),
                },
                Some(joined) = self.supervisors.join_next() => match joined {
                    Ok(result) if result.is_crash() => {
                        warn!(entity_id = result.entity_id, outcome = ?result.outcome, "Supervisor task ended after crash");
                    }
                    Ok(result) => debug!(entity_id = result.entity_id, outcome = ?result.outcome, "Supervisor task ended"),
                    Err(e) => error!(error = %e, "Supervisor task failed to join"),
                },
                Some(joined) = self.background.join_next() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "Background task failed");
                    }
                }
            }
        }

        self.shutdown(reconcile_task).await
    }

    /// Spawn a supervisor, or forward the entity as an update if one runs.
    async fn handle_start(&mut self, entity: Entity, reason: StartReason) {
        let id = entity.id;
        if self.shutting_down {
            debug!(entity_id = id, "Start rejected, shutting down");
            return;
        }

        // The registry is the source of truth; the queued copy may be stale.
        let Some(entity) = self.registry.get(id).await else {
            info!(entity_id = id, ?reason, "Start dropped, entity no longer subscribed");
            return;
        };

        if self.ctx.mailboxes.contains(id) {
            debug!(entity_id = id, "Supervisor exists, forwarding as update");
            match self.ctx.mailboxes.try_send(id, Command::Update(entity)) {
                Ok(()) => {}
                Err(e) if e.is_transient() => {
                    warn!(entity_id = id, error = %e, "Update not delivered, mailbox busy")
                }
                Err(e) => debug!(entity_id = id, error = %e, "Update not delivered"),
            }
            return;
        }

        let Some(registration) = self.ctx.mailboxes.register(id) else {
            warn!(entity_id = id, "Mailbox appeared concurrently, start skipped");
            return;
        };

        info!(entity_id = id, ?reason, flags = %entity.flags, "Spawning supervisor");
        self.supervisors.spawn(run_supervisor(
            Arc::clone(&self.ctx),
            entity,
            reason,
            registration,
        ));
    }

    /// Complete a deferred deletion once the entity's sessions are gone.
    fn handle_reap(&mut self, id: u64) {
        let registry = Arc::clone(&self.registry);
        let reconciler = Arc::clone(&self.reconciler);
        let ctx = Arc::clone(&self.ctx);
        self.background.spawn(async move {
            match registry.try_reap(id).await {
                Ok(true) => {
                    ctx.restarts.lock().remove(id);
                    reconciler.reconcile_registry().await;
                }
                Ok(false) => {}
                Err(e) => warn!(entity_id = id, error = %e, "Reap failed"),
            }
        });
    }

    async fn shutdown(mut self, reconcile_task: JoinHandle<()>) -> ShutdownReport {
        let started = Instant::now();
        let grace = self.config.shutdown_grace;
        let mut report = ShutdownReport::default();
        info!(?grace, "Shutdown started");

        // Phase 1: stop reconciling and refuse new starts.
        self.reconcile_token.cancel();
        self.shutting_down = true;
        self.ctx.shutdown.cancel();
        self.background.abort_all();

        // Phase 2: ask every supervisor and session to stop.
        let quit_sent = self.ctx.mailboxes.broadcast_quit();
        report.sessions_signalled = self.recordings().shutdown();
        info!(
            supervisors = quit_sent,
            sessions = report.sessions_signalled,
            "Quit sent"
        );

        // Phase 3: wait for tasks up to the grace period.
        let deadline = started + grace;
        while !self.supervisors.is_empty() {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    report.timed_out = true;
                    break;
                }
                joined = self.supervisors.join_next() => match joined {
                    Some(Ok(_)) => report.supervisors_stopped += 1,
                    Some(Err(e)) => {
                        warn!(error = %e, "Supervisor task failed during shutdown");
                        report.supervisors_stopped += 1;
                    }
                    None => break,
                },
            }
        }
        if !report.timed_out {
            let recordings = Arc::clone(self.recordings());
            tokio::select! {
                _ = recordings.wait_idle() => {}
                _ = tokio::time::sleep_until(deadline) => report.timed_out = true,
            }
        }

        // Phase 4: force whatever is left.
        if report.timed_out {
            report.supervisors_aborted = self.supervisors.len();
            warn!(
                supervisors = report.supervisors_aborted,
                sessions = self.recordings().running_tasks(),
                "Grace period expired, forcing shutdown"
            );
            self.supervisors.abort_all();
            report.sessions_killed = self.recordings().kill_all();

            let recordings = Arc::clone(self.recordings());
            if tokio::time::timeout(FORCED_STOP_WAIT, recordings.wait_idle())
                .await
                .is_err()
            {
                warn!(
                    remaining = recordings.running_tasks(),
                    "Sessions still finalizing after kill"
                );
            }
            while self.supervisors.join_next().await.is_some() {}
        }

        let mut reconcile_task = reconcile_task;
        if tokio::time::timeout(RECONCILE_STOP_WAIT, &mut reconcile_task)
            .await
            .is_err()
        {
            reconcile_task.abort();
        }
        self.ctx
            .mailboxes
            .unregister(SPAWN_MAILBOX_ID, self.spawn.generation);

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(?report, "Shutdown complete");
        report
    }
}
