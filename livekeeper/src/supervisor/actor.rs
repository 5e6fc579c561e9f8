//! Entity supervisor: polling loop, live/offline state machine, and
//! side-effect dispatch for one entity.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::SupervisorContext;
use super::board::LiveInfo;
use super::state::{Phase, SupervisorState};
use crate::control::{Command, StartReason};
use crate::error::ActorError;
use crate::domain::Entity;
use crate::notification::NotificationEvent;
use crate::recording::SessionOrigin;

/// Why a supervisor returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorExit {
    /// Stop command (entity removed).
    Stopped,
    /// Quit command (shutdown).
    Quit,
    /// Mailbox cancellation token fired.
    Cancelled,
}

/// Monitors a single entity.
pub struct EntitySupervisor {
    entity: Entity,
    state: SupervisorState,
    ctx: Arc<SupervisorContext>,
    mailbox: mpsc::Receiver<Command>,
    cancellation_token: CancellationToken,
}

impl EntitySupervisor {
    pub fn new(
        entity: Entity,
        reason: StartReason,
        ctx: Arc<SupervisorContext>,
        mailbox: mpsc::Receiver<Command>,
        cancellation_token: CancellationToken,
    ) -> Self {
        let mut state = SupervisorState::new(&entity.flags);
        // Do not re-announce or restart a stream the crashed task already handled.
        state.pending_modify = reason == StartReason::Recovered { was_live: true };
        Self {
            entity,
            state,
            ctx,
            mailbox,
            cancellation_token,
        }
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    pub fn state(&self) -> &SupervisorState {
        &self.state
    }

    pub(crate) fn mailbox_mut(&mut self) -> &mut mpsc::Receiver<Command> {
        &mut self.mailbox
    }

    fn id(&self) -> u64 {
        self.entity.id
    }

    /// Run until a terminal command, cancellation, or a fault.
    pub async fn run(&mut self) -> Result<SupervisorExit, ActorError> {
        info!(entity_id = self.id(), phase = ?self.state.phase, "Supervisor starting");

        loop {
            match self.state.phase {
                Phase::Idle => {
                    if let Some(exit) = self.idle().await? {
                        return Ok(exit);
                    }
                }
                Phase::Polling | Phase::Live => {
                    if let Some(exit) = self.tick().await? {
                        return Ok(exit);
                    }
                }
                Phase::ShuttingDown => return Ok(SupervisorExit::Stopped),
            }
        }
    }

    /// Idle: block on exactly one command.
    async fn idle(&mut self) -> Result<Option<SupervisorExit>, ActorError> {
        debug!(entity_id = self.id(), "Supervisor idle");
        let command = tokio::select! {
            biased;
            _ = self.cancellation_token.cancelled() => return Ok(Some(SupervisorExit::Cancelled)),
            command = self.mailbox.recv() => command,
        };
        match command {
            Some(command) => Ok(self.handle_command(command)),
            None => Err(ActorError::fatal("mailbox closed while idle")),
        }
    }

    /// One polling tick: a pending command replaces the status query.
    async fn tick(&mut self) -> Result<Option<SupervisorExit>, ActorError> {
        match self.mailbox.try_recv() {
            Ok(command) => {
                if let Some(exit) = self.handle_command(command) {
                    return Ok(Some(exit));
                }
                if !self.state.phase.is_monitoring() {
                    return Ok(None);
                }
            }
            Err(TryRecvError::Empty) => self.poll().await,
            Err(TryRecvError::Disconnected) => {
                return Err(ActorError::fatal("mailbox closed while polling"));
            }
        }

        tokio::select! {
            biased;
            _ = self.cancellation_token.cancelled() => Ok(Some(SupervisorExit::Cancelled)),
            _ = tokio::time::sleep(self.ctx.config.tick_interval) => Ok(None),
        }
    }

    fn handle_command(&mut self, command: Command) -> Option<SupervisorExit> {
        let id = self.id();
        match command {
            Command::Stop => {
                info!(entity_id = id, "Supervisor stopping");
                self.ctx.recordings.stop_recording(id);
                self.leave();
                Some(SupervisorExit::Stopped)
            }
            Command::Quit => {
                debug!(entity_id = id, "Supervisor quitting");
                self.leave();
                Some(SupervisorExit::Quit)
            }
            Command::Update(entity) => {
                self.apply_update(entity);
                None
            }
            other => {
                debug!(entity_id = id, command = other.name(), "Ignoring misrouted command");
                None
            }
        }
    }

    fn leave(&mut self) {
        self.ctx.board.clear(self.id());
        self.state.phase = Phase::ShuttingDown;
    }

    /// Hot-update the desired state.
    fn apply_update(&mut self, entity: Entity) {
        let old = std::mem::replace(&mut self.entity, entity);
        let id = self.id();
        self.state.pending_modify = true;
        info!(entity_id = id, from = %old.flags, to = %self.entity.flags, "Supervisor updated");

        if !self.entity.flags.wants_monitoring() {
            if self.state.recording {
                self.ctx.recordings.stop_recording(id);
                self.state.recording = false;
            }
            self.ctx.board.clear(id);
            self.state.live_flag = false;
            self.state.phase = Phase::Idle;
            return;
        }

        if self.state.phase == Phase::Idle {
            // Nothing was announced or recorded while dormant.
            self.state.phase = Phase::Polling;
            self.state.pending_modify = false;
            return;
        }

        let new = self.entity.flags;
        let session_changed =
            old.flags.record != new.record || old.flags.capture_chat != new.capture_chat;
        if self.state.live_flag && session_changed {
            if new.record || new.capture_chat {
                self.start_session(true);
            } else if self.state.recording {
                self.ctx.recordings.stop_recording(id);
                self.state.recording = false;
            }
        }
    }

    async fn poll(&mut self) {
        let id = self.id();
        let live = self.ctx.provider.is_live(id).await;

        match (self.state.live_flag, live) {
            (false, true) => self.go_live().await,
            (true, false) => {
                if self.confirm_offline().await {
                    self.go_offline();
                } else {
                    debug!(entity_id = id, "Offline reading not confirmed, staying live");
                }
            }
            _ => {}
        }

        self.state.pending_modify = false;
    }

    /// Corroborate a negative reading with direct source probes.
    async fn confirm_offline(&self) -> bool {
        for _ in 0..self.ctx.config.offline_confirm_probes {
            if self
                .ctx
                .provider
                .resolve_stream_source(self.id())
                .await
                .is_some()
            {
                return false;
            }
        }
        true
    }

    async fn go_live(&mut self) {
        let id = self.id();
        self.state.phase = Phase::Live;
        self.state.live_flag = true;

        let title = self.ctx.provider.current_title(id).await;
        info!(entity_id = id, title = %title, "Entity went live");
        self.ctx.board.set_live(LiveInfo {
            entity_id: id,
            name: self.entity.display_name(),
            title: title.clone(),
            since: Utc::now(),
        });

        if self.entity.flags.notify_live && !self.state.pending_modify {
            self.ctx.notifier.notify(NotificationEvent::LiveStarted {
                entity_id: id,
                entity_name: self.entity.display_name(),
                title,
                targets: self.entity.targets,
                timestamp: Utc::now(),
            });
        }

        if self.entity.flags.record || self.entity.flags.capture_chat {
            self.start_session(self.state.pending_modify);
        }
    }

    fn go_offline(&mut self) {
        let id = self.id();
        info!(entity_id = id, "Entity went offline");
        self.state.phase = Phase::Polling;
        self.state.live_flag = false;
        self.ctx.board.clear(id);

        if self.entity.flags.notify_offline {
            self.ctx.notifier.notify(NotificationEvent::WentOffline {
                entity_id: id,
                entity_name: self.entity.display_name(),
                targets: self.entity.targets,
                timestamp: Utc::now(),
            });
        }

        if self.state.recording {
            self.ctx.recordings.signal_offline(id);
            self.state.recording = false;
        }
    }

    /// Hand a video (or capture-only) session to the recording manager.
    fn start_session(&mut self, modified: bool) {
        let flags = self.entity.flags;
        let outcome = if flags.record {
            self.ctx.recordings.start_recording(
                &self.entity,
                flags.capture_chat,
                SessionOrigin::Monitor,
                modified,
            )
        } else {
            self.ctx
                .recordings
                .start_capture(&self.entity, SessionOrigin::Monitor, modified)
        };
        debug!(entity_id = self.id(), ?outcome, "Session requested");
        self.state.recording = outcome.session_id().is_some();
    }
}
