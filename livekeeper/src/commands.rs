//! Command surface used by front-ends (CLI, chat bots, tray apps).
//!
//! Every command answers with a [`CommandResponse`]; failures are reported in
//! the response instead of being returned as errors, so front-ends only have
//! one shape to render.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::control::{Command, MailboxMap};
use crate::domain::{Entity, NotifyTargets, SPAWN_MAILBOX_ID, SubscriptionFlags};
use crate::reconciler::Reconciler;
use crate::recording::{RecordingManager, SessionOrigin, StartOutcome};
use crate::registry::{EntityRegistry, RemoveOutcome};
use crate::supervisor::LiveBoard;

/// Uniform command result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl CommandResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    pub fn ok_with(message: impl Into<String>, data: impl Serialize) -> Self {
        let data = match serde_json::to_value(data) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(error = %e, "Failed to serialize command data");
                None
            }
        };
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

/// Entry point for user commands against a running core.
pub struct CommandService {
    registry: Arc<EntityRegistry>,
    reconciler: Arc<Reconciler>,
    recordings: Arc<RecordingManager>,
    board: Arc<LiveBoard>,
    mailboxes: Arc<MailboxMap>,
}

impl CommandService {
    pub fn new(
        registry: Arc<EntityRegistry>,
        reconciler: Arc<Reconciler>,
        recordings: Arc<RecordingManager>,
        board: Arc<LiveBoard>,
        mailboxes: Arc<MailboxMap>,
    ) -> Self {
        Self {
            registry,
            reconciler,
            recordings,
            board,
            mailboxes,
        }
    }

    /// Subscribe `id` to `flags` and push the change to the supervisors.
    pub async fn add_subscription(
        &self,
        id: u64,
        flags: SubscriptionFlags,
        targets: Option<NotifyTargets>,
        name: Option<String>,
    ) -> CommandResponse {
        match self
            .registry
            .add_subscription(id, flags, targets, name)
            .await
        {
            Ok(entity) => {
                self.reconciler.reconcile_registry().await;
                CommandResponse::ok_with(
                    format!("{} subscribed ({})", entity.display_name(), entity.flags),
                    &entity,
                )
            }
            Err(e) => {
                warn!(entity_id = id, error = %e, "Add subscription failed");
                CommandResponse::error(e.to_string())
            }
        }
    }

    /// Clear `flags` from `id`; the entity is deleted once nothing is left.
    pub async fn remove_subscription(&self, id: u64, flags: SubscriptionFlags) -> CommandResponse {
        let outcome = match self.registry.remove_subscription(id, flags).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(entity_id = id, error = %e, "Remove subscription failed");
                return CommandResponse::error(e.to_string());
            }
        };

        let message = match &outcome {
            RemoveOutcome::NotFound => return CommandResponse::error(format!("{} is not subscribed", id)),
            RemoveOutcome::Updated(entity) => {
                format!("{} now has {}", entity.display_name(), entity.flags)
            }
            RemoveOutcome::Deleted => format!("{} unsubscribed", id),
            RemoveOutcome::Deferred(entity) => format!(
                "{} unsubscribed, removal completes when its recording ends",
                entity.display_name()
            ),
        };

        self.reconciler.reconcile_registry().await;
        CommandResponse::ok_with(message, &outcome)
    }

    /// Record `id` once, whether or not it is subscribed.
    ///
    /// The session is never restarted after the recorder exits and leaves
    /// an already running session untouched.
    pub async fn start_temporary_recording(&self, id: u64) -> CommandResponse {
        if let Err(e) = Entity::validate_id(id) {
            return CommandResponse::error(e.to_string());
        }
        let entity = match self.registry.get(id).await {
            Some(entity) => entity,
            None => Entity::new(id, SubscriptionFlags::NONE),
        };

        let outcome = self.recordings.start_recording(
            &entity,
            entity.flags.capture_chat,
            SessionOrigin::Temporary,
            false,
        );
        match outcome {
            StartOutcome::Started { session_id } | StartOutcome::Restarted { session_id, .. } => {
                info!(entity_id = id, session_id, "Temporary recording started");
                CommandResponse::ok_with(
                    format!("recording {}", entity.display_name()),
                    json!({ "session_id": session_id }),
                )
            }
            StartOutcome::AlreadyActive { session_id } => CommandResponse::ok_with(
                format!("{} is already recording", entity.display_name()),
                json!({ "session_id": session_id }),
            ),
            StartOutcome::Rejected => CommandResponse::error("shutting down"),
        }
    }

    /// Gracefully stop the recording of `id`.
    pub fn stop_recording(&self, id: u64) -> CommandResponse {
        if self.recordings.stop_recording(id) {
            CommandResponse::ok(format!("stopping recording of {}", id))
        } else {
            CommandResponse::error(format!("{} is not recording", id))
        }
    }

    pub fn list_live(&self) -> CommandResponse {
        let live = self.board.list();
        CommandResponse::ok_with(format!("{} live", live.len()), &live)
    }

    pub fn list_recording(&self) -> CommandResponse {
        let sessions = self.recordings.list();
        CommandResponse::ok_with(format!("{} recording", sessions.len()), &sessions)
    }

    pub async fn list_subscriptions(&self) -> CommandResponse {
        let entities = self.registry.snapshot().await;
        CommandResponse::ok_with(format!("{} subscriptions", entities.len()), &entities)
    }

    /// Ask the control plane to shut down.
    pub async fn quit(&self) -> CommandResponse {
        match self.mailboxes.send(SPAWN_MAILBOX_ID, Command::Quit).await {
            Ok(()) => CommandResponse::ok("shutting down"),
            Err(e) => CommandResponse::error(e.to_string()),
        }
    }
}
