//! Service container for dependency injection.
//!
//! The ServiceContainer wires the registry, reconciler, recording manager
//! and supervisor context around injected collaborators, and hands out the
//! control plane and the command service built on top of them.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::commands::CommandService;
use crate::config::AppConfig;
use crate::control::{ControlConfig, ControlPlane, MailboxMap, RestartTracker};
use crate::notification::{
    ChatBotChannel, ChatBotConfig, LogChannel, NotificationChannel, NotificationService,
};
use crate::provider::{HttpStatusProvider, LiveStatusProvider};
use crate::reconciler::Reconciler;
use crate::recording::{
    ChatSource, FfmpegRecorder, Recorder, RecordingConfig, RecordingManager, SessionMap,
};
use crate::registry::{EntityRegistry, FileRegistryStore, RegistryStore};
use crate::supervisor::{LiveBoard, SupervisorConfig, SupervisorContext};
use crate::Result;

/// External collaborators and settings the core is built from.
pub struct CoreComponents {
    pub store: Arc<dyn RegistryStore>,
    pub provider: Arc<dyn LiveStatusProvider>,
    pub recorder: Arc<dyn Recorder>,
    pub notifier: Arc<NotificationService>,
    pub chat: Option<Arc<dyn ChatSource>>,
    pub supervisor: SupervisorConfig,
    pub recording: RecordingConfig,
    pub control: ControlConfig,
}

impl CoreComponents {
    /// Production adapters described by `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let store = Arc::new(FileRegistryStore::new(config.registry.path.clone())?);

        let provider = Arc::new(HttpStatusProvider::new(
            config.provider.endpoint.clone(),
            Duration::from_secs(config.provider.timeout_secs),
            config.provider.user_agent.as_deref(),
        ));

        let recorder = Arc::new(FfmpegRecorder::new(
            config.recording.recorder_binary.clone(),
        ));

        let mut channels: Vec<Arc<dyn NotificationChannel>> =
            vec![Arc::new(LogChannel::new(config.notification.log_channel))];
        if let Some(endpoint) = &config.notification.chat_bot_endpoint {
            channels.push(Arc::new(ChatBotChannel::new(ChatBotConfig {
                enabled: true,
                endpoint: endpoint.clone(),
                access_token: config.notification.chat_bot_token.clone(),
                timeout_secs: config.notification.chat_bot_timeout_secs,
            })));
        }
        let notifier = Arc::new(NotificationService::with_channels(channels));

        Ok(Self {
            store,
            provider,
            recorder,
            notifier,
            chat: None,
            supervisor: config.supervisor_config(),
            recording: config.recording_config(),
            control: config.control_config(),
        })
    }
}

/// Point-in-time counters for status output.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub subscriptions: usize,
    pub live: usize,
    pub active_sessions: usize,
    pub dangling_sessions: usize,
    pub supervisors: usize,
}

/// Service container holding the core services.
pub struct ServiceContainer {
    pub registry: Arc<EntityRegistry>,
    pub reconciler: Arc<Reconciler>,
    pub recordings: Arc<RecordingManager>,
    pub notifier: Arc<NotificationService>,
    pub board: Arc<LiveBoard>,
    pub mailboxes: Arc<MailboxMap>,
    pub sessions: Arc<SessionMap>,
    context: Arc<SupervisorContext>,
    control: ControlConfig,
}

impl ServiceContainer {
    /// Build the core from production adapters.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(CoreComponents::from_config(config)?).await
    }

    /// Build the core around `components`, loading the registry snapshot.
    pub async fn new(components: CoreComponents) -> Result<Self> {
        info!("Initializing service container");

        let sessions = Arc::new(SessionMap::new());
        let mailboxes = Arc::new(MailboxMap::with_capacity(
            components.supervisor.mailbox_capacity,
        ));

        let registry = Arc::new(EntityRegistry::load(components.store, Arc::clone(&sessions)).await?);
        let reconciler = Arc::new(Reconciler::new(Arc::clone(&registry), Arc::clone(&mailboxes)));

        let mut recordings = RecordingManager::new(
            components.recording,
            components.recorder,
            Arc::clone(&components.provider),
            Arc::clone(&components.notifier),
            Arc::clone(&sessions),
            Arc::clone(&mailboxes),
        );
        if let Some(chat) = components.chat {
            recordings = recordings.with_chat_source(chat);
        }
        let recordings = Arc::new(recordings);

        let board = Arc::new(LiveBoard::new());
        let context = Arc::new(SupervisorContext {
            provider: components.provider,
            recordings: Arc::clone(&recordings),
            notifier: Arc::clone(&components.notifier),
            mailboxes: Arc::clone(&mailboxes),
            board: Arc::clone(&board),
            restarts: Arc::new(Mutex::new(RestartTracker::new())),
            config: components.supervisor,
            shutdown: CancellationToken::new(),
        });

        Ok(Self {
            registry,
            reconciler,
            recordings,
            notifier: components.notifier,
            board,
            mailboxes,
            sessions,
            context,
            control: components.control,
        })
    }

    /// Create the control plane. Fails if one already owns mailbox 0.
    pub fn control_plane(&self) -> Result<ControlPlane> {
        ControlPlane::new(
            self.control.clone(),
            Arc::clone(&self.context),
            Arc::clone(&self.registry),
            Arc::clone(&self.reconciler),
        )
    }

    pub fn commands(&self) -> CommandService {
        CommandService::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.reconciler),
            Arc::clone(&self.recordings),
            Arc::clone(&self.board),
            Arc::clone(&self.mailboxes),
        )
    }

    /// Cancelled when the control plane starts shutting down.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.context.shutdown.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.context.shutdown.is_cancelled()
    }

    pub async fn stats(&self) -> ServiceStats {
        ServiceStats {
            subscriptions: self.registry.snapshot().await.len(),
            live: self.board.len(),
            active_sessions: self.sessions.active_count(),
            dangling_sessions: self.sessions.dangling_count(),
            supervisors: self.mailboxes.entity_ids().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(temp: &TempDir) -> AppConfig {
        let mut config = AppConfig::default();
        config.registry.path = temp.path().join("subs.json");
        config.recording.recorder_binary = "livekeeper-missing-recorder".to_string();
        config.notification.chat_bot_endpoint = Some("http://127.0.0.1:5700".to_string());
        config
    }

    #[tokio::test]
    async fn builds_from_default_config() {
        let temp = TempDir::new().unwrap();
        let container = ServiceContainer::from_config(&config_in(&temp)).await.unwrap();

        assert_eq!(container.notifier.channel_count(), 2);
        let stats = container.stats().await;
        assert_eq!(stats.subscriptions, 0);
        assert_eq!(stats.supervisors, 0);
        assert!(!container.is_shutting_down());
    }

    #[tokio::test]
    async fn only_one_control_plane_per_container() {
        let temp = TempDir::new().unwrap();
        let container = ServiceContainer::from_config(&config_in(&temp)).await.unwrap();

        let _plane = container.control_plane().unwrap();
        assert!(container.control_plane().is_err());
    }

    #[tokio::test]
    async fn registry_path_that_is_a_directory_fails() {
        let temp = TempDir::new().unwrap();
        let mut config = config_in(&temp);
        config.registry.path = temp.path().to_path_buf();
        assert!(ServiceContainer::from_config(&config).await.is_err());
    }
}
