//! Recording manager: session lifecycle, flicker restarts and finalization.
//!
//! Every session runs in its own task. The manager only installs handles
//! into the [`SessionMap`] and sends control messages; the task owns the
//! recorder process, its stdin, and the files it produces.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{Local, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::capture::{self, CHAT_FILE_SUFFIX, ChatSource, NullChatSource};
use super::recorder::{Recorder, RecorderProcess};
use super::session::{
    SessionControl, SessionHandle, SessionInfo, SessionKind, SessionMap, SessionOrigin,
};
use crate::control::{Command, MailboxMap};
use crate::domain::{Entity, SPAWN_MAILBOX_ID};
use crate::notification::{NotificationEvent, NotificationService};
use crate::provider::{LiveStatusProvider, StreamSource};
use crate::utils::{filename, fs};

/// Control queue depth per session.
const SESSION_CONTROL_CAPACITY: usize = 8;

/// Recording manager settings.
#[derive(Debug, Clone)]
pub struct RecordingConfig {
    /// Files are written here while recording.
    pub work_dir: PathBuf,
    /// Finished files are moved here.
    pub final_dir: PathBuf,
    pub extension: String,
    pub resolve_attempts: u32,
    pub resolve_backoff: Duration,
    /// Time between the quit byte and a forced kill.
    pub kill_timeout: Duration,
    pub restart_delay: Duration,
    /// Time an offline stream gets to end the recorder on its own.
    pub offline_drain: Duration,
    pub max_filename_bytes: usize,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("recordings/.partial"),
            final_dir: PathBuf::from("recordings"),
            extension: "flv".to_string(),
            resolve_attempts: 3,
            resolve_backoff: Duration::from_secs(10),
            kill_timeout: Duration::from_secs(20),
            restart_delay: Duration::from_secs(3),
            offline_drain: Duration::from_secs(30),
            max_filename_bytes: 200,
        }
    }
}

/// Result of a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StartOutcome {
    /// A new session was started.
    Started { session_id: u64 },
    /// A new session replaced an active one, which is being stopped.
    Restarted { session_id: u64, replaced: u64 },
    /// The active session was kept.
    AlreadyActive { session_id: u64 },
    /// Shutdown has begun.
    Rejected,
}

impl StartOutcome {
    pub fn session_id(&self) -> Option<u64> {
        match self {
            Self::Started { session_id }
            | Self::Restarted { session_id, .. }
            | Self::AlreadyActive { session_id } => Some(*session_id),
            Self::Rejected => None,
        }
    }
}

/// Owns recording sessions for every entity.
pub struct RecordingManager {
    config: RecordingConfig,
    recorder: Arc<dyn Recorder>,
    provider: Arc<dyn LiveStatusProvider>,
    chat: Arc<dyn ChatSource>,
    notifier: Arc<NotificationService>,
    sessions: Arc<SessionMap>,
    mailboxes: Arc<MailboxMap>,
    tasks: TaskTracker,
    shutting_down: AtomicBool,
    next_session_id: AtomicU64,
}

impl RecordingManager {
    pub fn new(
        config: RecordingConfig,
        recorder: Arc<dyn Recorder>,
        provider: Arc<dyn LiveStatusProvider>,
        notifier: Arc<NotificationService>,
        sessions: Arc<SessionMap>,
        mailboxes: Arc<MailboxMap>,
    ) -> Self {
        Self {
            config,
            recorder,
            provider,
            chat: Arc::new(NullChatSource),
            notifier,
            sessions,
            mailboxes,
            tasks: TaskTracker::new(),
            shutting_down: AtomicBool::new(false),
            next_session_id: AtomicU64::new(1),
        }
    }

    pub fn with_chat_source(mut self, chat: Arc<dyn ChatSource>) -> Self {
        self.chat = chat;
        self
    }

    pub fn config(&self) -> &RecordingConfig {
        &self.config
    }

    pub fn sessions(&self) -> &Arc<SessionMap> {
        &self.sessions
    }

    /// Start a video session for `entity`, with chat capture if `also_capture`.
    ///
    /// With an active session of the same kind, `modified` (the caller just
    /// hot-updated) and temporary requests keep it; any other live edge is a
    /// flicker and replaces it. A session already told to stop or drain is
    /// always replaced.
    pub fn start_recording(
        self: &Arc<Self>,
        entity: &Entity,
        also_capture: bool,
        origin: SessionOrigin,
        modified: bool,
    ) -> StartOutcome {
        self.start_session(entity, SessionKind::Video, also_capture, origin, modified)
    }

    /// Start a chat-capture-only session for `entity`.
    pub fn start_capture(
        self: &Arc<Self>,
        entity: &Entity,
        origin: SessionOrigin,
        modified: bool,
    ) -> StartOutcome {
        self.start_session(entity, SessionKind::CaptureOnly, false, origin, modified)
    }

    fn start_session(
        self: &Arc<Self>,
        entity: &Entity,
        kind: SessionKind,
        also_capture: bool,
        origin: SessionOrigin,
        modified: bool,
    ) -> StartOutcome {
        if self.is_shutting_down() {
            debug!(entity_id = entity.id, "Ignoring start request during shutdown");
            return StartOutcome::Rejected;
        }

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SESSION_CONTROL_CAPACITY);
        let handle = SessionHandle::new(session_id, entity.id, kind, origin, tx);

        let keep = modified || origin == SessionOrigin::Temporary;
        let previous = match self.sessions.install_unless(handle.clone(), |existing| {
            keep && existing.kind == kind && !existing.is_winding_down()
        }) {
            Ok(previous) => previous,
            Err(existing) => {
                debug!(
                    entity_id = entity.id,
                    session_id = existing.session_id,
                    "Keeping active session"
                );
                return StartOutcome::AlreadyActive {
                    session_id: existing.session_id,
                };
            }
        };

        let outcome = match &previous {
            Some(old) => {
                info!(
                    entity_id = entity.id,
                    old_session = old.session_id,
                    new_session = session_id,
                    "Restarting recording session"
                );
                old.signal(SessionControl::Stop);
                StartOutcome::Restarted {
                    session_id,
                    replaced: old.session_id,
                }
            }
            None => {
                info!(entity_id = entity.id, session_id, ?kind, ?origin, "Starting session");
                StartOutcome::Started { session_id }
            }
        };

        let task = SessionTask {
            manager: Arc::clone(self),
            entity: entity.clone(),
            handle,
            also_capture,
            control: rx,
        };
        self.tasks.spawn(task.run());

        outcome
    }

    /// Gracefully stop the active session of `id`. False if there is none.
    pub fn stop_recording(&self, id: u64) -> bool {
        match self.sessions.active(id) {
            Some(handle) => {
                info!(entity_id = id, session_id = handle.session_id, "Stopping session");
                handle.signal(SessionControl::Stop)
            }
            None => false,
        }
    }

    /// Tell the active session of `id` that the stream went offline.
    pub fn signal_offline(&self, id: u64) -> bool {
        match self.sessions.active(id) {
            Some(handle) => {
                debug!(entity_id = id, session_id = handle.session_id, "Signalling offline");
                handle.signal(SessionControl::StreamOffline)
            }
            None => false,
        }
    }

    pub fn has_activity(&self, id: u64) -> bool {
        self.sessions.has_activity(id)
    }

    pub fn list(&self) -> Vec<SessionInfo> {
        self.sessions.list_active()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Refuse new sessions and ask every active and dangling one to quit.
    ///
    /// Returns the number of sessions signalled.
    pub fn shutdown(&self) -> usize {
        self.shutting_down.store(true, Ordering::Release);
        self.tasks.close();

        let handles = self.sessions.all_handles();
        for handle in &handles {
            handle.signal(SessionControl::Quit);
        }
        info!(count = handles.len(), "Quit sent to recording sessions");
        handles.len()
    }

    /// Kill every remaining subprocess. Returns the number of sessions hit.
    pub fn kill_all(&self) -> usize {
        let handles = self.sessions.all_handles();
        for handle in &handles {
            warn!(
                entity_id = handle.entity_id,
                session_id = handle.session_id,
                "Killing recording session"
            );
            handle.kill();
        }
        handles.len()
    }

    /// Number of session tasks still running.
    pub fn running_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for every session task to finish. Only completes after [`shutdown`](Self::shutdown).
    pub async fn wait_idle(&self) {
        self.tasks.wait().await;
    }

    fn notify_failed(&self, entity: &Entity, error_message: impl Into<String>) {
        self.notifier.notify(NotificationEvent::RecordingFailed {
            entity_id: entity.id,
            entity_name: entity.display_name(),
            error_message: error_message.into(),
            targets: entity.targets,
            timestamp: Utc::now(),
        });
    }
}

/// How one recorded segment ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentEnd {
    /// Stop, Quit, or kill.
    Stopped,
    /// The stream went offline.
    Offline,
    /// The recorder exited on its own.
    Unexpected,
    /// The segment could not start.
    Failed,
}

enum Resolve {
    Source(StreamSource),
    Interrupted,
    Exhausted,
}

/// State owned by one session task.
struct SessionTask {
    manager: Arc<RecordingManager>,
    entity: Entity,
    handle: SessionHandle,
    also_capture: bool,
    control: mpsc::Receiver<SessionControl>,
}

impl SessionTask {
    fn config(&self) -> &RecordingConfig {
        &self.manager.config
    }

    async fn run(mut self) {
        loop {
            let end = match self.handle.kind {
                SessionKind::Video => self.record_segment().await,
                SessionKind::CaptureOnly => self.capture_segment().await,
            };
            debug!(
                entity_id = self.entity.id,
                session_id = self.handle.session_id,
                ?end,
                "Segment finished"
            );

            if end != SegmentEnd::Unexpected || !self.should_restart().await {
                break;
            }
            if !self.wait_restart_delay().await {
                break;
            }
            info!(
                entity_id = self.entity.id,
                session_id = self.handle.session_id,
                "Recorder exited while still live, restarting into a new file"
            );
        }

        self.finish().await;
    }

    /// Restart only unexpected exits of monitor sessions that still own the slot.
    async fn should_restart(&self) -> bool {
        if self.handle.origin != SessionOrigin::Monitor
            || self.manager.is_shutting_down()
            || self.handle.cancellation_token().is_cancelled()
            || !self
                .manager
                .sessions
                .is_active_session(self.entity.id, self.handle.session_id)
        {
            return false;
        }
        self.manager
            .provider
            .resolve_stream_source(self.entity.id)
            .await
            .is_some()
    }

    /// Sleep for the restart delay unless a control message arrives first.
    async fn wait_restart_delay(&mut self) -> bool {
        let token = self.handle.cancellation_token();
        tokio::select! {
            _ = tokio::time::sleep(self.manager.config.restart_delay) => true,
            _ = self.control.recv() => false,
            _ = token.cancelled() => false,
        }
    }

    async fn resolve_source(&mut self) -> Resolve {
        let attempts = self.config().resolve_attempts.max(1);
        let backoff = self.config().resolve_backoff;
        let token = self.handle.cancellation_token();

        if self.control.try_recv().is_ok() {
            return Resolve::Interrupted;
        }

        for attempt in 1..=attempts {
            if let Some(source) = self
                .manager
                .provider
                .resolve_stream_source(self.entity.id)
                .await
            {
                return Resolve::Source(source);
            }
            if attempt == attempts {
                break;
            }

            warn!(
                entity_id = self.entity.id,
                attempt, attempts, "No playable source yet, retrying in {:?}", backoff
            );
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = self.control.recv() => return Resolve::Interrupted,
                _ = token.cancelled() => return Resolve::Interrupted,
            }
        }

        Resolve::Exhausted
    }

    /// Pick a file name in `dir` that does not exist yet.
    async fn unique_path(dir: &Path, file_name: &str) -> PathBuf {
        let candidate = dir.join(file_name);
        if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            return candidate;
        }
        let (stem, ext) = split_file_name(file_name);
        let mut n = 1u32;
        loop {
            let candidate = if ext.is_empty() {
                dir.join(format!("{}-{}", stem, n))
            } else {
                dir.join(format!("{}-{}.{}", stem, n, ext))
            };
            if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                return candidate;
            }
            n += 1;
        }
    }

    async fn output_path(&self, extension: &str) -> crate::Result<PathBuf> {
        let title = self.manager.provider.current_title(self.entity.id).await;
        let file_name = filename::recording_filename(
            &self.entity.display_name(),
            Local::now(),
            &title,
            extension,
            self.config().max_filename_bytes,
        );
        let work_dir = self.config().work_dir.clone();
        fs::ensure_dir_all_with_op("creating recording work directory", &work_dir).await?;
        Ok(Self::unique_path(&work_dir, &file_name).await)
    }

    async fn record_segment(&mut self) -> SegmentEnd {
        let source = match self.resolve_source().await {
            Resolve::Source(source) => source,
            Resolve::Interrupted => return SegmentEnd::Stopped,
            Resolve::Exhausted => {
                let attempts = self.config().resolve_attempts;
                warn!(entity_id = self.entity.id, attempts, "Giving up on stream source");
                self.manager.notify_failed(
                    &self.entity,
                    format!("no playable source after {} attempts", attempts),
                );
                return SegmentEnd::Failed;
            }
        };

        let extension = source
            .format
            .as_deref()
            .filter(|f| matches!(*f, "flv" | "ts" | "mp4" | "mkv"))
            .unwrap_or(&self.config().extension)
            .to_string();
        let path = match self.output_path(&extension).await {
            Ok(path) => path,
            Err(e) => {
                warn!(entity_id = self.entity.id, error = %e, "Cannot prepare output");
                self.manager.notify_failed(&self.entity, e.to_string());
                return SegmentEnd::Failed;
            }
        };

        let mut process = match self.manager.recorder.spawn(&source, &path).await {
            Ok(process) => process,
            Err(e) => {
                warn!(entity_id = self.entity.id, error = %e, "Recorder failed to start");
                self.manager.notify_failed(&self.entity, e.to_string());
                return SegmentEnd::Failed;
            }
        };

        let chat_path = chat_path_for(&path);
        let capture_token = CancellationToken::new();
        let capture = self
            .also_capture
            .then(|| self.spawn_capture(chat_path.clone(), capture_token.clone()));

        self.mark_started(&path);
        let started = Instant::now();

        let end = self.supervise_process(process.as_mut()).await;

        capture_token.cancel();
        if let Some(capture) = capture {
            let _ = capture.await;
        }
        self.handle.set_recording(false);

        let chat = self.also_capture.then_some(chat_path);
        self.finalize(&path, chat.as_deref(), started.elapsed()).await;
        end
    }

    async fn capture_segment(&mut self) -> SegmentEnd {
        let path = match self.output_path(CHAT_FILE_SUFFIX).await {
            Ok(path) => path,
            Err(e) => {
                self.manager.notify_failed(&self.entity, e.to_string());
                return SegmentEnd::Failed;
            }
        };

        let token = CancellationToken::new();
        let mut capture = self.spawn_capture(path.clone(), token.clone());
        self.mark_started(&path);
        let started = Instant::now();

        let kill = self.handle.cancellation_token();
        let mut reason = None;
        let mut drain_deadline: Option<Instant> = None;

        let end = loop {
            tokio::select! {
                _ = &mut capture => break reason.unwrap_or(SegmentEnd::Unexpected),
                _ = kill.cancelled(), if !token.is_cancelled() => {
                    reason = Some(SegmentEnd::Stopped);
                    token.cancel();
                }
                message = self.control.recv(), if !token.is_cancelled() => match message {
                    Some(SessionControl::StreamOffline) => {
                        reason.get_or_insert(SegmentEnd::Offline);
                        drain_deadline.get_or_insert(Instant::now() + self.manager.config.offline_drain);
                    }
                    _ => {
                        reason = Some(SegmentEnd::Stopped);
                        token.cancel();
                    }
                },
                _ = sleep_until_opt(drain_deadline) => {
                    drain_deadline = None;
                    token.cancel();
                }
            }
        };

        self.handle.set_recording(false);
        self.finalize(&path, None, started.elapsed()).await;
        end
    }

    fn spawn_capture(&self, path: PathBuf, token: CancellationToken) -> JoinHandle<()> {
        let chat = Arc::clone(&self.manager.chat);
        let entity_id = self.entity.id;
        tokio::spawn(async move {
            if let Err(e) = capture::run_capture(chat.as_ref(), entity_id, &path, token).await {
                warn!(entity_id, error = %e, "Chat capture failed");
            }
        })
    }

    fn mark_started(&self, path: &Path) {
        self.handle.set_output_path(Some(path.to_path_buf()));
        self.handle.set_recording(true);

        let file_name = display_name(path);
        info!(
            entity_id = self.entity.id,
            session_id = self.handle.session_id,
            file = %file_name,
            "Recording started"
        );
        self.manager
            .notifier
            .notify(NotificationEvent::RecordingStarted {
                entity_id: self.entity.id,
                entity_name: self.entity.display_name(),
                session_id: self.handle.session_id,
                file_name,
                targets: self.entity.targets,
                timestamp: Utc::now(),
            });
    }

    /// Drive the recorder until it exits, translating control messages into
    /// a graceful quit, an offline drain, or a forced kill.
    async fn supervise_process(&mut self, process: &mut dyn RecorderProcess) -> SegmentEnd {
        let kill_timeout = self.config().kill_timeout;
        let offline_drain = self.config().offline_drain;
        let token = self.handle.cancellation_token();
        let entity_id = self.entity.id;

        let mut reason: Option<SegmentEnd> = None;
        let mut drain_deadline: Option<Instant> = None;
        let mut kill_deadline: Option<Instant> = None;
        let mut killed = false;
        let mut control_open = true;

        loop {
            tokio::select! {
                biased;

                _ = token.cancelled(), if !killed => {
                    warn!(entity_id, "Session cancelled, killing recorder");
                    if let Err(e) = process.kill().await {
                        warn!(entity_id, error = %e, "Failed to kill recorder");
                    }
                    killed = true;
                    reason = Some(SegmentEnd::Stopped);
                }
                status = process.wait() => {
                    match &status {
                        Ok(code) => debug!(entity_id, ?code, "Recorder exited"),
                        Err(e) => warn!(entity_id, error = %e, "Failed to wait for recorder"),
                    }
                    return match reason {
                        Some(reason) => reason,
                        None => {
                            warn!(entity_id, ?status, "Recorder exited unexpectedly");
                            SegmentEnd::Unexpected
                        }
                    };
                }
                message = self.control.recv(), if control_open => match message {
                    Some(SessionControl::StreamOffline) => {
                        if reason.is_none() {
                            debug!(entity_id, ?offline_drain, "Stream offline, draining recorder");
                            reason = Some(SegmentEnd::Offline);
                            drain_deadline = Some(Instant::now() + offline_drain);
                        }
                    }
                    other => {
                        if other.is_none() {
                            control_open = false;
                        }
                        reason = Some(SegmentEnd::Stopped);
                        drain_deadline = None;
                        if kill_deadline.is_none() && !killed {
                            request_quit(process, entity_id).await;
                            kill_deadline = Some(Instant::now() + kill_timeout);
                        }
                    }
                },
                _ = sleep_until_opt(drain_deadline) => {
                    drain_deadline = None;
                    if kill_deadline.is_none() && !killed {
                        request_quit(process, entity_id).await;
                        kill_deadline = Some(Instant::now() + kill_timeout);
                    }
                }
                _ = sleep_until_opt(kill_deadline) => {
                    kill_deadline = None;
                    warn!(entity_id, ?kill_timeout, "Recorder ignored quit, killing");
                    if let Err(e) = process.kill().await {
                        warn!(entity_id, error = %e, "Failed to kill recorder");
                    }
                    killed = true;
                }
            }
        }
    }

    /// Move finished files into the final directory and report the result.
    async fn finalize(&self, path: &Path, chat: Option<&Path>, elapsed: Duration) {
        let final_dir = &self.manager.config.final_dir;

        if let Some(chat) = chat {
            if tokio::fs::try_exists(chat).await.unwrap_or(false) {
                let target = Self::unique_path(final_dir, &display_name(chat)).await;
                if let Err(e) = fs::move_file(chat, &target).await {
                    warn!(entity_id = self.entity.id, error = %e, "Failed to move chat log");
                }
            }
        }

        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            warn!(entity_id = self.entity.id, path = %path.display(), "Recorder produced no output");
            self.manager
                .notify_failed(&self.entity, "recorder produced no output");
            return;
        }

        let target = Self::unique_path(final_dir, &display_name(path)).await;
        match fs::move_file(path, &target).await {
            Ok(()) => {
                self.handle.set_output_path(Some(target.clone()));
                info!(
                    entity_id = self.entity.id,
                    session_id = self.handle.session_id,
                    file = %target.display(),
                    "Recording finalized"
                );
                self.manager
                    .notifier
                    .notify(NotificationEvent::RecordingEnded {
                        entity_id: self.entity.id,
                        entity_name: self.entity.display_name(),
                        session_id: self.handle.session_id,
                        file_name: display_name(&target),
                        duration_secs: elapsed.as_secs_f64(),
                        targets: self.entity.targets,
                        timestamp: Utc::now(),
                    });
            }
            Err(e) => {
                warn!(entity_id = self.entity.id, error = %e, "Failed to finalize recording");
                self.manager.notify_failed(&self.entity, e.to_string());
            }
        }
    }

    /// Leave the session map and let the control plane reap the entity.
    async fn finish(self) {
        let entity_id = self.entity.id;
        self.manager
            .sessions
            .remove(entity_id, self.handle.session_id);
        debug!(entity_id, session_id = self.handle.session_id, "Session closed");

        // Nobody drains mailbox 0 once shutdown has begun.
        if self.manager.is_shutting_down() {
            return;
        }
        if let Err(e) = self
            .manager
            .mailboxes
            .send(SPAWN_MAILBOX_ID, Command::Reap(entity_id))
            .await
        {
            debug!(entity_id, error = %e, "Reap not delivered");
        }
    }
}

async fn request_quit(process: &mut dyn RecorderProcess, entity_id: u64) {
    if let Err(e) = process.request_quit().await {
        warn!(entity_id, error = %e, "Failed to send quit to recorder");
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// `a_b.flv` -> `a_b.chat.jsonl` in the same directory.
fn chat_path_for(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    capture::chat_path(path.parent().unwrap_or(Path::new("")), &stem)
}

/// Split off the extension; `x.chat.jsonl` keeps its compound one, and dots
/// inside the stem (titles like `v1.2`) stay in the stem.
fn split_file_name(file_name: &str) -> (&str, &str) {
    if let Some(stem) = file_name
        .strip_suffix(CHAT_FILE_SUFFIX)
        .and_then(|s| s.strip_suffix('.'))
        .filter(|s| !s.is_empty())
    {
        return (stem, CHAT_FILE_SUFFIX);
    }
    match file_name.rfind('.') {
        Some(0) | None => (file_name, ""),
        Some(idx) => (&file_name[..idx], &file_name[idx + 1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_path_sits_next_to_recording() {
        assert_eq!(
            chat_path_for(Path::new("/w/alice_20240101-000000_hi.flv")),
            PathBuf::from("/w/alice_20240101-000000_hi.chat.jsonl")
        );
    }

    #[test]
    fn split_keeps_compound_extension() {
        assert_eq!(split_file_name("a_b.chat.jsonl"), ("a_b", "chat.jsonl"));
        assert_eq!(split_file_name("a_b.flv"), ("a_b", "flv"));
        assert_eq!(split_file_name("noext"), ("noext", ""));
    }

    #[test]
    fn split_keeps_dots_inside_title() {
        assert_eq!(
            split_file_name("alice_20240101-000000_v1.2 test.flv"),
            ("alice_20240101-000000_v1.2 test", "flv")
        );
        assert_eq!(
            split_file_name("alice_20240101-000000_v1.2 test.chat.jsonl"),
            ("alice_20240101-000000_v1.2 test", "chat.jsonl")
        );
    }

    #[tokio::test]
    async fn unique_path_with_dotted_title() {
        let temp = tempfile::TempDir::new().unwrap();
        tokio::fs::write(temp.path().join("a_v1.2.flv"), b"x").await.unwrap();

        let path = SessionTask::unique_path(temp.path(), "a_v1.2.flv").await;
        assert_eq!(path, temp.path().join("a_v1.2-1.flv"));
    }

    #[tokio::test]
    async fn unique_path_appends_counter() {
        let temp = tempfile::TempDir::new().unwrap();
        tokio::fs::write(temp.path().join("a.flv"), b"x").await.unwrap();
        tokio::fs::write(temp.path().join("a-1.flv"), b"x").await.unwrap();

        let path = SessionTask::unique_path(temp.path(), "a.flv").await;
        assert_eq!(path, temp.path().join("a-2.flv"));
        let fresh = SessionTask::unique_path(temp.path(), "b.flv").await;
        assert_eq!(fresh, temp.path().join("b.flv"));
    }

    #[test]
    fn start_outcome_exposes_session() {
        assert_eq!(StartOutcome::Started { session_id: 4 }.session_id(), Some(4));
        assert_eq!(StartOutcome::Rejected.session_id(), None);
    }
}
