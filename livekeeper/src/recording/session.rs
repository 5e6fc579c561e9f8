//! Session map: active recording slots plus superseded ("dangling") sessions.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Control messages for a session task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionControl {
    /// Graceful stop requested by a user, a supervisor or a restart.
    Stop,
    /// The stream went offline; let the recorder drain before stopping.
    StreamOffline,
    /// Process shutdown.
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// Recorder subprocess, optionally with chat capture alongside.
    Video,
    /// Chat capture without a subprocess.
    CaptureOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOrigin {
    /// Started by a supervisor on a live edge.
    Monitor,
    /// Started by a user command; never auto-restarts.
    Temporary,
}

/// Handle to one session task, cloned out of the map for delivery.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub session_id: u64,
    pub entity_id: u64,
    pub kind: SessionKind,
    pub origin: SessionOrigin,
    pub started_at: DateTime<Utc>,
    control: mpsc::Sender<SessionControl>,
    cancellation_token: CancellationToken,
    is_recording: Arc<AtomicBool>,
    /// Set once a Stop or StreamOffline has been queued.
    winding_down: Arc<AtomicBool>,
    output_path: Arc<Mutex<Option<PathBuf>>>,
}

impl SessionHandle {
    pub(crate) fn new(
        session_id: u64,
        entity_id: u64,
        kind: SessionKind,
        origin: SessionOrigin,
        control: mpsc::Sender<SessionControl>,
    ) -> Self {
        Self {
            session_id,
            entity_id,
            kind,
            origin,
            started_at: Utc::now(),
            control,
            cancellation_token: CancellationToken::new(),
            is_recording: Arc::new(AtomicBool::new(false)),
            winding_down: Arc::new(AtomicBool::new(false)),
            output_path: Arc::new(Mutex::new(None)),
        }
    }

    /// Queue a control message. Returns false if the session task is gone.
    pub fn signal(&self, message: SessionControl) -> bool {
        if matches!(message, SessionControl::Stop | SessionControl::StreamOffline) {
            self.winding_down.store(true, Ordering::Release);
        }
        match self.control.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                // A queued message already asks the task to wind down.
                trace!(session_id = self.session_id, ?message, "Session control queue full");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Kill the subprocess without waiting for a graceful exit.
    pub fn kill(&self) {
        self.cancellation_token.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    pub fn is_recording(&self) -> bool {
        self.is_recording.load(Ordering::Acquire)
    }

    /// The session was told to stop or that its stream went offline.
    pub fn is_winding_down(&self) -> bool {
        self.winding_down.load(Ordering::Acquire)
    }

    pub(crate) fn set_recording(&self, recording: bool) {
        self.is_recording.store(recording, Ordering::Release);
    }

    pub fn output_path(&self) -> Option<PathBuf> {
        self.output_path.lock().clone()
    }

    pub(crate) fn set_output_path(&self, path: Option<PathBuf>) {
        *self.output_path.lock() = path;
    }

    pub fn info(&self, dangling: bool) -> SessionInfo {
        SessionInfo {
            session_id: self.session_id,
            entity_id: self.entity_id,
            kind: self.kind,
            origin: self.origin,
            started_at: self.started_at,
            recording: self.is_recording(),
            output_path: self.output_path(),
            dangling,
        }
    }
}

/// Serializable view of a session for listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    pub session_id: u64,
    pub entity_id: u64,
    pub kind: SessionKind,
    pub origin: SessionOrigin,
    pub started_at: DateTime<Utc>,
    pub recording: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    pub dangling: bool,
}

#[derive(Default)]
struct Slots {
    /// At most one per entity.
    active: HashMap<u64, SessionHandle>,
    /// Superseded sessions keyed by session id, until their process exits.
    dangling: HashMap<u64, SessionHandle>,
}

/// Shared by the recording manager, the registry and the control plane.
#[derive(Default)]
pub struct SessionMap {
    slots: Mutex<Slots>,
}

impl SessionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Active session of `entity_id`.
    pub fn active(&self, entity_id: u64) -> Option<SessionHandle> {
        self.slots.lock().active.get(&entity_id).cloned()
    }

    /// Install `handle` as the active session of its entity.
    ///
    /// A previous active session is moved to the dangling set and returned.
    #[cfg(test)]
    pub(crate) fn install(&self, handle: SessionHandle) -> Option<SessionHandle> {
        self.install_unless(handle, |_| false).ok().flatten()
    }

    /// Like [`install`](Self::install), but keeps the current active session
    /// when `keep_existing` approves it, handing it back as `Err`.
    pub(crate) fn install_unless(
        &self,
        handle: SessionHandle,
        keep_existing: impl FnOnce(&SessionHandle) -> bool,
    ) -> std::result::Result<Option<SessionHandle>, SessionHandle> {
        let mut slots = self.slots.lock();
        if let Some(existing) = slots.active.get(&handle.entity_id) {
            if keep_existing(existing) {
                return Err(existing.clone());
            }
        }
        let previous = slots.active.insert(handle.entity_id, handle);
        if let Some(old) = &previous {
            slots.dangling.insert(old.session_id, old.clone());
            debug!(
                entity_id = old.entity_id,
                session_id = old.session_id,
                "Session moved to dangling set"
            );
        }
        Ok(previous)
    }

    /// Remove a finished session from whichever set holds it.
    pub(crate) fn remove(&self, entity_id: u64, session_id: u64) -> bool {
        let mut slots = self.slots.lock();
        if slots
            .active
            .get(&entity_id)
            .is_some_and(|h| h.session_id == session_id)
        {
            slots.active.remove(&entity_id);
            return true;
        }
        slots.dangling.remove(&session_id).is_some()
    }

    /// Whether `session_id` still owns the active slot of `entity_id`.
    pub fn is_active_session(&self, entity_id: u64, session_id: u64) -> bool {
        self.slots
            .lock()
            .active
            .get(&entity_id)
            .is_some_and(|h| h.session_id == session_id)
    }

    /// Any active or dangling session exists for `entity_id`.
    pub fn has_activity(&self, entity_id: u64) -> bool {
        Self::has_activity_locked(&self.slots.lock(), entity_id)
    }

    fn has_activity_locked(slots: &Slots, entity_id: u64) -> bool {
        slots.active.contains_key(&entity_id)
            || slots.dangling.values().any(|h| h.entity_id == entity_id)
    }

    /// Run `f` under the map lock if `entity_id` has no session at all.
    pub fn run_if_idle<R>(&self, entity_id: u64, f: impl FnOnce() -> R) -> Option<R> {
        let slots = self.slots.lock();
        if Self::has_activity_locked(&slots, entity_id) {
            return None;
        }
        Some(f())
    }

    pub fn active_count(&self) -> usize {
        self.slots.lock().active.len()
    }

    pub fn dangling_count(&self) -> usize {
        self.slots.lock().dangling.len()
    }

    /// Active sessions ordered by entity id.
    pub fn list_active(&self) -> Vec<SessionInfo> {
        let mut list: Vec<_> = self
            .slots
            .lock()
            .active
            .values()
            .map(|h| h.info(false))
            .collect();
        list.sort_by_key(|i| i.entity_id);
        list
    }

    /// Every active and dangling handle.
    pub fn all_handles(&self) -> Vec<SessionHandle> {
        let slots = self.slots.lock();
        slots
            .active
            .values()
            .chain(slots.dangling.values())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(session_id: u64, entity_id: u64) -> (SessionHandle, mpsc::Receiver<SessionControl>) {
        let (tx, rx) = mpsc::channel(4);
        (
            SessionHandle::new(
                session_id,
                entity_id,
                SessionKind::Video,
                SessionOrigin::Monitor,
                tx,
            ),
            rx,
        )
    }

    #[test]
    fn install_moves_previous_to_dangling() {
        let map = SessionMap::new();
        let (first, _rx1) = handle(1, 10);
        let (second, _rx2) = handle(2, 10);

        assert!(map.install(first).is_none());
        let previous = map.install(second).unwrap();
        assert_eq!(previous.session_id, 1);
        assert_eq!(map.active_count(), 1);
        assert_eq!(map.dangling_count(), 1);
        assert!(map.is_active_session(10, 2));
        assert!(!map.is_active_session(10, 1));
    }

    #[test]
    fn install_unless_keeps_approved_session() {
        let map = SessionMap::new();
        let (first, _rx1) = handle(1, 10);
        let (second, _rx2) = handle(2, 10);
        map.install(first);

        let kept = map.install_unless(second, |h| h.session_id == 1).unwrap_err();
        assert_eq!(kept.session_id, 1);
        assert!(map.is_active_session(10, 1));
        assert_eq!(map.dangling_count(), 0);
    }

    #[test]
    fn remove_finds_dangling_sessions() {
        let map = SessionMap::new();
        let (first, _rx1) = handle(1, 10);
        let (second, _rx2) = handle(2, 10);
        map.install(first);
        map.install(second);

        assert!(map.remove(10, 1));
        assert!(map.has_activity(10));
        assert!(map.remove(10, 2));
        assert!(!map.has_activity(10));
        assert!(!map.remove(10, 2));
    }

    #[test]
    fn run_if_idle_respects_dangling_sessions() {
        let map = SessionMap::new();
        let (first, _rx1) = handle(1, 10);
        let (second, _rx2) = handle(2, 10);
        map.install(first);
        map.install(second);
        map.remove(10, 2);

        assert_eq!(map.active_count(), 0);
        assert!(map.run_if_idle(10, || ()).is_none());
        assert_eq!(map.run_if_idle(11, || 5), Some(5));
    }

    #[test]
    fn signal_reports_closed_sessions() {
        let (h, rx) = handle(1, 1);
        assert!(h.signal(SessionControl::Stop));
        drop(rx);
        assert!(!h.signal(SessionControl::Stop));
    }

    #[test]
    fn offline_signal_marks_session_winding_down() {
        let (h, _rx) = handle(1, 1);
        assert!(!h.is_winding_down());
        h.signal(SessionControl::StreamOffline);
        assert!(h.is_winding_down());
        assert!(h.clone().is_winding_down());
    }
}
