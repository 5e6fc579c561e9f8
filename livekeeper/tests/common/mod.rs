//! Test doubles and a harness that runs the whole core on a paused clock.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use livekeeper::control::{ControlConfig, ShutdownReport};
use livekeeper::domain::Entity;
use livekeeper::notification::{NotificationEvent, NotificationService};
use livekeeper::provider::{LiveStatusProvider, StreamSource};
use livekeeper::recording::{Recorder, RecorderProcess, RecordingConfig};
use livekeeper::registry::{FileRegistryStore, RegistryStore};
use livekeeper::services::{CoreComponents, ServiceContainer};
use livekeeper::supervisor::SupervisorConfig;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Provider whose answers are set by the test.
#[derive(Default)]
pub struct ScriptedProvider {
    live: Mutex<HashSet<u64>>,
    /// Sources that stay resolvable while `is_live` says offline.
    lingering: Mutex<HashSet<u64>>,
    /// Remaining `is_live` calls that panic, per id.
    panics: Mutex<HashMap<u64, usize>>,
    polls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn set_live(&self, id: u64, live: bool) {
        let mut set = self.live.lock();
        if live {
            set.insert(id);
        } else {
            set.remove(&id);
        }
    }

    pub fn set_lingering(&self, id: u64, lingering: bool) {
        let mut set = self.lingering.lock();
        if lingering {
            set.insert(id);
        } else {
            set.remove(&id);
        }
    }

    pub fn panic_times(&self, id: u64, times: usize) {
        self.panics.lock().insert(id, times);
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LiveStatusProvider for ScriptedProvider {
    async fn is_live(&self, id: u64) -> bool {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let should_panic = {
            let mut panics = self.panics.lock();
            match panics.get_mut(&id) {
                Some(n) if *n > 0 => {
                    *n -= 1;
                    true
                }
                _ => false,
            }
        };
        if should_panic {
            panic!("scripted provider failure for {}", id);
        }
        self.live.lock().contains(&id)
    }

    async fn resolve_stream_source(&self, id: u64) -> Option<StreamSource> {
        let resolvable = self.live.lock().contains(&id) || self.lingering.lock().contains(&id);
        resolvable.then(|| StreamSource::new(format!("http://cdn.test/{}.flv", id)))
    }

    async fn current_title(&self, id: u64) -> String {
        format!("stream {}", id)
    }
}

/// Observable state of one fake recorder process.
#[derive(Default)]
pub struct ProcessProbe {
    pub output: Mutex<PathBuf>,
    quits: AtomicUsize,
    kills: AtomicUsize,
    exited: CancellationToken,
}

impl ProcessProbe {
    pub fn quits(&self) -> usize {
        self.quits.load(Ordering::SeqCst)
    }

    pub fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    pub fn has_exited(&self) -> bool {
        self.exited.is_cancelled()
    }

    /// Make the process exit on its own.
    pub fn crash(&self) {
        self.exited.cancel();
    }
}

struct FakeProcess {
    probe: Arc<ProcessProbe>,
    ignore_quit: bool,
}

#[async_trait]
impl RecorderProcess for FakeProcess {
    async fn request_quit(&mut self) -> livekeeper::Result<()> {
        self.probe.quits.fetch_add(1, Ordering::SeqCst);
        if !self.ignore_quit {
            self.probe.exited.cancel();
        }
        Ok(())
    }

    async fn kill(&mut self) -> livekeeper::Result<()> {
        self.probe.kills.fetch_add(1, Ordering::SeqCst);
        self.probe.exited.cancel();
        Ok(())
    }

    async fn wait(&mut self) -> livekeeper::Result<Option<i32>> {
        self.probe.exited.cancelled().await;
        Ok(Some(0))
    }
}

/// Recorder that writes a stub file and runs until quit or kill.
#[derive(Default)]
pub struct FakeRecorder {
    ignore_quit: bool,
    spawned: Mutex<Vec<Arc<ProcessProbe>>>,
}

impl FakeRecorder {
    pub fn ignoring_quit() -> Self {
        Self {
            ignore_quit: true,
            ..Default::default()
        }
    }

    pub fn spawn_count(&self) -> usize {
        self.spawned.lock().len()
    }

    pub fn process(&self, index: usize) -> Arc<ProcessProbe> {
        Arc::clone(&self.spawned.lock()[index])
    }
}

#[async_trait]
impl Recorder for FakeRecorder {
    async fn spawn(
        &self,
        _source: &StreamSource,
        output: &Path,
    ) -> livekeeper::Result<Box<dyn RecorderProcess>> {
        tokio::fs::write(output, b"FLV").await?;
        let probe = Arc::new(ProcessProbe::default());
        *probe.output.lock() = output.to_path_buf();
        self.spawned.lock().push(Arc::clone(&probe));
        Ok(Box::new(FakeProcess {
            probe,
            ignore_quit: self.ignore_quit,
        }))
    }
}

pub struct Harness {
    pub temp: TempDir,
    pub container: ServiceContainer,
    pub provider: Arc<ScriptedProvider>,
    pub recorder: Arc<FakeRecorder>,
    pub store: Arc<FileRegistryStore>,
    events: broadcast::Receiver<NotificationEvent>,
}

pub fn registry_path(temp: &TempDir) -> PathBuf {
    temp.path().join("subscriptions.json")
}

pub fn recording_config(temp: &TempDir) -> RecordingConfig {
    RecordingConfig {
        work_dir: temp.path().join("work"),
        final_dir: temp.path().join("final"),
        resolve_attempts: 3,
        resolve_backoff: Duration::from_secs(1),
        kill_timeout: Duration::from_secs(5),
        restart_delay: Duration::from_secs(1),
        offline_drain: Duration::from_secs(10),
        ..RecordingConfig::default()
    }
}

pub fn control_config() -> ControlConfig {
    ControlConfig {
        registry_poll_interval: Duration::from_secs(5),
        reconcile_restart_delay: Duration::from_secs(1),
        shutdown_grace: Duration::from_secs(10),
    }
}

impl Harness {
    pub async fn new(entities: &[Entity]) -> Self {
        Self::with(entities, FakeRecorder::default(), |_| {}).await
    }

    /// Build a harness, letting the test adjust the components first.
    pub async fn with(
        entities: &[Entity],
        recorder: FakeRecorder,
        adjust: impl FnOnce(&mut CoreComponents),
    ) -> Self {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(FileRegistryStore::new(registry_path(&temp)).unwrap());
        store.save_snapshot(entities).await.unwrap();

        let provider = Arc::new(ScriptedProvider::default());
        let recorder = Arc::new(recorder);
        let notifier = Arc::new(NotificationService::new());
        let events = notifier.subscribe();

        let mut components = CoreComponents {
            store: Arc::clone(&store) as Arc<dyn RegistryStore>,
            provider: Arc::clone(&provider) as Arc<dyn LiveStatusProvider>,
            recorder: Arc::clone(&recorder) as Arc<dyn Recorder>,
            notifier,
            chat: None,
            supervisor: SupervisorConfig::default(),
            recording: recording_config(&temp),
            control: control_config(),
        };
        adjust(&mut components);

        let container = ServiceContainer::new(components).await.unwrap();
        Self {
            temp,
            container,
            provider,
            recorder,
            store,
            events,
        }
    }

    /// Start the control plane in the background.
    pub fn start(&self) -> JoinHandle<ShutdownReport> {
        let plane = self.container.control_plane().unwrap();
        tokio::spawn(plane.run())
    }

    /// Every notification emitted since the last call.
    pub fn drain_events(&mut self) -> Vec<NotificationEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn final_dir(&self) -> PathBuf {
        self.temp.path().join("final")
    }
}

/// Let the paused clock run for `secs` seconds.
pub async fn advance(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

pub fn count(events: &[NotificationEvent], event_type: &str) -> usize {
    events.iter().filter(|e| e.event_type() == event_type).count()
}
