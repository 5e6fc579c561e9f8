//! Application configuration.
//!
//! Configuration is read from an optional TOML file and then overridden by
//! `LIVEKEEPER_*` environment variables (a `.env` file is honoured through
//! `dotenvy`). Durations are written as whole seconds in the file and turned
//! into the runtime configs each component consumes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::control::ControlConfig;
use crate::recording::RecordingConfig;
use crate::supervisor::SupervisorConfig;
use crate::{Error, Result};

/// Environment variable prefix for overrides.
const ENV_PREFIX: &str = "LIVEKEEPER_";

/// Registry (subscription list) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySection {
    /// Path of the persisted subscription file.
    pub path: PathBuf,
    /// How often the file is checked for external edits.
    pub poll_interval_secs: u64,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("subscriptions.json"),
            poll_interval_secs: 60,
        }
    }
}

/// Per-entity supervisor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSection {
    pub tick_interval_secs: u64,
    /// Extra source probes that must all fail before an offline edge fires.
    pub offline_confirm_probes: u32,
    pub crash_backoff_secs: u64,
    pub mailbox_capacity: usize,
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            tick_interval_secs: 1,
            offline_confirm_probes: 1,
            crash_backoff_secs: 2,
            mailbox_capacity: 20,
        }
    }
}

/// Recorder subprocess and output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingSection {
    pub recorder_binary: String,
    /// Directory the recorder writes into while a session is running.
    pub work_dir: PathBuf,
    /// Directory finished recordings are moved to.
    pub final_dir: PathBuf,
    pub extension: String,
    pub resolve_attempts: u32,
    pub resolve_backoff_secs: u64,
    pub kill_timeout_secs: u64,
    pub restart_delay_secs: u64,
    pub offline_drain_secs: u64,
    pub max_filename_bytes: usize,
}

impl Default for RecordingSection {
    fn default() -> Self {
        Self {
            recorder_binary: "ffmpeg".to_string(),
            work_dir: PathBuf::from("recordings/.partial"),
            final_dir: PathBuf::from("recordings"),
            extension: "flv".to_string(),
            resolve_attempts: 3,
            resolve_backoff_secs: 10,
            kill_timeout_secs: 20,
            restart_delay_secs: 3,
            offline_drain_secs: 30,
            max_filename_bytes: 200,
        }
    }
}

/// Live status provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    /// Base URL of the status sidecar (`GET {endpoint}/{id}`).
    pub endpoint: String,
    pub timeout_secs: u64,
    pub user_agent: Option<String>,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8090/status".to_string(),
            timeout_secs: 10,
            user_agent: None,
        }
    }
}

/// Notification channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSection {
    /// Emit notifications as structured log lines.
    pub log_channel: bool,
    /// OneBot-style HTTP endpoint for chat pushes; disabled when unset.
    pub chat_bot_endpoint: Option<String>,
    pub chat_bot_token: Option<String>,
    pub chat_bot_timeout_secs: u64,
}

impl Default for NotificationSection {
    fn default() -> Self {
        Self {
            log_channel: true,
            chat_bot_endpoint: None,
            chat_bot_token: None,
            chat_bot_timeout_secs: 10,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub log_dir: PathBuf,
    /// Log filter directive applied at startup (e.g. `livekeeper=debug`).
    pub log_filter: Option<String>,
    pub shutdown_grace_secs: u64,
    pub registry: RegistrySection,
    pub supervisor: SupervisorSection,
    pub recording: RecordingSection,
    pub provider: ProviderSection,
    pub notification: NotificationSection,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            log_filter: None,
            shutdown_grace_secs: 30,
            registry: RegistrySection::default(),
            supervisor: SupervisorSection::default(),
            recording: RecordingSection::default(),
            provider: ProviderSection::default(),
            notification: NotificationSection::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `path` (if given and present) plus environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(path)?,
            Some(path) => {
                warn!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::io_path("reading config", path, e))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::config(format!("invalid config: {}", e)))
    }

    /// Apply `LIVEKEEPER_*` overrides using `lookup` to read variables.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(v) = get("LOG_DIR") {
            self.log_dir = PathBuf::from(v);
        }
        if let Some(v) = get("LOG_FILTER") {
            self.log_filter = Some(v);
        }
        if let Some(v) = get("REGISTRY_PATH") {
            self.registry.path = PathBuf::from(v);
        }
        if let Some(v) = get("RECORDER") {
            self.recording.recorder_binary = v;
        }
        if let Some(v) = get("WORK_DIR") {
            self.recording.work_dir = PathBuf::from(v);
        }
        if let Some(v) = get("FINAL_DIR") {
            self.recording.final_dir = PathBuf::from(v);
        }
        if let Some(v) = get("STATUS_ENDPOINT") {
            self.provider.endpoint = v;
        }
        if let Some(v) = get("CHAT_BOT_ENDPOINT") {
            self.notification.chat_bot_endpoint = Some(v);
        }
        if let Some(v) = get("CHAT_BOT_TOKEN") {
            self.notification.chat_bot_token = Some(v);
        }
        if let Some(v) = get("SHUTDOWN_GRACE_SECS") {
            self.shutdown_grace_secs = parse_env("SHUTDOWN_GRACE_SECS", &v)?;
        }
        if let Some(v) = get("TICK_INTERVAL_SECS") {
            self.supervisor.tick_interval_secs = parse_env("TICK_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = get("OFFLINE_CONFIRM_PROBES") {
            self.supervisor.offline_confirm_probes = parse_env("OFFLINE_CONFIRM_PROBES", &v)?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.supervisor.tick_interval_secs == 0 {
            return Err(Error::config("supervisor.tick_interval_secs must be > 0"));
        }
        if self.registry.poll_interval_secs == 0 {
            return Err(Error::config("registry.poll_interval_secs must be > 0"));
        }
        if self.supervisor.mailbox_capacity == 0 {
            return Err(Error::config("supervisor.mailbox_capacity must be > 0"));
        }
        if self.recording.resolve_attempts == 0 {
            return Err(Error::config("recording.resolve_attempts must be > 0"));
        }
        if self.recording.max_filename_bytes < 32 {
            return Err(Error::config("recording.max_filename_bytes must be >= 32"));
        }
        debug!("Configuration validated");
        Ok(())
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            tick_interval: Duration::from_secs(self.supervisor.tick_interval_secs),
            offline_confirm_probes: self.supervisor.offline_confirm_probes,
            crash_backoff: Duration::from_secs(self.supervisor.crash_backoff_secs),
            mailbox_capacity: self.supervisor.mailbox_capacity,
        }
    }

    pub fn recording_config(&self) -> RecordingConfig {
        let r = &self.recording;
        RecordingConfig {
            work_dir: r.work_dir.clone(),
            final_dir: r.final_dir.clone(),
            extension: r.extension.clone(),
            resolve_attempts: r.resolve_attempts,
            resolve_backoff: Duration::from_secs(r.resolve_backoff_secs),
            kill_timeout: Duration::from_secs(r.kill_timeout_secs),
            restart_delay: Duration::from_secs(r.restart_delay_secs),
            offline_drain: Duration::from_secs(r.offline_drain_secs),
            max_filename_bytes: r.max_filename_bytes,
        }
    }

    pub fn control_config(&self) -> ControlConfig {
        ControlConfig {
            registry_poll_interval: Duration::from_secs(self.registry.poll_interval_secs),
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
            ..ControlConfig::default()
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("{}{} has invalid value '{}'", ENV_PREFIX, name, value)))
}
