//! Entity supervisors: one polling task per subscribed entity.

mod actor;
mod board;
mod runner;
mod state;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

pub use actor::{EntitySupervisor, SupervisorExit};
pub use board::{LiveBoard, LiveInfo};
pub use runner::{SupervisorTaskResult, TaskOutcome, run_supervisor};
pub use state::{Phase, SupervisorState};

use crate::control::{MailboxMap, RestartTracker};
use crate::notification::NotificationService;
use crate::provider::LiveStatusProvider;
use crate::recording::RecordingManager;

/// Supervisor timing and limits.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub tick_interval: Duration,
    /// Source probes that must all fail before an offline reading counts.
    pub offline_confirm_probes: u32,
    /// Minimum delay before a crashed supervisor is restarted.
    pub crash_backoff: Duration,
    pub mailbox_capacity: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            offline_confirm_probes: 1,
            crash_backoff: Duration::from_secs(2),
            mailbox_capacity: crate::control::DEFAULT_MAILBOX_CAPACITY,
        }
    }
}

/// Collaborators shared by every supervisor.
pub struct SupervisorContext {
    pub provider: Arc<dyn LiveStatusProvider>,
    pub recordings: Arc<RecordingManager>,
    pub notifier: Arc<NotificationService>,
    pub mailboxes: Arc<MailboxMap>,
    pub board: Arc<LiveBoard>,
    pub restarts: Arc<Mutex<RestartTracker>>,
    pub config: SupervisorConfig,
    /// Cancelled once shutdown begins; pending restarts are dropped.
    pub shutdown: CancellationToken,
}
