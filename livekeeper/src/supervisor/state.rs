//! Per-entity supervisor state.

use serde::Serialize;

use crate::domain::SubscriptionFlags;

/// Lifecycle phase of a supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No monitoring flag set; waits for one command.
    Idle,
    /// Polling, last reading offline.
    Polling,
    /// Polling, last reading live.
    Live,
    ShuttingDown,
}

impl Phase {
    pub fn is_monitoring(&self) -> bool {
        matches!(self, Self::Polling | Self::Live)
    }
}

/// State owned exclusively by one supervisor task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorState {
    pub phase: Phase,
    /// Last observed live reading, for edge detection.
    pub live_flag: bool,
    /// A session was handed to the recording manager.
    pub recording: bool,
    /// Suppresses notifications and restarts on the next poll after a hot-update.
    pub pending_modify: bool,
}

impl SupervisorState {
    pub fn new(flags: &SubscriptionFlags) -> Self {
        Self {
            phase: if flags.wants_monitoring() {
                Phase::Polling
            } else {
                Phase::Idle
            },
            live_flag: false,
            recording: false,
            pending_modify: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_flags_start_idle() {
        let state = SupervisorState::new(&SubscriptionFlags::NONE);
        assert_eq!(state.phase, Phase::Idle);
        assert!(!state.phase.is_monitoring());
    }

    #[test]
    fn any_flag_starts_polling() {
        let flags = SubscriptionFlags {
            capture_chat: true,
            ..Default::default()
        };
        let state = SupervisorState::new(&flags);
        assert_eq!(state.phase, Phase::Polling);
        assert!(!state.live_flag && !state.recording && !state.pending_modify);
    }
}
