//! Restart tracker for supervisor crash backoff.
//!
//! - First 3 failures within the failure window: no extra backoff
//! - After that: backoff = base * 2^(failures - 3), capped at `max_backoff`
//! - 10 failures inside one window: give up on the entity
//! - Failure count resets once the window expires

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

pub const DEFAULT_BASE_BACKOFF: Duration = Duration::from_secs(1);

pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(300);

pub const DEFAULT_FAILURE_WINDOW: Duration = Duration::from_secs(60);

/// Failures tolerated before backoff grows.
pub const DEFAULT_FAILURE_THRESHOLD: usize = 3;

/// Failures within one window after which restarts stop.
pub const DEFAULT_MAX_FAILURES: usize = 10;

/// Maximum exponent to prevent overflow.
const MAX_EXPONENT: u32 = 10;

#[derive(Debug, Clone)]
pub struct RestartTrackerConfig {
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub failure_window: Duration,
    pub failure_threshold: usize,
    pub max_failures: usize,
}

impl Default for RestartTrackerConfig {
    fn default() -> Self {
        Self {
            base_backoff: DEFAULT_BASE_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            failure_window: DEFAULT_FAILURE_WINDOW,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            max_failures: DEFAULT_MAX_FAILURES,
        }
    }
}

/// Restart history for a single entity.
#[derive(Debug, Clone, Default)]
struct RestartHistory {
    failures: Vec<Instant>,
    total_restarts: u64,
}

impl RestartHistory {
    /// Record a failure and return the number of recent failures.
    fn record_failure(&mut self, now: Instant, window: Duration) -> usize {
        self.failures.retain(|&t| now.duration_since(t) < window);
        self.failures.push(now);
        self.total_restarts += 1;
        self.failures.len()
    }

    fn recent_failures(&self, now: Instant, window: Duration) -> usize {
        self.failures
            .iter()
            .filter(|&&t| now.duration_since(t) < window)
            .count()
    }
}

/// Per-entity failure history and backoff calculation.
pub struct RestartTracker {
    history: HashMap<u64, RestartHistory>,
    config: RestartTrackerConfig,
}

impl RestartTracker {
    pub fn new() -> Self {
        Self::with_config(RestartTrackerConfig::default())
    }

    pub fn with_config(config: RestartTrackerConfig) -> Self {
        Self {
            history: HashMap::new(),
            config,
        }
    }

    /// Record a failure for `id` and return the extra backoff to apply.
    pub fn record_failure(&mut self, id: u64) -> Duration {
        let now = Instant::now();
        let failures = self
            .history
            .entry(id)
            .or_default()
            .record_failure(now, self.config.failure_window);
        let backoff = self.calculate_backoff(failures);

        if backoff.is_zero() {
            debug!(entity_id = id, failures, "Supervisor failed, no extra backoff");
        } else {
            info!(entity_id = id, failures, ?backoff, "Supervisor failed, backing off");
        }

        backoff
    }

    /// Formula: base * 2^(failures - threshold) for failures >= threshold.
    fn calculate_backoff(&self, failures: usize) -> Duration {
        if failures < self.config.failure_threshold {
            return Duration::ZERO;
        }

        let exponent =
            (failures - self.config.failure_threshold).min(MAX_EXPONENT as usize) as u32;
        let multiplier = 2u32.saturating_pow(exponent);
        self.config
            .base_backoff
            .saturating_mul(multiplier)
            .min(self.config.max_backoff)
    }

    pub fn recent_failures(&self, id: u64) -> usize {
        let now = Instant::now();
        self.history
            .get(&id)
            .map(|h| h.recent_failures(now, self.config.failure_window))
            .unwrap_or(0)
    }

    pub fn total_restarts(&self, id: u64) -> u64 {
        self.history.get(&id).map(|h| h.total_restarts).unwrap_or(0)
    }

    /// Whether `id` is still under the failure cap for the current window.
    pub fn should_restart(&self, id: u64) -> bool {
        self.recent_failures(id) < self.config.max_failures
    }

    /// Forget an entity (e.g. after it was removed).
    pub fn remove(&mut self, id: u64) {
        self.history.remove(&id);
    }
}

impl Default for RestartTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_backoff_under_threshold() {
        let mut tracker = RestartTracker::new();
        for _ in 0..2 {
            assert_eq!(tracker.record_failure(1), Duration::ZERO);
        }
        assert_eq!(tracker.recent_failures(1), 2);
        assert!(tracker.should_restart(1));
    }

    #[test]
    fn exponential_backoff_after_threshold() {
        let mut tracker = RestartTracker::new();
        tracker.record_failure(1);
        tracker.record_failure(1);
        assert_eq!(tracker.record_failure(1), Duration::from_secs(1));
        assert_eq!(tracker.record_failure(1), Duration::from_secs(2));
        assert_eq!(tracker.record_failure(1), Duration::from_secs(4));
    }

    #[test]
    fn backoff_is_capped() {
        let mut tracker = RestartTracker::with_config(RestartTrackerConfig {
            max_backoff: Duration::from_secs(10),
            max_failures: 100,
            ..Default::default()
        });
        for _ in 0..20 {
            tracker.record_failure(1);
        }
        assert_eq!(tracker.record_failure(1), Duration::from_secs(10));
    }

    #[test]
    fn gives_up_at_failure_cap() {
        let mut tracker = RestartTracker::new();
        for _ in 0..9 {
            tracker.record_failure(7);
        }
        assert!(tracker.should_restart(7));
        tracker.record_failure(7);
        assert!(!tracker.should_restart(7));
        assert!(tracker.should_restart(8));
    }

    #[tokio::test(start_paused = true)]
    async fn failures_expire_with_window() {
        let mut tracker = RestartTracker::new();
        for _ in 0..10 {
            tracker.record_failure(2);
        }
        assert!(!tracker.should_restart(2));

        tokio::time::advance(DEFAULT_FAILURE_WINDOW + Duration::from_secs(1)).await;
        assert_eq!(tracker.recent_failures(2), 0);
        assert!(tracker.should_restart(2));
        assert_eq!(tracker.total_restarts(2), 10);
    }
}
