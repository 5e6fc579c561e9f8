//! Notification dispatch.
//!
//! Delivery is fire-and-forget: every enabled channel gets its own task,
//! failures are logged and never retried.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::channels::NotificationChannel;
use super::events::NotificationEvent;

/// Capacity of the in-process event broadcast.
const EVENT_BROADCAST_CAPACITY: usize = 256;

/// Fans events out to the configured channels.
pub struct NotificationService {
    channels: RwLock<Vec<Arc<dyn NotificationChannel>>>,
    event_tx: broadcast::Sender<NotificationEvent>,
}

impl NotificationService {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BROADCAST_CAPACITY);
        Self {
            channels: RwLock::new(Vec::new()),
            event_tx,
        }
    }

    pub fn with_channels(channels: Vec<Arc<dyn NotificationChannel>>) -> Self {
        let service = Self::new();
        for channel in channels {
            service.add_channel(channel);
        }
        service
    }

    pub fn add_channel(&self, channel: Arc<dyn NotificationChannel>) {
        debug!(channel = channel.channel_type(), "Notification channel added");
        self.channels.write().push(channel);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.read().len()
    }

    /// Subscribe to every dispatched event (in-process observers).
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.event_tx.subscribe()
    }

    /// Dispatch `event` to every enabled channel without waiting for delivery.
    pub fn notify(&self, event: NotificationEvent) {
        let _ = self.event_tx.send(event.clone());

        let channels: Vec<_> = self
            .channels
            .read()
            .iter()
            .filter(|c| c.is_enabled())
            .cloned()
            .collect();
        if channels.is_empty() {
            return;
        }

        let event = Arc::new(event);
        for channel in channels {
            let event = Arc::clone(&event);
            tokio::spawn(async move {
                if let Err(e) = channel.send(&event).await {
                    warn!(
                        channel = channel.channel_type(),
                        event_type = event.event_type(),
                        entity_id = event.entity_id(),
                        error = %e,
                        "Notification delivery failed"
                    );
                }
            });
        }
    }
}

impl Default for NotificationService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NotifyTargets;
    use crate::{Error, Result};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingChannel {
        enabled: bool,
        fail: bool,
        sent: AtomicUsize,
    }

    #[async_trait]
    impl NotificationChannel for CountingChannel {
        fn channel_type(&self) -> &'static str {
            "counting"
        }

        fn is_enabled(&self) -> bool {
            self.enabled
        }

        async fn send(&self, _event: &NotificationEvent) -> Result<()> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::Other("boom".into()));
            }
            Ok(())
        }
    }

    fn counting(enabled: bool, fail: bool) -> Arc<CountingChannel> {
        Arc::new(CountingChannel {
            enabled,
            fail,
            sent: AtomicUsize::new(0),
        })
    }

    fn offline_event() -> NotificationEvent {
        NotificationEvent::WentOffline {
            entity_id: 1,
            entity_name: "a".into(),
            targets: NotifyTargets::default(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn dispatches_to_enabled_channels_only() {
        let on = counting(true, false);
        let off = counting(false, false);
        let failing = counting(true, true);
        let service = NotificationService::with_channels(vec![
            on.clone(),
            off.clone(),
            failing.clone(),
        ]);
        let mut rx = service.subscribe();

        service.notify(offline_event());

        assert_eq!(rx.recv().await.unwrap().event_type(), "went_offline");
        for _ in 0..50 {
            if on.sent.load(Ordering::SeqCst) == 1 && failing.sent.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(on.sent.load(Ordering::SeqCst), 1);
        assert_eq!(failing.sent.load(Ordering::SeqCst), 1);
        assert_eq!(off.sent.load(Ordering::SeqCst), 0);
    }
}
