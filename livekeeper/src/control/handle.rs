//! Mailbox handle with backpressure-aware sends.
//!
//! - Fast path `try_send` when the mailbox has capacity
//! - Slow path waits for a permit, bounded by a timeout

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Default mailbox capacity for entity tasks.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 20;

/// Default timeout for send operations when the mailbox is full.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(2);

/// Error type for send operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The receiving task has stopped.
    ActorStopped,
    /// The mailbox is full.
    MailboxFull,
    /// The send operation timed out.
    Timeout,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::ActorStopped => write!(f, "Actor has stopped"),
            SendError::MailboxFull => write!(f, "Mailbox is full"),
            SendError::Timeout => write!(f, "Send operation timed out"),
        }
    }
}

impl std::error::Error for SendError {}

/// Metadata about a registered mailbox.
#[derive(Debug, Clone)]
pub struct ActorMetadata {
    /// Entity id (0 for the spawn mailbox).
    pub id: u64,
    /// Registration generation; unregistering requires a match.
    pub generation: u64,
    pub spawned_at: Instant,
}

impl ActorMetadata {
    pub fn new(id: u64, generation: u64) -> Self {
        Self {
            id,
            generation,
            spawned_at: Instant::now(),
        }
    }
}

/// A handle for sending messages into one task's mailbox.
pub struct ActorHandle<M> {
    sender: mpsc::Sender<M>,
    cancellation_token: CancellationToken,
    pub metadata: ActorMetadata,
    max_capacity: usize,
}

impl<M> ActorHandle<M> {
    pub fn new(
        sender: mpsc::Sender<M>,
        cancellation_token: CancellationToken,
        metadata: ActorMetadata,
    ) -> Self {
        let max_capacity = sender.max_capacity();
        Self {
            sender,
            cancellation_token,
            metadata,
            max_capacity,
        }
    }

    /// Send a message, waiting up to [`DEFAULT_SEND_TIMEOUT`] for capacity.
    pub async fn send(&self, msg: M) -> Result<(), SendError> {
        self.send_with_timeout(msg, DEFAULT_SEND_TIMEOUT).await
    }

    pub async fn send_with_timeout(&self, msg: M, timeout: Duration) -> Result<(), SendError> {
        match self.sender.try_send(msg) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(msg)) => {
                match tokio::time::timeout(timeout, self.sender.reserve()).await {
                    Ok(Ok(permit)) => {
                        permit.send(msg);
                        Ok(())
                    }
                    Ok(Err(_)) => Err(SendError::ActorStopped),
                    Err(_) => Err(SendError::Timeout),
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SendError::ActorStopped),
        }
    }

    /// Try to send a message without blocking.
    pub fn try_send(&self, msg: M) -> Result<(), SendError> {
        match self.sender.try_send(msg) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(SendError::MailboxFull),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SendError::ActorStopped),
        }
    }

    /// Returns `(current_available, max_capacity)`.
    pub fn mailbox_capacity(&self) -> (usize, usize) {
        (self.sender.capacity(), self.max_capacity)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub fn cancel(&self) {
        self.cancellation_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}

impl<M> Clone for ActorHandle<M> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            cancellation_token: self.cancellation_token.clone(),
            metadata: self.metadata.clone(),
            max_capacity: self.max_capacity,
        }
    }
}

impl<M> fmt::Debug for ActorHandle<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorHandle")
            .field("metadata", &self.metadata)
            .field("capacity", &self.mailbox_capacity())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(capacity: usize) -> (ActorHandle<u32>, mpsc::Receiver<u32>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            ActorHandle::new(tx, CancellationToken::new(), ActorMetadata::new(1, 1)),
            rx,
        )
    }

    #[tokio::test]
    async fn try_send_reports_full_mailbox() {
        let (handle, _rx) = handle(1);
        handle.try_send(1).unwrap();
        assert_eq!(handle.try_send(2), Err(SendError::MailboxFull));
        assert_eq!(handle.mailbox_capacity(), (0, 1));
    }

    #[tokio::test]
    async fn send_to_dropped_receiver_fails() {
        let (handle, rx) = handle(4);
        drop(rx);
        assert!(handle.is_closed());
        assert_eq!(handle.send(1).await, Err(SendError::ActorStopped));
    }

    #[tokio::test(start_paused = true)]
    async fn send_times_out_when_full() {
        let (handle, _rx) = handle(1);
        handle.send(1).await.unwrap();
        let result = handle
            .send_with_timeout(2, Duration::from_millis(50))
            .await;
        assert_eq!(result, Err(SendError::Timeout));
    }

    #[tokio::test]
    async fn send_waits_for_capacity() {
        let (handle, mut rx) = handle(1);
        handle.send(1).await.unwrap();

        let sender = handle.clone();
        let task = tokio::spawn(async move { sender.send(2).await });
        assert_eq!(rx.recv().await, Some(1));
        task.await.unwrap().unwrap();
        assert_eq!(rx.recv().await, Some(2));
    }
}
