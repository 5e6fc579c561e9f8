//! Control plane: mailbox routing, restart bookkeeping and shutdown.

mod handle;
mod mailbox;
mod messages;
mod plane;
mod restart_tracker;

pub use handle::{
    ActorHandle, ActorMetadata, DEFAULT_MAILBOX_CAPACITY, DEFAULT_SEND_TIMEOUT, SendError,
};
pub use mailbox::{MailboxMap, Registration};
pub use messages::{Command, StartReason};
pub use plane::{ControlConfig, ControlPlane, ShutdownReport};
pub use restart_tracker::{RestartTracker, RestartTrackerConfig};
