//! Reconciler: turns registry snapshots into supervisor lifecycle commands.

mod diff;
mod service;

pub use diff::{LifecycleCommand, diff_snapshots};
pub use service::Reconciler;
pub(crate) use service::panic_message;
