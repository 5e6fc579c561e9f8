//! livekeeper: supervision and reconciliation core for live-stream recording.
//!
//! A persisted subscription list is reconciled into one supervisor task per
//! broadcaster. Supervisors poll live status, emit notifications and drive
//! recording sessions; the control plane owns their mailboxes, restarts
//! crashed supervisors and bounds shutdown.

pub mod commands;
pub mod config;
pub mod control;
pub mod domain;
pub mod error;
pub mod logging;
pub mod notification;
pub mod provider;
pub mod reconciler;
pub mod recording;
pub mod registry;
pub mod services;
pub mod supervisor;
pub mod utils;

pub use error::{Error, Result};
