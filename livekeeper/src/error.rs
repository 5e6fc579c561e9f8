//! Application-wide error types.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::control::SendError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error while {op} {}: {source}", path.display())]
    IoPath {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Entity not found: {0}")]
    NotFound(u64),

    #[error("Recorder error: {0}")]
    Recorder(String),

    #[error("Status provider error: {0}")]
    Provider(String),

    #[error("Mailbox error for entity {id}: {source}")]
    Mailbox {
        id: u64,
        #[source]
        source: SendError,
    },

    #[error("Shutdown in progress")]
    ShuttingDown,

    #[error("{0}")]
    Other(String),
}

/// A supervisor tick loop fault. The crash wrapper restarts the task.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct ActorError {
    pub message: String,
}

impl ActorError {
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Error {
    pub fn io_path(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn mailbox(id: u64, source: SendError) -> Self {
        Self::Mailbox { id, source }
    }

    /// Whether retrying the failed operation later can reasonably succeed.
    ///
    /// Network, subprocess and full-mailbox failures are transient;
    /// configuration and validation problems need a new input first.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Provider(_) | Self::Recorder(_) => true,
            Self::Mailbox { source, .. } => !matches!(source, SendError::ActorStopped),
            Self::Io(_) | Self::IoPath { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actor_error_displays_message() {
        let err = ActorError::fatal("mailbox closed while idle");
        assert_eq!(err.to_string(), "mailbox closed while idle");
    }

    #[test]
    fn transient_classification() {
        assert!(Error::Provider("timeout".into()).is_transient());
        assert!(Error::mailbox(3, SendError::MailboxFull).is_transient());
        assert!(!Error::mailbox(3, SendError::ActorStopped).is_transient());
        assert!(!Error::config("bad file").is_transient());
        assert!(!Error::ShuttingDown.is_transient());
    }

    #[test]
    fn io_path_message_names_the_path() {
        let err = Error::io_path(
            "reading registry",
            Path::new("/tmp/registry.json"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        let msg = err.to_string();
        assert!(msg.contains("reading registry"));
        assert!(msg.contains("/tmp/registry.json"));
    }
}
