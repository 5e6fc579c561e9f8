//! Recording sessions: recorder subprocesses, chat capture, and the
//! session map shared with the registry and the control plane.

pub mod capture;
mod manager;
pub mod recorder;
mod session;

pub use capture::{ChatMessage, ChatSource, NullChatSource};
pub use manager::{RecordingConfig, RecordingManager, StartOutcome};
pub use recorder::{FfmpegRecorder, Recorder, RecorderProcess};
pub use session::{
    SessionControl, SessionHandle, SessionInfo, SessionKind, SessionMap, SessionOrigin,
};
