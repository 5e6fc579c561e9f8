//! Chat capture: one JSON line per message next to the recording.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::utils::fs;
use crate::{Error, Result};

/// Suffix appended to a recording stem for its chat log.
pub const CHAT_FILE_SUFFIX: &str = "chat.jsonl";

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub timestamp: DateTime<Utc>,
    pub user: String,
    pub content: String,
}

/// Stream of chat messages for an entity.
#[async_trait]
pub trait ChatSource: Send + Sync + 'static {
    /// Next message, or `None` once the stream has ended.
    async fn next_message(&self, id: u64) -> Option<ChatMessage>;
}

/// Chat source that never yields.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullChatSource;

#[async_trait]
impl ChatSource for NullChatSource {
    async fn next_message(&self, _id: u64) -> Option<ChatMessage> {
        std::future::pending().await
    }
}

/// `{dir}/{stem}.chat.jsonl`
pub fn chat_path(dir: &Path, stem: &str) -> PathBuf {
    dir.join(format!("{}.{}", stem, CHAT_FILE_SUFFIX))
}

/// Write messages from `source` to `path` until cancelled or the stream ends.
///
/// Returns the number of messages written.
pub async fn run_capture(
    source: &dyn ChatSource,
    entity_id: u64,
    path: &Path,
    token: CancellationToken,
) -> Result<u64> {
    fs::ensure_parent_dir_with_op("creating chat capture directory", path).await?;
    let file = tokio::fs::File::create(path)
        .await
        .map_err(|e| Error::io_path("creating chat capture file", path, e))?;
    let mut writer = BufWriter::new(file);
    let mut written = 0u64;

    loop {
        let message = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            message = source.next_message(entity_id) => message,
        };
        let Some(message) = message else {
            debug!(entity_id, "Chat stream ended");
            break;
        };

        let mut line = serde_json::to_vec(&message)?;
        line.push(b'\n');
        if let Err(e) = writer.write_all(&line).await {
            warn!(entity_id, error = %e, "Failed to write chat message");
            break;
        }
        written += 1;
    }

    writer
        .flush()
        .await
        .map_err(|e| Error::io_path("flushing chat capture file", path, e))?;
    debug!(entity_id, written, path = %path.display(), "Chat capture finished");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use tempfile::TempDir;

    struct ScriptedChat {
        messages: Mutex<VecDeque<ChatMessage>>,
    }

    #[async_trait]
    impl ChatSource for ScriptedChat {
        async fn next_message(&self, _id: u64) -> Option<ChatMessage> {
            self.messages.lock().pop_front()
        }
    }

    fn message(content: &str) -> ChatMessage {
        ChatMessage {
            timestamp: Utc::now(),
            user: "viewer".into(),
            content: content.into(),
        }
    }

    #[test]
    fn chat_path_uses_stem() {
        assert_eq!(
            chat_path(Path::new("/rec"), "alice_20240101-000000_hi"),
            PathBuf::from("/rec/alice_20240101-000000_hi.chat.jsonl")
        );
    }

    #[tokio::test]
    async fn writes_one_line_per_message() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sub").join("a.chat.jsonl");
        let source = ScriptedChat {
            messages: Mutex::new(VecDeque::from([message("hello"), message("world")])),
        };

        let written = run_capture(&source, 1, &path, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(written, 2);

        let text = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<ChatMessage> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].content, "world");
    }

    #[tokio::test]
    async fn cancellation_stops_a_silent_source() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("b.chat.jsonl");
        let token = CancellationToken::new();
        token.cancel();

        let written = run_capture(&NullChatSource, 1, &path, token).await.unwrap();
        assert_eq!(written, 0);
        assert!(path.exists());
    }
}
