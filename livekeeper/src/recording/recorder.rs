//! Recorder subprocess abstraction and the ffmpeg adapter.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Child;
use tracing::{debug, info, warn};

use crate::provider::StreamSource;
use crate::{Error, Result};

/// Byte that asks the recorder to finish the file and exit.
pub const QUIT_BYTE: &[u8] = b"q";

/// Spawns recorder processes.
#[async_trait]
pub trait Recorder: Send + Sync + 'static {
    /// Start recording `source` into `output`.
    async fn spawn(&self, source: &StreamSource, output: &Path) -> Result<Box<dyn RecorderProcess>>;
}

/// A running recorder process.
///
/// `wait` must be cancel-safe so it can sit in a `select!` next to control
/// messages.
#[async_trait]
pub trait RecorderProcess: Send {
    /// Ask the process to finalize its output and exit.
    async fn request_quit(&mut self) -> Result<()>;

    /// Kill the process immediately.
    async fn kill(&mut self) -> Result<()>;

    /// Wait for exit, returning the exit code if there is one.
    async fn wait(&mut self) -> Result<Option<i32>>;
}

/// ffmpeg-based recorder (`-i <url> -c copy <output>`).
#[derive(Debug, Clone)]
pub struct FfmpegRecorder {
    binary_path: String,
    version: Option<String>,
}

impl FfmpegRecorder {
    pub fn new(binary_path: impl Into<String>) -> Self {
        let binary_path = binary_path.into();
        let version = Self::detect_version(&binary_path);
        match &version {
            Some(v) => info!(binary = %binary_path, version = %v, "Recorder available"),
            None => warn!(binary = %binary_path, "Recorder binary not found or not runnable"),
        }
        Self {
            binary_path,
            version,
        }
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Detect ffmpeg version.
    fn detect_version(path: &str) -> Option<String> {
        process_utils::std_command(path)
            .arg("-version")
            .output()
            .ok()
            .and_then(|output| {
                String::from_utf8(output.stdout)
                    .ok()
                    .and_then(|s| s.lines().next().map(|l| l.to_string()))
            })
    }

    /// Build ffmpeg command arguments.
    fn build_args(source: &StreamSource, output: &Path) -> Vec<String> {
        let mut args = vec!["-y".to_string(), "-hide_banner".to_string()];

        let mut headers: Vec<_> = source.headers.iter().collect();
        headers.sort();
        for (key, value) in headers {
            if key.eq_ignore_ascii_case("user-agent") {
                args.extend(["-user_agent".to_string(), value.clone()]);
            } else {
                args.extend(["-headers".to_string(), format!("{}: {}\r\n", key, value)]);
            }
        }

        args.extend(["-i".to_string(), source.playback_url.clone()]);
        args.extend(["-c".to_string(), "copy".to_string()]);
        args.push(output.to_string_lossy().to_string());
        args
    }
}

#[async_trait]
impl Recorder for FfmpegRecorder {
    async fn spawn(&self, source: &StreamSource, output: &Path) -> Result<Box<dyn RecorderProcess>> {
        let args = Self::build_args(source, output);
        debug!(output = %output.display(), ?args, "Starting ffmpeg");

        let mut child = process_utils::tokio_command(&self.binary_path)
            .args(&args)
            .env("LC_ALL", "C")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Recorder(format!("Failed to spawn ffmpeg: {}", e)))?;

        if let Some(stderr) = child.stderr.take() {
            let output_name = output
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if line.contains("Error") || line.contains("error") {
                        warn!(output = %output_name, "ffmpeg: {}", line);
                    } else {
                        debug!(output = %output_name, "ffmpeg: {}", line);
                    }
                }
            });
        }

        Ok(Box::new(FfmpegProcess { child }))
    }
}

/// A spawned ffmpeg child.
struct FfmpegProcess {
    child: Child,
}

#[async_trait]
impl RecorderProcess for FfmpegProcess {
    async fn request_quit(&mut self) -> Result<()> {
        let Some(stdin) = self.child.stdin.as_mut() else {
            return Err(Error::Recorder("ffmpeg stdin is not available".to_string()));
        };
        stdin.write_all(QUIT_BYTE).await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn kill(&mut self) -> Result<()> {
        match self.child.kill().await {
            Ok(()) => Ok(()),
            // Already exited.
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn wait(&mut self) -> Result<Option<i32>> {
        let status = self.child.wait().await?;
        Ok(status.code())
    }
}
