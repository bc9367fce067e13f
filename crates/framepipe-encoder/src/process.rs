//! Raw-pipe encoder: one ffmpeg child fed through its stdin.
//!
//! ```text
//! write_frame ──► ChildStdin ──► ffmpeg -f rawvideo -i - ──► output.mp4
//!                                  stderr ──► tracing (warn)
//! ```
//!
//! A full pipe makes `write_frame` wait, which is what throttles the
//! capture loop when the encoder falls behind.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use framepipe_core::{EncoderError, EncoderState};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::FrameSink;

const STDERR_GRACE: Duration = Duration::from_secs(1);

pub struct EncoderProcess {
    child:            Child,
    stdin:            Option<ChildStdin>,
    state:            EncoderState,
    stderr_task:      Option<JoinHandle<()>>,
    finalize_timeout: Option<Duration>,
    bytes_written:    u64,
}

impl EncoderProcess {
    /// Spawn `binary` with `args`, stdin piped for frames and stderr forwarded to the log.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        binary: &Path,
        args: &[String],
        finalize_timeout: Option<Duration>,
    ) -> Result<Self, EncoderError> {
        debug!("Encoder command: {} {}", binary.display(), args.join(" "));

        let mut child = Command::new(binary)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EncoderError::Launch {
                binary: binary.display().to_string(),
                source,
            })?;

        let stdin = child.stdin.take();
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(forward_stderr(stderr)));

        info!("Encoder started (pid {:?})", child.id());

        Ok(Self {
            child,
            stdin,
            state: EncoderState::Running,
            stderr_task,
            finalize_timeout,
            bytes_written: 0,
        })
    }

    /// Write one full frame. Waits while the pipe is full.
    pub async fn write(&mut self, frame_index: u64, data: &[u8]) -> Result<(), EncoderError> {
        let stdin = self.stdin.as_mut().ok_or(EncoderError::InputClosed)?;
        stdin
            .write_all(data)
            .await
            .map_err(|source| EncoderError::Write { frame: frame_index, source })?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    /// Flush and close stdin so the encoder sees EOF. No-op once closed.
    pub async fn close_input(&mut self) {
        let Some(mut stdin) = self.stdin.take() else { return };
        if let Err(e) = stdin.flush().await {
            warn!("Flushing encoder input failed: {}", e);
        }
        drop(stdin);
        self.state = EncoderState::InputClosed;
        debug!("Encoder input closed after {} bytes", self.bytes_written);
    }

    /// Close input if still open, then wait for the process to exit.
    ///
    /// Returns `Ok` immediately if the process was already reaped.
    pub async fn wait_for_exit(&mut self) -> Result<(), EncoderError> {
        if self.state == EncoderState::Exited {
            return Ok(());
        }
        self.close_input().await;

        let waited = match self.finalize_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.child.wait()).await {
                Ok(waited) => waited,
                Err(_) => {
                    warn!("Encoder still running after {:?}, killing it", limit);
                    if let Err(e) = self.child.kill().await {
                        warn!("Killing encoder failed: {}", e);
                    }
                    self.mark_exited(true).await;
                    return Err(EncoderError::FinalizeTimeout { timeout_ms: limit.as_millis() as u64 });
                }
            },
            None => self.child.wait().await,
        };
        self.mark_exited(false).await;

        let status = waited.map_err(|e| EncoderError::Finalization { status: format!("wait failed: {e}") })?;
        check_exit(status)
    }

    pub fn state(&self) -> EncoderState {
        self.state
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Grandchildren may hold stderr open after the encoder is gone, so the
    /// forwarder only gets a short grace period.
    async fn mark_exited(&mut self, killed: bool) {
        self.state = EncoderState::Exited;
        let Some(mut task) = self.stderr_task.take() else { return };
        if killed || tokio::time::timeout(STDERR_GRACE, &mut task).await.is_err() {
            task.abort();
        }
    }
}

#[async_trait]
impl FrameSink for EncoderProcess {
    async fn write_frame(&mut self, frame_index: u64, data: &[u8]) -> Result<(), EncoderError> {
        self.write(frame_index, data).await
    }

    async fn finish(&mut self) -> Result<(), EncoderError> {
        self.wait_for_exit().await
    }

    fn state(&self) -> EncoderState {
        self.state
    }
}

pub(crate) fn check_exit(status: ExitStatus) -> Result<(), EncoderError> {
    if status.success() {
        info!("Encoder exited cleanly");
        Ok(())
    } else {
        Err(EncoderError::Finalization { status: status.to_string() })
    }
}

/// Drain the encoder's stderr so it never blocks on a full pipe.
pub(crate) async fn forward_stderr<R: AsyncRead + Unpin>(stderr: R) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if !line.is_empty() {
            warn!("[ffmpeg] {}", line);
        }
    }
}
