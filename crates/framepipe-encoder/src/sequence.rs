//! Frame-sequence strategy: PNG per frame while recording, one batch encode at the end.
//!
//! Files are numbered by write order, not capture index, so dropped frames
//! never leave gaps that would end ffmpeg's `%04d` input early.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use framepipe_core::{CaptureSession, EncoderConfig, EncoderError, EncoderState, PixelFormat};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::command::FfmpegCommandBuilder;
use crate::process::{check_exit, forward_stderr};
use crate::FrameSink;

pub struct FrameSequenceSink {
    binary:       PathBuf,
    config:       EncoderConfig,
    frames_dir:   PathBuf,
    width:        u32,
    height:       u32,
    pixel_format: PixelFormat,
    fps:          u32,
    next_number:  u32,
    state:        EncoderState,
}

impl FrameSequenceSink {
    /// Create `<frames_dir>/session_YYYYMMDD_HHMMSS` for this session's frames.
    pub fn create(
        binary: PathBuf,
        session: &CaptureSession,
        config: &EncoderConfig,
    ) -> Result<Self, EncoderError> {
        let folder = format!("session_{}", chrono::Local::now().format("%Y%m%d_%H%M%S"));
        let frames_dir = config.frames_dir.join(folder);
        std::fs::create_dir_all(&frames_dir).map_err(|e| EncoderError::FrameSequence {
            reason: format!("creating {}: {e}", frames_dir.display()),
        })?;
        info!("Frame folder: {}", frames_dir.display());

        Ok(Self {
            binary,
            config: config.clone(),
            frames_dir,
            width: session.resolution.width,
            height: session.resolution.height,
            pixel_format: session.pixel_format,
            fps: session.fps,
            next_number: 0,
            state: EncoderState::Running,
        })
    }

    pub fn frames_dir(&self) -> &Path {
        &self.frames_dir
    }

    pub fn frames_written(&self) -> u32 {
        self.next_number
    }

    async fn encode(&self) -> Result<(), EncoderError> {
        let args = FfmpegCommandBuilder::image_sequence(&self.frames_dir, self.fps, &self.config).build();
        debug!("Batch encode: {} {}", self.binary.display(), args.join(" "));
        info!("Encoding {} frames to {}", self.next_number, self.config.output_path.display());

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EncoderError::Launch {
                binary: self.binary.display().to_string(),
                source,
            })?;

        let stderr_task = child.stderr.take().map(|stderr| tokio::spawn(forward_stderr(stderr)));

        let waited = match self.config.finalize_timeout() {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(waited) => waited,
                Err(_) => {
                    warn!("Batch encode still running after {:?}, killing it", limit);
                    let _ = child.kill().await;
                    if let Some(task) = stderr_task {
                        task.abort();
                    }
                    return Err(EncoderError::FinalizeTimeout { timeout_ms: limit.as_millis() as u64 });
                }
            },
            None => child.wait().await,
        };
        if let Some(task) = stderr_task {
            let _ = tokio::time::timeout(Duration::from_secs(1), task).await;
        }

        let status = waited.map_err(|e| EncoderError::Finalization { status: format!("wait failed: {e}") })?;
        check_exit(status)
    }

    fn cleanup(&self) {
        if self.config.keep_frames {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.frames_dir) {
            warn!("Could not remove frame folder {}: {}", self.frames_dir.display(), e);
        }
    }
}

#[async_trait]
impl FrameSink for FrameSequenceSink {
    async fn write_frame(&mut self, frame_index: u64, data: &[u8]) -> Result<(), EncoderError> {
        if self.state != EncoderState::Running {
            return Err(EncoderError::InputClosed);
        }

        let path = self.frames_dir.join(format!("frame_{:04}.png", self.next_number));
        let (width, height, pixel_format) = (self.width, self.height, self.pixel_format);
        let mut pixels = data.to_vec();

        let saved = tokio::task::spawn_blocking(move || {
            if pixel_format == PixelFormat::Bgra {
                for px in pixels.chunks_exact_mut(4) {
                    px.swap(0, 2);
                }
            }
            let image = image::RgbaImage::from_raw(width, height, pixels)
                .ok_or_else(|| format!("{width}x{height} buffer has the wrong length"))?;
            image.save(&path).map_err(|e| format!("{}: {e}", path.display()))
        })
        .await
        .map_err(|e| EncoderError::FrameSequence { reason: e.to_string() })?;

        saved.map_err(|reason| {
            EncoderError::Write {
                frame: frame_index,
                source: std::io::Error::new(std::io::ErrorKind::Other, reason),
            }
        })?;

        self.next_number += 1;
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), EncoderError> {
        if self.state == EncoderState::Exited {
            return Ok(());
        }
        self.state = EncoderState::InputClosed;

        let result = if self.next_number == 0 {
            Err(EncoderError::Finalization { status: "no frames to encode".to_owned() })
        } else {
            self.encode().await
        };

        self.state = EncoderState::Exited;
        self.cleanup();
        result
    }

    fn state(&self) -> EncoderState {
        self.state
    }
}
