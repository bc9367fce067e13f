//! framepipe-encoder: external ffmpeg encoder for captured frames.
//!
//! # Strategies
//!
//! | Strategy        | Input to ffmpeg                  | When frames are encoded |
//! |-----------------|----------------------------------|-------------------------|
//! | `RawPipe`       | `-f rawvideo -pix_fmt rgba -i -` | while recording         |
//! | `FrameSequence` | `frame_%04d.png` in a session dir | after the last frame    |
//!
//! # Lifecycle
//!
//! ```text
//! EncoderBackend::locate   (binary exists?)       ── ConfigurationError
//!        │
//! EncoderBackend::launch   (spawn / create dir)   ── EncoderError::Launch
//!        │
//! FrameSink::write_frame × N                      ── EncoderError::Write / Stalled
//!        │
//! FrameSink::finish        (close stdin, wait)    ── EncoderError::Finalization
//! ```

pub mod command;
pub mod locate;
pub mod process;
pub mod sequence;

use std::path::PathBuf;

use async_trait::async_trait;
use framepipe_core::{CaptureSession, ConfigurationError, EncodeStrategy, EncoderConfig, EncoderError, EncoderState};
use tracing::info;

pub use command::{FfmpegCommandBuilder, FrameInput};
pub use locate::locate_binary;
pub use process::EncoderProcess;
pub use sequence::FrameSequenceSink;

// ── FrameSink ─────────────────────────────────────────────────────────────────

/// Consumer of finished frames. Written by exactly one session.
#[async_trait]
pub trait FrameSink: Send {
    /// Hand over one tightly packed frame. Waits while the encoder is busy.
    async fn write_frame(&mut self, frame_index: u64, data: &[u8]) -> Result<(), EncoderError>;

    /// Close input and wait for the encoder to exit. Later calls are no-ops.
    async fn finish(&mut self) -> Result<(), EncoderError>;

    fn state(&self) -> EncoderState;
}

// ── EncoderBackend ────────────────────────────────────────────────────────────

/// Factory for per-session sinks.
#[async_trait]
pub trait EncoderBackend: Send + Sync {
    /// Check that the encoder can be found, without starting it.
    fn locate(&self) -> Result<(), ConfigurationError>;

    /// Start an encoder for `session`.
    async fn launch(&self, session: &CaptureSession) -> Result<Box<dyn FrameSink>, EncoderError>;
}

// ── FfmpegBackend ─────────────────────────────────────────────────────────────

/// Launches ffmpeg according to an [`EncoderConfig`].
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    config: EncoderConfig,
}

impl FfmpegBackend {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    fn binary(&self) -> Result<PathBuf, ConfigurationError> {
        locate_binary(&self.config.ffmpeg_path)
    }
}

#[async_trait]
impl EncoderBackend for FfmpegBackend {
    fn locate(&self) -> Result<(), ConfigurationError> {
        self.binary().map(|_| ())
    }

    async fn launch(&self, session: &CaptureSession) -> Result<Box<dyn FrameSink>, EncoderError> {
        let binary = self.binary().map_err(|e| EncoderError::Launch {
            binary: self.config.ffmpeg_path.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, e.to_string()),
        })?;

        match self.config.strategy {
            EncodeStrategy::RawPipe => {
                let args = FfmpegCommandBuilder::raw_pipe(session, &self.config).build();
                info!(
                    "Raw pipe encoder: {} @ {} fps → {}",
                    session.resolution,
                    session.fps,
                    self.config.output_path.display()
                );
                let process = EncoderProcess::spawn(&binary, &args, self.config.finalize_timeout())?;
                Ok(Box::new(process))
            }
            EncodeStrategy::FrameSequence => {
                let sink = FrameSequenceSink::create(binary, session, &self.config)?;
                Ok(Box::new(sink))
            }
        }
    }
}
