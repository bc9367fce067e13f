use thiserror::Error;

#[derive(Error, Debug)]
pub enum FramePipeError {
    #[error("Configuration invalid: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Encoder error: {0}")]
    Encoder(#[from] EncoderError),
}

impl FramePipeError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Configuration(_) => FailureKind::Configuration,
            Self::Encoder(e) => e.kind(),
        }
    }
}

/// Rejections raised before a session begins. No encoder is spawned.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("No capture surface bound")]
    MissingSurface,

    #[error("Recording duration must be positive and representable, got {seconds}s")]
    InvalidDuration { seconds: f64 },

    #[error("Frame rate must be positive, got {fps}")]
    InvalidFrameRate { fps: u32 },

    #[error("Resolution must be non-zero, got {width}x{height}")]
    InvalidResolution { width: u32, height: u32 },

    #[error("Capture surface is {actual}, session expects {expected}")]
    ResolutionMismatch { expected: String, actual: String },

    #[error("Encoder binary not found: {path}")]
    EncoderNotFound { path: String },

    #[error("Unreadable config file {path}: {reason}")]
    ConfigFile { path: String, reason: String },
}

/// A single failed readback. Always absorbed by the session as a dropped frame.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReadbackError {
    #[error("Readback of frame {frame_index} failed: {reason}")]
    Failed { frame_index: u64, reason: String },

    #[error("Readback of frame {frame_index} returned {actual} bytes, expected {expected}")]
    SizeMismatch { frame_index: u64, expected: usize, actual: usize },

    #[error("Readback of frame {frame_index} was abandoned by the surface")]
    Abandoned { frame_index: u64 },
}

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("Failed to launch encoder '{binary}': {source}")]
    Launch {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Encoder write failed at frame {frame}: {source}")]
    Write {
        frame: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("Encoder stalled for more than {timeout_ms}ms writing frame {frame}")]
    Stalled { frame: u64, timeout_ms: u64 },

    #[error("Encoder input is closed")]
    InputClosed,

    #[error("Encoder exited with {status}")]
    Finalization { status: String },

    #[error("Encoder did not exit within {timeout_ms}ms and was killed")]
    FinalizeTimeout { timeout_ms: u64 },

    #[error("Frame sequence error: {reason}")]
    FrameSequence { reason: String },
}

impl EncoderError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Launch { .. } => FailureKind::EncoderLaunch,
            Self::Write { .. } | Self::Stalled { .. } | Self::InputClosed | Self::FrameSequence { .. } => {
                FailureKind::EncoderWrite
            }
            Self::Finalization { .. } | Self::FinalizeTimeout { .. } => FailureKind::Finalization,
        }
    }
}

/// Coarse failure class surfaced to UI collaborators through the session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Configuration,
    EncoderLaunch,
    EncoderWrite,
    Finalization,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::EncoderLaunch => write!(f, "encoder launch"),
            Self::EncoderWrite => write!(f, "encoder write"),
            Self::Finalization => write!(f, "finalization"),
        }
    }
}
