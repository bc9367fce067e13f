use std::time::Duration;

use uuid::Uuid;

use crate::errors::ConfigurationError;

// MARK: - Resolution

/// Fixed capture resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const FHD: Self = Self { width: 1920, height: 1080 };
    pub const QHD: Self = Self { width: 2560, height: 1440 };
    pub const UHD: Self = Self { width: 3840, height: 2160 };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn total_pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// `WxH` as the encoder expects it on the command line.
    pub fn ffmpeg_size(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// MARK: - PixelFormat

/// Packed 8-bit-per-channel layouts a capture surface can hand back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Rgba,
    Bgra,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        4
    }

    /// Name passed to `-pix_fmt` for the raw input stream.
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            Self::Rgba => "rgba",
            Self::Bgra => "bgra",
        }
    }
}

// MARK: - CaptureSession

/// Immutable parameters of one recording session.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSession {
    pub id: Uuid,
    pub resolution: Resolution,
    pub pixel_format: PixelFormat,
    pub fps: u32,
    pub duration: Duration,
    /// `ceil(duration × fps)`.
    pub total_frames: u64,
}

impl CaptureSession {
    pub fn new(
        resolution: Resolution,
        pixel_format: PixelFormat,
        fps: u32,
        duration_secs: f64,
    ) -> Result<Self, ConfigurationError> {
        if resolution.width == 0 || resolution.height == 0 {
            return Err(ConfigurationError::InvalidResolution {
                width: resolution.width,
                height: resolution.height,
            });
        }
        if fps == 0 {
            return Err(ConfigurationError::InvalidFrameRate { fps });
        }
        let invalid = || ConfigurationError::InvalidDuration { seconds: duration_secs };
        if !duration_secs.is_finite() || duration_secs <= 0.0 {
            return Err(invalid());
        }
        let duration = Duration::try_from_secs_f64(duration_secs).map_err(|_| invalid())?;
        let total_frames = frames_in(duration, fps).ok_or_else(invalid)?;

        Ok(Self {
            id: Uuid::new_v4(),
            resolution,
            pixel_format,
            fps,
            duration,
            total_frames,
        })
    }

    /// Size of one tightly packed frame in bytes.
    pub fn frame_bytes(&self) -> usize {
        self.resolution.total_pixels() as usize * self.pixel_format.bytes_per_pixel()
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps as f64)
    }

    /// Session-clock time at which frame `index` becomes due.
    pub fn capture_due(&self, index: u64) -> Duration {
        Duration::from_secs_f64(index as f64 / self.fps as f64)
    }

    /// Fraction of `total_frames` already accounted for, clamped to `0..=1`.
    pub fn progress(&self, frames_done: u64) -> f32 {
        (frames_done as f64 / self.total_frames as f64).min(1.0) as f32
    }

    /// Short id used as a log prefix.
    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_owned()
    }
}

/// `ceil(duration × fps)` in whole nanoseconds. `None` when the count is zero
/// or does not fit in a `u64`.
fn frames_in(duration: Duration, fps: u32) -> Option<u64> {
    const NANOS_PER_SEC: u128 = 1_000_000_000;
    let frames = (duration.as_nanos() * fps as u128).div_ceil(NANOS_PER_SEC);
    u64::try_from(frames).ok().filter(|&n| n > 0)
}

// MARK: - EncoderState

/// Lifecycle of the external encoder process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    NotStarted,
    Running,
    InputClosed,
    Exited,
}

// MARK: - SessionStatus

#[derive(Debug, Clone, PartialEq)]
pub enum SessionStatus {
    Idle,
    Recording,
    Stopping,
    /// Finished. `warning` carries a logged finalization problem, if any.
    Completed { warning: Option<String> },
    Failed { kind: crate::errors::FailureKind, message: String },
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::Idle
    }
}

impl SessionStatus {
    pub fn label(&self) -> &str {
        match self {
            SessionStatus::Idle             => "Idle",
            SessionStatus::Recording        => "Recording",
            SessionStatus::Stopping         => "Stopping…",
            SessionStatus::Completed { .. } => "Completed",
            SessionStatus::Failed { .. }    => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }

    /// Human-readable status line for UI collaborators.
    pub fn message(&self) -> String {
        match self {
            SessionStatus::Completed { warning: Some(w) } => format!("Completed with warning: {w}"),
            SessionStatus::Failed { kind, message } => format!("Failed ({kind}): {message}"),
            other => other.label().to_owned(),
        }
    }
}
