use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::ConfigurationError;
use crate::types::{CaptureSession, PixelFormat, Resolution};

/// How captured frames reach the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EncodeStrategy {
    /// Stream raw frames into the encoder's stdin while recording.
    #[serde(alias = "rawPipe")]
    RawPipe,
    /// Write one PNG per frame, batch-encode when the session ends.
    #[serde(alias = "frameSequence")]
    FrameSequence,
}

/// Recording session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub resolution: Resolution,
    pub fps: u32,
    #[serde(alias = "recordingDuration")]
    pub duration_secs: f64,
    #[serde(alias = "poolSize")]
    pub pool_size: usize,
    /// Tick rate of the capture loop, standing in for the display refresh.
    #[serde(alias = "refreshHz")]
    pub refresh_hz: u32,
    /// Upper bound on one frame write before the encoder is declared stalled.
    #[serde(alias = "writeTimeoutMs")]
    pub write_timeout_ms: Option<u64>,
    pub encoder: EncoderConfig,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::FHD,
            fps: 30,
            duration_secs: 10.0,
            pool_size: 4,
            refresh_hz: 60,
            write_timeout_ms: None,
            encoder: EncoderConfig::default(),
        }
    }
}

/// Settings for the external ffmpeg process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    #[serde(alias = "ffmpegPath")]
    pub ffmpeg_path: PathBuf,
    #[serde(alias = "outputPath")]
    pub output_path: PathBuf,
    pub strategy: EncodeStrategy,
    /// Apply `-vf vflip` for surfaces that read back bottom row first.
    #[serde(alias = "flipVertical")]
    pub flip_vertical: bool,
    pub codec: String,
    pub preset: String,
    pub crf: u8,
    #[serde(alias = "outputPixelFormat")]
    pub output_pixel_format: String,
    /// Parent folder for per-session PNG folders (frame-sequence strategy).
    #[serde(alias = "framesDir")]
    pub frames_dir: PathBuf,
    #[serde(alias = "keepFrames")]
    pub keep_frames: bool,
    #[serde(alias = "finalizeTimeoutMs")]
    pub finalize_timeout_ms: Option<u64>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            output_path: PathBuf::from("capture.mp4"),
            strategy: EncodeStrategy::RawPipe,
            flip_vertical: true,
            codec: "libx264".to_owned(),
            preset: "veryfast".to_owned(),
            crf: 18,
            output_pixel_format: "yuv420p".to_owned(),
            frames_dir: PathBuf::from("CaptureFrames"),
            keep_frames: false,
            finalize_timeout_ms: Some(30_000),
        }
    }
}

impl EncoderConfig {
    pub fn finalize_timeout(&self) -> Option<Duration> {
        self.finalize_timeout_ms.map(Duration::from_millis)
    }
}

impl RecorderConfig {
    /// Load a JSON config file. Missing fields fall back to defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigurationError::ConfigFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let cfg: Self = serde_json::from_str(&text).map_err(|e| ConfigurationError::ConfigFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        debug!("Loaded recorder config from {}", path.display());
        Ok(cfg)
    }

    /// Apply `FRAMEPIPE_FFMPEG` and `FRAMEPIPE_OUTPUT` if set.
    pub fn apply_env_overrides(&mut self) {
        if let Some(ffmpeg) = std::env::var_os("FRAMEPIPE_FFMPEG") {
            self.encoder.ffmpeg_path = PathBuf::from(ffmpeg);
        }
        if let Some(output) = std::env::var_os("FRAMEPIPE_OUTPUT") {
            self.encoder.output_path = PathBuf::from(output);
        }
    }

    /// Validate and freeze the session parameters.
    pub fn session(&self, pixel_format: PixelFormat) -> Result<CaptureSession, ConfigurationError> {
        CaptureSession::new(self.resolution, pixel_format, self.fps, self.duration_secs)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_ms.map(Duration::from_millis)
    }

    /// Interval between loop ticks. Never slower than the capture rate.
    pub fn tick_interval(&self) -> Duration {
        let hz = self.refresh_hz.max(self.fps).max(1);
        Duration::from_secs_f64(1.0 / hz as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_camel_case_fields() {
        let json = r#"{
            "resolution": {"width": 1920, "height": 178},
            "fps": 25,
            "recordingDuration": 10.0,
            "poolSize": 2,
            "encoder": {
                "ffmpegPath": "/opt/ffmpeg/bin/ffmpeg",
                "outputPath": "capture_1920x178.mp4",
                "strategy": "frameSequence",
                "flipVertical": false
            }
        }"#;

        let cfg: RecorderConfig = serde_json::from_str(json).expect("valid camelCase config");
        assert_eq!(cfg.resolution, Resolution::new(1920, 178));
        assert_eq!(cfg.fps, 25);
        assert_eq!(cfg.pool_size, 2);
        assert_eq!(cfg.encoder.strategy, EncodeStrategy::FrameSequence);
        assert!(!cfg.encoder.flip_vertical);
        assert_eq!(cfg.encoder.crf, 18);
    }

    #[test]
    fn deserializes_snake_case_fields() {
        let json = r#"{
            "fps": 30,
            "duration_secs": 2.5,
            "write_timeout_ms": 250,
            "encoder": { "strategy": "raw-pipe", "finalize_timeout_ms": null }
        }"#;

        let cfg: RecorderConfig = serde_json::from_str(json).expect("valid snake_case config");
        assert_eq!(cfg.duration_secs, 2.5);
        assert_eq!(cfg.write_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(cfg.encoder.strategy, EncodeStrategy::RawPipe);
        assert_eq!(cfg.encoder.finalize_timeout(), None);
        assert_eq!(cfg.resolution, Resolution::FHD);
    }

    #[test]
    fn tick_interval_never_slower_than_fps() {
        let cfg = RecorderConfig { fps: 120, refresh_hz: 60, ..Default::default() };
        assert_eq!(cfg.tick_interval(), Duration::from_secs_f64(1.0 / 120.0));
    }

    #[test]
    fn load_reports_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = RecorderConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigurationError::ConfigFile { .. }));

        let missing = RecorderConfig::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(missing.to_string().contains("missing.json"));
    }
}
