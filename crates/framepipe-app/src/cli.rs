use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use framepipe_core::{EncodeStrategy, PixelFormat, RecorderConfig, Resolution};

/// Record a synthetic test pattern to a video file through ffmpeg.
///
/// Flags override the config file; `FRAMEPIPE_FFMPEG` and `FRAMEPIPE_OUTPUT`
/// override both.
#[derive(Parser, Debug)]
#[command(name = "framepipe", version)]
pub struct Args {
    /// JSON config file (missing fields use defaults)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output video path
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Recording duration in seconds
    #[arg(short, long)]
    pub duration: Option<f64>,

    /// Capture frame rate
    #[arg(short, long)]
    pub fps: Option<u32>,

    /// Capture size, e.g. 1920x1080
    #[arg(short, long, value_parser = parse_size)]
    pub size: Option<Resolution>,

    /// Path or name of the ffmpeg binary
    #[arg(long)]
    pub ffmpeg: Option<PathBuf>,

    /// How frames reach the encoder
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,

    #[arg(long, value_enum, default_value_t = PixelFormatArg::Rgba)]
    pub pixel_format: PixelFormatArg,

    /// Frame buffers in the pool
    #[arg(long)]
    pub pool_size: Option<usize>,

    /// Fail the session if one frame write takes longer than this
    #[arg(long)]
    pub write_timeout_ms: Option<u64>,

    /// Do not add the vertical flip filter
    #[arg(long)]
    pub no_flip: bool,

    /// Keep the PNG folder after a frame-sequence encode
    #[arg(long)]
    pub keep_frames: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyArg {
    RawPipe,
    FrameSequence,
}

impl From<StrategyArg> for EncodeStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::RawPipe => EncodeStrategy::RawPipe,
            StrategyArg::FrameSequence => EncodeStrategy::FrameSequence,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormatArg {
    Rgba,
    Bgra,
}

impl From<PixelFormatArg> for PixelFormat {
    fn from(arg: PixelFormatArg) -> Self {
        match arg {
            PixelFormatArg::Rgba => PixelFormat::Rgba,
            PixelFormatArg::Bgra => PixelFormat::Bgra,
        }
    }
}

impl Args {
    /// Apply command-line overrides on top of `config`.
    pub fn apply(&self, config: &mut RecorderConfig) {
        if let Some(output) = &self.output {
            config.encoder.output_path = output.clone();
        }
        if let Some(duration) = self.duration {
            config.duration_secs = duration;
        }
        if let Some(fps) = self.fps {
            config.fps = fps;
        }
        if let Some(size) = self.size {
            config.resolution = size;
        }
        if let Some(ffmpeg) = &self.ffmpeg {
            config.encoder.ffmpeg_path = ffmpeg.clone();
        }
        if let Some(strategy) = self.strategy {
            config.encoder.strategy = strategy.into();
        }
        if let Some(pool_size) = self.pool_size {
            config.pool_size = pool_size;
        }
        if self.write_timeout_ms.is_some() {
            config.write_timeout_ms = self.write_timeout_ms;
        }
        if self.no_flip {
            config.encoder.flip_vertical = false;
        }
        if self.keep_frames {
            config.encoder.keep_frames = true;
        }
    }
}

fn parse_size(s: &str) -> Result<Resolution, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
    let width = w.trim().parse::<u32>().map_err(|e| format!("width: {e}"))?;
    let height = h.trim().parse::<u32>().map_err(|e| format!("height: {e}"))?;
    Ok(Resolution::new(width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let args = Args::try_parse_from([
            "framepipe", "-d", "2", "-f", "30", "--size", "1920x178",
            "--strategy", "frame-sequence", "--no-flip", "-o", "out.mp4",
        ])
        .unwrap();

        let mut cfg = RecorderConfig::default();
        args.apply(&mut cfg);

        assert_eq!(cfg.duration_secs, 2.0);
        assert_eq!(cfg.fps, 30);
        assert_eq!(cfg.resolution, Resolution::new(1920, 178));
        assert_eq!(cfg.encoder.strategy, EncodeStrategy::FrameSequence);
        assert!(!cfg.encoder.flip_vertical);
        assert_eq!(cfg.encoder.output_path, PathBuf::from("out.mp4"));
        assert_eq!(cfg.pool_size, 4);
    }

    #[test]
    fn no_flags_leave_config_untouched() {
        let args = Args::try_parse_from(["framepipe"]).unwrap();
        let mut cfg = RecorderConfig::default();
        args.apply(&mut cfg);
        assert_eq!(cfg, RecorderConfig::default());
        assert_eq!(PixelFormat::from(args.pixel_format), PixelFormat::Rgba);
    }

    #[test]
    fn size_parser() {
        assert_eq!(parse_size("640X480").unwrap(), Resolution::new(640, 480));
        assert!(parse_size("640").is_err());
        assert!(parse_size("axb").is_err());
    }
}
