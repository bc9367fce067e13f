//! ffmpeg argument construction for both encode strategies.

use std::path::{Path, PathBuf};

use framepipe_core::{CaptureSession, EncoderConfig, PixelFormat, Resolution};

/// Where ffmpeg reads its frames from.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameInput {
    /// Tightly packed raw frames on stdin.
    RawPipe { pixel_format: PixelFormat, resolution: Resolution },
    /// Numbered image files, e.g. `<dir>/frame_%04d.png`.
    ImageSequence { pattern: PathBuf },
}

#[derive(Debug, Clone)]
pub struct FfmpegCommandBuilder {
    input: FrameInput,
    framerate: u32,
    flip_vertical: bool,
    video_codec: String,
    preset: String,
    crf: u8,
    output_pixel_format: String,
    log_level: String,
    output_path: PathBuf,
}

impl FfmpegCommandBuilder {
    pub fn new(input: FrameInput, output_path: impl Into<PathBuf>) -> Self {
        Self {
            input,
            framerate: 30,
            flip_vertical: true,
            video_codec: "libx264".to_string(),
            preset: "veryfast".to_string(),
            crf: 18,
            output_pixel_format: "yuv420p".to_string(),
            log_level: "warning".to_string(),
            output_path: output_path.into(),
        }
    }

    /// Raw stdin input sized and timed for `session`, encoder options from `config`.
    pub fn raw_pipe(session: &CaptureSession, config: &EncoderConfig) -> Self {
        Self::new(
            FrameInput::RawPipe {
                pixel_format: session.pixel_format,
                resolution: session.resolution,
            },
            &config.output_path,
        )
        .with_framerate(session.fps)
        .with_encoder_config(config)
    }

    /// Batch encode of a `frame_%04d.png` sequence in `frames_dir`.
    pub fn image_sequence(frames_dir: &Path, fps: u32, config: &EncoderConfig) -> Self {
        Self::new(
            FrameInput::ImageSequence { pattern: frames_dir.join("frame_%04d.png") },
            &config.output_path,
        )
        .with_framerate(fps)
        .with_encoder_config(config)
    }

    pub fn with_encoder_config(self, config: &EncoderConfig) -> Self {
        self.with_flip(config.flip_vertical)
            .with_video_codec(config.codec.clone())
            .with_preset(config.preset.clone())
            .with_crf(config.crf)
            .with_output_pixel_format(config.output_pixel_format.clone())
    }

    pub fn with_framerate(mut self, framerate: u32) -> Self {
        self.framerate = framerate;
        self
    }

    pub fn with_flip(mut self, flip_vertical: bool) -> Self {
        self.flip_vertical = flip_vertical;
        self
    }

    pub fn with_video_codec(mut self, codec: String) -> Self {
        self.video_codec = codec;
        self
    }

    pub fn with_preset(mut self, preset: String) -> Self {
        self.preset = preset;
        self
    }

    pub fn with_crf(mut self, crf: u8) -> Self {
        self.crf = crf;
        self
    }

    pub fn with_output_pixel_format(mut self, pix_fmt: String) -> Self {
        self.output_pixel_format = pix_fmt;
        self
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn build(&self) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(), self.log_level.clone(),
            "-y".to_string(),
        ];

        match &self.input {
            FrameInput::RawPipe { pixel_format, resolution } => args.extend(vec![
                "-f".to_string(), "rawvideo".to_string(),
                "-pix_fmt".to_string(), pixel_format.ffmpeg_name().to_string(),
                "-s".to_string(), resolution.ffmpeg_size(),
                "-r".to_string(), self.framerate.to_string(),
                "-i".to_string(), "-".to_string(),
            ]),
            FrameInput::ImageSequence { pattern } => args.extend(vec![
                "-framerate".to_string(), self.framerate.to_string(),
                "-i".to_string(), pattern.to_string_lossy().to_string(),
            ]),
        }

        if self.flip_vertical {
            args.push("-vf".to_string());
            args.push("vflip".to_string());
        }

        args.extend(vec![
            "-c:v".to_string(), self.video_codec.clone(),
            "-preset".to_string(), self.preset.clone(),
            "-crf".to_string(), self.crf.to_string(),
            "-pix_fmt".to_string(), self.output_pixel_format.clone(),
            self.output_path.to_string_lossy().to_string(),
        ]);

        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> CaptureSession {
        CaptureSession::new(Resolution::FHD, PixelFormat::Rgba, 30, 2.0).unwrap()
    }

    #[test]
    fn raw_pipe_matches_encoder_contract() {
        let config = EncoderConfig { output_path: "out.mp4".into(), ..Default::default() };
        let args = FfmpegCommandBuilder::raw_pipe(&session(), &config).build();

        let joined = args.join(" ");
        assert_eq!(
            joined,
            "-hide_banner -loglevel warning -y -f rawvideo -pix_fmt rgba -s 1920x1080 -r 30 -i - \
             -vf vflip -c:v libx264 -preset veryfast -crf 18 -pix_fmt yuv420p out.mp4"
        );
    }

    #[test]
    fn flip_can_be_disabled() {
        let config = EncoderConfig { flip_vertical: false, ..Default::default() };
        let args = FfmpegCommandBuilder::raw_pipe(&session(), &config).build();
        assert!(!args.iter().any(|a| a == "vflip"));
        assert_eq!(args.last().unwrap(), "capture.mp4");
    }

    #[test]
    fn image_sequence_reads_numbered_pngs() {
        let config = EncoderConfig::default();
        let args = FfmpegCommandBuilder::image_sequence(Path::new("frames"), 25, &config).build();

        assert_eq!(args[4], "-framerate");
        assert_eq!(args[5], "25");
        assert_eq!(args[7], Path::new("frames").join("frame_%04d.png").to_string_lossy());
        assert!(!args.iter().any(|a| a == "rawvideo"));
    }

    #[test]
    fn bgra_surfaces_are_declared_as_bgra() {
        let s = CaptureSession::new(Resolution::new(640, 480), PixelFormat::Bgra, 60, 1.0).unwrap();
        let args = FfmpegCommandBuilder::raw_pipe(&s, &EncoderConfig::default()).build();
        assert_eq!(args[6], "-pix_fmt");
        assert_eq!(args[7], "bgra");
        assert_eq!(args[9], "640x480");
    }
}
