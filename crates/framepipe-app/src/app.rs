use std::time::Duration;

use anyhow::{bail, Context, Result};
use framepipe_capture::Recorder;
use framepipe_core::{PixelFormat, RecorderConfig, SessionStatus};
use tracing::{info, warn};

use crate::cli::Args;
use crate::pattern::TestPatternSurface;

/// Record one session and wait for the encoder to finish.
///
/// # Flow
/// 1. Load the config file (if any), then env overrides, then flags
/// 2. Bind the test-pattern surface and start the session
/// 3. Log progress once a second; Ctrl-C requests a graceful stop
/// 4. Wait for finalize and map the final status to an exit code
pub async fn run(args: Args) -> Result<()> {
    // ── Configuration ──────────────────────────────────────────────────────
    let mut config = match &args.config {
        Some(path) => RecorderConfig::load(path)
            .with_context(|| format!("Loading config {}", path.display()))?,
        None => RecorderConfig::default(),
    };
    config.apply_env_overrides();
    args.apply(&mut config);

    let pixel_format = PixelFormat::from(args.pixel_format);
    info!(
        "Recording {} @ {} fps for {}s → {} ({:?})",
        config.resolution,
        config.fps,
        config.duration_secs,
        config.encoder.output_path.display(),
        config.encoder.strategy
    );

    // ── Start ──────────────────────────────────────────────────────────────
    let surface = TestPatternSurface::new(config.resolution, pixel_format);
    let handle = Recorder::new(config)
        .surface(surface)
        .start_recording()
        .await
        .context("Failed to start recording")?;

    // ── Monitor ────────────────────────────────────────────────────────────
    let mut status_rx = handle.subscribe();
    let mut progress = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("Ctrl-C received, finishing the recording");
                handle.stop_recording();
            }

            changed = status_rx.changed() => {
                if changed.is_err() || status_rx.borrow().is_terminal() {
                    break;
                }
            }

            _ = progress.tick() => {
                info!(
                    "{:>3.0}% | {} written, {} dropped",
                    handle.progress() * 100.0,
                    handle.frames_written(),
                    handle.frames_dropped()
                );
            }
        }
    }

    // ── Result ─────────────────────────────────────────────────────────────
    let written = handle.frames_written();
    let dropped = handle.frames_dropped();
    let total = handle.session().total_frames;
    let status = handle.wait().await;

    match &status {
        SessionStatus::Completed { warning } => {
            if let Some(w) = warning {
                warn!("Encoder reported a problem: {}", w);
            }
            info!("Done: {}/{} frames written, {} dropped", written, total, dropped);
            Ok(())
        }
        other => bail!("{}", other.message()),
    }
}
