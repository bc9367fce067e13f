//! framepipe: record a capture surface to a video file through ffmpeg.
//!
//! # Pipeline
//!
//! ```text
//! TestPatternSurface ──readback──► BufferPool ──► ffmpeg stdin ──► output.mp4
//!        ▲                                        (or PNG frames + batch encode)
//!   capture ticks (refresh rate, throttled to fps)
//! ```
//!
//! Set `RUST_LOG=debug` for per-frame logging; ffmpeg's own warnings are
//! forwarded under the `framepipe_encoder` target.

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod app;
mod cli;
mod pattern;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let args = cli::Args::parse();

    info!("framepipe v{}", env!("CARGO_PKG_VERSION"));

    match app::run(args).await {
        Ok(()) => {
            info!("framepipe exited cleanly.");
            Ok(())
        }
        Err(e) => {
            error!("Fatal error: {:#}", e);
            Err(e)
        }
    }
}
