//! framepipe-capture: capture scheduler, buffer pool, and encoder feeder.
//!
//! # Usage
//!
//! ```rust,no_run
//! # async fn example(surface: impl framepipe_capture::CaptureSurface + 'static) -> anyhow::Result<()> {
//! use framepipe_capture::Recorder;
//! use framepipe_core::RecorderConfig;
//!
//! let handle = Recorder::new(RecorderConfig::default())
//!     .surface(surface)
//!     .start_recording()
//!     .await?;
//! // ... later, from a UI or signal handler:
//! handle.stop_recording();
//! let status = handle.wait().await;
//! println!("{}", status.message());
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! ```text
//!  Ticker ──► CaptureScheduler ── request_readback ──► CaptureSurface
//!                   │                                       │ (later tick)
//!                   │ ◄──────────── ReadbackResult ─────────┘
//!                   ▼
//!             EncoderFeeder: BufferPool slot ─► PendingWriteQueue ─► FrameSink
//! ```

pub mod feeder;
pub mod pool;
mod scheduler;
pub mod session;
pub mod surface;
pub mod ticker;

#[cfg(test)]
mod testing;

pub use feeder::EncoderFeeder;
pub use pool::{BufferPool, FrameBuffer, PendingWriteQueue, SlotHandle};
pub use session::{pool_slots, Recorder, RecordingHandle, SessionStats};
pub use surface::{readback_channel, CaptureSurface, ReadbackCompleter, ReadbackRequest, ReadbackResult};
pub use ticker::{IntervalTicker, Ticker, VirtualTicker};
