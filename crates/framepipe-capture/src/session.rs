//! Session control: start a recording, observe it, stop it.
//!
//! ```text
//! Recorder::start_recording ──► validate ──► locate + launch encoder
//!                                               │
//!                              tokio::spawn(CaptureScheduler::run)
//!                                               │
//! RecordingHandle ◄── stop_tx / stats / status ─┘
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use framepipe_core::{
    CaptureSession, ConfigurationError, FailureKind, FramePipeError, RecorderConfig, SessionStatus,
};
use framepipe_encoder::{EncoderBackend, FfmpegBackend};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::feeder::EncoderFeeder;
use crate::pool::BufferPool;
use crate::scheduler::CaptureScheduler;
use crate::surface::CaptureSurface;
use crate::ticker::{IntervalTicker, Ticker};

// ── Stats ─────────────────────────────────────────────────────────────────────

/// Counters shared between the capture task and its handle.
#[derive(Debug, Default)]
pub struct SessionStats {
    /// Readbacks completed, successful or not.
    pub frames_captured: AtomicU64,
    pub frames_written:  AtomicU64,
    pub frames_dropped:  AtomicU64,
}

// ── Recorder ──────────────────────────────────────────────────────────────────

/// Builder for one recording session.
///
/// The ticker defaults to an [`IntervalTicker`] at the configured refresh rate
/// and the backend to an [`FfmpegBackend`] built from `config.encoder`.
pub struct Recorder {
    config:  RecorderConfig,
    surface: Option<Box<dyn CaptureSurface>>,
    ticker:  Option<Box<dyn Ticker>>,
    backend: Option<Box<dyn EncoderBackend>>,
}

impl Recorder {
    pub fn new(config: RecorderConfig) -> Self {
        Self { config, surface: None, ticker: None, backend: None }
    }

    pub fn surface(mut self, surface: impl CaptureSurface + 'static) -> Self {
        self.surface = Some(Box::new(surface));
        self
    }

    pub fn ticker(mut self, ticker: impl Ticker + 'static) -> Self {
        self.ticker = Some(Box::new(ticker));
        self
    }

    pub fn backend(mut self, backend: impl EncoderBackend + 'static) -> Self {
        self.backend = Some(Box::new(backend));
        self
    }

    /// Validate, launch the encoder, and spawn the capture task.
    ///
    /// Nothing is spawned when validation fails.
    pub async fn start_recording(self) -> Result<RecordingHandle, FramePipeError> {
        let Recorder { config, surface, ticker, backend } = self;

        let surface = surface.ok_or(ConfigurationError::MissingSurface)?;
        let session = config.session(surface.pixel_format())?;
        let actual = surface.resolution();
        if actual != session.resolution {
            return Err(ConfigurationError::ResolutionMismatch {
                expected: session.resolution.to_string(),
                actual: actual.to_string(),
            }
            .into());
        }

        let backend: Box<dyn EncoderBackend> = match backend {
            Some(backend) => backend,
            None => Box::new(FfmpegBackend::new(config.encoder.clone())),
        };
        backend.locate()?;
        let sink = backend.launch(&session).await?;

        let ticker: Box<dyn Ticker> = match ticker {
            Some(ticker) => ticker,
            None => Box::new(IntervalTicker::new(config.tick_interval())),
        };
        let slots = pool_slots(config.pool_size, session.total_frames);
        let pool = BufferPool::new(slots, session.frame_bytes());

        let stats = Arc::new(SessionStats::default());
        let (stop_tx, stop_rx) = mpsc::channel::<()>(1);
        let (status_tx, status_rx) = watch::channel(SessionStatus::Recording);

        let feeder = EncoderFeeder::new(sink, pool, config.write_timeout(), Arc::clone(&stats));
        let scheduler = CaptureScheduler::new(
            session.clone(),
            surface,
            ticker,
            feeder,
            Arc::clone(&stats),
            stop_rx,
            status_tx,
        );

        info!(
            "[{}] Session started: {} frames, {} buffers of {} bytes",
            session.short_id(),
            session.total_frames,
            slots,
            session.frame_bytes()
        );
        let task = tokio::spawn(scheduler.run());

        Ok(RecordingHandle { session, stop_tx, stats, status_rx, task })
    }
}

/// Pool size clamped to `1..=total_frames`.
pub fn pool_slots(requested: usize, total_frames: u64) -> usize {
    let ceiling = usize::try_from(total_frames).unwrap_or(usize::MAX).max(1);
    requested.clamp(1, ceiling)
}

// ── RecordingHandle ───────────────────────────────────────────────────────────

/// Handle to a running session. Dropping it requests a stop.
pub struct RecordingHandle {
    session:   CaptureSession,
    stop_tx:   mpsc::Sender<()>,
    stats:     Arc<SessionStats>,
    status_rx: watch::Receiver<SessionStatus>,
    task:      JoinHandle<SessionStatus>,
}

impl RecordingHandle {
    pub fn session(&self) -> &CaptureSession {
        &self.session
    }

    /// Request a graceful stop (non-blocking). Repeated calls are no-ops.
    pub fn stop_recording(&self) {
        if self.stop_tx.try_send(()).is_ok() {
            info!("[{}] Stop requested", self.session.short_id());
        }
    }

    pub fn is_recording(&self) -> bool {
        matches!(*self.status_rx.borrow(), SessionStatus::Recording | SessionStatus::Stopping)
    }

    pub fn frames_captured(&self) -> u64 {
        self.stats.frames_captured.load(Ordering::Relaxed)
    }

    pub fn frames_written(&self) -> u64 {
        self.stats.frames_written.load(Ordering::Relaxed)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.stats.frames_dropped.load(Ordering::Relaxed)
    }

    /// Captured fraction of the session, `0.0..=1.0`.
    pub fn progress(&self) -> f32 {
        self.session.progress(self.frames_captured())
    }

    pub fn status(&self) -> SessionStatus {
        self.status_rx.borrow().clone()
    }

    /// Watch channel for UI collaborators that want change notifications.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status_rx.clone()
    }

    /// Wait until the session is closed and return its final status.
    pub async fn wait(self) -> SessionStatus {
        match self.task.await {
            Ok(status) => status,
            Err(e) => {
                error!("[{}] Capture task ended abnormally: {}", self.session.short_id(), e);
                SessionStatus::Failed {
                    kind: FailureKind::Finalization,
                    message: format!("capture task ended abnormally: {e}"),
                }
            }
        }
    }
}
