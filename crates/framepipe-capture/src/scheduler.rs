//! Capture scheduler: the per-tick loop of one session.
//!
//! Each tick, in order:
//!
//! 1. collect a completed readback and hand it to the feeder
//! 2. stop if the duration elapsed, every frame was captured, or a stop was requested
//! 3. skip while a readback is in flight
//! 4. skip until the next frame is due (`index / fps`, minus 1/8 frame of jitter)
//! 5. issue the next readback
//!
//! The tick wait is the only suspension point apart from encoder writes,
//! which block the loop while the encoder is busy.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use framepipe_core::{CaptureSession, EncoderError, ReadbackError, SessionStatus};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::feeder::EncoderFeeder;
use crate::session::SessionStats;
use crate::surface::{CaptureSurface, ReadbackRequest, ReadbackResult};
use crate::ticker::Ticker;

const PROGRESS_LOG_EVERY: u64 = 60;
/// Upper bound on waiting for the last readback once the session stops.
const IN_FLIGHT_DRAIN_LIMIT: Duration = Duration::from_secs(2);

pub(crate) struct CaptureScheduler {
    session:        CaptureSession,
    surface:        Box<dyn CaptureSurface>,
    ticker:         Box<dyn Ticker>,
    feeder:         EncoderFeeder,
    stats:          Arc<SessionStats>,
    stop_rx:        mpsc::Receiver<()>,
    status_tx:      watch::Sender<SessionStatus>,
    in_flight:      Option<ReadbackRequest>,
    next_frame:     u64,
    stop_requested: bool,
    tag:            String,
}

impl CaptureScheduler {
    pub(crate) fn new(
        session: CaptureSession,
        surface: Box<dyn CaptureSurface>,
        ticker: Box<dyn Ticker>,
        feeder: EncoderFeeder,
        stats: Arc<SessionStats>,
        stop_rx: mpsc::Receiver<()>,
        status_tx: watch::Sender<SessionStatus>,
    ) -> Self {
        let tag = session.short_id();
        Self {
            session,
            surface,
            ticker,
            feeder,
            stats,
            stop_rx,
            status_tx,
            in_flight: None,
            next_frame: 0,
            stop_requested: false,
            tag,
        }
    }

    /// Run the session to completion and return its final status.
    pub(crate) async fn run(mut self) -> SessionStatus {
        info!(
            "[{}] Recording {} @ {} fps for {:.2}s ({} frames)",
            self.tag,
            self.session.resolution,
            self.session.fps,
            self.session.duration.as_secs_f64(),
            self.session.total_frames
        );
        self.surface.bind_for_capture();
        self.status_tx.send_replace(SessionStatus::Recording);

        let mut failure = self.capture_loop().await.err();
        self.status_tx.send_replace(SessionStatus::Stopping);

        if failure.is_none() {
            failure = self.drain_in_flight().await.err();
        } else if let Some(request) = self.in_flight.take() {
            debug!("[{}] Abandoning readback of frame {}", self.tag, request.frame_index());
        }

        self.surface.restore_binding();
        let finalized = self.feeder.finalize().await;

        let status = self.final_status(failure, finalized);
        self.status_tx.send_replace(status.clone());
        status
    }

    async fn capture_loop(&mut self) -> Result<(), EncoderError> {
        let jitter = self.session.frame_interval() / 8;

        loop {
            let elapsed = self.ticker.tick().await;

            if let Some(result) = self.in_flight.as_mut().and_then(|r| r.try_complete()) {
                self.in_flight = None;
                self.collect(result).await?;
            }

            if self.should_stop(elapsed) {
                return Ok(());
            }

            if self.in_flight.is_some() || self.next_frame >= self.session.total_frames {
                continue;
            }

            if elapsed + jitter < self.session.capture_due(self.next_frame) {
                continue;
            }

            self.in_flight = Some(self.surface.request_readback(self.next_frame));
            self.next_frame += 1;
        }
    }

    /// Feed one completed readback through the pool and into the encoder.
    async fn collect(&mut self, result: ReadbackResult) -> Result<(), EncoderError> {
        let captured = self.stats.frames_captured.fetch_add(1, Ordering::Relaxed) + 1;
        self.feeder.on_readback_complete(result);
        self.feeder.drain_queue().await?;

        if captured % PROGRESS_LOG_EVERY == 0 {
            info!(
                "[{}] {}/{} frames ({:.0}%)",
                self.tag,
                captured,
                self.session.total_frames,
                self.session.progress(captured) * 100.0
            );
        }
        Ok(())
    }

    fn should_stop(&mut self, elapsed: Duration) -> bool {
        if !self.stop_requested {
            match self.stop_rx.try_recv() {
                Ok(()) => {
                    info!("[{}] Stop requested", self.tag);
                    self.stop_requested = true;
                }
                Err(TryRecvError::Disconnected) => {
                    info!("[{}] Recording handle dropped, stopping", self.tag);
                    self.stop_requested = true;
                }
                Err(TryRecvError::Empty) => {}
            }
        }
        if self.stop_requested {
            return true;
        }

        let captured = self.stats.frames_captured.load(Ordering::Relaxed);
        if captured >= self.session.total_frames {
            debug!("[{}] All {} frames captured", self.tag, captured);
            return true;
        }
        if elapsed >= self.session.duration {
            debug!("[{}] Duration reached after {} frames", self.tag, captured);
            return true;
        }
        false
    }

    /// Await a readback still in flight at stop and write it.
    async fn drain_in_flight(&mut self) -> Result<(), EncoderError> {
        let Some(request) = self.in_flight.take() else {
            return Ok(());
        };
        let frame_index = request.frame_index();
        debug!("[{}] Waiting for in-flight readback of frame {}", self.tag, frame_index);

        let result = match tokio::time::timeout(IN_FLIGHT_DRAIN_LIMIT, request.wait()).await {
            Ok(result) => result,
            Err(_) => ReadbackResult {
                frame_index,
                outcome: Err(ReadbackError::Abandoned { frame_index }),
            },
        };
        self.collect(result).await
    }

    fn final_status(
        &self,
        failure: Option<EncoderError>,
        finalized: Result<(), EncoderError>,
    ) -> SessionStatus {
        let written = self.stats.frames_written.load(Ordering::Relaxed);
        let dropped = self.stats.frames_dropped.load(Ordering::Relaxed);

        match (failure, finalized) {
            (Some(e), finalized) => {
                error!("[{}] Recording failed after {} frames: {}", self.tag, written, e);
                if let Err(f) = finalized {
                    warn!("[{}] Finalization after failure: {}", self.tag, f);
                }
                SessionStatus::Failed { kind: e.kind(), message: e.to_string() }
            }
            (None, Err(e)) => {
                error!("[{}] Finalization error: {}", self.tag, e);
                SessionStatus::Completed { warning: Some(e.to_string()) }
            }
            (None, Ok(())) => {
                info!(
                    "[{}] Recording complete: {} frames written, {} dropped",
                    self.tag, written, dropped
                );
                SessionStatus::Completed { warning: None }
            }
        }
    }
}
