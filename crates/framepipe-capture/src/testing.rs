//! Test doubles for the surface, sink and backend seams.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use framepipe_core::{CaptureSession, ConfigurationError, EncoderError, EncoderState, Resolution};
use framepipe_encoder::{EncoderBackend, FrameSink};
use tokio::sync::mpsc;

use crate::surface::{readback_channel, CaptureSurface, ReadbackRequest};

// ── Sink ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct SinkLog {
    /// (frame index, first byte of the payload)
    written:      Vec<(u64, u8)>,
    finish_calls: u32,
    /// Encoder state observed when `finish` was called.
    state_at_finish: Option<EncoderState>,
}

/// Shared view of what a [`MockSink`] received.
#[derive(Debug, Clone, Default)]
pub struct SinkProbe {
    log: Arc<Mutex<SinkLog>>,
}

impl SinkProbe {
    pub fn written(&self) -> Vec<(u64, u8)> {
        self.log.lock().unwrap().written.clone()
    }

    pub fn written_indices(&self) -> Vec<u64> {
        self.written().into_iter().map(|(i, _)| i).collect()
    }

    pub fn finish_calls(&self) -> u32 {
        self.log.lock().unwrap().finish_calls
    }

    pub fn state_at_finish(&self) -> Option<EncoderState> {
        self.log.lock().unwrap().state_at_finish
    }
}

pub struct MockSink {
    probe:       SinkProbe,
    writes:      usize,
    fail_on:     Option<usize>,
    stall_on:    Option<usize>,
    fail_finish: bool,
    state:       EncoderState,
}

impl MockSink {
    pub fn new(probe: SinkProbe) -> Self {
        Self {
            probe,
            writes: 0,
            fail_on: None,
            stall_on: None,
            fail_finish: false,
            state: EncoderState::Running,
        }
    }

    /// Fail the `nth` write call (1-based) with a broken pipe.
    pub fn fail_on_write(mut self, nth: usize) -> Self {
        self.fail_on = Some(nth);
        self
    }

    /// Never complete the `nth` write call (1-based).
    pub fn stall_on_write(mut self, nth: usize) -> Self {
        self.stall_on = Some(nth);
        self
    }

    /// Report a non-zero exit from `finish`.
    pub fn fail_finish(mut self) -> Self {
        self.fail_finish = true;
        self
    }
}

#[async_trait]
impl FrameSink for MockSink {
    async fn write_frame(&mut self, frame_index: u64, data: &[u8]) -> Result<(), EncoderError> {
        if self.state != EncoderState::Running {
            return Err(EncoderError::InputClosed);
        }
        self.writes += 1;
        if self.stall_on == Some(self.writes) {
            std::future::pending::<()>().await;
        }
        if self.fail_on == Some(self.writes) {
            return Err(EncoderError::Write {
                frame: frame_index,
                source: std::io::Error::from(std::io::ErrorKind::BrokenPipe),
            });
        }
        self.probe.log.lock().unwrap().written.push((frame_index, data[0]));
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), EncoderError> {
        if self.state == EncoderState::Exited {
            return Ok(());
        }
        {
            let mut log = self.probe.log.lock().unwrap();
            log.finish_calls += 1;
            log.state_at_finish = Some(self.state);
        }
        self.state = EncoderState::InputClosed;
        tokio::task::yield_now().await;
        self.state = EncoderState::Exited;
        if self.fail_finish {
            Err(EncoderError::Finalization { status: "exit status: 1".into() })
        } else {
            Ok(())
        }
    }

    fn state(&self) -> EncoderState {
        self.state
    }
}

// ── Backend ───────────────────────────────────────────────────────────────────

pub struct MockBackend {
    pub probe:     SinkProbe,
    pub launches:  Arc<AtomicUsize>,
    missing:       bool,
    fail_launch:   bool,
    make_sink:     Box<dyn Fn(SinkProbe) -> MockSink + Send + Sync>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            probe: SinkProbe::default(),
            launches: Arc::new(AtomicUsize::new(0)),
            missing: false,
            fail_launch: false,
            make_sink: Box::new(MockSink::new),
        }
    }

    pub fn with_sink(mut self, make: impl Fn(SinkProbe) -> MockSink + Send + Sync + 'static) -> Self {
        self.make_sink = Box::new(make);
        self
    }

    pub fn missing_binary(mut self) -> Self {
        self.missing = true;
        self
    }

    pub fn failing_launch(mut self) -> Self {
        self.fail_launch = true;
        self
    }
}

#[async_trait]
impl EncoderBackend for MockBackend {
    fn locate(&self) -> Result<(), ConfigurationError> {
        if self.missing {
            Err(ConfigurationError::EncoderNotFound { path: "/missing/ffmpeg".into() })
        } else {
            Ok(())
        }
    }

    async fn launch(&self, _session: &CaptureSession) -> Result<Box<dyn FrameSink>, EncoderError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.fail_launch {
            return Err(EncoderError::Launch {
                binary: "ffmpeg".into(),
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            });
        }
        Ok(Box::new((self.make_sink)(self.probe.clone())))
    }
}

// ── Surface ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct SurfaceLog {
    requests:    Vec<u64>,
    /// Readbacks issued whose completer has not fired yet.
    outstanding: usize,
    max_outstanding: usize,
    bindings:    Vec<&'static str>,
}

#[derive(Debug, Clone, Default)]
pub struct SurfaceProbe {
    log: Arc<Mutex<SurfaceLog>>,
}

impl SurfaceProbe {
    pub fn requests(&self) -> Vec<u64> {
        self.log.lock().unwrap().requests.clone()
    }

    pub fn max_outstanding(&self) -> usize {
        self.log.lock().unwrap().max_outstanding
    }

    pub fn bindings(&self) -> Vec<&'static str> {
        self.log.lock().unwrap().bindings.clone()
    }
}

/// Surface whose pixels are filled with `frame_index % 251`.
///
/// Readbacks complete immediately, or from a spawned task after `delay`. Either
/// way the session only sees them on its next tick.
pub struct MockSurface {
    resolution:  Resolution,
    probe:       SurfaceProbe,
    delay:       Option<Duration>,
    failing:     HashSet<u64>,
    wrong_size:  HashSet<u64>,
    stop_after:  Option<(u64, mpsc::Sender<()>)>,
}

impl MockSurface {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            probe: SurfaceProbe::default(),
            delay: None,
            failing: HashSet::new(),
            wrong_size: HashSet::new(),
            stop_after: None,
        }
    }

    pub fn probe(&self) -> SurfaceProbe {
        self.probe.clone()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing(mut self, frames: impl IntoIterator<Item = u64>) -> Self {
        self.failing.extend(frames);
        self
    }

    pub fn wrong_size(mut self, frames: impl IntoIterator<Item = u64>) -> Self {
        self.wrong_size.extend(frames);
        self
    }

    /// Send a stop request right after issuing readback `frame_index`.
    pub fn stop_after(mut self, frame_index: u64, stop_tx: mpsc::Sender<()>) -> Self {
        self.stop_after = Some((frame_index, stop_tx));
        self
    }
}

impl CaptureSurface for MockSurface {
    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn request_readback(&mut self, frame_index: u64) -> ReadbackRequest {
        {
            let mut log = self.probe.log.lock().unwrap();
            log.requests.push(frame_index);
            log.outstanding += 1;
            log.max_outstanding = log.max_outstanding.max(log.outstanding);
        }

        let (done, request) = readback_channel(frame_index);
        let mut len = self.resolution.total_pixels() as usize * 4;
        if self.wrong_size.contains(&frame_index) {
            len -= 1;
        }
        let fail = self.failing.contains(&frame_index);
        let log = Arc::clone(&self.probe.log);
        let finish = move || {
            log.lock().unwrap().outstanding -= 1;
            if fail {
                done.fail("injected readback error");
            } else {
                done.complete(Bytes::from(vec![(frame_index % 251) as u8; len]));
            }
        };

        match self.delay {
            Some(delay) => {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    finish();
                });
            }
            None => finish(),
        }

        if let Some((at, stop_tx)) = &self.stop_after {
            if *at == frame_index {
                let _ = stop_tx.try_send(());
            }
        }
        request
    }

    fn bind_for_capture(&mut self) {
        self.probe.log.lock().unwrap().bindings.push("capture");
    }

    fn restore_binding(&mut self) {
        self.probe.log.lock().unwrap().bindings.push("restore");
    }
}
