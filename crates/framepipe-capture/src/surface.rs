//! Capture surface seam and the one-shot readback handshake.
//!
//! ```text
//! scheduler ── request_readback(i) ──► surface
//!     ▲                                   │ (later tick, any task)
//!     └── ReadbackRequest ◄── oneshot ◄── ReadbackCompleter::complete / fail
//! ```

use bytes::Bytes;
use framepipe_core::{PixelFormat, ReadbackError, Resolution};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

// ── CaptureSurface ────────────────────────────────────────────────────────────

/// Render target the session pulls frames from.
///
/// Implementations hand out one [`ReadbackRequest`] per call and complete it
/// later through the paired [`ReadbackCompleter`]. The session never has more
/// than one request outstanding.
pub trait CaptureSurface: Send {
    fn resolution(&self) -> Resolution;

    fn pixel_format(&self) -> PixelFormat {
        PixelFormat::Rgba
    }

    /// Start an asynchronous GPU→CPU transfer of the current frame.
    fn request_readback(&mut self, frame_index: u64) -> ReadbackRequest;

    /// Redirect the surface's display binding to the capture target.
    fn bind_for_capture(&mut self) {}

    /// Undo [`bind_for_capture`](Self::bind_for_capture).
    fn restore_binding(&mut self) {}
}

// ── Readback handshake ────────────────────────────────────────────────────────

/// Outcome of one readback, tagged with the frame it was issued for.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadbackResult {
    pub frame_index: u64,
    pub outcome: Result<Bytes, ReadbackError>,
}

/// Create a linked completer/request pair for `frame_index`.
pub fn readback_channel(frame_index: u64) -> (ReadbackCompleter, ReadbackRequest) {
    let (tx, rx) = oneshot::channel();
    (
        ReadbackCompleter { frame_index, tx },
        ReadbackRequest { frame_index, rx },
    )
}

/// Surface side of an in-flight readback. Dropping it abandons the request.
#[derive(Debug)]
pub struct ReadbackCompleter {
    frame_index: u64,
    tx: oneshot::Sender<Result<Bytes, String>>,
}

impl ReadbackCompleter {
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn complete(self, data: impl Into<Bytes>) {
        let _ = self.tx.send(Ok(data.into()));
    }

    pub fn fail(self, reason: impl Into<String>) {
        let _ = self.tx.send(Err(reason.into()));
    }
}

/// Session side of an in-flight readback.
#[derive(Debug)]
pub struct ReadbackRequest {
    frame_index: u64,
    rx: oneshot::Receiver<Result<Bytes, String>>,
}

impl ReadbackRequest {
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Non-blocking poll. `None` while the transfer is still running.
    pub fn try_complete(&mut self) -> Option<ReadbackResult> {
        match self.rx.try_recv() {
            Ok(payload) => Some(self.result(Some(payload))),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(self.result(None)),
        }
    }

    /// Wait for the transfer to finish.
    pub async fn wait(mut self) -> ReadbackResult {
        let payload = (&mut self.rx).await.ok();
        self.result(payload)
    }

    fn result(&self, payload: Option<Result<Bytes, String>>) -> ReadbackResult {
        let frame_index = self.frame_index;
        let outcome = match payload {
            Some(Ok(data)) => Ok(data),
            Some(Err(reason)) => Err(ReadbackError::Failed { frame_index, reason }),
            None => Err(ReadbackError::Abandoned { frame_index }),
        };
        ReadbackResult { frame_index, outcome }
    }
}
