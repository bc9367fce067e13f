//! Buffer pool & encoder feeder.
//!
//! Completed readbacks are copied into the next pool slot, queued, and written
//! to the encoder in capture order on the same tick.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use framepipe_core::{EncoderError, EncoderState, ReadbackError};
use framepipe_encoder::FrameSink;
use tracing::{debug, info, warn};

use crate::pool::{BufferPool, PendingWriteQueue};
use crate::session::SessionStats;
use crate::surface::ReadbackResult;

pub struct EncoderFeeder {
    pool:          BufferPool,
    queue:         PendingWriteQueue,
    sink:          Box<dyn FrameSink>,
    write_timeout: Option<Duration>,
    stats:         Arc<SessionStats>,
    finalized:     bool,
}

impl EncoderFeeder {
    pub fn new(
        sink: Box<dyn FrameSink>,
        pool: BufferPool,
        write_timeout: Option<Duration>,
        stats: Arc<SessionStats>,
    ) -> Self {
        Self {
            pool,
            queue: PendingWriteQueue::default(),
            sink,
            write_timeout,
            stats,
            finalized: false,
        }
    }

    /// Copy a completed readback into the pool and queue it for writing.
    ///
    /// Failed or mis-sized readbacks are counted as dropped frames.
    pub fn on_readback_complete(&mut self, result: ReadbackResult) {
        let expected = self.pool.frame_bytes();
        let frame_index = result.frame_index;

        let data = match result.outcome {
            Ok(data) if data.len() == expected => data,
            Ok(data) => {
                self.drop_frame(ReadbackError::SizeMismatch { frame_index, expected, actual: data.len() });
                return;
            }
            Err(e) => {
                self.drop_frame(e);
                return;
            }
        };

        if self.finalized {
            debug!("Frame {} arrived after finalize, ignored", frame_index);
            return;
        }

        match self.pool.fill(frame_index, &data) {
            Some(handle) => self.queue.push(handle),
            None => {
                warn!("No free buffer for frame {}, dropping it", frame_index);
                self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Write every queued frame to the encoder, oldest first.
    ///
    /// Any error is terminal for the session: the raw stream cannot resync
    /// after a partial write.
    pub async fn drain_queue(&mut self) -> Result<(), EncoderError> {
        while let Some(handle) = self.queue.pop() {
            let frame = handle.frame_index;
            let data = self.pool.bytes(handle);
            let write = self.sink.write_frame(frame, data);

            let written = match self.write_timeout {
                Some(limit) => match tokio::time::timeout(limit, write).await {
                    Ok(r) => r,
                    Err(_) => {
                        warn!("Encoder did not accept frame {} within {:?}", frame, limit);
                        Err(EncoderError::Stalled { frame, timeout_ms: limit.as_millis() as u64 })
                    }
                },
                None => write.await,
            };
            self.pool.mark_written(handle);
            written?;

            self.stats.frames_written.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Close encoder input, wait for exit, release the pool. Later calls are no-ops.
    pub async fn finalize(&mut self) -> Result<(), EncoderError> {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;

        let discarded = self.queue.clear();
        if discarded > 0 {
            warn!("{} queued frames discarded at finalize", discarded);
        }

        info!("Closing encoder input");
        let result = self.sink.finish().await;
        self.pool.release();
        result
    }

    pub fn pending_writes(&self) -> usize {
        self.queue.len()
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn encoder_state(&self) -> EncoderState {
        self.sink.state()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    fn drop_frame(&self, error: ReadbackError) {
        warn!("{}, frame dropped", error);
        self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockSink, SinkProbe};
    use bytes::Bytes;

    fn ok(frame_index: u64, byte: u8, len: usize) -> ReadbackResult {
        ReadbackResult { frame_index, outcome: Ok(Bytes::from(vec![byte; len])) }
    }

    fn feeder(sink: MockSink, slots: usize) -> (EncoderFeeder, Arc<SessionStats>) {
        let stats = Arc::new(SessionStats::default());
        let feeder = EncoderFeeder::new(Box::new(sink), BufferPool::new(slots, 4), None, Arc::clone(&stats));
        (feeder, stats)
    }

    #[tokio::test]
    async fn writes_in_fifo_order() {
        let probe = SinkProbe::default();
        let (mut feeder, stats) = feeder(MockSink::new(probe.clone()), 4);

        feeder.on_readback_complete(ok(0, 10, 4));
        feeder.on_readback_complete(ok(1, 11, 4));
        feeder.on_readback_complete(ok(2, 12, 4));
        assert_eq!(feeder.pending_writes(), 3);
        feeder.drain_queue().await.unwrap();

        assert_eq!(probe.written(), vec![(0, 10), (1, 11), (2, 12)]);
        assert_eq!(stats.frames_written.load(Ordering::Relaxed), 3);
        assert_eq!(feeder.pending_writes(), 0);
    }

    #[tokio::test]
    async fn failed_and_mis_sized_readbacks_are_dropped() {
        let probe = SinkProbe::default();
        let (mut feeder, stats) = feeder(MockSink::new(probe.clone()), 2);

        feeder.on_readback_complete(ReadbackResult {
            frame_index: 0,
            outcome: Err(ReadbackError::Failed { frame_index: 0, reason: "lost".into() }),
        });
        feeder.on_readback_complete(ok(1, 1, 3));
        feeder.on_readback_complete(ok(2, 2, 4));
        feeder.drain_queue().await.unwrap();

        assert_eq!(probe.written(), vec![(2, 2)]);
        assert_eq!(stats.frames_dropped.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn write_error_is_returned() {
        let probe = SinkProbe::default();
        let (mut feeder, stats) = feeder(MockSink::new(probe.clone()).fail_on_write(2), 4);

        feeder.on_readback_complete(ok(0, 0, 4));
        feeder.drain_queue().await.unwrap();
        feeder.on_readback_complete(ok(1, 1, 4));
        let err = feeder.drain_queue().await.unwrap_err();

        assert!(matches!(err, EncoderError::Write { frame: 1, .. }));
        assert_eq!(stats.frames_written.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn stalled_write_times_out() {
        let probe = SinkProbe::default();
        let stats = Arc::new(SessionStats::default());
        let sink = MockSink::new(probe.clone()).stall_on_write(1);
        let mut feeder = EncoderFeeder::new(
            Box::new(sink),
            BufferPool::new(2, 4),
            Some(Duration::from_millis(20)),
            Arc::clone(&stats),
        );

        feeder.on_readback_complete(ok(0, 0, 4));
        let err = feeder.drain_queue().await.unwrap_err();
        assert!(matches!(err, EncoderError::Stalled { frame: 0, timeout_ms: 20 }));
        assert_eq!(stats.frames_written.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn finalize_is_idempotent_and_releases_pool() {
        let probe = SinkProbe::default();
        let (mut feeder, _) = feeder(MockSink::new(probe.clone()), 4);

        feeder.on_readback_complete(ok(0, 0, 4));
        feeder.drain_queue().await.unwrap();

        feeder.finalize().await.unwrap();
        feeder.finalize().await.unwrap();
        assert!(feeder.is_finalized());
        assert!(feeder.pool().is_released());
        assert_eq!(feeder.encoder_state(), EncoderState::Exited);
        assert_eq!(probe.finish_calls(), 1);

        // Late completions are ignored.
        feeder.on_readback_complete(ok(1, 1, 4));
        assert_eq!(feeder.pending_writes(), 0);
    }
}
