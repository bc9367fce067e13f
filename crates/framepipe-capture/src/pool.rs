//! Fixed ring of frame buffers and the FIFO of slots awaiting an encoder write.

use std::collections::VecDeque;

use tracing::debug;

// MARK: - FrameBuffer

/// One pre-allocated frame. Never resized.
#[derive(Debug)]
pub struct FrameBuffer {
    data: Box<[u8]>,
}

impl FrameBuffer {
    pub fn new(frame_bytes: usize) -> Self {
        Self { data: vec![0u8; frame_bytes].into_boxed_slice() }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn copy_from(&mut self, src: &[u8]) {
        self.data.copy_from_slice(src);
    }
}

// MARK: - SlotHandle

/// A filled pool slot waiting to be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotHandle {
    pub slot: usize,
    pub frame_index: u64,
}

// MARK: - BufferPool

#[derive(Debug)]
pub struct BufferPool {
    buffers:     Vec<FrameBuffer>,
    pending:     Vec<bool>,
    cursor:      usize,
    frame_bytes: usize,
}

impl BufferPool {
    /// Allocate `slots` buffers of `frame_bytes` each (at least one).
    pub fn new(slots: usize, frame_bytes: usize) -> Self {
        let slots = slots.max(1);
        debug!("Allocating {} frame buffers of {} bytes", slots, frame_bytes);
        Self {
            buffers: (0..slots).map(|_| FrameBuffer::new(frame_bytes)).collect(),
            pending: vec![false; slots],
            cursor: 0,
            frame_bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_released(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Copy `data` into the slot at the cursor and advance the cursor.
    ///
    /// Returns `None` if that slot is still pending a write, the payload has
    /// the wrong length, or the pool has been released.
    pub fn fill(&mut self, frame_index: u64, data: &[u8]) -> Option<SlotHandle> {
        if self.is_released() || data.len() != self.frame_bytes || self.pending[self.cursor] {
            return None;
        }
        let slot = self.cursor;
        self.buffers[slot].copy_from(data);
        self.pending[slot] = true;
        self.cursor = (slot + 1) % self.buffers.len();
        Some(SlotHandle { slot, frame_index })
    }

    pub fn bytes(&self, handle: SlotHandle) -> &[u8] {
        self.buffers[handle.slot].as_bytes()
    }

    /// Return a slot to the ring once its bytes have left.
    pub fn mark_written(&mut self, handle: SlotHandle) {
        if let Some(pending) = self.pending.get_mut(handle.slot) {
            *pending = false;
        }
    }

    /// Free every buffer. Later fills are rejected.
    pub fn release(&mut self) {
        if self.is_released() {
            return;
        }
        debug!("Releasing {} frame buffers", self.buffers.len());
        self.buffers = Vec::new();
        self.pending = Vec::new();
        self.cursor = 0;
    }
}

// MARK: - PendingWriteQueue

/// FIFO of filled slots. Drained on the tick that filled it.
#[derive(Debug, Default)]
pub struct PendingWriteQueue {
    slots: VecDeque<SlotHandle>,
}

impl PendingWriteQueue {
    pub fn push(&mut self, handle: SlotHandle) {
        self.slots.push_back(handle);
    }

    pub fn pop(&mut self) -> Option<SlotHandle> {
        self.slots.pop_front()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) -> usize {
        let n = self.slots.len();
        self.slots.clear();
        n
    }
}
