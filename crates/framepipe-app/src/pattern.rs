//! Synthetic capture surface: a moving gradient with a frame counter bar.

use bytes::Bytes;
use framepipe_capture::{readback_channel, CaptureSurface, ReadbackRequest};
use framepipe_core::{PixelFormat, Resolution};
use tracing::debug;

pub struct TestPatternSurface {
    resolution:   Resolution,
    pixel_format: PixelFormat,
    bound:        bool,
}

impl TestPatternSurface {
    pub fn new(resolution: Resolution, pixel_format: PixelFormat) -> Self {
        Self { resolution, pixel_format, bound: false }
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }
}

impl CaptureSurface for TestPatternSurface {
    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    fn request_readback(&mut self, frame_index: u64) -> ReadbackRequest {
        let (done, request) = readback_channel(frame_index);
        let (resolution, pixel_format) = (self.resolution, self.pixel_format);

        tokio::task::spawn_blocking(move || {
            done.complete(render(resolution, pixel_format, frame_index));
        });
        request
    }

    fn bind_for_capture(&mut self) {
        debug!("Test pattern bound for capture");
        self.bound = true;
    }

    fn restore_binding(&mut self) {
        debug!("Test pattern binding restored");
        self.bound = false;
    }
}

/// Render frame `frame_index`, top row first.
pub fn render(resolution: Resolution, pixel_format: PixelFormat, frame_index: u64) -> Bytes {
    let (w, h) = (resolution.width as usize, resolution.height as usize);
    let mut data = vec![0u8; w * h * pixel_format.bytes_per_pixel()];
    let shift = (frame_index * 4) as usize;
    // Bar grows one column per frame and wraps.
    let bar_end = (frame_index as usize) % w.max(1);

    for (y, row) in data.chunks_exact_mut(w * 4).enumerate() {
        for (x, px) in row.chunks_exact_mut(4).enumerate() {
            let (r, g, b) = if y < h / 16 && x <= bar_end {
                (255, 255, 255)
            } else {
                (((x + shift) * 255 / w.max(1)) as u8, (y * 255 / h.max(1)) as u8, (shift % 256) as u8)
            };
            match pixel_format {
                PixelFormat::Rgba => px.copy_from_slice(&[r, g, b, 255]),
                PixelFormat::Bgra => px.copy_from_slice(&[b, g, r, 255]),
            }
        }
    }
    Bytes::from(data)
}
