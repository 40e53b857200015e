// SPDX-License-Identifier: GPL-3.0-only

//! Encoder seam
//!
//! The actual encoder lives behind [`VideoEncoder`]. [`EncoderHandle`] moves
//! it onto a [`SerialQueue`], which makes that queue the only context that can
//! touch the encoder's state: frame delivery and dimension updates are both
//! funneled through it and therefore never interleave.

use crate::constants::queues;
use crate::dispatch::SerialQueue;
use crate::errors::{PipelineError, PipelineResult};
use crate::media::{MediaTime, PixelBuffer};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// Consumer of processed frames
pub trait VideoEncoder: Send + 'static {
    /// Encode one frame; `buffer` is owned by the encoder from here on
    fn encode(&mut self, buffer: PixelBuffer, presentation_time: MediaTime, duration: MediaTime);

    /// Expected output width
    fn width(&self) -> u32;

    /// Expected output height
    fn height(&self) -> u32;

    /// Change the expected output size
    fn set_dimensions(&mut self, width: u32, height: u32);
}

/// Serialized access to a [`VideoEncoder`]
pub struct EncoderHandle {
    queue: SerialQueue<Box<dyn VideoEncoder>>,
}

impl EncoderHandle {
    /// Move `encoder` onto its own serial queue
    pub fn new(encoder: Box<dyn VideoEncoder>) -> PipelineResult<Self> {
        let queue = SerialQueue::start(queues::ENCODER, encoder).map_err(|e| {
            PipelineError::Queue(format!("failed to start encoder queue: {}", e))
        })?;
        Ok(Self { queue })
    }

    /// Queue a frame for encoding
    pub fn encode(&self, buffer: PixelBuffer, presentation_time: MediaTime, duration: MediaTime) {
        let queued = self.queue.dispatch_async(move |encoder| {
            encoder.encode(buffer, presentation_time, duration);
        });
        if !queued {
            debug!("Encoder queue closed, frame discarded");
        }
    }

    /// Queue a change of the encoder's output size
    pub fn set_dimensions(&self, width: u32, height: u32) {
        self.queue.dispatch_async(move |encoder| {
            debug!(width, height, "Encoder dimensions updated");
            encoder.set_dimensions(width, height);
        });
    }

    /// Current encoder size, after all previously queued work
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.queue
            .dispatch_sync(|encoder| (encoder.width(), encoder.height()))
    }

    /// Run `f` against the encoder on its queue and wait for the result
    pub fn with_encoder<R, F>(&self, f: F) -> Option<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn VideoEncoder) -> R + Send + 'static,
    {
        self.queue.dispatch_sync(move |encoder| f(encoder.as_mut()))
    }

    /// Wait for all queued frames and size changes to be applied
    pub fn flush(&self) {
        self.queue.flush();
    }
}

/// Encoder that only logs frames; used for headless runs and diagnostics
pub struct LoggingEncoder {
    width: u32,
    height: u32,
    frames: Arc<AtomicU64>,
    last_presentation_time: Option<MediaTime>,
}

impl LoggingEncoder {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frames: Arc::new(AtomicU64::new(0)),
            last_presentation_time: None,
        }
    }

    /// Shared counter of encoded frames
    pub fn frame_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.frames)
    }
}

impl VideoEncoder for LoggingEncoder {
    fn encode(&mut self, buffer: PixelBuffer, presentation_time: MediaTime, duration: MediaTime) {
        let frame = self.frames.fetch_add(1, Ordering::Relaxed);
        if let Some(last) = self.last_presentation_time
            && last.timescale == presentation_time.timescale
            && presentation_time.value < last.value
        {
            debug!(%last, current = %presentation_time, "Presentation time went backwards");
        }
        self.last_presentation_time = Some(presentation_time);

        debug!(
            frame,
            width = buffer.width(),
            height = buffer.height(),
            format = %buffer.format(),
            pts = %presentation_time,
            duration = %duration,
            "Encoded frame"
        );
        if buffer.width() != self.width || buffer.height() != self.height {
            debug!(
                expected_width = self.width,
                expected_height = self.height,
                "Frame size differs from encoder size"
            );
        }
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn set_dimensions(&mut self, width: u32, height: u32) {
        info!(width, height, "Encoder output size changed");
        self.width = width;
        self.height = height;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::PixelFormat;

    #[test]
    fn test_dimension_updates_are_serialized() {
        let handle = EncoderHandle::new(Box::new(LoggingEncoder::new(640, 480))).unwrap();
        handle.set_dimensions(1920, 1080);
        assert_eq!(handle.dimensions(), Some((1920, 1080)));
    }

    #[test]
    fn test_frames_are_counted() {
        let encoder = LoggingEncoder::new(2, 2);
        let frames = encoder.frame_counter();
        let handle = EncoderHandle::new(Box::new(encoder)).unwrap();

        for i in 0..5 {
            let buffer = PixelBuffer::black(2, 2, PixelFormat::Nv12).unwrap();
            handle.encode(buffer, MediaTime::from_millis(i * 33), MediaTime::from_millis(33));
        }
        handle.flush();
        assert_eq!(frames.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn test_with_encoder_reads_state() {
        let handle = EncoderHandle::new(Box::new(LoggingEncoder::new(320, 240))).unwrap();
        assert_eq!(handle.with_encoder(|encoder| encoder.width()), Some(320));
    }
}
