// SPDX-License-Identifier: GPL-3.0-only

//! Shared fixtures for the integration tests

#![allow(dead_code)]

use camera_effects::converter::{BufferAllocator, FrameConverter, SystemAllocator};
use camera_effects::encoder::VideoEncoder;
use camera_effects::errors::{PipelineError, PipelineResult};
use camera_effects::media::{MediaTime, PixelBuffer, PixelFormat};
use camera_effects::pipeline::PipelineController;
use camera_effects::preview::PreviewSink;
use camera_effects::render::RenderContext;
use image::{Rgba, RgbaImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// What the encoder saw, in order
#[derive(Debug, Clone)]
pub enum EncoderEvent {
    Frame {
        buffer: PixelBuffer,
        presentation_time: MediaTime,
        duration: MediaTime,
    },
    Resize {
        width: u32,
        height: u32,
    },
}

pub type EventLog = Arc<Mutex<Vec<EncoderEvent>>>;

/// Encoder that records every call
pub struct RecordingEncoder {
    width: u32,
    height: u32,
    events: EventLog,
}

impl RecordingEncoder {
    pub fn new(width: u32, height: u32) -> (Self, EventLog) {
        let events = EventLog::default();
        (
            Self {
                width,
                height,
                events: Arc::clone(&events),
            },
            events,
        )
    }
}

impl VideoEncoder for RecordingEncoder {
    fn encode(&mut self, buffer: PixelBuffer, presentation_time: MediaTime, duration: MediaTime) {
        self.events.lock().unwrap().push(EncoderEvent::Frame {
            buffer,
            presentation_time,
            duration,
        });
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn set_dimensions(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.events
            .lock()
            .unwrap()
            .push(EncoderEvent::Resize { width, height });
    }
}

/// Frames recorded so far
pub fn frames(events: &EventLog) -> Vec<(PixelBuffer, MediaTime, MediaTime)> {
    events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|event| match event {
            EncoderEvent::Frame {
                buffer,
                presentation_time,
                duration,
            } => Some((buffer.clone(), *presentation_time, *duration)),
            EncoderEvent::Resize { .. } => None,
        })
        .collect()
}

/// Fails the first `failures` allocations, then behaves like the system allocator
pub struct FlakyAllocator {
    remaining_failures: AtomicUsize,
    inner: SystemAllocator,
}

impl FlakyAllocator {
    pub fn new(failures: usize) -> Self {
        Self {
            remaining_failures: AtomicUsize::new(failures),
            inner: SystemAllocator::default(),
        }
    }
}

impl BufferAllocator for FlakyAllocator {
    fn allocate(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> PipelineResult<PixelBuffer> {
        let failing = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PipelineError::Allocation("pool exhausted".into()));
        }
        self.inner.allocate(width, height, format)
    }
}

pub fn software_converter() -> FrameConverter {
    FrameConverter::new(RenderContext::software(), Arc::new(SystemAllocator::default()))
}

/// Software pipeline recording into a fresh encoder
pub fn pipeline(preview: Option<Box<dyn PreviewSink>>) -> (PipelineController, EventLog) {
    pipeline_with_allocator(Arc::new(SystemAllocator::default()), preview)
}

pub fn pipeline_with_allocator(
    allocator: Arc<dyn BufferAllocator>,
    preview: Option<Box<dyn PreviewSink>>,
) -> (PipelineController, EventLog) {
    let (encoder, events) = RecordingEncoder::new(1280, 720);
    let converter = FrameConverter::new(RenderContext::software(), allocator);
    let controller =
        PipelineController::from_parts(converter, Box::new(encoder), preview).unwrap();
    (controller, events)
}

pub fn solid_frame(width: u32, height: u32, rgb: [u8; 3]) -> PixelBuffer {
    PixelBuffer::from_rgba_image(RgbaImage::from_pixel(
        width,
        height,
        Rgba([rgb[0], rgb[1], rgb[2], 255]),
    ))
}

/// Detailed test frame with edges in both directions
pub fn pattern_frame(width: u32, height: u32) -> PixelBuffer {
    PixelBuffer::from_rgba_image(RgbaImage::from_fn(width, height, |x, y| {
        let checker = ((x / 16 + y / 16) % 2) as u8 * 120;
        Rgba([
            (x % 256) as u8,
            (y % 256) as u8,
            checker.wrapping_add((x ^ y) as u8 / 4),
            255,
        ])
    }))
}

/// Decode an NV12 output buffer back to RGBA
pub fn decode(buffer: &PixelBuffer) -> RgbaImage {
    let converter = software_converter();
    RgbaImage::clone(&converter.to_processable(buffer).unwrap().render())
}

pub fn assert_close(actual: [u8; 4], expected: [u8; 3], tolerance: i32) {
    for channel in 0..3 {
        let diff = (actual[channel] as i32 - expected[channel] as i32).abs();
        assert!(
            diff <= tolerance,
            "channel {} is {} expected {} (pixel {:?})",
            channel,
            actual[channel],
            expected[channel],
            actual
        );
    }
}
