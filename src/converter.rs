// SPDX-License-Identifier: GPL-3.0-only

//! Conversion between native pixel buffers and processable images
//!
//! The converter owns the [`RenderContext`]. Reading wraps a locked buffer's
//! pixels as a source image; materializing allocates a fresh NV12 buffer and
//! renders an image into it.

use crate::constants::DEFAULT_MAX_BUFFER_BYTES;
use crate::errors::{PipelineError, PipelineResult};
use crate::media::color::ycbcr_to_rgb;
use crate::media::buffer::chroma_stride;
use crate::media::{BufferLock, PixelBuffer, PixelFormat, ProcessableImage};
use crate::render::{BackendKind, RenderContext};
use image::{Rgba, RgbaImage};
use std::sync::Arc;
use tracing::trace;

/// Source of output buffers
pub trait BufferAllocator: Send + Sync {
    fn allocate(&self, width: u32, height: u32, format: PixelFormat)
    -> PipelineResult<PixelBuffer>;
}

/// Heap allocator with a size ceiling
#[derive(Debug, Clone, Copy)]
pub struct SystemAllocator {
    max_bytes: usize,
}

impl SystemAllocator {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

impl Default for SystemAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUFFER_BYTES)
    }
}

impl BufferAllocator for SystemAllocator {
    fn allocate(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> PipelineResult<PixelBuffer> {
        if width == 0 || height == 0 {
            return Err(PipelineError::Allocation(format!(
                "invalid size {}x{}",
                width, height
            )));
        }
        let size = format.frame_size(width, height).ok_or_else(|| {
            PipelineError::Allocation(format!("{}x{} {} overflows", width, height, format))
        })?;
        if size > self.max_bytes {
            return Err(PipelineError::Allocation(format!(
                "{}x{} {} needs {} bytes, limit is {}",
                width, height, format, size, self.max_bytes
            )));
        }
        PixelBuffer::black(width, height, format)
            .ok_or_else(|| PipelineError::Allocation(format!("{}x{} {}", width, height, format)))
    }
}

/// Buffer ⇄ image conversion using one rendering context
pub struct FrameConverter {
    context: RenderContext,
    allocator: Arc<dyn BufferAllocator>,
}

impl FrameConverter {
    pub fn new(context: RenderContext, allocator: Arc<dyn BufferAllocator>) -> Self {
        Self { context, allocator }
    }

    /// Active rendering backend
    pub fn backend(&self) -> BackendKind {
        self.context.backend()
    }

    pub fn context(&self) -> &RenderContext {
        &self.context
    }

    /// Lock `buffer` and wrap its contents as a processable image
    ///
    /// The lock is released before returning, on success or failure.
    pub fn to_processable(&self, buffer: &PixelBuffer) -> PipelineResult<ProcessableImage> {
        let lock = buffer.lock();
        self.image_from_lock(&lock)
    }

    /// Wrap the contents of an already locked buffer
    pub fn image_from_lock(&self, lock: &BufferLock<'_>) -> PipelineResult<ProcessableImage> {
        let (width, height) = (lock.width(), lock.height());
        if width == 0 || height == 0 {
            return Err(PipelineError::Conversion(format!(
                "empty buffer {}x{}",
                width, height
            )));
        }

        let image = match lock.format() {
            PixelFormat::Nv12 => nv12_to_rgba(lock)?,
            PixelFormat::Rgba => {
                let required = PixelFormat::Rgba
                    .frame_size(width, height)
                    .ok_or_else(|| PipelineError::Conversion("size overflow".into()))?;
                let data = lock.data().get(..required).ok_or_else(|| {
                    PipelineError::Conversion(format!(
                        "RGBA storage is {} bytes, need {}",
                        lock.data().len(),
                        required
                    ))
                })?;
                RgbaImage::from_raw(width, height, data.to_vec()).ok_or_else(|| {
                    PipelineError::Conversion("RGBA storage does not match size".into())
                })?
            }
        };

        trace!(width, height, format = %lock.format(), "Wrapped buffer as image");
        Ok(ProcessableImage::from_rgba(image))
    }

    /// Rasterize an image for preview
    pub fn rasterize(&self, image: &ProcessableImage) -> Arc<RgbaImage> {
        self.context.rasterize(image)
    }

    /// Allocate a new NV12 buffer of the given size and render `image` into it
    pub fn materialize(
        &self,
        image: &ProcessableImage,
        width: u32,
        height: u32,
    ) -> PipelineResult<PixelBuffer> {
        let buffer = self.allocator.allocate(width, height, PixelFormat::Nv12)?;
        {
            let mut lock = buffer.lock();
            self.context.render_into(image, &mut lock)?;
        }
        Ok(buffer)
    }
}

fn nv12_to_rgba(lock: &BufferLock<'_>) -> PipelineResult<RgbaImage> {
    let (width, height) = (lock.width(), lock.height());
    let (y_plane, uv_plane) = lock.nv12_planes().ok_or_else(|| {
        PipelineError::Conversion(format!(
            "NV12 storage of {} bytes is too short for {}x{}",
            lock.data().len(),
            width,
            height
        ))
    })?;

    let stride = width as usize;
    let uv_stride = chroma_stride(stride);
    let mut image = RgbaImage::new(width, height);
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let (x, y) = (x as usize, y as usize);
        let luma = y_plane[y * stride + x];
        let uv_index = (y / 2) * uv_stride + (x / 2) * 2;
        let [r, g, b] = ycbcr_to_rgb(luma, uv_plane[uv_index], uv_plane[uv_index + 1]);
        *pixel = Rgba([r, g, b, 255]);
    }
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn converter() -> FrameConverter {
        FrameConverter::new(RenderContext::software(), Arc::new(SystemAllocator::default()))
    }

    #[test]
    fn test_zero_sized_buffer_is_conversion_error() {
        let buffer = PixelBuffer::from_bytes(0, 0, PixelFormat::Nv12, Vec::new());
        let err = converter().to_processable(&buffer).unwrap_err();
        assert!(matches!(err, PipelineError::Conversion(_)));
        assert_eq!(buffer.lock_count(), 0);
    }

    #[test]
    fn test_short_buffer_is_conversion_error() {
        let buffer = PixelBuffer::from_bytes(4, 4, PixelFormat::Rgba, vec![0; 8]);
        assert!(converter().to_processable(&buffer).is_err());
        assert_eq!(buffer.lock_count(), 0);
    }

    #[test]
    fn test_rgba_round_trip_through_nv12() {
        let converter = converter();
        let source = RgbaImage::from_pixel(4, 4, Rgba([90, 90, 90, 255]));
        let buffer = PixelBuffer::from_rgba_image(source);

        let image = converter.to_processable(&buffer).unwrap();
        let output = converter.materialize(&image, 4, 4).unwrap();
        assert_eq!(output.format(), PixelFormat::Nv12);
        assert_eq!(output.lock_count(), 0);

        let back = converter.to_processable(&output).unwrap().render();
        for pixel in back.pixels() {
            for channel in &pixel.0[..3] {
                assert!((*channel as i32 - 90).abs() <= 1);
            }
        }
    }

    #[test]
    fn test_allocator_limits() {
        let allocator = SystemAllocator::new(100);
        assert!(allocator.allocate(4, 4, PixelFormat::Nv12).is_ok());
        assert!(matches!(
            allocator.allocate(64, 64, PixelFormat::Nv12),
            Err(PipelineError::Allocation(_))
        ));
        assert!(allocator.allocate(0, 4, PixelFormat::Nv12).is_err());
    }

    #[test]
    fn test_materialize_fails_when_allocation_fails() {
        let converter =
            FrameConverter::new(RenderContext::software(), Arc::new(SystemAllocator::new(8)));
        let image = ProcessableImage::from_rgba(RgbaImage::new(4, 4));
        let err = converter.materialize(&image, 4, 4).unwrap_err();
        assert!(matches!(err, PipelineError::Allocation(_)));
    }
}
