// SPDX-License-Identifier: GPL-3.0-only

//! CPU rendering backend

use super::{BackendKind, RenderBackend};
use crate::errors::{PipelineError, PipelineResult};
use crate::media::buffer::chroma_stride;
use crate::media::color::{normalize, rgb_to_chroma, rgb_to_luma};
use crate::media::BufferLock;
use image::RgbaImage;

/// RGBA to NV12 conversion on the CPU
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareBackend;

impl SoftwareBackend {
    pub fn new() -> Self {
        Self
    }
}

impl RenderBackend for SoftwareBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Software
    }

    fn describe(&self) -> String {
        "cpu".to_string()
    }

    fn render_nv12(&self, image: &RgbaImage, target: &mut BufferLock<'_>) -> PipelineResult<()> {
        let (width, height) = (target.width(), target.height());
        if image.dimensions() != (width, height) {
            return Err(PipelineError::Render(format!(
                "image is {}x{}, target is {}x{}",
                image.width(),
                image.height(),
                width,
                height
            )));
        }
        let (y_plane, uv_plane) = target
            .nv12_planes_mut()
            .ok_or_else(|| PipelineError::Render("target is not a complete NV12 buffer".into()))?;
        write_nv12(image, y_plane, uv_plane);
        Ok(())
    }
}

/// Convert RGBA pixels into NV12 planes
///
/// Luma is computed per pixel; chroma from the average colour of each 2x2
/// block (partial blocks at odd edges average the pixels they contain).
pub fn write_nv12(image: &RgbaImage, y_plane: &mut [u8], uv_plane: &mut [u8]) {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let uv_stride = chroma_stride(width);

    for by in (0..height).step_by(2) {
        for bx in (0..width).step_by(2) {
            let mut sum = [0.0f32; 3];
            let mut count = 0.0f32;

            for y in by..(by + 2).min(height) {
                for x in bx..(bx + 2).min(width) {
                    let [r, g, b, _] = image.get_pixel(x as u32, y as u32).0;
                    let rgb = normalize(r, g, b);
                    y_plane[y * width + x] = rgb_to_luma(rgb);
                    sum[0] += rgb[0];
                    sum[1] += rgb[1];
                    sum[2] += rgb[2];
                    count += 1.0;
                }
            }

            let (cb, cr) = rgb_to_chroma(sum.map(|c| c / count));
            let uv_index = (by / 2) * uv_stride + bx;
            uv_plane[uv_index] = cb;
            uv_plane[uv_index + 1] = cr;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{PixelBuffer, PixelFormat};
    use image::Rgba;

    #[test]
    fn test_white_frame() {
        let image = RgbaImage::from_pixel(4, 2, Rgba([255, 255, 255, 255]));
        let buffer = PixelBuffer::black(4, 2, PixelFormat::Nv12).unwrap();
        SoftwareBackend::new()
            .render_nv12(&image, &mut buffer.lock())
            .unwrap();

        let lock = buffer.lock();
        let (y, uv) = lock.nv12_planes().unwrap();
        assert!(y.iter().all(|&v| v == 235));
        assert!(uv.iter().all(|&v| v == 128));
    }

    #[test]
    fn test_odd_dimensions() {
        let image = RgbaImage::from_pixel(3, 3, Rgba([0, 0, 0, 255]));
        let buffer = PixelBuffer::from_bytes(3, 3, PixelFormat::Nv12, vec![0; 9 + 8]);
        SoftwareBackend::new()
            .render_nv12(&image, &mut buffer.lock())
            .unwrap();
        let data = buffer.to_vec();
        assert!(data[..9].iter().all(|&v| v == 16));
        assert!(data[9..].iter().all(|&v| v == 128));
    }

    #[test]
    fn test_rejects_rgba_target() {
        let image = RgbaImage::new(2, 2);
        let buffer = PixelBuffer::black(2, 2, PixelFormat::Rgba).unwrap();
        let err = SoftwareBackend::new()
            .render_nv12(&image, &mut buffer.lock())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Render(_)));
    }

    #[test]
    fn test_rejects_size_mismatch() {
        let image = RgbaImage::new(4, 4);
        let buffer = PixelBuffer::black(2, 2, PixelFormat::Nv12).unwrap();
        assert!(
            SoftwareBackend::new()
                .render_nv12(&image, &mut buffer.lock())
                .is_err()
        );
        assert_eq!(buffer.lock_count(), 0);
    }
}
