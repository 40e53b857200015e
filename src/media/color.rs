// SPDX-License-Identifier: GPL-3.0-only

//! BT.601 video-range colour conversion
//!
//! Shared by the NV12 reader, the software renderer and (as constants) the
//! GPU conversion shader, so both backends produce identical planes.

use crate::constants::video_range::{C_MID, C_RANGE, Y_MIN, Y_RANGE};

/// Luma weights (BT.601)
pub const LUMA_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

/// Relative luminance of normalized RGB
#[inline]
pub fn luminance(rgb: [f32; 3]) -> f32 {
    LUMA_WEIGHTS[0] * rgb[0] + LUMA_WEIGHTS[1] * rgb[1] + LUMA_WEIGHTS[2] * rgb[2]
}

/// Normalize 8-bit RGB to 0.0..=1.0
#[inline]
pub fn normalize(r: u8, g: u8, b: u8) -> [f32; 3] {
    [r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0]
}

/// Quantize a normalized channel back to 8 bits
#[inline]
pub fn quantize(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Video-range luma for normalized RGB
#[inline]
pub fn rgb_to_luma(rgb: [f32; 3]) -> u8 {
    (Y_MIN + Y_RANGE * luminance(rgb)).round().clamp(0.0, 255.0) as u8
}

/// Video-range chroma (Cb, Cr) for normalized RGB
#[inline]
pub fn rgb_to_chroma(rgb: [f32; 3]) -> (u8, u8) {
    let [r, g, b] = rgb;
    let cb = C_MID + C_RANGE * (-0.168736 * r - 0.331264 * g + 0.5 * b);
    let cr = C_MID + C_RANGE * (0.5 * r - 0.418688 * g - 0.081312 * b);
    (
        cb.round().clamp(0.0, 255.0) as u8,
        cr.round().clamp(0.0, 255.0) as u8,
    )
}

/// Video-range YCbCr to 8-bit RGB
#[inline]
pub fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8) -> [u8; 3] {
    let y = (y as f32 - Y_MIN) / Y_RANGE;
    let pb = (cb as f32 - C_MID) / C_RANGE;
    let pr = (cr as f32 - C_MID) / C_RANGE;

    let r = y + 1.402 * pr;
    let g = y - 0.344136 * pb - 0.714136 * pr;
    let b = y + 1.772 * pb;
    [quantize(r), quantize(g), quantize(b)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_black_and_white_levels() {
        assert_eq!(rgb_to_luma([0.0, 0.0, 0.0]), 16);
        assert_eq!(rgb_to_luma([1.0, 1.0, 1.0]), 235);
        assert_eq!(rgb_to_chroma([0.5, 0.5, 0.5]), (128, 128));
    }

    #[test]
    fn test_gray_survives_conversion() {
        let rgb = normalize(128, 128, 128);
        let y = rgb_to_luma(rgb);
        let (cb, cr) = rgb_to_chroma(rgb);
        let back = ycbcr_to_rgb(y, cb, cr);
        for channel in back {
            assert!((channel as i32 - 128).abs() <= 1, "got {:?}", back);
        }
    }

    #[test]
    fn test_primary_red_is_red() {
        let rgb = normalize(255, 0, 0);
        let y = rgb_to_luma(rgb);
        let (cb, cr) = rgb_to_chroma(rgb);
        let [r, g, b] = ycbcr_to_rgb(y, cb, cr);
        assert!(r > 240);
        assert!(g < 10);
        assert!(b < 10);
    }
}
