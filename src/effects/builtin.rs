// SPDX-License-Identifier: GPL-3.0-only

//! Built-in effect library
//!
//! Colour effects use the same RGB maths as the camera filter presets.
//! [`EffectKind`] is the serializable description used by the config file
//! and the CLI; [`EffectKind::build`] creates a fresh effect instance.

use super::{Effect, EffectRef};
use crate::media::ProcessableImage;
use crate::media::color::luminance;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Serializable description of a built-in effect
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EffectKind {
    Grayscale,
    Sepia,
    Noir,
    Vivid,
    Cool,
    Warm,
    Fade,
    Duotone,
    Negative,
    Posterize { levels: u32 },
    Solarize { threshold: f32 },
    Vignette,
    Sharpen { amount: f32 },
    Crop { x: u32, y: u32, width: u32, height: u32 },
    Strobe { interval: u64 },
}

impl EffectKind {
    /// Names accepted by [`EffectKind::from_name`]
    pub const NAMES: [&'static str; 15] = [
        "grayscale",
        "sepia",
        "noir",
        "vivid",
        "cool",
        "warm",
        "fade",
        "duotone",
        "negative",
        "posterize",
        "solarize",
        "vignette",
        "sharpen",
        "crop",
        "strobe",
    ];

    /// Parse an effect name, using default parameters
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name.trim().to_ascii_lowercase().as_str() {
            "grayscale" | "mono" => EffectKind::Grayscale,
            "sepia" => EffectKind::Sepia,
            "noir" => EffectKind::Noir,
            "vivid" => EffectKind::Vivid,
            "cool" => EffectKind::Cool,
            "warm" => EffectKind::Warm,
            "fade" => EffectKind::Fade,
            "duotone" => EffectKind::Duotone,
            "negative" => EffectKind::Negative,
            "posterize" => EffectKind::Posterize { levels: 4 },
            "solarize" => EffectKind::Solarize { threshold: 0.5 },
            "vignette" => EffectKind::Vignette,
            "sharpen" => EffectKind::Sharpen { amount: 1.0 },
            "crop" => EffectKind::Crop {
                x: 0,
                y: 0,
                width: 640,
                height: 360,
            },
            "strobe" => EffectKind::Strobe { interval: 15 },
            _ => return None,
        };
        Some(kind)
    }

    /// Display name of the effect
    pub fn name(&self) -> &'static str {
        match self {
            EffectKind::Grayscale => "grayscale",
            EffectKind::Sepia => "sepia",
            EffectKind::Noir => "noir",
            EffectKind::Vivid => "vivid",
            EffectKind::Cool => "cool",
            EffectKind::Warm => "warm",
            EffectKind::Fade => "fade",
            EffectKind::Duotone => "duotone",
            EffectKind::Negative => "negative",
            EffectKind::Posterize { .. } => "posterize",
            EffectKind::Solarize { .. } => "solarize",
            EffectKind::Vignette => "vignette",
            EffectKind::Sharpen { .. } => "sharpen",
            EffectKind::Crop { .. } => "crop",
            EffectKind::Strobe { .. } => "strobe",
        }
    }

    /// Create a new effect instance
    pub fn build(&self) -> EffectRef {
        let name = self.name();
        match *self {
            EffectKind::Grayscale => color(name, grayscale),
            EffectKind::Sepia => color(name, sepia),
            EffectKind::Noir => color(name, noir),
            EffectKind::Vivid => color(name, vivid),
            EffectKind::Cool => color(name, cool),
            EffectKind::Warm => color(name, warm),
            EffectKind::Fade => color(name, fade),
            EffectKind::Duotone => color(name, duotone),
            EffectKind::Negative => color(name, negative),
            EffectKind::Posterize { levels } => {
                let levels = levels.max(1) as f32;
                color(name, move |rgb| rgb.map(|c| (c * levels).floor() / levels))
            }
            EffectKind::Solarize { threshold } => color(name, move |rgb| {
                rgb.map(|c| if c > threshold { 1.0 - c } else { c })
            }),
            EffectKind::Vignette => Arc::new(Vignette),
            EffectKind::Sharpen { amount } => Arc::new(Sharpen { amount }),
            EffectKind::Crop {
                x,
                y,
                width,
                height,
            } => Arc::new(Crop {
                x,
                y,
                width,
                height,
            }),
            EffectKind::Strobe { interval } => Arc::new(Strobe::new(interval)),
        }
    }
}

/// Colour effect applying a per-pixel function
pub struct ColorEffect {
    name: &'static str,
    op: Arc<dyn Fn([f32; 3]) -> [f32; 3] + Send + Sync>,
}

impl Effect for ColorEffect {
    fn name(&self) -> &str {
        self.name
    }

    fn execute(&self, image: ProcessableImage) -> ProcessableImage {
        let op = self.op.clone();
        image.map_color(move |rgb| op(rgb))
    }
}

fn color<F>(name: &'static str, op: F) -> EffectRef
where
    F: Fn([f32; 3]) -> [f32; 3] + Send + Sync + 'static,
{
    Arc::new(ColorEffect {
        name,
        op: Arc::new(op),
    })
}

fn grayscale(rgb: [f32; 3]) -> [f32; 3] {
    let gray = luminance(rgb);
    [gray, gray, gray]
}

fn sepia(rgb: [f32; 3]) -> [f32; 3] {
    let l = luminance(rgb);
    [l * 1.2 + 0.1, l * 0.9 + 0.05, l * 0.7]
}

fn noir(rgb: [f32; 3]) -> [f32; 3] {
    let adjusted = ((luminance(rgb) - 0.5) * 2.0 + 0.5).clamp(0.0, 1.0);
    [adjusted, adjusted, adjusted]
}

fn vivid(rgb: [f32; 3]) -> [f32; 3] {
    let l = luminance(rgb);
    rgb.map(|c| {
        let saturated = (l + (c - l) * 1.4).clamp(0.0, 1.0);
        ((saturated - 0.5) * 1.15 + 0.5).clamp(0.0, 1.0)
    })
}

fn cool([r, g, b]: [f32; 3]) -> [f32; 3] {
    [r * 0.9, g * 0.95, b * 1.1]
}

fn warm([r, g, b]: [f32; 3]) -> [f32; 3] {
    [r * 1.1, g, b * 0.85]
}

fn fade(rgb: [f32; 3]) -> [f32; 3] {
    let lifted = rgb.map(|c| (c * 0.85 + 0.1).clamp(0.0, 1.0));
    let l = luminance(lifted);
    lifted.map(|c| l + (c - l) * 0.7)
}

fn duotone(rgb: [f32; 3]) -> [f32; 3] {
    const DARK: [f32; 3] = [0.1, 0.1, 0.4];
    const LIGHT: [f32; 3] = [1.0, 0.9, 0.5];
    let l = luminance(rgb);
    [
        DARK[0] + l * (LIGHT[0] - DARK[0]),
        DARK[1] + l * (LIGHT[1] - DARK[1]),
        DARK[2] + l * (LIGHT[2] - DARK[2]),
    ]
}

fn negative(rgb: [f32; 3]) -> [f32; 3] {
    rgb.map(|c| 1.0 - c)
}

/// Darkens towards the corners
pub struct Vignette;

impl Effect for Vignette {
    fn name(&self) -> &str {
        "vignette"
    }

    fn execute(&self, image: ProcessableImage) -> ProcessableImage {
        image.map_positional(|rgb, pos| {
            let dx = pos.x as f32 / pos.width.max(1) as f32 - 0.5;
            let dy = pos.y as f32 / pos.height.max(1) as f32 - 0.5;
            let dist = (dx * dx + dy * dy).sqrt();
            let factor = 1.0 - smoothstep(0.3, 0.9, dist);
            rgb.map(|c| c * factor)
        })
    }
}

#[inline]
fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Unsharp 3x3 kernel; `amount` 0.0 is identity
pub struct Sharpen {
    amount: f32,
}

impl Sharpen {
    pub fn kernel(&self) -> [f32; 9] {
        let a = self.amount;
        [0.0, -a, 0.0, -a, 1.0 + 4.0 * a, -a, 0.0, -a, 0.0]
    }
}

impl Effect for Sharpen {
    fn name(&self) -> &str {
        "sharpen"
    }

    fn execute(&self, image: ProcessableImage) -> ProcessableImage {
        image.convolve(self.kernel())
    }
}

/// Crops the image, changing its nominal extent
pub struct Crop {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl Effect for Crop {
    fn name(&self) -> &str {
        "crop"
    }

    fn execute(&self, image: ProcessableImage) -> ProcessableImage {
        image.cropped(self.x, self.y, self.width, self.height)
    }
}

/// Inverts every `interval`-th frame; counts the frames it has seen
pub struct Strobe {
    interval: u64,
    frames: AtomicU64,
}

impl Strobe {
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            frames: AtomicU64::new(0),
        }
    }

    /// Frames processed so far
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}

impl Effect for Strobe {
    fn name(&self) -> &str {
        "strobe"
    }

    fn execute(&self, image: ProcessableImage) -> ProcessableImage {
        let frame = self.frames.fetch_add(1, Ordering::Relaxed);
        if frame % self.interval == 0 {
            image.map_color(negative)
        } else {
            image
        }
    }
}
