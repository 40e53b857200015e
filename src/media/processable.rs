// SPDX-License-Identifier: GPL-3.0-only

//! Immutable, lazily evaluated images for the effect chain
//!
//! A [`ProcessableImage`] is a handle onto a node in a small image graph.
//! Transforms never touch pixels; they return a new handle whose node refers
//! to its input. Pixels are produced on the first [`ProcessableImage::render`]
//! and cached on the node, so the preview and the output buffer share a single
//! evaluation of the chain.

use crate::media::color::{normalize, quantize};
use image::{Rgba, RgbaImage};
use std::sync::{Arc, OnceLock};

/// Per-pixel colour transform on normalized RGB
pub type ColorOp = Arc<dyn Fn([f32; 3]) -> [f32; 3] + Send + Sync>;

/// Per-pixel colour transform that also sees the pixel position
pub type PositionalOp = Arc<dyn Fn([f32; 3], PixelPosition) -> [f32; 3] + Send + Sync>;

/// Nominal size of an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Position of a pixel within the image being evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelPosition {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

enum NodeKind {
    Source(Arc<RgbaImage>),
    Color {
        input: ProcessableImage,
        op: ColorOp,
    },
    Positional {
        input: ProcessableImage,
        op: PositionalOp,
    },
    Convolve {
        input: ProcessableImage,
        kernel: [f32; 9],
    },
    Crop {
        input: ProcessableImage,
        x: u32,
        y: u32,
    },
}

struct Node {
    kind: NodeKind,
    extent: Extent,
    rendered: OnceLock<Arc<RgbaImage>>,
}

/// Handle onto an immutable image graph node
#[derive(Clone)]
pub struct ProcessableImage {
    node: Arc<Node>,
}

impl ProcessableImage {
    fn with_kind(kind: NodeKind, extent: Extent) -> Self {
        Self {
            node: Arc::new(Node {
                kind,
                extent,
                rendered: OnceLock::new(),
            }),
        }
    }

    /// Source image backed by decoded pixels
    pub fn from_rgba(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        let image = Arc::new(image);
        let node = Self::with_kind(NodeKind::Source(image.clone()), Extent::new(width, height));
        // A source is already evaluated
        let _ = node.node.rendered.set(image);
        node
    }

    /// Nominal size of this image
    pub fn extent(&self) -> Extent {
        self.node.extent
    }

    /// Whether the pixels of this node have been produced yet
    pub fn is_rendered(&self) -> bool {
        self.node.rendered.get().is_some()
    }

    /// Apply a colour transform to every pixel
    pub fn map_color<F>(&self, op: F) -> Self
    where
        F: Fn([f32; 3]) -> [f32; 3] + Send + Sync + 'static,
    {
        Self::with_kind(
            NodeKind::Color {
                input: self.clone(),
                op: Arc::new(op),
            },
            self.extent(),
        )
    }

    /// Apply a position-dependent colour transform to every pixel
    pub fn map_positional<F>(&self, op: F) -> Self
    where
        F: Fn([f32; 3], PixelPosition) -> [f32; 3] + Send + Sync + 'static,
    {
        Self::with_kind(
            NodeKind::Positional {
                input: self.clone(),
                op: Arc::new(op),
            },
            self.extent(),
        )
    }

    /// Convolve RGB with a 3x3 kernel (row-major), clamping at the edges
    pub fn convolve(&self, kernel: [f32; 9]) -> Self {
        Self::with_kind(
            NodeKind::Convolve {
                input: self.clone(),
                kernel,
            },
            self.extent(),
        )
    }

    /// Crop to a rectangle, clamped to the current extent
    pub fn cropped(&self, x: u32, y: u32, width: u32, height: u32) -> Self {
        let extent = self.extent();
        let x = x.min(extent.width);
        let y = y.min(extent.height);
        let width = width.min(extent.width - x);
        let height = height.min(extent.height - y);
        Self::with_kind(
            NodeKind::Crop {
                input: self.clone(),
                x,
                y,
            },
            Extent::new(width, height),
        )
    }

    /// Evaluate the graph down to pixels (cached per node)
    pub fn render(&self) -> Arc<RgbaImage> {
        self.node
            .rendered
            .get_or_init(|| Arc::new(self.evaluate()))
            .clone()
    }

    fn evaluate(&self) -> RgbaImage {
        let extent = self.extent();
        match &self.node.kind {
            NodeKind::Source(image) => RgbaImage::clone(image),
            NodeKind::Color { input, op } => {
                let mut out = RgbaImage::clone(&input.render());
                for pixel in out.pixels_mut() {
                    apply_to_pixel(pixel, |rgb| op(rgb));
                }
                out
            }
            NodeKind::Positional { input, op } => {
                let mut out = RgbaImage::clone(&input.render());
                let (width, height) = out.dimensions();
                for (x, y, pixel) in out.enumerate_pixels_mut() {
                    let position = PixelPosition {
                        x,
                        y,
                        width,
                        height,
                    };
                    apply_to_pixel(pixel, |rgb| op(rgb, position));
                }
                out
            }
            NodeKind::Convolve { input, kernel } => convolve_3x3(&input.render(), kernel),
            NodeKind::Crop { input, x, y } => {
                let source = input.render();
                image::imageops::crop_imm(&*source, *x, *y, extent.width, extent.height)
                    .to_image()
            }
        }
    }

    fn kind_name(&self) -> &'static str {
        match self.node.kind {
            NodeKind::Source(_) => "source",
            NodeKind::Color { .. } => "color",
            NodeKind::Positional { .. } => "positional",
            NodeKind::Convolve { .. } => "convolve",
            NodeKind::Crop { .. } => "crop",
        }
    }
}

impl std::fmt::Debug for ProcessableImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessableImage")
            .field("kind", &self.kind_name())
            .field("extent", &self.extent())
            .field("rendered", &self.is_rendered())
            .finish()
    }
}

#[inline]
fn apply_to_pixel(pixel: &mut Rgba<u8>, op: impl Fn([f32; 3]) -> [f32; 3]) {
    let [r, g, b, a] = pixel.0;
    let [r, g, b] = op(normalize(r, g, b));
    pixel.0 = [quantize(r), quantize(g), quantize(b), a];
}

fn convolve_3x3(source: &RgbaImage, kernel: &[f32; 9]) -> RgbaImage {
    let (width, height) = source.dimensions();
    let mut out = RgbaImage::new(width, height);
    if width == 0 || height == 0 {
        return out;
    }

    let sample = |x: i64, y: i64| -> Rgba<u8> {
        let x = x.clamp(0, width as i64 - 1) as u32;
        let y = y.clamp(0, height as i64 - 1) as u32;
        *source.get_pixel(x, y)
    };

    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let mut acc = [0.0f32; 3];
        for (i, weight) in kernel.iter().enumerate() {
            let dx = (i % 3) as i64 - 1;
            let dy = (i / 3) as i64 - 1;
            let neighbour = sample(x as i64 + dx, y as i64 + dy);
            for channel in 0..3 {
                acc[channel] += weight * neighbour.0[channel] as f32;
            }
        }
        let alpha = source.get_pixel(x, y).0[3];
        pixel.0 = [
            acc[0].round().clamp(0.0, 255.0) as u8,
            acc[1].round().clamp(0.0, 255.0) as u8,
            acc[2].round().clamp(0.0, 255.0) as u8,
            alpha,
        ];
    }
    out
}
