// SPDX-License-Identifier: GPL-3.0-only

//! Visual effects applied to every frame
//!
//! An effect transforms one [`ProcessableImage`] into another. Effects are
//! shared as [`EffectRef`] (`Arc<dyn Effect>`) and compared by identity: two
//! handles are the same effect only if they point at the same instance, since
//! effects may carry per-invocation state.

pub mod builtin;
pub mod registry;

pub use builtin::EffectKind;
pub use registry::EffectRegistry;

use crate::media::ProcessableImage;
use std::sync::Arc;

/// A single-image transform
///
/// `execute` is only ever called from one thread at a time (the frame
/// processing thread), but effects must be `Send + Sync` because the registry
/// is shared with control threads.
pub trait Effect: Send + Sync {
    /// Human readable name for logs
    fn name(&self) -> &str;

    /// Produce the transformed image
    fn execute(&self, image: ProcessableImage) -> ProcessableImage;
}

/// Shared handle to an effect instance
pub type EffectRef = Arc<dyn Effect>;

/// Identity comparison of two effect handles
#[inline]
pub fn same_effect(a: &EffectRef, b: &EffectRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Fold an image through effects in order
pub fn apply_chain(effects: &[EffectRef], image: ProcessableImage) -> ProcessableImage {
    effects
        .iter()
        .fold(image, |image, effect| effect.execute(image))
}

/// Effect backed by a closure
pub struct FnEffect<F> {
    name: String,
    transform: F,
}

impl<F> Effect for FnEffect<F>
where
    F: Fn(ProcessableImage) -> ProcessableImage + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, image: ProcessableImage) -> ProcessableImage {
        (self.transform)(image)
    }
}

/// Build an effect from a closure
pub fn effect_fn<F>(name: &str, transform: F) -> EffectRef
where
    F: Fn(ProcessableImage) -> ProcessableImage + Send + Sync + 'static,
{
    Arc::new(FnEffect {
        name: name.to_string(),
        transform,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_identity_is_per_instance() {
        let a = effect_fn("noop", |image| image);
        let b = effect_fn("noop", |image| image);
        assert!(same_effect(&a, &a.clone()));
        assert!(!same_effect(&a, &b));
    }

    #[test]
    fn test_chain_applies_in_order() {
        let source =
            ProcessableImage::from_rgba(RgbaImage::from_pixel(1, 1, Rgba([100, 0, 0, 255])));
        let halve = effect_fn("halve", |image| image.map_color(|[r, g, b]| [r * 0.5, g, b]));
        let zero_red = effect_fn("zero", |image| image.map_color(|[_, g, b]| [0.0, g, b]));
        let add = effect_fn("add", |image| image.map_color(|[r, g, b]| [r + 0.2, g, b]));

        let out = apply_chain(&[zero_red.clone(), add.clone()], source.clone()).render();
        assert_eq!(out.get_pixel(0, 0).0[0], 51);

        let out = apply_chain(&[add, zero_red, halve], source).render();
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
    }
}
