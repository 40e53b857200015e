// SPDX-License-Identifier: GPL-3.0-only

//! Rendering context used to rasterize images and re-materialize buffers
//!
//! The context is built once. Construction is a two-step algorithm: try the
//! hardware (wgpu compute) backend, then fall back to the software backend.
//! Which backend won is observable through [`RenderContext::backend`], and
//! [`RenderContext::with_factories`] lets callers force either branch.

pub mod gpu;
pub mod software;

pub use gpu::GpuBackend;
pub use software::SoftwareBackend;

use crate::errors::{PipelineError, PipelineResult};
use crate::media::{BufferLock, ProcessableImage};
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{info, warn};

/// Which rendering backend is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    /// GPU compute backend
    Hardware,
    /// CPU backend
    Software,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Hardware => write!(f, "hardware"),
            BackendKind::Software => write!(f, "software"),
        }
    }
}

/// Backend selection policy from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderPreference {
    /// Prefer hardware, fall back to software
    #[default]
    Auto,
    /// Skip the hardware probe entirely
    Software,
}

/// Writes rasterized RGBA pixels into a locked NV12 buffer
pub trait RenderBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Short description for diagnostics (adapter name, etc.)
    fn describe(&self) -> String;

    /// Convert `image` into the NV12 planes of `target`
    ///
    /// `image` always has the same dimensions as `target`.
    fn render_nv12(&self, image: &RgbaImage, target: &mut BufferLock<'_>) -> PipelineResult<()>;
}

/// Constructor for a rendering backend
pub type BackendFactory<'a> = Box<dyn FnOnce() -> PipelineResult<Box<dyn RenderBackend>> + 'a>;

/// Long-lived rendering resource shared by preview and output rendering
pub struct RenderContext {
    backend: Box<dyn RenderBackend>,
}

impl RenderContext {
    /// Build the context for a configured preference
    pub fn create(preference: RenderPreference) -> PipelineResult<Self> {
        match preference {
            RenderPreference::Auto => Self::with_factories(
                Box::new(|| {
                    GpuBackend::new().map(|backend| Box::new(backend) as Box<dyn RenderBackend>)
                }),
                Box::new(|| Ok(Box::new(SoftwareBackend::new()) as Box<dyn RenderBackend>)),
            ),
            RenderPreference::Software => {
                info!("Rendering context uses software renderer (configured)");
                Ok(Self::software())
            }
        }
    }

    /// Two-step construction: hardware first, software on failure
    ///
    /// Fails with `ContextInit` only if both factories fail.
    pub fn with_factories(
        hardware: BackendFactory<'_>,
        software: BackendFactory<'_>,
    ) -> PipelineResult<Self> {
        let hardware_error = match hardware() {
            Ok(backend) => {
                info!(backend = %backend.describe(), "Rendering context uses hardware renderer");
                return Ok(Self { backend });
            }
            Err(e) => e,
        };
        warn!(error = %hardware_error, "Hardware renderer unavailable, trying software");

        match software() {
            Ok(backend) => {
                info!(backend = %backend.describe(), "Rendering context uses software renderer");
                Ok(Self { backend })
            }
            Err(software_error) => Err(PipelineError::ContextInit(format!(
                "hardware: {}; software: {}",
                hardware_error, software_error
            ))),
        }
    }

    /// Wrap an already constructed backend
    pub fn from_backend(backend: Box<dyn RenderBackend>) -> Self {
        Self { backend }
    }

    /// Software-only context
    pub fn software() -> Self {
        Self::from_backend(Box::new(SoftwareBackend::new()))
    }

    /// Active backend
    pub fn backend(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn describe(&self) -> String {
        self.backend.describe()
    }

    /// Rasterize an image to RGBA pixels
    pub fn rasterize(&self, image: &ProcessableImage) -> Arc<RgbaImage> {
        image.render()
    }

    /// Render an image into a locked NV12 buffer
    ///
    /// The image is drawn at the origin at its own size. If it is smaller than
    /// the target the rest stays black; if it is larger it is cropped.
    pub fn render_into(
        &self,
        image: &ProcessableImage,
        target: &mut BufferLock<'_>,
    ) -> PipelineResult<()> {
        let pixels = self.rasterize(image);
        let fitted = fit_to_target(&pixels, target.width(), target.height());
        self.backend.render_nv12(&fitted, target)
    }
}

impl std::fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderContext")
            .field("backend", &self.backend.kind())
            .finish()
    }
}

fn fit_to_target(image: &RgbaImage, width: u32, height: u32) -> Cow<'_, RgbaImage> {
    if image.dimensions() == (width, height) {
        return Cow::Borrowed(image);
    }
    let mut canvas = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]));
    image::imageops::replace(&mut canvas, image, 0, 0);
    Cow::Owned(canvas)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failing<'a>(message: &'a str) -> BackendFactory<'a> {
        Box::new(move || Err(PipelineError::ContextInit(message.to_string())))
    }

    fn software_factory<'a>() -> BackendFactory<'a> {
        Box::new(|| Ok(Box::new(SoftwareBackend::new()) as Box<dyn RenderBackend>))
    }

    /// Stands in for a GPU backend so the hardware branch can be forced
    struct FakeHardware(SoftwareBackend);

    impl RenderBackend for FakeHardware {
        fn kind(&self) -> BackendKind {
            BackendKind::Hardware
        }

        fn describe(&self) -> String {
            "fake gpu".into()
        }

        fn render_nv12(&self, image: &RgbaImage, target: &mut BufferLock<'_>) -> PipelineResult<()> {
            self.0.render_nv12(image, target)
        }
    }

    #[test]
    fn test_hardware_failure_falls_back_to_software() {
        let context =
            RenderContext::with_factories(failing("no adapter"), software_factory()).unwrap();
        assert_eq!(context.backend(), BackendKind::Software);
    }

    #[test]
    fn test_hardware_success_is_preferred() {
        let mut software_called = false;
        let context = RenderContext::with_factories(
            Box::new(|| {
                Ok(Box::new(FakeHardware(SoftwareBackend::new())) as Box<dyn RenderBackend>)
            }),
            Box::new(|| {
                software_called = true;
                Ok(Box::new(SoftwareBackend::new()) as Box<dyn RenderBackend>)
            }),
        )
        .unwrap();
        assert_eq!(context.backend(), BackendKind::Hardware);
        assert_eq!(context.describe(), "fake gpu");
        assert!(!software_called);
    }

    #[test]
    fn test_both_failing_is_context_init_error() {
        let err = RenderContext::with_factories(failing("no adapter"), failing("no memory"))
            .unwrap_err();
        match err {
            PipelineError::ContextInit(msg) => {
                assert!(msg.contains("no adapter"));
                assert!(msg.contains("no memory"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_software_preference_skips_hardware() {
        let context = RenderContext::create(RenderPreference::Software).unwrap();
        assert_eq!(context.backend(), BackendKind::Software);
        assert_eq!(context.describe(), "cpu");
    }

    #[test]
    fn test_fit_crops_and_pads() {
        let image = RgbaImage::from_pixel(4, 2, Rgba([255, 255, 255, 255]));
        let fitted = fit_to_target(&image, 2, 4);
        assert_eq!(fitted.dimensions(), (2, 4));
        assert_eq!(fitted.get_pixel(1, 1).0, [255, 255, 255, 255]);
        assert_eq!(fitted.get_pixel(1, 3).0, [0, 0, 0, 255]);
    }
}
