// SPDX-License-Identifier: GPL-3.0-only

//! Camera Effects - live effect chain for camera and screen frames
//!
//! Frames from a capture source are run through an ordered, mutable chain of
//! effects, shown on a preview sink and re-materialized as NV12 buffers for a
//! video encoder. Screen frames take a shorter path straight to the encoder.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`pipeline`]: Controller and capture entry points
//! - [`effects`]: Effect trait, registry and built-in effects
//! - [`converter`]: Buffer to image conversion and output buffer allocation
//! - [`render`]: Rendering context with GPU and CPU backends
//! - [`media`]: Pixel buffers, lazily evaluated images and timing
//! - [`preview`]: Preview sink, dispatch and layout
//! - [`encoder`]: Encoder seam running on its own serial queue
//! - [`dispatch`]: Serial execution queues
//! - [`config`]: User configuration handling
//!
//! # Example
//!
//! ```ignore
//! let config = Config::load_default()?;
//! let pipeline = PipelineController::new(&config, Box::new(encoder), None)?;
//! pipeline.register_effect(EffectKind::Sepia.build());
//! pipeline.on_frame(buffer, pts, duration);
//! ```

pub mod config;
pub mod constants;
pub mod converter;
pub mod dispatch;
pub mod effects;
pub mod encoder;
pub mod errors;
pub mod media;
pub mod pipeline;
pub mod preview;
pub mod render;

// Re-export commonly used types
pub use config::Config;
pub use effects::{Effect, EffectKind, EffectRef, EffectRegistry};
pub use encoder::VideoEncoder;
pub use errors::{PipelineError, PipelineResult};
pub use media::{MediaTime, PixelBuffer, PixelFormat, ProcessableImage};
pub use pipeline::{PipelineController, PipelineStats};
pub use preview::PreviewSink;
pub use render::BackendKind;
