// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline controller
//!
//! Entry point for both capture paths:
//!
//! - camera frames go through [`PipelineController::on_frame`], which runs the
//!   effect chain, feeds the preview and forwards the re-materialized NV12
//!   buffer to the encoder;
//! - screen frames go through [`PipelineController::on_pixel_buffer`] and are
//!   forwarded untouched, with size changes applied on the encoder queue.
//!
//! Frame sources never see errors. A frame that fails is logged, counted as
//! dropped and the pipeline carries on with the next one.

use crate::config::Config;
use crate::converter::{FrameConverter, SystemAllocator};
use crate::effects::{EffectRef, EffectRegistry, apply_chain};
use crate::encoder::{EncoderHandle, VideoEncoder};
use crate::errors::{PipelineError, PipelineResult};
use crate::media::{MediaTime, PixelBuffer};
use crate::preview::{PreviewDispatcher, PreviewSink};
use crate::render::{BackendKind, RenderContext};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, trace, warn};

/// Frame counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Camera frames that reached the encoder
    pub processed: u64,
    /// Camera frames dropped because of a per-frame error
    pub dropped: u64,
    /// Screen frames forwarded to the encoder
    pub screen_frames: u64,
}

#[derive(Default)]
struct Counters {
    processed: AtomicU64,
    dropped: AtomicU64,
    screen_frames: AtomicU64,
}

/// Owns the effect registry, the converter, the preview and the encoder
pub struct PipelineController {
    registry: EffectRegistry,
    converter: FrameConverter,
    preview: Option<PreviewDispatcher>,
    encoder: EncoderHandle,
    counters: Counters,
}

impl PipelineController {
    /// Build a controller from configuration
    ///
    /// Fails only if no rendering context can be created or a queue thread
    /// cannot be started.
    pub fn new(
        config: &Config,
        encoder: Box<dyn VideoEncoder>,
        preview: Option<Box<dyn PreviewSink>>,
    ) -> PipelineResult<Self> {
        let context = RenderContext::create(config.render)?;
        let converter = FrameConverter::new(
            context,
            Arc::new(SystemAllocator::new(config.max_buffer_bytes)),
        );

        let preview = match preview {
            Some(sink) if config.preview_enabled => Some(sink),
            Some(_) => {
                debug!("Preview disabled by configuration");
                None
            }
            None => None,
        };

        let controller = Self::from_parts(converter, encoder, preview)?;
        controller
            .encoder
            .set_dimensions(config.encoder_width, config.encoder_height);
        for kind in &config.effects {
            controller.register_effect(kind.build());
        }

        info!(
            backend = %controller.backend(),
            effects = config.effects.len(),
            preview = controller.preview.is_some(),
            "Pipeline ready"
        );
        Ok(controller)
    }

    /// Build a controller from already constructed parts
    pub fn from_parts(
        converter: FrameConverter,
        encoder: Box<dyn VideoEncoder>,
        preview: Option<Box<dyn PreviewSink>>,
    ) -> PipelineResult<Self> {
        let preview = preview.map(PreviewDispatcher::new).transpose()?;
        Ok(Self {
            registry: EffectRegistry::new(),
            converter,
            preview,
            encoder: EncoderHandle::new(encoder)?,
            counters: Counters::default(),
        })
    }

    /// Run the effect chain on one frame and produce a new NV12 buffer
    ///
    /// The output has the input's dimensions regardless of what the effects
    /// did to the image's extent. The input buffer stays locked until the
    /// preview has been handed off.
    pub fn effect(&self, buffer: &PixelBuffer) -> PipelineResult<PixelBuffer> {
        let lock = buffer.lock();
        let (width, height) = (lock.width(), lock.height());

        let source = self.converter.image_from_lock(&lock)?;
        let effects = self.registry.snapshot();
        let image = apply_chain(&effects, source);

        if let Some(preview) = &self.preview {
            preview.submit(self.converter.rasterize(&image));
        }
        drop(lock);

        self.converter.materialize(&image, width, height)
    }

    /// Camera path: process a frame and forward it to the encoder
    pub fn on_frame(&self, buffer: PixelBuffer, presentation_time: MediaTime, duration: MediaTime) {
        match self.effect(&buffer) {
            Ok(output) => {
                self.encoder.encode(output, presentation_time, duration);
                self.counters.processed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                log_dropped(&e, presentation_time);
            }
        }
    }

    /// Screen path: the captured surface changed size
    pub fn on_size_changed(&self, width: u32, height: u32) {
        debug!(width, height, "Screen size changed");
        self.encoder.set_dimensions(width, height);
    }

    /// Screen path: forward a captured buffer without effects
    ///
    /// The timestamp is used as both presentation time and duration.
    pub fn on_pixel_buffer(&self, buffer: PixelBuffer, timestamp: MediaTime) {
        trace!(timestamp = %timestamp, "Screen frame");
        self.encoder.encode(buffer, timestamp, timestamp);
        self.counters.screen_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Add an effect at the end of the chain; `false` if already present
    pub fn register_effect(&self, effect: EffectRef) -> bool {
        self.registry.register(effect)
    }

    /// Remove an effect; `false` if it was not registered
    pub fn unregister_effect(&self, effect: &EffectRef) -> bool {
        self.registry.unregister(effect)
    }

    /// Current effect chain
    pub fn effects(&self) -> Vec<EffectRef> {
        self.registry.snapshot()
    }

    /// Shared handle onto the effect registry
    pub fn registry(&self) -> &EffectRegistry {
        &self.registry
    }

    pub fn encoder(&self) -> &EncoderHandle {
        &self.encoder
    }

    pub fn backend(&self) -> BackendKind {
        self.converter.backend()
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            processed: self.counters.processed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            screen_frames: self.counters.screen_frames.load(Ordering::Relaxed),
        }
    }

    /// Wait for queued preview and encoder work to finish
    pub fn flush(&self) {
        if let Some(preview) = &self.preview {
            preview.flush();
        }
        self.encoder.flush();
    }
}

fn log_dropped(error: &PipelineError, presentation_time: MediaTime) {
    match error {
        PipelineError::Allocation(_) => {
            warn!(error = %error, pts = %presentation_time, "Frame dropped");
        }
        e if e.is_per_frame() => {
            debug!(error = %error, pts = %presentation_time, "Frame dropped");
        }
        _ => {
            warn!(error = %error, pts = %presentation_time, "Frame dropped by pipeline failure");
        }
    }
}
