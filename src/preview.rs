// SPDX-License-Identifier: GPL-3.0-only

//! Preview delivery
//!
//! The processing thread hands rasterized frames to a [`PreviewDispatcher`],
//! which forwards them to a [`PreviewSink`] on its own presentation queue.
//! Delivery is one-way: the caller never waits, gets no result, and a failing
//! sink cannot affect the encode path. Only the newest frame is kept: content
//! submitted while the sink is busy replaces whatever was still pending.

use crate::constants::queues;
use crate::dispatch::SerialQueue;
use crate::errors::{PipelineError, PipelineResult};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// Receiver of rendered preview content (e.g. a display layer)
pub trait PreviewSink: Send + 'static {
    fn present(&mut self, content: Arc<RgbaImage>);
}

/// Sink that discards everything
#[derive(Debug, Default)]
pub struct NullPreview;

impl PreviewSink for NullPreview {
    fn present(&mut self, _content: Arc<RgbaImage>) {}
}

type PendingSlot = Arc<Mutex<Option<Arc<RgbaImage>>>>;

/// Fire-and-forget delivery onto the presentation queue
///
/// At most one frame waits for the sink. A presentation job is queued only
/// when the slot goes from empty to full.
pub struct PreviewDispatcher {
    queue: SerialQueue<Box<dyn PreviewSink>>,
    pending: PendingSlot,
}

impl PreviewDispatcher {
    pub fn new(sink: Box<dyn PreviewSink>) -> PipelineResult<Self> {
        let queue = SerialQueue::start(queues::PREVIEW, sink).map_err(|e| {
            PipelineError::Queue(format!("failed to start preview queue: {}", e))
        })?;
        Ok(Self {
            queue,
            pending: PendingSlot::default(),
        })
    }

    fn slot(pending: &PendingSlot) -> MutexGuard<'_, Option<Arc<RgbaImage>>> {
        pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send content to the sink without waiting
    pub fn submit(&self, content: Arc<RgbaImage>) {
        let mut slot = Self::slot(&self.pending);
        if slot.replace(content).is_some() {
            trace!("Sink busy, replaced pending preview frame");
            return;
        }
        drop(slot);

        let pending = Arc::clone(&self.pending);
        let queued = self.queue.dispatch_async(move |sink| {
            let latest = Self::slot(&pending).take();
            if let Some(content) = latest {
                sink.present(content);
            }
        });
        if !queued {
            Self::slot(&self.pending).take();
            trace!("Preview queue closed, content dropped");
        }
    }

    /// Whether a frame is waiting for the sink
    pub fn has_pending(&self) -> bool {
        Self::slot(&self.pending).is_some()
    }

    /// Wait until all submitted content has been presented
    pub fn flush(&self) {
        self.queue.flush();
    }
}

/// How preview content is fitted into its layer
///
/// Config files may spell it any way [`Gravity::from_name`] accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum Gravity {
    /// Stretch to fill the bounds
    Resize,
    /// Fit inside the bounds, preserving aspect ratio
    #[default]
    ResizeAspect,
    /// Fill the bounds, preserving aspect ratio and cropping overflow
    ResizeAspectFill,
}

/// Placement of content inside a layer (may extend past the bounds)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Gravity {
    /// Parse a gravity name; unknown names mean [`Gravity::ResizeAspect`]
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "resize" => Gravity::Resize,
            "resizeaspectfill" => Gravity::ResizeAspectFill,
            _ => Gravity::ResizeAspect,
        }
    }

    /// Where content of `content` size lands in a layer of `bounds` size
    pub fn layout(&self, content: (u32, u32), bounds: (f32, f32)) -> PreviewRect {
        let (bw, bh) = bounds;
        let full = PreviewRect {
            x: 0.0,
            y: 0.0,
            width: bw,
            height: bh,
        };
        if content.0 == 0 || content.1 == 0 {
            return full;
        }

        let (cw, ch) = (content.0 as f32, content.1 as f32);
        // Width is the limiting side when the content is relatively wider
        let width_limited = bw * ch <= bh * cw;
        let fit_width = match self {
            Gravity::Resize => return full,
            Gravity::ResizeAspect => width_limited,
            Gravity::ResizeAspectFill => !width_limited,
        };
        // The matching side is set to the bound exactly
        let (width, height) = if fit_width {
            (bw, ch * bw / cw)
        } else {
            (cw * bh / ch, bh)
        };
        PreviewRect {
            x: (bw - width) / 2.0,
            y: (bh - height) / 2.0,
            width,
            height,
        }
    }
}

impl From<String> for Gravity {
    fn from(name: String) -> Self {
        Gravity::from_name(&name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Collecting(Arc<Mutex<Vec<(u32, u32)>>>);

    impl PreviewSink for Collecting {
        fn present(&mut self, content: Arc<RgbaImage>) {
            self.0.lock().unwrap().push(content.dimensions());
        }
    }

    #[test]
    fn test_submit_reaches_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = PreviewDispatcher::new(Box::new(Collecting(seen.clone()))).unwrap();
        dispatcher.submit(Arc::new(RgbaImage::new(4, 2)));
        dispatcher.flush();
        assert_eq!(*seen.lock().unwrap(), vec![(4, 2)]);
    }

    /// Sink whose first presentation blocks until released
    struct Stalling {
        release: std::sync::mpsc::Receiver<()>,
        stalled: bool,
        seen: Arc<Mutex<Vec<u32>>>,
    }

    impl PreviewSink for Stalling {
        fn present(&mut self, content: Arc<RgbaImage>) {
            if !self.stalled {
                self.stalled = true;
                let _ = self.release.recv();
            }
            self.seen.lock().unwrap().push(content.width());
        }
    }

    #[test]
    fn test_busy_sink_only_gets_latest_frame() {
        let (release, wait) = std::sync::mpsc::channel();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = PreviewDispatcher::new(Box::new(Stalling {
            release: wait,
            stalled: false,
            seen: seen.clone(),
        }))
        .unwrap();

        dispatcher.submit(Arc::new(RgbaImage::new(1, 1)));
        // Let the sink pick up the first frame and stall on it
        while dispatcher.has_pending() {
            std::thread::yield_now();
        }
        for width in 2..=20 {
            dispatcher.submit(Arc::new(RgbaImage::new(width, 1)));
            assert!(dispatcher.has_pending());
        }

        release.send(()).unwrap();
        dispatcher.flush();
        assert_eq!(*seen.lock().unwrap(), vec![1, 20]);
        assert!(!dispatcher.has_pending());
    }

    #[test]
    fn test_null_preview_accepts_content() {
        let dispatcher = PreviewDispatcher::new(Box::new(NullPreview)).unwrap();
        dispatcher.submit(Arc::new(RgbaImage::new(2, 2)));
        dispatcher.flush();
    }

    #[test]
    fn test_gravity_names() {
        assert_eq!(Gravity::from_name("resize"), Gravity::Resize);
        assert_eq!(Gravity::from_name("resize_aspect"), Gravity::ResizeAspect);
        assert_eq!(Gravity::from_name("ResizeAspectFill"), Gravity::ResizeAspectFill);
        assert_eq!(Gravity::from_name("sideways"), Gravity::ResizeAspect);
    }

    #[test]
    fn test_gravity_deserializes_loose_names() {
        let parse = |json: &str| serde_json::from_str::<Gravity>(json).unwrap();
        assert_eq!(parse(r#""resize_aspect_fill""#), Gravity::ResizeAspectFill);
        assert_eq!(parse(r#""Resize""#), Gravity::Resize);
        assert_eq!(parse(r#""stretchy""#), Gravity::ResizeAspect);
        assert_eq!(
            serde_json::to_string(&Gravity::ResizeAspectFill).unwrap(),
            r#""resize_aspect_fill""#
        );
    }

    #[test]
    fn test_limiting_side_matches_bounds_exactly() {
        let rect = Gravity::ResizeAspect.layout((1280, 720), (333.0, 777.0));
        assert_eq!(rect.width, 333.0);
        assert_eq!(rect.x, 0.0);
        let rect = Gravity::ResizeAspectFill.layout((1280, 720), (333.0, 777.0));
        assert_eq!(rect.height, 777.0);
        assert_eq!(rect.y, 0.0);
    }

    #[test]
    fn test_aspect_letterboxes() {
        let rect = Gravity::ResizeAspect.layout((1920, 1080), (1000.0, 1000.0));
        assert_eq!(rect.width, 1000.0);
        assert_eq!(rect.height, 562.5);
        assert_eq!(rect.x, 0.0);
        assert_eq!(rect.y, 218.75);
    }

    #[test]
    fn test_aspect_fill_overflows() {
        let rect = Gravity::ResizeAspectFill.layout((1920, 1080), (1000.0, 1000.0));
        assert!((rect.width - 1777.7778).abs() < 0.01);
        assert_eq!(rect.height, 1000.0);
        assert!(rect.x < 0.0);
    }

    #[test]
    fn test_resize_stretches() {
        let rect = Gravity::Resize.layout((16, 9), (4.0, 4.0));
        assert_eq!(
            rect,
            PreviewRect {
                x: 0.0,
                y: 0.0,
                width: 4.0,
                height: 4.0
            }
        );
    }
}
