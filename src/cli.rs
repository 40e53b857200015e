// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Listing the built-in effects
//! - Running a synthetic camera through the effect pipeline
//! - Running a synthetic screen capture through the encoder path
//!
//! Frames are paced by a tokio interval. Each frame is handed to the pipeline
//! on the blocking pool and awaited before the next tick, so frames reach the
//! pipeline in capture order. Ctrl+C stops a run early.

use camera_effects::config::Config;
use camera_effects::effects::EffectKind;
use camera_effects::encoder::LoggingEncoder;
use camera_effects::media::{MediaTime, PixelBuffer};
use camera_effects::pipeline::PipelineController;
use camera_effects::preview::{Gravity, PreviewSink};
use camera_effects::render::RenderPreference;
use image::{Rgba, RgbaImage};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{debug, info, trace};

/// Options shared by both sources
pub struct RunOptions {
    pub width: u32,
    pub height: u32,
    /// Stop after this many frames (runs until Ctrl+C otherwise)
    pub frames: Option<u64>,
}

/// Preview sink that only computes where each frame would be shown
struct LayoutPreview {
    gravity: Gravity,
    bounds: (f32, f32),
    frames: u64,
}

impl PreviewSink for LayoutPreview {
    fn present(&mut self, content: Arc<RgbaImage>) {
        let rect = self.gravity.layout(content.dimensions(), self.bounds);
        self.frames += 1;
        trace!(
            frame = self.frames,
            x = rect.x,
            y = rect.y,
            width = rect.width,
            height = rect.height,
            "Preview frame"
        );
    }
}

/// List the built-in effects
pub fn list_effects() -> Result<(), Box<dyn std::error::Error>> {
    println!("Available effects:");
    println!();
    for name in EffectKind::NAMES {
        println!("  {}", name);
    }
    Ok(())
}

/// Run a synthetic camera through the effect chain
pub fn run_camera(
    mut config: Config,
    effects: &[String],
    software: bool,
    options: RunOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    if software {
        config.render = RenderPreference::Software;
    }
    for name in effects {
        let kind = EffectKind::from_name(name).ok_or_else(|| {
            format!(
                "Unknown effect '{}' (available: {})",
                name,
                EffectKind::NAMES.join(", ")
            )
        })?;
        config.effects.push(kind);
    }

    let encoder = LoggingEncoder::new(options.width, options.height);
    let encoded = encoder.frame_counter();
    let preview = LayoutPreview {
        gravity: config.preview_gravity,
        bounds: (options.width as f32 / 2.0, options.height as f32 / 2.0),
        frames: 0,
    };
    config.encoder_width = options.width;
    config.encoder_height = options.height;

    let controller = Arc::new(PipelineController::new(
        &config,
        Box::new(encoder),
        Some(Box::new(preview)),
    )?);

    println!("Renderer: {}", controller.backend());
    println!(
        "Source: {}x{} @ {}fps",
        options.width, options.height, config.frame_rate
    );
    let names: Vec<String> = controller
        .effects()
        .iter()
        .map(|effect| effect.name().to_string())
        .collect();
    println!("Effects: {}", display_list(&names));
    println!();
    println!("Running... (press Ctrl+C to stop)");

    let frame_ms = frame_interval_ms(config.frame_rate);
    let (width, height) = (options.width, options.height);
    let rt = tokio::runtime::Runtime::new()?;
    let sent = rt.block_on(drive(options.frames, config.frame_rate, {
        let controller = Arc::clone(&controller);
        move |index| {
            let controller = Arc::clone(&controller);
            move || {
                let buffer = PixelBuffer::from_rgba_image(test_pattern(width, height, index));
                let pts = MediaTime::from_millis(index as i64 * frame_ms);
                controller.on_frame(buffer, pts, MediaTime::from_millis(frame_ms));
            }
        }
    }))?;

    controller.flush();
    let stats = controller.stats();
    println!();
    println!(
        "Frames: {} captured, {} encoded, {} dropped",
        sent,
        encoded.load(Ordering::Relaxed),
        stats.dropped
    );
    Ok(())
}

/// Run a synthetic screen capture straight into the encoder
///
/// With `resize_at`, the captured surface switches to half size from that
/// frame on.
pub fn run_screen(
    config: Config,
    resize_at: Option<u64>,
    options: RunOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let encoder = LoggingEncoder::new(config.encoder_width, config.encoder_height);
    let encoded = encoder.frame_counter();
    let controller = Arc::new(PipelineController::new(&config, Box::new(encoder), None)?);
    controller.on_size_changed(options.width, options.height);

    println!(
        "Screen: {}x{} @ {}fps",
        options.width, options.height, config.frame_rate
    );
    println!("Running... (press Ctrl+C to stop)");

    let frame_ms = frame_interval_ms(config.frame_rate);
    let (width, height) = (options.width, options.height);
    let rt = tokio::runtime::Runtime::new()?;
    let sent = rt.block_on(drive(options.frames, config.frame_rate, {
        let controller = Arc::clone(&controller);
        move |index| {
            let controller = Arc::clone(&controller);
            move || {
                let (w, h) = match resize_at {
                    Some(at) if index >= at => ((width / 2).max(1), (height / 2).max(1)),
                    _ => (width, height),
                };
                if resize_at == Some(index) {
                    controller.on_size_changed(w, h);
                }
                let buffer = PixelBuffer::from_rgba_image(test_pattern(w, h, index));
                controller.on_pixel_buffer(buffer, MediaTime::from_millis(index as i64 * frame_ms));
            }
        }
    }))?;

    controller.flush();
    let size = controller.encoder().dimensions();
    println!();
    println!(
        "Frames: {} captured, {} encoded",
        sent,
        encoded.load(Ordering::Relaxed)
    );
    if let Some((w, h)) = size {
        println!("Encoder size: {}x{}", w, h);
    }
    Ok(())
}

/// Tick at `frame_rate` and run one frame job per tick until the frame limit
/// or Ctrl+C; returns the number of frames run
async fn drive<M, J>(
    limit: Option<u64>,
    frame_rate: u32,
    mut make_job: M,
) -> Result<u64, Box<dyn std::error::Error>>
where
    M: FnMut(u64) -> J,
    J: FnOnce() + Send + 'static,
{
    let mut interval = tokio::time::interval(Duration::from_millis(
        frame_interval_ms(frame_rate) as u64,
    ));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut index = 0u64;
    loop {
        if limit.is_some_and(|limit| index >= limit) {
            break;
        }
        tokio::select! {
            _ = &mut ctrl_c => {
                println!();
                println!("Stopping early...");
                break;
            }
            _ = interval.tick() => {
                tokio::task::spawn_blocking(make_job(index)).await?;
                index += 1;
                if index % 30 == 0 {
                    debug!(frames = index, "Source progress");
                }
            }
        }
    }
    info!(frames = index, "Source stopped");
    Ok(index)
}

fn frame_interval_ms(frame_rate: u32) -> i64 {
    1000 / frame_rate.max(1) as i64
}

fn display_list(names: &[String]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(" -> ")
    }
}

/// Moving colour gradient with a sweeping bar
fn test_pattern(width: u32, height: u32, frame: u64) -> RgbaImage {
    let bar = (frame * 8 % width.max(1) as u64) as u32;
    RgbaImage::from_fn(width, height, |x, y| {
        if x.abs_diff(bar) < 4 {
            return Rgba([255, 255, 255, 255]);
        }
        let r = (x * 255 / width.max(1)) as u8;
        let g = (y * 255 / height.max(1)) as u8;
        let b = (frame % 256) as u8;
        Rgba([r, g, b, 255])
    })
}
