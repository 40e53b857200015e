// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline-wide constants

/// Application identifier, used for the config directory
pub const APP_ID: &str = "camera-effects";

/// Config file name inside the config directory
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Default encoder output size before the first screen size notification
pub const DEFAULT_ENCODER_WIDTH: u32 = 1280;
pub const DEFAULT_ENCODER_HEIGHT: u32 = 720;

/// Largest output buffer the system allocator hands out (8K NV12 with headroom)
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 7680 * 4320 * 2;

/// Default frame rate of the demo sources
pub const DEFAULT_FRAME_RATE: u32 = 30;

/// Timescale used for media timestamps produced by the demo sources (milliseconds)
pub const DEFAULT_TIMESCALE: i32 = 1000;

/// Compute workgroup edge for the GPU conversion shader (in 2x2 pixel blocks)
pub const GPU_WORKGROUP_SIZE: u32 = 8;

/// Thread names of the serial execution contexts
pub mod queues {
    pub const ENCODER: &str = "camera-effects.encoder";
    pub const PREVIEW: &str = "camera-effects.preview";
}

/// BT.601 video-range limits
pub mod video_range {
    pub const Y_MIN: f32 = 16.0;
    pub const Y_RANGE: f32 = 219.0;
    pub const C_MID: f32 = 128.0;
    pub const C_RANGE: f32 = 224.0;
}

/// Build information
pub mod app_info {
    /// Version stamped by the build script (git describe or `CAMERA_EFFECTS_VERSION`)
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}
