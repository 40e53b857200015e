// SPDX-License-Identifier: GPL-3.0-only

//! Frame data model: native buffers, processable images, colour math and timing

pub mod buffer;
pub mod color;
pub mod processable;
pub mod timing;

pub use buffer::{BufferLock, PixelBuffer, PixelFormat};
pub use processable::{Extent, PixelPosition, ProcessableImage};
pub use timing::MediaTime;
