// SPDX-License-Identifier: GPL-3.0-only

//! Native pixel buffers with scoped memory locking
//!
//! A [`PixelBuffer`] only exposes its storage through a [`BufferLock`] guard.
//! The guard holds the buffer's memory for as long as it lives and releases it
//! on drop, so every exit path (including `?` and panics) unlocks the buffer.
//! The buffer counts outstanding locks for diagnostics.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Pixel layout of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// YCbCr 4:2:0 bi-planar, video range (encoder input format)
    Nv12,
    /// Packed 8-bit RGBA
    Rgba,
}

impl PixelFormat {
    /// Bytes needed to store a frame of the given size, `None` on overflow
    pub fn frame_size(&self, width: u32, height: u32) -> Option<usize> {
        let width = width as usize;
        let height = height as usize;
        match self {
            PixelFormat::Nv12 => {
                let y_size = width.checked_mul(height)?;
                let uv_size = chroma_stride(width).checked_mul(chroma_rows(height))?;
                y_size.checked_add(uv_size)
            }
            PixelFormat::Rgba => width.checked_mul(height)?.checked_mul(4),
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PixelFormat::Nv12 => write!(f, "NV12"),
            PixelFormat::Rgba => write!(f, "RGBA"),
        }
    }
}

/// Bytes per row of the interleaved CbCr plane
#[inline]
pub fn chroma_stride(width: usize) -> usize {
    width.div_ceil(2) * 2
}

/// Rows in the interleaved CbCr plane
#[inline]
pub fn chroma_rows(height: usize) -> usize {
    height.div_ceil(2)
}

struct BufferInner {
    width: u32,
    height: u32,
    format: PixelFormat,
    storage: Mutex<Vec<u8>>,
    lock_count: AtomicUsize,
}

/// Reference-counted native pixel buffer
///
/// Cloning retains the same storage; it does not copy pixels.
#[derive(Clone)]
pub struct PixelBuffer {
    inner: Arc<BufferInner>,
}

impl PixelBuffer {
    /// Wrap existing pixel bytes
    ///
    /// The length is not validated here; readers reject storage that is too
    /// short for the declared size.
    pub fn from_bytes(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            inner: Arc::new(BufferInner {
                width,
                height,
                format,
                storage: Mutex::new(data),
                lock_count: AtomicUsize::new(0),
            }),
        }
    }

    /// Wrap an RGBA image
    pub fn from_rgba_image(image: image::RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self::from_bytes(width, height, PixelFormat::Rgba, image.into_raw())
    }

    /// Create a black frame, `None` if the size overflows
    pub fn black(width: u32, height: u32, format: PixelFormat) -> Option<Self> {
        let size = format.frame_size(width, height)?;
        let data = match format {
            PixelFormat::Nv12 => {
                let y_size = width as usize * height as usize;
                let mut data = vec![128u8; size];
                data[..y_size].fill(16);
                data
            }
            PixelFormat::Rgba => {
                let mut data = vec![0u8; size];
                data.chunks_exact_mut(4).for_each(|px| px[3] = 255);
                data
            }
        };
        Some(Self::from_bytes(width, height, format, data))
    }

    pub fn width(&self) -> u32 {
        self.inner.width
    }

    pub fn height(&self) -> u32 {
        self.inner.height
    }

    pub fn format(&self) -> PixelFormat {
        self.inner.format
    }

    /// Lock the buffer's memory until the returned guard is dropped
    pub fn lock(&self) -> BufferLock<'_> {
        let storage = self
            .inner
            .storage
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.inner.lock_count.fetch_add(1, Ordering::SeqCst);
        BufferLock {
            inner: &self.inner,
            storage,
        }
    }

    /// Number of locks currently held on this buffer
    pub fn lock_count(&self) -> usize {
        self.inner.lock_count.load(Ordering::SeqCst)
    }

    /// Copy the raw pixel bytes out of the buffer
    pub fn to_vec(&self) -> Vec<u8> {
        self.lock().data().to_vec()
    }

    /// Whether two handles refer to the same storage
    pub fn same_buffer(&self, other: &PixelBuffer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "PixelBuffer({}x{} {})",
            self.inner.width, self.inner.height, self.inner.format
        )
    }
}

/// Scoped access to a locked buffer's memory
pub struct BufferLock<'a> {
    inner: &'a BufferInner,
    storage: MutexGuard<'a, Vec<u8>>,
}

impl BufferLock<'_> {
    pub fn width(&self) -> u32 {
        self.inner.width
    }

    pub fn height(&self) -> u32 {
        self.inner.height
    }

    pub fn format(&self) -> PixelFormat {
        self.inner.format
    }

    pub fn data(&self) -> &[u8] {
        &self.storage
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.storage
    }

    /// Split NV12 storage into (Y plane, CbCr plane)
    ///
    /// Returns `None` for other formats or storage that is too short.
    pub fn nv12_planes(&self) -> Option<(&[u8], &[u8])> {
        let y_size = self.nv12_luma_size()?;
        let data: &[u8] = &self.storage;
        Some(data.split_at(y_size))
    }

    /// Mutable variant of [`BufferLock::nv12_planes`]
    pub fn nv12_planes_mut(&mut self) -> Option<(&mut [u8], &mut [u8])> {
        let y_size = self.nv12_luma_size()?;
        let data: &mut [u8] = &mut self.storage;
        Some(data.split_at_mut(y_size))
    }

    fn nv12_luma_size(&self) -> Option<usize> {
        if self.inner.format != PixelFormat::Nv12 {
            return None;
        }
        let required = self.inner.format.frame_size(self.inner.width, self.inner.height)?;
        if self.storage.len() < required {
            return None;
        }
        Some(self.inner.width as usize * self.inner.height as usize)
    }
}

impl Drop for BufferLock<'_> {
    fn drop(&mut self) {
        self.inner.lock_count.fetch_sub(1, Ordering::SeqCst);
    }
}
