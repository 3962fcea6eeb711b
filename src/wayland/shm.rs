//! Solid-color `wl_shm` buffers
//!
//! A toplevel only maps once a buffer is attached, so every window keeps
//! one ARGB8888 buffer at its current buffer size.

use std::os::unix::io::{AsFd, OwnedFd};

use memmap2::{MmapMut, MmapOptions};
use rustix::fs::{self, MemfdFlags};
use wayland_client::protocol::{wl_buffer, wl_shm, wl_shm_pool};
use wayland_client::QueueHandle;

use crate::error::{PlatformError, Result};
use crate::geometry::PhysicalSize;

use super::State;

const BYTES_PER_PIXEL: u32 = 4;

/// Window background, opaque dark grey
pub const BACKGROUND: u32 = 0xff20_2020;

/// Stride and total length of a buffer
fn layout(size: PhysicalSize) -> Option<(i32, usize)> {
    let stride = size.width.checked_mul(BYTES_PER_PIXEL)?;
    let len = (stride as usize).checked_mul(size.height as usize)?;
    (len <= i32::MAX as usize).then_some((stride as i32, len))
}

/// Fill `pixels` with one ARGB8888 color (little endian in memory)
fn fill(pixels: &mut [u8], color: u32) {
    let bytes = color.to_le_bytes();
    for pixel in pixels.chunks_exact_mut(BYTES_PER_PIXEL as usize) {
        pixel.copy_from_slice(&bytes);
    }
}

pub struct ShmBuffer {
    buffer: wl_buffer::WlBuffer,
    pool: wl_shm_pool::WlShmPool,
    _mmap: MmapMut,
    _fd: OwnedFd,
    size: PhysicalSize,
}

impl ShmBuffer {
    pub fn new(
        shm: &wl_shm::WlShm,
        qh: &QueueHandle<State>,
        size: PhysicalSize,
        color: u32,
    ) -> Result<Self> {
        let alloc_failed = |e: &dyn std::fmt::Display| {
            PlatformError::ConnectionLost(format!("shm buffer allocation failed: {e}"))
        };
        let (stride, len) = layout(size).ok_or_else(|| alloc_failed(&"size overflow"))?;

        let fd = fs::memfd_create("lumina-shm", MemfdFlags::CLOEXEC)
            .map_err(|e| alloc_failed(&e))?;
        fs::ftruncate(&fd, len as u64).map_err(|e| alloc_failed(&e))?;
        // SAFETY: the memfd is private to this buffer and sized above
        let mut mmap = unsafe { MmapOptions::new().len(len).map_mut(&fd) }
            .map_err(|e| alloc_failed(&e))?;
        fill(&mut mmap, color);

        let pool = shm.create_pool(fd.as_fd(), len as i32, qh, ());
        let buffer = pool.create_buffer(
            0,
            size.width as i32,
            size.height as i32,
            stride,
            wl_shm::Format::Argb8888,
            qh,
            (),
        );

        Ok(Self {
            buffer,
            pool,
            _mmap: mmap,
            _fd: fd,
            size,
        })
    }

    pub fn buffer(&self) -> &wl_buffer::WlBuffer {
        &self.buffer
    }

    pub fn size(&self) -> PhysicalSize {
        self.size
    }
}

impl Drop for ShmBuffer {
    fn drop(&mut self) {
        self.buffer.destroy();
        self.pool.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        assert_eq!(layout(PhysicalSize::new(800, 600)), Some((3200, 1_920_000)));
        assert_eq!(layout(PhysicalSize::new(u32::MAX, 2)), None);
        assert_eq!(layout(PhysicalSize::new(40_000, 40_000)), None);
    }

    #[test]
    fn test_fill_is_little_endian_argb() {
        let mut pixels = vec![0u8; 8];
        fill(&mut pixels, 0xff11_2233);
        assert_eq!(pixels, [0x33, 0x22, 0x11, 0xff, 0x33, 0x22, 0x11, 0xff]);
    }
}
