//! The shared backing framebuffer and content migration across resizes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::utils::Rect;

/// The pixel buffer backing the virtual screen.
///
/// Rows are padded to a 4-byte boundary. A resize never grows a pixmap in
/// place; a new one is allocated and the old content migrated into it.
#[derive(Debug)]
pub struct Pixmap {
    width: u16,
    height: u16,
    bytes_pp: usize,
    stride: usize,
    data: Vec<u8>,
}

impl Pixmap {
    pub fn new(width: u16, height: u16, bits_per_pixel: u8) -> Self {
        let bytes_pp = bits_per_pixel as usize / 8;
        let stride = (width as usize * bytes_pp + 3) & !3;
        Self {
            width,
            height,
            bytes_pp,
            stride,
            data: vec![0; stride * height as usize],
        }
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.bytes_pp
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Copies `copy` from `old` into `new` row by row, zeroing everything in
/// `new` outside the copied area: the tail of every copied row, and all rows
/// below the copied ones.
pub fn copy_root_software(old: &Pixmap, new: &mut Pixmap, copy: Rect) {
    assert_eq!(old.bytes_pp, new.bytes_pp);
    let copy = if copy.is_empty() { Rect::default() } else { copy };

    let bpp = new.bytes_pp;
    let src_stride = old.stride;
    let dst_stride = new.stride;
    let line_len = copy.w as usize * bpp;
    let x_off = copy.x as usize * bpp;

    let mut src_at = src_stride * copy.y as usize + x_off;
    let mut dst_at = dst_stride * copy.y as usize + x_off;
    for _ in 0..copy.h {
        new.data[dst_at..dst_at + line_len].copy_from_slice(&old.data[src_at..src_at + line_len]);
        let row_end = dst_at - x_off + dst_stride;
        new.data[dst_at + line_len..row_end].fill(0);
        src_at += src_stride;
        dst_at += dst_stride;
    }

    let below = dst_stride * (copy.y + copy.h) as usize;
    new.data[below..].fill(0);
}

/// A swap image still referenced by the accelerated presentation pipeline.
///
/// The pipeline signals the release handle once the buffer is free; only then
/// may the image be destroyed or its contents migrated.
#[derive(Debug, Default)]
pub struct SwapImage {
    released: Arc<AtomicBool>,
}

impl SwapImage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    pub fn release_handle(&self) -> SwapImageRelease {
        SwapImageRelease {
            released: self.released.clone(),
        }
    }
}

/// Completion handle fulfilled by the presentation pipeline.
#[derive(Debug, Clone)]
pub struct SwapImageRelease {
    released: Arc<AtomicBool>,
}

impl SwapImageRelease {
    pub fn signal(&self) {
        self.released.store(true, Ordering::Release);
    }
}

/// The accelerated blit backend.
pub trait AccelRenderer {
    /// Binds `new` as the render target, clears it to opaque black and blits
    /// `copy` from `old`.
    fn copy_root(&mut self, old: &Pixmap, new: &mut Pixmap, copy: Rect) -> anyhow::Result<()>;

    /// Destroys a swap image whose buffer has been released.
    fn destroy_image(&mut self, image: SwapImage);
}

/// Which of the two blit backends migrates pixel content.
pub enum RenderBackend {
    Accel(Box<dyn AccelRenderer>),
    Software,
}

impl RenderBackend {
    pub fn is_accel(&self) -> bool {
        matches!(self, RenderBackend::Accel(_))
    }
}
