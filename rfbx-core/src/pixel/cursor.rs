//! Cursor shape state grabbed from the platform cursor.

use crate::pixel::format::PixelFormat;
use crate::pixel::framebuffer::FrameBuffer;
use crate::region::{Dimension, Point};

/// A cursor image: pixels, a 1-bit transparency mask and a hotspot.
///
/// Mask rows are byte aligned: `(width + 7) / 8` bytes per row, MSB
/// first, a set bit meaning the pixel is opaque.
#[derive(Debug, Clone, Default)]
pub struct CursorShape {
    pixels: FrameBuffer,
    mask: Vec<u8>,
    hotspot: Point,
}

impl CursorShape {
    pub fn new(dim: Dimension, format: PixelFormat, hotspot: Point) -> Self {
        let pixels = FrameBuffer::new(dim, format);
        let mask = vec![0; Self::mask_len(dim)];
        Self {
            pixels,
            mask,
            hotspot,
        }
    }

    fn mask_len(dim: Dimension) -> usize {
        ((dim.width.max(0) + 7) / 8) as usize * dim.height.max(0) as usize
    }

    pub fn dimension(&self) -> Dimension {
        self.pixels.dimension()
    }

    pub fn hotspot(&self) -> Point {
        self.hotspot
    }

    pub fn set_hotspot(&mut self, hotspot: Point) {
        self.hotspot = hotspot;
    }

    pub fn pixels(&self) -> &FrameBuffer {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut FrameBuffer {
        &mut self.pixels
    }

    pub fn mask(&self) -> &[u8] {
        &self.mask
    }

    pub fn set_mask(&mut self, mask: Vec<u8>) {
        debug_assert_eq!(mask.len(), Self::mask_len(self.pixels.dimension()));
        self.mask = mask;
    }

    /// Reallocate with new properties; pixels and mask become empty.
    pub fn set_properties(&mut self, dim: Dimension, format: PixelFormat) {
        self.pixels.set_properties(dim, format);
        self.mask = vec![0; Self::mask_len(dim)];
    }

    /// Full clone of another shape, taken on each grab.
    pub fn clone_from_shape(&mut self, other: &CursorShape) {
        self.pixels.clone_from_fb(other.pixels());
        self.mask.clear();
        self.mask.extend_from_slice(&other.mask);
        self.hotspot = other.hotspot;
    }
}
