//! The in-memory pixel buffer shared by capture and send paths.

use crate::error::RfbError;
use crate::pixel::format::PixelFormat;
use crate::region::{Dimension, Rect};

/// A pixel buffer with a dimension and a pixel format.
///
/// Rows are tightly packed: the stride is always
/// `width * bytes_per_pixel`. Pixels are stored in the format's byte
/// order, so a buffer can be shipped to a same-format client verbatim.
#[derive(Debug, Clone, Default)]
pub struct FrameBuffer {
    dim: Dimension,
    format: PixelFormat,
    data: Vec<u8>,
}

impl FrameBuffer {
    pub fn new(dim: Dimension, format: PixelFormat) -> Self {
        let mut fb = Self {
            dim: Dimension::default(),
            format,
            data: Vec::new(),
        };
        fb.set_properties(dim, format);
        fb
    }

    /// Reallocate for new properties; contents become zeroed black.
    pub fn set_properties(&mut self, dim: Dimension, format: PixelFormat) {
        self.dim = dim;
        self.format = format;
        let len = dim.area() as usize * format.bytes_per_pixel();
        self.data = vec![0; len];
    }

    pub fn dimension(&self) -> Dimension {
        self.dim
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.format.bytes_per_pixel()
    }

    pub fn buffer(&self) -> &[u8] {
        &self.data
    }

    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// True when dimension and pixel format match `other`. Used to
    /// detect screen property drift against the backup buffer.
    pub fn same_properties(&self, other: &FrameBuffer) -> bool {
        self.dim == other.dim && self.format == other.format
    }

    /// Full clone of properties and contents.
    pub fn clone_from_fb(&mut self, other: &FrameBuffer) {
        self.dim = other.dim;
        self.format = other.format;
        self.data.clear();
        self.data.extend_from_slice(&other.data);
    }

    fn stride(&self) -> usize {
        self.dim.width as usize * self.format.bytes_per_pixel()
    }

    fn offset(&self, x: i32, y: i32) -> usize {
        y as usize * self.stride() + x as usize * self.format.bytes_per_pixel()
    }

    /// Read the pixel value at `(x, y)` honoring the format byte order.
    pub fn pixel(&self, x: i32, y: i32) -> u32 {
        let off = self.offset(x, y);
        let bpp = self.format.bytes_per_pixel();
        let raw = &self.data[off..off + bpp];
        match bpp {
            1 => raw[0] as u32,
            2 => {
                let v = [raw[0], raw[1]];
                if self.format.big_endian {
                    u16::from_be_bytes(v) as u32
                } else {
                    u16::from_le_bytes(v) as u32
                }
            }
            _ => {
                let v = [raw[0], raw[1], raw[2], raw[3]];
                if self.format.big_endian {
                    u32::from_be_bytes(v)
                } else {
                    u32::from_le_bytes(v)
                }
            }
        }
    }

    /// Write the pixel value at `(x, y)` honoring the format byte order.
    pub fn set_pixel(&mut self, x: i32, y: i32, value: u32) {
        let off = self.offset(x, y);
        let bpp = self.format.bytes_per_pixel();
        match bpp {
            1 => self.data[off] = value as u8,
            2 => {
                let v = if self.format.big_endian {
                    (value as u16).to_be_bytes()
                } else {
                    (value as u16).to_le_bytes()
                };
                self.data[off..off + 2].copy_from_slice(&v);
            }
            _ => {
                let v = if self.format.big_endian {
                    value.to_be_bytes()
                } else {
                    value.to_le_bytes()
                };
                self.data[off..off + 4].copy_from_slice(&v);
            }
        }
    }

    /// Fill the whole buffer with one pixel value.
    pub fn fill(&mut self, value: u32) {
        for y in 0..self.dim.height {
            for x in 0..self.dim.width {
                self.set_pixel(x, y, value);
            }
        }
    }

    /// Copy `dst_rect` from `src` where the source data starts at
    /// `(src_x, src_y)`. Rects falling outside either buffer are
    /// clipped away; formats must match.
    pub fn copy_rect_from(
        &mut self,
        dst_rect: &Rect,
        src: &FrameBuffer,
        src_x: i32,
        src_y: i32,
    ) -> Result<(), RfbError> {
        if self.format != src.format {
            return Err(RfbError::Other(
                "copy between different pixel formats".to_string(),
            ));
        }
        let mut dst_rect = dst_rect.intersection(&self.dim.rect());
        // Clip against the source bounds as well.
        let src_avail = Rect::new(
            dst_rect.left,
            dst_rect.top,
            dst_rect.left + (src.dim.width - src_x),
            dst_rect.top + (src.dim.height - src_y),
        );
        dst_rect = dst_rect.intersection(&src_avail);
        if dst_rect.is_empty() || src_x < 0 || src_y < 0 {
            return Ok(());
        }

        let bpp = self.format.bytes_per_pixel();
        let row_bytes = dst_rect.width() as usize * bpp;
        let src_stride = src.stride();
        let dst_stride = self.stride();
        for row in 0..dst_rect.height() {
            let s = (src_y + row) as usize * src_stride + src_x as usize * bpp;
            let d = (dst_rect.top + row) as usize * dst_stride + dst_rect.left as usize * bpp;
            self.data[d..d + row_bytes].copy_from_slice(&src.data[s..s + row_bytes]);
        }
        Ok(())
    }

    /// Compare the pixels of `rect` against the same rect in `other`.
    /// Both buffers must share properties; out-of-bounds parts are
    /// ignored.
    pub fn rect_equal(&self, other: &FrameBuffer, rect: &Rect) -> bool {
        if !self.same_properties(other) {
            return false;
        }
        let rect = rect.intersection(&self.dim.rect());
        if rect.is_empty() {
            return true;
        }
        let bpp = self.format.bytes_per_pixel();
        let row_bytes = rect.width() as usize * bpp;
        let stride = self.stride();
        for row in 0..rect.height() {
            let off = (rect.top + row) as usize * stride + rect.left as usize * bpp;
            if self.data[off..off + row_bytes] != other.data[off..off + row_bytes] {
                return false;
            }
        }
        true
    }

    /// Extract the rect as tightly packed rows (no padding).
    pub fn packed_rect(&self, rect: &Rect) -> Vec<u8> {
        let rect = rect.intersection(&self.dim.rect());
        let bpp = self.format.bytes_per_pixel();
        let row_bytes = rect.width() as usize * bpp;
        let stride = self.stride();
        let mut out = Vec::with_capacity(row_bytes * rect.height() as usize);
        for row in 0..rect.height() {
            let off = (rect.top + row) as usize * stride + rect.left as usize * bpp;
            out.extend_from_slice(&self.data[off..off + row_bytes]);
        }
        out
    }
}
