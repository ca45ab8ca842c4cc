//! Pixel format translation between the server screen and a client.

use bytes::{BufMut, BytesMut};

use crate::pixel::format::PixelFormat;
use crate::pixel::framebuffer::FrameBuffer;
use crate::region::Rect;

/// Converts pixels from a source format to a destination format.
///
/// Conversion is a pure function of the two formats. The same-format
/// path is a straight copy and therefore bit-exact; cross-format
/// conversion rescales each channel to the destination channel width.
#[derive(Debug, Clone)]
pub struct PixelConverter {
    src: PixelFormat,
    dst: PixelFormat,
    same: bool,
}

impl PixelConverter {
    pub fn new(dst: PixelFormat, src: PixelFormat) -> Self {
        Self {
            src,
            dst,
            same: src == dst,
        }
    }

    /// Install the effective format pair for the coming frame.
    pub fn set_formats(&mut self, dst: &PixelFormat, src: &PixelFormat) {
        self.src = *src;
        self.dst = *dst;
        self.same = src == dst;
    }

    pub fn dst_format(&self) -> PixelFormat {
        self.dst
    }

    /// Convert one pixel value from the source to the destination
    /// format.
    pub fn convert_pixel(&self, value: u32) -> u32 {
        if self.same {
            return value;
        }
        let r = (value >> self.src.red_shift) & self.src.red_max as u32;
        let g = (value >> self.src.green_shift) & self.src.green_max as u32;
        let b = (value >> self.src.blue_shift) & self.src.blue_max as u32;

        let r = rescale(r, self.src.red_max, self.dst.red_max);
        let g = rescale(g, self.src.green_max, self.dst.green_max);
        let b = rescale(b, self.src.blue_max, self.dst.blue_max);

        (r << self.dst.red_shift) | (g << self.dst.green_shift) | (b << self.dst.blue_shift)
    }

    /// Append `rect` of `src` to `out` as tightly packed rows in the
    /// destination format and byte order.
    pub fn convert_rect(&self, src: &FrameBuffer, rect: &Rect, out: &mut BytesMut) {
        let rect = rect.intersection(&src.dimension().rect());
        if rect.is_empty() {
            return;
        }
        if self.same {
            out.extend_from_slice(&src.packed_rect(&rect));
            return;
        }
        out.reserve(rect.area() as usize * self.dst.bytes_per_pixel());
        for y in rect.top..rect.bottom {
            for x in rect.left..rect.right {
                let converted = self.convert_pixel(src.pixel(x, y));
                put_pixel(out, &self.dst, converted);
            }
        }
    }

    /// Convert a whole source buffer into a new framebuffer carrying
    /// the destination format. Used for cursor shape conversion.
    pub fn convert_buffer(&self, src: &FrameBuffer) -> FrameBuffer {
        let mut dst = FrameBuffer::new(src.dimension(), self.dst);
        let bound = src.dimension().rect();
        for y in bound.top..bound.bottom {
            for x in bound.left..bound.right {
                dst.set_pixel(x, y, self.convert_pixel(src.pixel(x, y)));
            }
        }
        dst
    }
}

/// Write one pixel value in the given format's byte order.
pub fn put_pixel(out: &mut BytesMut, format: &PixelFormat, value: u32) {
    match format.bytes_per_pixel() {
        1 => out.put_u8(value as u8),
        2 => {
            if format.big_endian {
                out.put_u16(value as u16)
            } else {
                out.put_u16_le(value as u16)
            }
        }
        _ => {
            if format.big_endian {
                out.put_u32(value)
            } else {
                out.put_u32_le(value)
            }
        }
    }
}

fn rescale(value: u32, src_max: u16, dst_max: u16) -> u32 {
    if src_max == 0 {
        return 0;
    }
    // Round to nearest so a round-trip through a wider format is exact.
    (value * dst_max as u32 + src_max as u32 / 2) / src_max as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Dimension;

    #[test]
    fn same_format_is_identity() {
        let conv = PixelConverter::new(PixelFormat::rgb888(), PixelFormat::rgb888());
        assert_eq!(conv.convert_pixel(0x00AB_CDEF), 0x00AB_CDEF);

        let mut src = FrameBuffer::new(Dimension::new(3, 3), PixelFormat::rgb888());
        src.set_pixel(1, 1, 0x0012_3456);
        let mut out = BytesMut::new();
        conv.convert_rect(&src, &Rect::new(0, 0, 3, 3), &mut out);
        assert_eq!(&out[..], src.buffer());
    }

    #[test]
    fn truecolor_to_565() {
        let conv = PixelConverter::new(PixelFormat::rgb565(), PixelFormat::rgb888());
        // Pure red stays pure red.
        let red = conv.convert_pixel(0x00FF_0000);
        assert_eq!(red, 31 << 11);
        // Pure white stays pure white.
        let white = conv.convert_pixel(0x00FF_FFFF);
        assert_eq!(white, 0xFFFF);
        // Black stays black.
        assert_eq!(conv.convert_pixel(0), 0);
    }

    #[test]
    fn narrowing_preserves_monotonicity() {
        let conv = PixelConverter::new(PixelFormat::indexed_332(), PixelFormat::rgb888());
        let mut last = 0;
        for v in 0..=255u32 {
            let out = conv.convert_pixel(v << 16); // red ramp
            let red = out & 7;
            assert!(red >= last, "red channel must be monotone");
            last = red;
        }
        assert_eq!(last, 7);
    }

    #[test]
    fn widening_roundtrip_is_exact() {
        let narrow = PixelFormat::rgb565();
        let up = PixelConverter::new(PixelFormat::rgb888(), narrow);
        let down = PixelConverter::new(narrow, PixelFormat::rgb888());
        for v in [0u32, 0x1234, 0x8421, 0xFFFF] {
            assert_eq!(down.convert_pixel(up.convert_pixel(v)), v);
        }
    }

    #[test]
    fn convert_rect_packs_destination_format() {
        let conv = PixelConverter::new(PixelFormat::rgb565(), PixelFormat::rgb888());
        let mut src = FrameBuffer::new(Dimension::new(2, 1), PixelFormat::rgb888());
        src.set_pixel(0, 0, 0x00FF_0000);
        src.set_pixel(1, 0, 0x0000_00FF);
        let mut out = BytesMut::new();
        conv.convert_rect(&src, &Rect::new(0, 0, 2, 1), &mut out);
        assert_eq!(out.len(), 4);
        assert_eq!(u16::from_le_bytes([out[0], out[1]]), 31 << 11);
        assert_eq!(u16::from_le_bytes([out[2], out[3]]), 31);
    }

    #[test]
    fn endianness_swap_on_wire() {
        let mut be = PixelFormat::rgb888();
        be.big_endian = true;
        let conv = PixelConverter::new(be, PixelFormat::rgb888());
        let mut src = FrameBuffer::new(Dimension::new(1, 1), PixelFormat::rgb888());
        src.set_pixel(0, 0, 0x0011_2233);
        let mut out = BytesMut::new();
        conv.convert_rect(&src, &Rect::new(0, 0, 1, 1), &mut out);
        assert_eq!(&out[..], &[0x00, 0x11, 0x22, 0x33]);
    }
}
