//! ZRLE rectangle decoding.
//!
//! A ZRLE rectangle is a zlib-compressed sequence of 64×64 tiles in
//! row-major order. Each tile starts with a subencoding byte:
//!
//! ```text
//! 0         raw pixels
//! 1         solid tile, one pixel value
//! 2..=16    packed palette of that many colors (1/2/4-bit indices)
//! 128       plain RLE
//! 130..=255 palette RLE of (type − 128) colors
//! ```
//!
//! The zlib stream persists across rectangles of one session; the
//! server flushes but never finishes it. Pixels travel as "cpixels":
//! when a 32-bit format with depth ≤ 24 leaves a whole byte provably
//! unused, only the three used bytes are on the wire.
//!
//! All reads are bounds-checked. Corrupt input yields a typed error,
//! never a panic or an out-of-bounds access.

use flate2::{Decompress, FlushDecompress, Status};
use tracing::warn;

use crate::error::RfbError;
use crate::pixel::{FrameBuffer, PixelFormat};
use crate::region::Rect;

pub const TILE_SIZE: i32 = 64;

/// Worst case for one tile: type byte, a full palette, raw pixels.
const MAX_TILE_BYTES: usize = 1 + 16 * 4 + (TILE_SIZE * TILE_SIZE) as usize * 4;

/// How pixel values are laid out on the wire for one rectangle.
#[derive(Debug, Clone, Copy)]
struct CPixelLayout {
    /// Bytes per wire pixel (3 when narrowed).
    bpp: usize,
    /// Byte offset of the wire bytes inside the 32-bit value.
    first_byte: usize,
    big_endian: bool,
}

impl CPixelLayout {
    fn for_format(format: &PixelFormat) -> Self {
        let mut layout = Self {
            bpp: format.bytes_per_pixel(),
            first_byte: 0,
            big_endian: format.big_endian,
        };
        if format.bits_per_pixel == 32 && format.depth <= 24 {
            let color_max: u32 = (format.blue_max as u32) << format.blue_shift
                | (format.green_max as u32) << format.green_shift
                | (format.red_max as u32) << format.red_shift;
            if color_max & 0xFF00_0000 == 0 {
                layout.bpp = 3;
                layout.first_byte = 0;
            } else if color_max & 0xFF == 0 {
                layout.bpp = 3;
                layout.first_byte = 1;
            }
        }
        layout
    }
}

/// Stateful ZRLE decoder. One instance per connection, because the
/// zlib stream carries state from rectangle to rectangle.
pub struct ZrleDecoder {
    zlib: Decompress,
}

impl Default for ZrleDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ZrleDecoder {
    pub fn new() -> Self {
        Self {
            zlib: Decompress::new(true),
        }
    }

    /// Decode one rectangle. `compressed` is the rectangle payload
    /// after its u32 length prefix; `dst` must lie inside `fb`.
    pub fn decode(
        &mut self,
        compressed: &[u8],
        fb: &mut FrameBuffer,
        dst: &Rect,
    ) -> Result<(), RfbError> {
        if !fb.dimension().rect().contains_rect(dst) {
            return Err(RfbError::RectOutOfBounds);
        }

        let data = self.inflate(compressed, max_unpacked_size(dst))?;
        if data.is_empty() {
            if dst.area() != 0 {
                warn!("empty zrle payload for a non-empty rectangle");
            }
            return Ok(());
        }

        let layout = CPixelLayout::for_format(&fb.format());
        let mut reader = Reader {
            data: &data,
            pos: 0,
        };

        let mut pixels = Vec::new();
        let mut y = dst.top;
        while y < dst.bottom {
            let mut x = dst.left;
            while x < dst.right {
                let tile = Rect::new(
                    x,
                    y,
                    (x + TILE_SIZE).min(dst.right),
                    (y + TILE_SIZE).min(dst.bottom),
                );
                decode_tile(&mut reader, layout, &tile, &mut pixels)?;
                draw_tile(fb, &tile, &pixels);
                x += TILE_SIZE;
            }
            y += TILE_SIZE;
        }
        Ok(())
    }

    /// Run the persistent zlib stream over one rectangle's input.
    fn inflate(&mut self, input: &[u8], max_size: usize) -> Result<Vec<u8>, RfbError> {
        let mut out = Vec::new();
        let mut buf = [0u8; 16 * 1024];
        let mut offset = 0;
        while offset < input.len() && out.len() < max_size {
            let before_in = self.zlib.total_in();
            let before_out = self.zlib.total_out();
            let status = self
                .zlib
                .decompress(&input[offset..], &mut buf, FlushDecompress::Sync)
                .map_err(|e| RfbError::Compression(format!("zlib inflate failed: {e}")))?;
            let consumed = (self.zlib.total_in() - before_in) as usize;
            let produced = (self.zlib.total_out() - before_out) as usize;
            offset += consumed;
            out.extend_from_slice(&buf[..produced]);
            if out.len() > max_size {
                // Tiles can never legitimately inflate this far.
                out.truncate(max_size);
                break;
            }
            match status {
                Status::StreamEnd => break,
                _ if consumed == 0 && produced == 0 => break,
                _ => {}
            }
        }
        Ok(out)
    }
}

/// The decompressed data can never legitimately exceed this for `dst`.
fn max_unpacked_size(dst: &Rect) -> usize {
    let cols = (dst.width() as usize).div_ceil(TILE_SIZE as usize);
    let rows = (dst.height() as usize).div_ceil(TILE_SIZE as usize);
    cols * rows * MAX_TILE_BYTES
}

// ── Bounded reads ────────────────────────────────────────────────

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn u8(&mut self, context: &'static str) -> Result<u8, RfbError> {
        Ok(self.take(1, context)?[0])
    }

    fn take(&mut self, need: usize, context: &'static str) -> Result<&'a [u8], RfbError> {
        let avail = self.data.len() - self.pos;
        if need > avail {
            return Err(RfbError::DecodeOverrun {
                context,
                need,
                avail,
            });
        }
        let slice = &self.data[self.pos..self.pos + need];
        self.pos += need;
        Ok(slice)
    }

    /// A run length is one more than the sum of its bytes; a 255 byte
    /// means the sum continues.
    fn run_length(&mut self) -> Result<usize, RfbError> {
        let mut length = 0usize;
        loop {
            let delta = self.u8("run length")?;
            length += delta as usize;
            if delta != 255 {
                return Ok(length + 1);
            }
        }
    }

    fn pixel(&mut self, layout: CPixelLayout) -> Result<u32, RfbError> {
        let bytes = self.take(layout.bpp, "pixel value")?;
        Ok(assemble_pixel(bytes, layout))
    }

    fn palette(&mut self, size: usize, layout: CPixelLayout) -> Result<Vec<u32>, RfbError> {
        let mut palette = Vec::with_capacity(size);
        for _ in 0..size {
            let bytes = self.take(layout.bpp, "palette entry")?;
            palette.push(assemble_pixel(bytes, layout));
        }
        Ok(palette)
    }
}

fn assemble_pixel(bytes: &[u8], layout: CPixelLayout) -> u32 {
    if layout.bpp == 3 {
        // Narrowed cpixel: the three wire bytes occupy the used byte
        // positions of the 32-bit value, the unused byte stays zero.
        let mut value = 0u32;
        for (i, &b) in bytes.iter().enumerate() {
            value |= (b as u32) << (8 * (layout.first_byte + i));
        }
        return value;
    }
    let mut value = 0u32;
    if layout.big_endian {
        for &b in bytes {
            value = value << 8 | b as u32;
        }
    } else {
        for (i, &b) in bytes.iter().enumerate() {
            value |= (b as u32) << (8 * i);
        }
    }
    value
}

// ── Tile decoding ────────────────────────────────────────────────

/// Decode one tile into `pixels` (row-major, `tile.area()` entries).
fn decode_tile(
    reader: &mut Reader<'_>,
    layout: CPixelLayout,
    tile: &Rect,
    pixels: &mut Vec<u32>,
) -> Result<(), RfbError> {
    let len = tile.area() as usize;
    pixels.clear();
    pixels.resize(len, 0);

    let kind = reader.u8("tile subencoding")?;
    match kind {
        0 => {
            for px in pixels.iter_mut() {
                *px = reader.pixel(layout)?;
            }
        }
        1 => {
            let solid = reader.pixel(layout)?;
            pixels.fill(solid);
        }
        2..=16 => decode_packed_palette(reader, layout, tile, kind as usize, pixels)?,
        128 => decode_plain_rle(reader, layout, pixels)?,
        130..=255 => decode_palette_rle(reader, layout, (kind - 128) as usize, pixels)?,
        _ => return Err(RfbError::InvalidSubencoding(kind)),
    }
    Ok(())
}

/// Types 2..=16: per-row byte-aligned packed indices, MSB first.
fn decode_packed_palette(
    reader: &mut Reader<'_>,
    layout: CPixelLayout,
    tile: &Rect,
    palette_size: usize,
    pixels: &mut [u32],
) -> Result<(), RfbError> {
    let palette = reader.palette(palette_size, layout)?;
    let width = tile.width() as usize;
    let height = tile.height() as usize;

    let bits = match palette_size {
        2 => 1,
        3..=4 => 2,
        _ => 4,
    };
    let row_bytes = (width * bits).div_ceil(8);
    let mask = (1u8 << bits) - 1;

    for row in 0..height {
        let packed = reader.take(row_bytes, "packed palette row")?;
        let mut shift = 8;
        let mut index = 0;
        for col in 0..width {
            shift -= bits;
            let color = (packed[index] >> shift) & mask;
            if shift == 0 {
                shift = 8;
                index += 1;
            }
            pixels[row * width + col] = *palette
                .get(color as usize)
                .ok_or(RfbError::ProtocolViolation("packed palette index out of range"))?;
        }
    }
    Ok(())
}

/// Type 128: runs of literal pixel values.
fn decode_plain_rle(
    reader: &mut Reader<'_>,
    layout: CPixelLayout,
    pixels: &mut [u32],
) -> Result<(), RfbError> {
    let mut filled = 0;
    while filled < pixels.len() {
        let value = reader.pixel(layout)?;
        let run = reader.run_length()?;
        if run > pixels.len() - filled {
            return Err(RfbError::ProtocolViolation("rle run exceeds tile"));
        }
        pixels[filled..filled + run].fill(value);
        filled += run;
    }
    Ok(())
}

/// Types 130..=255: runs of palette indices. An index byte with the
/// high bit set is followed by an explicit run length.
fn decode_palette_rle(
    reader: &mut Reader<'_>,
    layout: CPixelLayout,
    palette_size: usize,
    pixels: &mut [u32],
) -> Result<(), RfbError> {
    let palette = reader.palette(palette_size, layout)?;
    let mut filled = 0;
    while filled < pixels.len() {
        let mut index = reader.u8("palette rle index")?;
        let run = if index >= 128 {
            index -= 128;
            reader.run_length()?
        } else {
            1
        };
        if run > pixels.len() - filled {
            return Err(RfbError::ProtocolViolation("rle run exceeds tile"));
        }
        let value = *palette
            .get(index as usize)
            .ok_or(RfbError::ProtocolViolation("palette rle index out of range"))?;
        pixels[filled..filled + run].fill(value);
        filled += run;
    }
    Ok(())
}

fn draw_tile(fb: &mut FrameBuffer, tile: &Rect, pixels: &[u32]) {
    let width = tile.width();
    for (i, &value) in pixels.iter().enumerate() {
        let x = tile.left + (i as i32 % width);
        let y = tile.top + (i as i32 / width);
        fb.set_pixel(x, y, value);
    }
}
