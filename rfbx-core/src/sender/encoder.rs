//! Rectangle payload encoders.
//!
//! An [`Encoder`] turns screen pixels into the payload of one update
//! rectangle, already converted to the client's pixel format. The rect
//! header itself is written by the sender; encoders produce only the
//! bytes that follow it.

use bytes::{BufMut, BytesMut};

use crate::error::RfbError;
use crate::pixel::{FrameBuffer, PixelConverter};
use crate::proto::msg;
use crate::region::Rect;

/// Soft cap on the pixel bytes of a single encoded rect.
const MAX_RECT_BYTES: usize = 1 << 20;

pub trait Encoder: Send {
    /// The encoding code this encoder emits rect headers for.
    fn code(&self) -> i32;

    /// Split `rect` into pieces this encoder is willing to emit as
    /// single rects. The default keeps the rect whole.
    fn split_rectangle(&self, rect: &Rect, client_format_bpp: usize, out: &mut Vec<Rect>) {
        let _ = client_format_bpp;
        out.push(*rect);
    }

    /// Append the payload for `rect` to `out`.
    fn encode_rectangle(
        &mut self,
        fb: &FrameBuffer,
        rect: &Rect,
        converter: &PixelConverter,
        out: &mut BytesMut,
    ) -> Result<(), RfbError>;
}

// ── Raw ──────────────────────────────────────────────────────────

/// Uncompressed pixels, split into horizontal bands so no single rect
/// payload exceeds [`MAX_RECT_BYTES`].
#[derive(Debug, Default)]
pub struct RawEncoder;

impl Encoder for RawEncoder {
    fn code(&self) -> i32 {
        msg::ENCODING_RAW
    }

    fn split_rectangle(&self, rect: &Rect, client_format_bpp: usize, out: &mut Vec<Rect>) {
        let row_bytes = rect.width() as usize * client_format_bpp.max(1);
        if row_bytes == 0 {
            return;
        }
        let band_rows = (MAX_RECT_BYTES / row_bytes).max(1) as i32;
        let mut top = rect.top;
        while top < rect.bottom {
            let bottom = (top + band_rows).min(rect.bottom);
            out.push(Rect::new(rect.left, top, rect.right, bottom));
            top = bottom;
        }
    }

    fn encode_rectangle(
        &mut self,
        fb: &FrameBuffer,
        rect: &Rect,
        converter: &PixelConverter,
        out: &mut BytesMut,
    ) -> Result<(), RfbError> {
        converter.convert_rect(fb, rect, out);
        Ok(())
    }
}

// ── Zstd video stream ────────────────────────────────────────────

/// Vendor encoding for video regions: client-format pixels compressed
/// with zstd, prefixed by the compressed length.
pub struct ZstdStreamEncoder {
    level: i32,
    scratch: BytesMut,
}

impl Default for ZstdStreamEncoder {
    fn default() -> Self {
        // Favour speed; video regions refresh many times per second.
        Self {
            level: 1,
            scratch: BytesMut::new(),
        }
    }
}

impl ZstdStreamEncoder {
    /// Map the client's 0..=9 compression slider onto zstd levels.
    pub fn set_compression_level(&mut self, level: u8) {
        self.level = 1 + level.min(9) as i32 * 2;
    }
}

impl Encoder for ZstdStreamEncoder {
    fn code(&self) -> i32 {
        msg::ENCODING_ZSTD_VIDEO
    }

    fn encode_rectangle(
        &mut self,
        fb: &FrameBuffer,
        rect: &Rect,
        converter: &PixelConverter,
        out: &mut BytesMut,
    ) -> Result<(), RfbError> {
        self.scratch.clear();
        converter.convert_rect(fb, rect, &mut self.scratch);
        let compressed = zstd::encode_all(&self.scratch[..], self.level)
            .map_err(|e| RfbError::Compression(format!("zstd encode failed: {e}")))?;
        out.put_u32(compressed.len() as u32);
        out.put_slice(&compressed);
        Ok(())
    }
}

// ── Store ────────────────────────────────────────────────────────

/// The encoders a sender owns, selected per rect by encoding code.
pub struct EncoderStore {
    raw: RawEncoder,
    video: ZstdStreamEncoder,
}

impl Default for EncoderStore {
    fn default() -> Self {
        Self {
            raw: RawEncoder,
            video: ZstdStreamEncoder::default(),
        }
    }
}

impl EncoderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The encoder for `code`, falling back to raw for anything the
    /// store has no specialised encoder for.
    pub fn select(&mut self, code: i32) -> &mut dyn Encoder {
        match code {
            msg::ENCODING_ZSTD_VIDEO => &mut self.video,
            _ => &mut self.raw,
        }
    }

    pub fn video_mut(&mut self) -> &mut ZstdStreamEncoder {
        &mut self.video
    }
}
