//! Inbound client message decoding.
//!
//! The server consumes exactly four message kinds after session setup:
//! `SetPixelFormat`, `SetEncodings`, `FramebufferUpdateRequest` and the
//! vendor `VideoFreeze` toggle. Anything else is a protocol violation
//! that fails the connection.
//!
//! ## Wire layouts (big-endian)
//!
//! ```text
//! SetPixelFormat:   u8 type=0, 3×pad,
//!                   u8 bpp, u8 depth, u8 bigEndian, u8 trueColor,
//!                   u16 redMax, u16 greenMax, u16 blueMax,
//!                   u8 redShift, u8 greenShift, u8 blueShift, 3×pad
//! SetEncodings:     u8 type=2, pad, u16 count, count × i32
//! UpdateRequest:    u8 type=3, u8 incremental, u16 x, y, w, h
//! VideoFreeze:      u8 type=150, u8 flag
//! ```

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use crate::error::RfbError;
use crate::pixel::PixelFormat;
use crate::proto::msg;
use crate::region::Rect;

/// A decoded client → server message.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    SetPixelFormat {
        format: PixelFormat,
        /// True when the client asked for the indexed color-map mode.
        color_map: bool,
    },
    SetEncodings {
        codes: Vec<i32>,
    },
    UpdateRequest {
        incremental: bool,
        rect: Rect,
    },
    VideoFreeze {
        frozen: bool,
    },
}

/// `tokio_util` decoder for the post-handshake client stream.
#[derive(Debug, Default)]
pub struct ClientMsgCodec;

impl Decoder for ClientMsgCodec {
    type Item = ClientMessage;
    type Error = RfbError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(&kind) = src.first() else {
            return Ok(None);
        };

        let need = match kind {
            msg::CLI_SET_PIXEL_FORMAT => 20,
            msg::CLI_FB_UPDATE_REQUEST => 10,
            msg::CLI_VIDEO_FREEZE => 2,
            msg::CLI_SET_ENCODINGS => {
                if src.len() < 4 {
                    return Ok(None);
                }
                let count = u16::from_be_bytes([src[2], src[3]]) as usize;
                4 + count * 4
            }
            other => return Err(RfbError::UnknownMessage(other)),
        };
        if src.len() < need {
            return Ok(None);
        }

        let mut buf = src.split_to(need);
        buf.advance(1); // message type
        match kind {
            msg::CLI_SET_PIXEL_FORMAT => decode_set_pixel_format(&mut buf).map(Some),
            msg::CLI_SET_ENCODINGS => {
                buf.advance(1); // padding
                let count = buf.get_u16() as usize;
                let mut codes = Vec::with_capacity(count);
                for _ in 0..count {
                    codes.push(buf.get_i32());
                }
                Ok(Some(ClientMessage::SetEncodings { codes }))
            }
            msg::CLI_FB_UPDATE_REQUEST => {
                let incremental = buf.get_u8() != 0;
                let x = buf.get_u16() as i32;
                let y = buf.get_u16() as i32;
                let w = buf.get_u16() as i32;
                let h = buf.get_u16() as i32;
                Ok(Some(ClientMessage::UpdateRequest {
                    incremental,
                    rect: Rect::with_size(x, y, w, h),
                }))
            }
            _ => {
                let frozen = buf.get_u8() != 0;
                Ok(Some(ClientMessage::VideoFreeze { frozen }))
            }
        }
    }
}

fn decode_set_pixel_format(buf: &mut BytesMut) -> Result<ClientMessage, RfbError> {
    buf.advance(3); // padding

    let bpp = buf.get_u8();
    if bpp != 8 && bpp != 16 && bpp != 32 {
        return Err(RfbError::UnsupportedPixelFormat(
            "only 8, 16 or 32 bits per pixel supported",
        ));
    }
    let depth = buf.get_u8();
    let big_endian = buf.get_u8() != 0;
    let color_map = buf.get_u8() == 0; // trueColor == 0 means color map
    if color_map && bpp != 8 {
        return Err(RfbError::UnsupportedPixelFormat(
            "color map mode requires 8 bits per pixel",
        ));
    }
    let red_max = buf.get_u16();
    let green_max = buf.get_u16();
    let blue_max = buf.get_u16();
    let red_shift = buf.get_u8();
    let green_shift = buf.get_u8();
    let blue_shift = buf.get_u8();
    // trailing padding ignored

    let format = if color_map {
        // The fixed 3-3-2 layout carries the palette indices.
        PixelFormat {
            bits_per_pixel: bpp,
            depth,
            big_endian,
            ..PixelFormat::indexed_332()
        }
    } else {
        PixelFormat {
            bits_per_pixel: bpp,
            depth,
            big_endian,
            red_max,
            green_max,
            blue_max,
            red_shift,
            green_shift,
            blue_shift,
        }
    };
    Ok(ClientMessage::SetPixelFormat { format, color_map })
}
