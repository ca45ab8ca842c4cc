//! Pixel model: formats, framebuffers, conversion and cursor shapes.

mod converter;
mod cursor;
mod format;
mod framebuffer;

pub use converter::{PixelConverter, put_pixel};
pub use cursor::CursorShape;
pub use format::PixelFormat;
pub use framebuffer::FrameBuffer;
