//! ZRLE tile decoding.

mod decoder;

pub use decoder::{ZrleDecoder, TILE_SIZE};
