//! Per-client update sending: options, encoders, the protocol engine.

pub mod cursor;
pub mod encoder;
pub mod options;
pub mod update_sender;

pub use cursor::CursorUpdates;
pub use encoder::{Encoder, EncoderStore, RawEncoder, ZstdStreamEncoder};
pub use options::{ClientCaps, EncodeOptions};
pub use update_sender::UpdateSender;
