//! # rfbx-core
//!
//! Server-side RFB update pipeline.
//!
//! This crate contains:
//! - **Region**: rectangle set algebra (`Rect`, `Region`) used as the
//!   currency of the whole pipeline
//! - **Pixel**: framebuffers, pixel formats and format conversion
//! - **Update**: change detection, accumulation (`UpdateKeeper`) and
//!   extraction (`LocalUpdateHandler`)
//! - **Sender**: the per-client protocol engine (`UpdateSender`) with
//!   its encoders and encode options
//! - **Proto**: RFB wire constants, inbound message codec, capabilities
//! - **Zrle**: bounds-checked ZRLE tile decoding
//! - **Error**: `RfbError` — typed, `thiserror`-based error hierarchy

pub mod error;
pub mod pixel;
pub mod proto;
pub mod region;
pub mod sender;
pub mod update;
pub mod zrle;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use error::RfbError;
pub use pixel::{CursorShape, FrameBuffer, PixelConverter, PixelFormat};
pub use proto::{Capability, CapabilityRegistry, ClientMessage, ClientMsgCodec};
pub use region::{Dimension, Point, Rect, Region};
pub use sender::{EncodeOptions, UpdateSender};
pub use update::{
    DetectorSet, FrameSource, LocalUpdateHandler, ScreenDriverFactory, UpdateContainer,
    UpdateKeeper, UpdateListener,
};
pub use zrle::ZrleDecoder;
