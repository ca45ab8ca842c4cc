//! RFB wire protocol: constants, inbound codec, capabilities.

mod caps;
mod client;
pub mod msg;

pub use caps::{Capability, CapabilityRegistry};
pub use client::{ClientMessage, ClientMsgCodec};
