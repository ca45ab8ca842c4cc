//! # rfbx-server — RFB screen-sharing server
//!
//! Binds an RFB/TCP listener, runs the `rfbx-core` update pipeline
//! over a frame source, and streams framebuffer updates to any number
//! of connected viewers.
//!
//! Ships with an animated test-pattern source so the full pipeline is
//! exercisable without a platform capture backend.

pub mod config;
pub mod service;
pub mod source;
