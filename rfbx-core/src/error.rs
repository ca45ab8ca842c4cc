//! Domain-specific error types for the RFB update pipeline.
//!
//! All fallible operations return `Result<T, RfbError>`.
//! No panics on invalid input — every error is typed and recoverable.

use thiserror::Error;

/// The canonical error type for the RFB server pipeline.
#[derive(Debug, Error)]
pub enum RfbError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// The client sent a message code the server never registered.
    #[error("unknown client message code: {0}")]
    UnknownMessage(u8),

    /// A message violated protocol rules.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// The client asked for a pixel format the server cannot serve.
    #[error("unsupported pixel format: {0}")]
    UnsupportedPixelFormat(&'static str),

    /// The update would not fit the 16-bit rectangle-count field.
    #[error("rectangle count overflow: {0} rectangles")]
    RectangleOverflow(usize),

    // ── Decode Errors ────────────────────────────────────────────
    /// A tile decode read past the end of the decompressed buffer.
    #[error("decode overrun in {context}: need {need} bytes, {avail} available")]
    DecodeOverrun {
        context: &'static str,
        need: usize,
        avail: usize,
    },

    /// A tile carried a subencoding selector outside the valid set.
    #[error("invalid subencoding selector: {0}")]
    InvalidSubencoding(u8),

    /// A rectangle or tile fell outside the destination framebuffer.
    #[error("rectangle out of framebuffer bounds")]
    RectOutOfBounds,

    /// Zlib inflate or zstd compression failed.
    #[error("compression error: {0}")]
    Compression(String),

    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    /// The sender worker was asked to stop.
    #[error("sender terminated")]
    Terminated,

    // ── Resource Errors ──────────────────────────────────────────
    /// A screen driver could not be constructed.
    #[error("screen driver unavailable: {0}")]
    DriverUnavailable(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl From<String> for RfbError {
    fn from(s: String) -> Self {
        RfbError::Other(s)
    }
}

impl From<&str> for RfbError {
    fn from(s: &str) -> Self {
        RfbError::Other(s.to_string())
    }
}
