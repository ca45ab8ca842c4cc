//! Per-client encoding preferences.
//!
//! A `SetEncodings` message is the client's complete statement of what
//! it can consume — feature flags, the preferred frame encoding and the
//! compression/quality sliders all ride in a single list of codes.
//! Parsing is gated by the server's capability registry so an enabled
//! option always corresponds to something the server actually sends.

use bitflags::bitflags;

use crate::proto::msg;
use crate::proto::CapabilityRegistry;

bitflags! {
    /// Feature flags a client opted in to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ClientCaps: u8 {
        const COPY_RECT    = 1 << 0;
        const RICH_CURSOR  = 1 << 1;
        const POINTER_POS  = 1 << 2;
        const DESKTOP_SIZE = 1 << 3;
        const ZSTD_VIDEO   = 1 << 4;
    }
}

/// The per-client encode state derived from `SetEncodings`.
#[derive(Debug, Clone)]
pub struct EncodeOptions {
    caps: ClientCaps,
    preferred: i32,
    compression_level: Option<u8>,
    quality_level: Option<u8>,
}

impl Default for EncodeOptions {
    /// Before any `SetEncodings` arrives the client gets raw rects and
    /// nothing else.
    fn default() -> Self {
        Self {
            caps: ClientCaps::empty(),
            preferred: msg::ENCODING_RAW,
            compression_level: None,
            quality_level: None,
        }
    }
}

impl EncodeOptions {
    /// Rebuild the options from a fresh code list. Codes the registry
    /// does not carry are ignored; the first registered frame encoding
    /// in the list becomes the preferred one.
    pub fn from_codes(codes: &[i32], registry: &CapabilityRegistry) -> Self {
        let mut opts = Self::default();
        let mut preferred_set = false;

        for &code in codes {
            match code {
                msg::ENCODING_RAW => {
                    if !preferred_set {
                        opts.preferred = msg::ENCODING_RAW;
                        preferred_set = true;
                    }
                }
                msg::ENCODING_COPYRECT => {
                    if registry.encoding_registered(code) {
                        opts.caps |= ClientCaps::COPY_RECT;
                    }
                }
                msg::ENCODING_ZSTD_VIDEO => {
                    if registry.encoding_registered(code) {
                        opts.caps |= ClientCaps::ZSTD_VIDEO;
                    }
                }
                msg::PSEUDO_RICH_CURSOR => {
                    if registry.encoding_registered(code) {
                        opts.caps |= ClientCaps::RICH_CURSOR;
                    }
                }
                msg::PSEUDO_POINTER_POS => {
                    if registry.encoding_registered(code) {
                        opts.caps |= ClientCaps::POINTER_POS;
                    }
                }
                msg::PSEUDO_DESKTOP_SIZE => {
                    if registry.encoding_registered(code) {
                        opts.caps |= ClientCaps::DESKTOP_SIZE;
                    }
                }
                c if (msg::PSEUDO_COMPR_LEVEL_0..=msg::PSEUDO_COMPR_LEVEL_9).contains(&c) => {
                    opts.compression_level = Some((c - msg::PSEUDO_COMPR_LEVEL_0) as u8);
                }
                c if (msg::PSEUDO_QUALITY_LEVEL_0..=msg::PSEUDO_QUALITY_LEVEL_9).contains(&c) => {
                    opts.quality_level = Some((c - msg::PSEUDO_QUALITY_LEVEL_0) as u8);
                }
                _ => {}
            }
        }
        opts
    }

    pub fn copy_rect_enabled(&self) -> bool {
        self.caps.contains(ClientCaps::COPY_RECT)
    }

    pub fn rich_cursor_enabled(&self) -> bool {
        self.caps.contains(ClientCaps::RICH_CURSOR)
    }

    pub fn pointer_pos_enabled(&self) -> bool {
        self.caps.contains(ClientCaps::POINTER_POS)
    }

    pub fn desktop_size_enabled(&self) -> bool {
        self.caps.contains(ClientCaps::DESKTOP_SIZE)
    }

    pub fn zstd_video_enabled(&self) -> bool {
        self.caps.contains(ClientCaps::ZSTD_VIDEO)
    }

    pub fn preferred_encoding(&self) -> i32 {
        self.preferred
    }

    /// Requested compression level 0..=9, if the client sent one.
    pub fn compression_level(&self) -> Option<u8> {
        self.compression_level
    }

    /// Requested quality level 0..=9, if the client sent one.
    pub fn quality_level(&self) -> Option<u8> {
        self.quality_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> CapabilityRegistry {
        let mut reg = CapabilityRegistry::new();
        reg.add_encoding(msg::ENCODING_COPYRECT, msg::VENDOR_STANDARD, msg::SIG_COPYRECT);
        reg.add_encoding(msg::ENCODING_ZSTD_VIDEO, msg::VENDOR_RFBX, msg::SIG_ZSTD_VIDEO);
        reg.add_encoding(msg::PSEUDO_RICH_CURSOR, msg::VENDOR_STANDARD, msg::SIG_RICH_CURSOR);
        reg.add_encoding(msg::PSEUDO_POINTER_POS, msg::VENDOR_STANDARD, msg::SIG_POINTER_POS);
        reg.add_encoding(msg::PSEUDO_DESKTOP_SIZE, msg::VENDOR_STANDARD, msg::SIG_DESKTOP_SIZE);
        reg
    }

    #[test]
    fn default_is_raw_only() {
        let opts = EncodeOptions::default();
        assert_eq!(opts.preferred_encoding(), msg::ENCODING_RAW);
        assert!(!opts.copy_rect_enabled());
        assert!(!opts.desktop_size_enabled());
    }

    #[test]
    fn flags_require_registration() {
        let reg = CapabilityRegistry::new(); // nothing registered
        let opts = EncodeOptions::from_codes(
            &[msg::ENCODING_COPYRECT, msg::PSEUDO_DESKTOP_SIZE],
            &reg,
        );
        assert!(!opts.copy_rect_enabled());
        assert!(!opts.desktop_size_enabled());
    }

    #[test]
    fn full_code_list() {
        let opts = EncodeOptions::from_codes(
            &[
                msg::ENCODING_RAW,
                msg::ENCODING_COPYRECT,
                msg::ENCODING_ZSTD_VIDEO,
                msg::PSEUDO_RICH_CURSOR,
                msg::PSEUDO_POINTER_POS,
                msg::PSEUDO_DESKTOP_SIZE,
                msg::PSEUDO_COMPR_LEVEL_0 + 6,
                msg::PSEUDO_QUALITY_LEVEL_0 + 9,
            ],
            &registry(),
        );
        assert!(opts.copy_rect_enabled());
        assert!(opts.zstd_video_enabled());
        assert!(opts.rich_cursor_enabled());
        assert!(opts.pointer_pos_enabled());
        assert!(opts.desktop_size_enabled());
        assert_eq!(opts.compression_level(), Some(6));
        assert_eq!(opts.quality_level(), Some(9));
    }

    #[test]
    fn fresh_list_replaces_old_state() {
        let reg = registry();
        let first = EncodeOptions::from_codes(&[msg::ENCODING_COPYRECT], &reg);
        assert!(first.copy_rect_enabled());
        let second = EncodeOptions::from_codes(&[msg::ENCODING_RAW], &reg);
        assert!(!second.copy_rect_enabled());
    }

    #[test]
    fn unknown_codes_are_ignored() {
        let opts = EncodeOptions::from_codes(&[424242, -9999], &registry());
        assert_eq!(opts.preferred_encoding(), msg::ENCODING_RAW);
        assert!(opts.caps.is_empty());
    }
}
