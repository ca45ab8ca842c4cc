//! RFB wire constants: message types, encodings, pseudo-encodings.

// ── Server → client message types ────────────────────────────────

pub const SRV_FRAMEBUFFER_UPDATE: u8 = 0;
pub const SRV_SET_COLOR_MAP_ENTRIES: u8 = 1;

// ── Client → server message types ────────────────────────────────

pub const CLI_SET_PIXEL_FORMAT: u8 = 0;
pub const CLI_SET_ENCODINGS: u8 = 2;
pub const CLI_FB_UPDATE_REQUEST: u8 = 3;
/// Vendor extension: freeze/unfreeze the streamed video region.
pub const CLI_VIDEO_FREEZE: u8 = 150;

// ── Encodings ────────────────────────────────────────────────────

pub const ENCODING_RAW: i32 = 0;
pub const ENCODING_COPYRECT: i32 = 1;
pub const ENCODING_ZRLE: i32 = 16;
/// Vendor encoding: zstd-compressed raw stream for video regions.
pub const ENCODING_ZSTD_VIDEO: i32 = -1024;

// ── Pseudo-encodings ─────────────────────────────────────────────

pub const PSEUDO_RICH_CURSOR: i32 = -239;
pub const PSEUDO_POINTER_POS: i32 = -232;
pub const PSEUDO_DESKTOP_SIZE: i32 = -223;

/// Compression level pseudo-encodings (-256 .. -247 map to 0..9).
pub const PSEUDO_COMPR_LEVEL_0: i32 = -256;
pub const PSEUDO_COMPR_LEVEL_9: i32 = -247;
/// Quality level pseudo-encodings (-32 .. -23 map to 0..9).
pub const PSEUDO_QUALITY_LEVEL_0: i32 = -32;
pub const PSEUDO_QUALITY_LEVEL_9: i32 = -23;

// ── Capability vendors / signatures ──────────────────────────────

pub const VENDOR_STANDARD: &str = "STDV";
pub const VENDOR_RFBX: &str = "RFBX";

pub const SIG_COPYRECT: &str = "COPYRECT";
pub const SIG_RAW: &str = "RAW.....";
pub const SIG_ZSTD_VIDEO: &str = "ZSTDVID.";
pub const SIG_RICH_CURSOR: &str = "RCHCURSR";
pub const SIG_POINTER_POS: &str = "POINTPOS";
pub const SIG_DESKTOP_SIZE: &str = "NEWFBSIZ";
pub const SIG_VIDEO_FREEZE: &str = "VD_FREEZ";

/// Rectangle-count field is u16; one value is reserved by convention.
pub const MAX_RECTS_PER_UPDATE: usize = 65534;
