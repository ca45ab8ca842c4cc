//! The per-tick snapshot of everything that changed on the screen.

use crate::region::{Point, Region};

/// A fully-assembled snapshot of pending screen changes.
///
/// `copied_region` holds at most one copy-move: every rect in it shares
/// the single `copy_src` source point. The portion of `changed_region`
/// it overlaps is removed during reconciliation — copy wins unless the
/// destination was also freshly changed.
#[derive(Debug, Clone, Default)]
pub struct UpdateContainer {
    /// Pixels that need a re-send.
    pub changed_region: Region,
    /// Destination of the single rectangular copy-move.
    pub copied_region: Region,
    /// Source point of the copy-move (top-left of the source area).
    pub copy_src: Point,
    /// Sub-region hinted as ideal for the streaming encoder.
    pub video_region: Region,
    pub cursor_pos: Point,
    pub cursor_pos_changed: bool,
    pub cursor_shape_changed: bool,
    pub screen_size_changed: bool,
}

impl UpdateContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when nothing at all is pending.
    pub fn is_empty(&self) -> bool {
        self.changed_region.is_empty()
            && self.copied_region.is_empty()
            && self.video_region.is_empty()
            && !self.cursor_pos_changed
            && !self.cursor_shape_changed
            && !self.screen_size_changed
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
