//! False-positive suppression for the changed region.
//!
//! Change detectors over-report: a window repaint that produces
//! identical pixels still lands in the changed region. Before an
//! extraction is handed to clients, each changed rect is compared
//! against the backup copy of the screen and the parts that did not
//! actually change are dropped.

use crate::pixel::FrameBuffer;
use crate::region::{Rect, Region};

/// Rows per comparison strip. Smaller strips discard more unchanged
/// area at the cost of more comparisons.
const STRIP_HEIGHT: i32 = 32;

/// Removes rects from a changed region whose pixels are identical in
/// `screen` and `backup`.
pub struct UpdateFilter;

impl UpdateFilter {
    /// Filter `changed` in place. Buffers with mismatched properties
    /// (mid-resize) are left untouched; the resize path handles that.
    pub fn filter(changed: &mut Region, screen: &FrameBuffer, backup: &FrameBuffer) {
        if changed.is_empty() || !screen.same_properties(backup) {
            return;
        }

        let mut kept = Region::new();
        for rect in changed.rects() {
            Self::filter_rect(rect, screen, backup, &mut kept);
        }
        *changed = kept;
    }

    fn filter_rect(rect: &Rect, screen: &FrameBuffer, backup: &FrameBuffer, kept: &mut Region) {
        let mut top = rect.top;
        while top < rect.bottom {
            let bottom = (top + STRIP_HEIGHT).min(rect.bottom);
            let strip = Rect::new(rect.left, top, rect.right, bottom);
            if !screen.rect_equal(backup, &strip) {
                kept.add_rect(&strip);
            }
            top = bottom;
        }
    }
}
