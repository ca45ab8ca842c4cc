//! Accumulator for pending screen changes.
//!
//! The keeper is the single source of truth for "what changed since the
//! last extraction". Callers serialize access externally (the keeper
//! lives behind the framebuffer lock), which makes `extract` atomic
//! with respect to concurrent `add_*` calls.

use crate::region::{Point, Rect, Region};
use crate::update::container::UpdateContainer;

/// Pending-change accumulator with border clipping and exclusion.
#[derive(Debug, Default)]
pub struct UpdateKeeper {
    pending: UpdateContainer,
    border: Rect,
    excluded: Region,
}

impl UpdateKeeper {
    pub fn new(border: Rect) -> Self {
        Self {
            pending: UpdateContainer::new(),
            border,
            excluded: Region::new(),
        }
    }

    pub fn border_rect(&self) -> Rect {
        self.border
    }

    /// Reset the clipping bound (used on resolution change) and re-crop
    /// everything already pending.
    pub fn set_border_rect(&mut self, border: Rect) {
        self.border = border;
        self.pending.changed_region.crop(&border);
        self.pending.copied_region.crop(&border);
        self.pending.video_region.crop(&border);
    }

    /// Areas never to report (e.g. outside the capture area).
    pub fn set_excluded_region(&mut self, excluded: &Region) {
        self.excluded = excluded.clone();
        self.pending.changed_region.subtract(&self.excluded);
        self.pending.copied_region.subtract(&self.excluded);
    }

    pub fn add_changed_rect(&mut self, rect: &Rect) {
        let mut region = Region::from_rect(rect);
        self.add_changed_region(&mut region);
    }

    pub fn add_changed_region(&mut self, region: &mut Region) {
        region.crop(&self.border);
        region.subtract(&self.excluded);
        self.pending.changed_region.add(region);
        // A destination that turns dirty again stops being a copy.
        self.pending.copied_region.subtract(region);
    }

    /// Record a single rectangular copy-move.
    ///
    /// Only one source point can be represented per snapshot. An
    /// incompatible stale copy (different source vector) is folded into
    /// the changed region before the new one is stored — superseded,
    /// never silently dropped. This single-slot behavior is a
    /// documented limitation, not something to fix here.
    pub fn add_copy_rect(&mut self, dst_rect: &Rect, src: Point) {
        let mut dst = Region::from_rect(dst_rect);
        dst.crop(&self.border);
        dst.subtract(&self.excluded);
        if dst.is_empty() {
            return;
        }

        if !self.pending.copied_region.is_empty() && self.pending.copy_src != src {
            let stale = std::mem::take(&mut self.pending.copied_region);
            self.pending.changed_region.add(&stale);
        }

        // Copy wins, unless the destination was also freshly changed.
        dst.subtract(&self.pending.changed_region);
        self.pending.copied_region.add(&dst);
        self.pending.copy_src = src;
    }

    pub fn set_cursor_pos(&mut self, pos: Point) {
        self.pending.cursor_pos = pos;
    }

    pub fn set_cursor_pos_changed(&mut self, pos: Point) {
        self.pending.cursor_pos = pos;
        self.pending.cursor_pos_changed = true;
    }

    pub fn set_cursor_shape_changed(&mut self) {
        self.pending.cursor_shape_changed = true;
    }

    pub fn set_screen_size_changed(&mut self) {
        self.pending.screen_size_changed = true;
    }

    /// Merge a whole container (used by the per-client keeper when the
    /// handler fans a snapshot out).
    pub fn add_update_container(&mut self, other: &UpdateContainer) {
        let mut changed = other.changed_region.clone();
        self.add_changed_region(&mut changed);

        if !other.copied_region.is_empty() {
            // The copy arrives as one rectangular move.
            let bound = other.copied_region.bounding_rect();
            self.add_copy_rect(&bound, other.copy_src);
        }

        let mut video = other.video_region.clone();
        video.crop(&self.border);
        self.pending.video_region.add(&video);

        if other.cursor_pos_changed {
            self.set_cursor_pos_changed(other.cursor_pos);
        } else {
            self.pending.cursor_pos = other.cursor_pos;
        }
        self.pending.cursor_shape_changed |= other.cursor_shape_changed;
        self.pending.screen_size_changed |= other.screen_size_changed;
    }

    /// Copy out the full pending state and clear it.
    ///
    /// The extract-and-clear contract is the central correctness
    /// mechanism: no update can be read twice, and none is lost as long
    /// as leftovers are re-inserted after partial consumption.
    pub fn extract(&mut self, container: &mut UpdateContainer) {
        *container = std::mem::take(&mut self.pending);
    }

    /// Peek at the pending state without clearing it.
    pub fn peek(&self, container: &mut UpdateContainer) {
        *container = self.pending.clone();
    }

    /// Force the entire bordered area into the changed region, dropping
    /// any pending copy (a full repaint covers it anyway).
    pub fn mark_whole_screen_changed(&mut self) {
        self.pending.changed_region = Region::from_rect(&self.border);
        self.pending.changed_region.subtract(&self.excluded);
        self.pending.copied_region.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keeper_100() -> UpdateKeeper {
        UpdateKeeper::new(Rect::new(0, 0, 100, 100))
    }

    #[test]
    fn extract_equals_union_of_added_rects() {
        let mut keeper = keeper_100();
        keeper.add_changed_rect(&Rect::new(0, 0, 10, 10));
        keeper.add_changed_rect(&Rect::new(5, 5, 20, 20));
        keeper.add_changed_rect(&Rect::new(90, 90, 200, 200)); // cropped

        let mut out = UpdateContainer::new();
        keeper.extract(&mut out);

        let mut expected = Region::new();
        expected.add_rect(&Rect::new(0, 0, 10, 10));
        expected.add_rect(&Rect::new(5, 5, 20, 20));
        expected.add_rect(&Rect::new(90, 90, 100, 100));
        assert_eq!(out.changed_region, expected);
    }

    #[test]
    fn second_extract_is_empty() {
        let mut keeper = keeper_100();
        keeper.add_changed_rect(&Rect::new(0, 0, 10, 10));
        keeper.set_cursor_shape_changed();

        let mut first = UpdateContainer::new();
        keeper.extract(&mut first);
        assert!(!first.is_empty());

        let mut second = UpdateContainer::new();
        keeper.extract(&mut second);
        assert!(second.is_empty());
    }

    #[test]
    fn excluded_region_never_reported() {
        let mut keeper = keeper_100();
        keeper.set_excluded_region(&Region::from_rect(&Rect::new(50, 0, 100, 100)));
        keeper.add_changed_rect(&Rect::new(40, 0, 60, 10));

        let mut out = UpdateContainer::new();
        keeper.extract(&mut out);
        assert_eq!(out.changed_region, Region::from_rect(&Rect::new(40, 0, 50, 10)));
    }

    #[test]
    fn border_reset_recrops_pending() {
        let mut keeper = keeper_100();
        keeper.add_changed_rect(&Rect::new(0, 0, 100, 100));
        keeper.set_border_rect(Rect::new(0, 0, 50, 50));

        let mut out = UpdateContainer::new();
        keeper.extract(&mut out);
        assert_eq!(out.changed_region, Region::from_rect(&Rect::new(0, 0, 50, 50)));
    }

    #[test]
    fn copy_supersedes_incompatible_stale_copy() {
        let mut keeper = keeper_100();
        keeper.add_copy_rect(&Rect::new(10, 10, 20, 20), Point::new(0, 0));
        keeper.add_copy_rect(&Rect::new(50, 50, 60, 60), Point::new(40, 40));

        let mut out = UpdateContainer::new();
        keeper.extract(&mut out);
        // New copy survives; the stale destination degraded to changed.
        assert_eq!(out.copied_region, Region::from_rect(&Rect::new(50, 50, 60, 60)));
        assert_eq!(out.copy_src, Point::new(40, 40));
        assert!(out.changed_region.contains_rect(&Rect::new(10, 10, 20, 20)));
    }

    #[test]
    fn freshly_changed_destination_beats_copy() {
        let mut keeper = keeper_100();
        keeper.add_changed_rect(&Rect::new(10, 10, 15, 15));
        keeper.add_copy_rect(&Rect::new(10, 10, 20, 20), Point::new(0, 0));

        let mut out = UpdateContainer::new();
        keeper.extract(&mut out);
        // Copied and changed regions are mutually exclusive.
        let mut overlap = out.copied_region.clone();
        overlap.intersect(&out.changed_region);
        assert!(overlap.is_empty());
        assert!(out.changed_region.contains_rect(&Rect::new(10, 10, 15, 15)));
    }

    #[test]
    fn changed_destination_revokes_copy() {
        let mut keeper = keeper_100();
        keeper.add_copy_rect(&Rect::new(10, 10, 20, 20), Point::new(0, 0));
        keeper.add_changed_rect(&Rect::new(10, 10, 20, 20));

        let mut out = UpdateContainer::new();
        keeper.extract(&mut out);
        assert!(out.copied_region.is_empty());
    }

    #[test]
    fn mark_whole_screen_changed_covers_border() {
        let mut keeper = keeper_100();
        keeper.add_copy_rect(&Rect::new(10, 10, 20, 20), Point::new(0, 0));
        keeper.mark_whole_screen_changed();

        let mut out = UpdateContainer::new();
        keeper.extract(&mut out);
        assert_eq!(out.changed_region, Region::from_rect(&Rect::new(0, 0, 100, 100)));
        assert!(out.copied_region.is_empty());
    }

    #[test]
    fn add_container_merges_all_fields() {
        let mut keeper = keeper_100();
        let mut snapshot = UpdateContainer::new();
        snapshot.changed_region.add_rect(&Rect::new(0, 0, 10, 10));
        snapshot.copied_region.add_rect(&Rect::new(30, 30, 40, 40));
        snapshot.copy_src = Point::new(20, 20);
        snapshot.cursor_pos_changed = true;
        snapshot.cursor_pos = Point::new(7, 8);

        keeper.add_update_container(&snapshot);

        let mut out = UpdateContainer::new();
        keeper.extract(&mut out);
        assert!(out.changed_region.contains_rect(&Rect::new(0, 0, 10, 10)));
        assert_eq!(out.copied_region, Region::from_rect(&Rect::new(30, 30, 40, 40)));
        assert!(out.cursor_pos_changed);
        assert_eq!(out.cursor_pos, Point::new(7, 8));
    }
}
