//! Per-client cursor update bookkeeping.
//!
//! Cursor position and shape changes ride the update pipeline like any
//! other change flag, but whether they actually reach a given client
//! depends on what that client opted in to. Pending flags for features
//! the client lacks are dropped, not queued, so a later `SetEncodings`
//! does not replay stale cursor state.

use crate::region::Point;
use crate::sender::options::EncodeOptions;
use crate::update::UpdateContainer;

#[derive(Debug, Default)]
pub struct CursorUpdates {
    pos: Point,
    pos_pending: bool,
    shape_pending: bool,
}

impl CursorUpdates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb the cursor flags of an extracted snapshot, honoring the
    /// client's capabilities.
    pub fn update_from(&mut self, container: &UpdateContainer, options: &EncodeOptions) {
        self.pos = container.cursor_pos;
        if container.cursor_pos_changed && options.pointer_pos_enabled() {
            self.pos_pending = true;
        }
        if container.cursor_shape_changed && options.rich_cursor_enabled() {
            self.shape_pending = true;
        }
    }

    /// A new shape must also go out on the next full frame, whether or
    /// not the shape changed since.
    pub fn request_shape(&mut self, options: &EncodeOptions) {
        if options.rich_cursor_enabled() {
            self.shape_pending = true;
        }
    }

    /// The position to send in this frame, if any. Clears the flag.
    pub fn take_pos(&mut self) -> Option<Point> {
        if self.pos_pending {
            self.pos_pending = false;
            Some(self.pos)
        } else {
            None
        }
    }

    /// Whether a shape rect goes into this frame. Clears the flag.
    pub fn take_shape(&mut self) -> bool {
        std::mem::take(&mut self.shape_pending)
    }
}
