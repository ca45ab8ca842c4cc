//! The update-change model: detection, accumulation, extraction.

pub mod container;
pub mod detector;
pub mod driver;
pub mod filter;
pub mod handler;
pub mod keeper;
pub mod video;

pub use container::UpdateContainer;
pub use detector::{
    CopyRectDetector, CursorPosSource, CursorShapeSource, DetectorSet, NoCopyRectDetector,
    UpdateListener,
};
pub use driver::{FrameSource, MirrorScreenDriver, ScreenDriver, ScreenDriverFactory, StandardScreenDriver};
pub use filter::UpdateFilter;
pub use handler::{CursorShapeGrabber, LocalUpdateHandler};
pub use keeper::UpdateKeeper;
pub use video::{VideoRegionProvider, VideoRegionTracker};
