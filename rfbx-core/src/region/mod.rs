//! Rect/Region primitives: set algebra over rectangle lists.

mod rect;
#[allow(clippy::module_inception)]
mod region;

pub use rect::{Dimension, Point, Rect};
pub use region::Region;
