//! Built-in frame source.
//!
//! Serves an animated test pattern so the pipeline can run without a
//! platform capture backend. A real deployment substitutes a
//! [`FrameSource`] that wraps the native display API.

use std::time::Instant;

use rfbx_core::update::{CursorPosSource, CursorShapeSource, FrameSource};
use rfbx_core::{CursorShape, Dimension, FrameBuffer, PixelFormat, Point, Rect, RfbError};

/// Size of the bouncing square in the test pattern.
const BLOCK: i32 = 96;

/// Animated test pattern: a colored square bouncing over a dark
/// checkerboard. Pixels are rendered lazily, only for the grabbed
/// rectangle.
pub struct TestPatternSource {
    dim: Dimension,
    format: PixelFormat,
    started: Instant,
}

impl TestPatternSource {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            dim: Dimension::new(width, height),
            format: PixelFormat::rgb888(),
            started: Instant::now(),
        }
    }

    /// Top-left corner of the bouncing square at elapsed time `t` ms.
    fn block_origin(&self, t: u64) -> Point {
        let bounce = |span: i32, pos: i64| -> i32 {
            let span = span.max(1) as i64;
            let phase = pos % (2 * span);
            if phase < span { phase as i32 } else { (2 * span - phase - 1) as i32 }
        };
        let x = bounce(self.dim.width - BLOCK, (t / 8) as i64);
        let y = bounce(self.dim.height - BLOCK, (t / 13) as i64);
        Point::new(x, y)
    }

    fn pixel_at(&self, x: i32, y: i32, origin: Point) -> u32 {
        let in_block = x >= origin.x
            && x < origin.x + BLOCK
            && y >= origin.y
            && y < origin.y + BLOCK;
        if in_block {
            0x00_ff_80_00
        } else if ((x / 64) + (y / 64)) % 2 == 0 {
            0x00_20_20_28
        } else {
            0x00_30_30_38
        }
    }
}

impl FrameSource for TestPatternSource {
    fn dimension(&self) -> Dimension {
        self.dim
    }

    fn pixel_format(&self) -> PixelFormat {
        self.format
    }

    fn grab(&mut self, rect: &Rect, out: &mut FrameBuffer) -> Result<(), RfbError> {
        let t = self.started.elapsed().as_millis() as u64;
        let origin = self.block_origin(t);
        let clipped = rect.intersection(&self.dim.rect());
        for y in clipped.top..clipped.bottom {
            for x in clipped.left..clipped.right {
                out.set_pixel(x, y, self.pixel_at(x, y, origin));
            }
        }
        Ok(())
    }
}

/// Pointer that orbits the center of the pattern.
pub struct OrbitingCursor {
    dim: Dimension,
    started: Instant,
}

impl OrbitingCursor {
    pub fn new(dim: Dimension) -> Self {
        Self { dim, started: Instant::now() }
    }
}

impl CursorPosSource for OrbitingCursor {
    fn cursor_pos(&mut self) -> Point {
        let t = self.started.elapsed().as_millis() as f64 / 1000.0;
        let (cx, cy) = (self.dim.width as f64 / 2.0, self.dim.height as f64 / 2.0);
        let r = (self.dim.width.min(self.dim.height) as f64 / 4.0).max(1.0);
        Point::new(
            (cx + r * t.cos()) as i32,
            (cy + r * t.sin()) as i32,
        )
    }
}

/// The test pattern never changes its cursor image.
pub struct StaticCursorShape;

impl CursorShapeSource for StaticCursorShape {
    fn shape_generation(&mut self) -> u64 {
        0
    }
}

/// Build the fixed cursor image shown to rich-cursor clients: a small
/// white square with a black border.
pub fn default_cursor_shape() -> CursorShape {
    let dim = Dimension::new(8, 8);
    let mut shape = CursorShape::new(dim, PixelFormat::rgb888(), Point::new(0, 0));
    for y in 0..8 {
        for x in 0..8 {
            let border = x == 0 || y == 0 || x == 7 || y == 7;
            let value = if border { 0x00_00_00_00 } else { 0x00_ff_ff_ff };
            shape.pixels_mut().set_pixel(x, y, value);
        }
    }
    shape.set_mask(vec![0xff; 8]);
    shape
}
