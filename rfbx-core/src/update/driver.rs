//! Screen acquisition drivers.
//!
//! A [`ScreenDriver`] owns the authoritative screen framebuffer and
//! knows how to refresh rectangular areas of it from the underlying
//! capture source. Two implementations exist: the standard polling
//! driver over any [`FrameSource`], and a mirror driver that hooks the
//! display pipeline directly where supported. Construction goes through
//! [`ScreenDriverFactory`], which degrades gracefully when the mirror
//! path is unavailable.

use tracing::{debug, warn};

use crate::error::RfbError;
use crate::pixel::{FrameBuffer, PixelFormat};
use crate::region::{Dimension, Rect};

// ── FrameSource ──────────────────────────────────────────────────

/// Low-level supplier of screen pixels.
///
/// Implementations wrap whatever the platform offers (X damage, DXGI
/// duplication, a test pattern). They report current display
/// properties and fill requested areas of a caller-owned buffer.
pub trait FrameSource: Send {
    /// Current display size.
    fn dimension(&self) -> Dimension;

    /// Native pixel format of the display.
    fn pixel_format(&self) -> PixelFormat;

    /// Copy the pixels of `rect` (display coordinates) into `out`,
    /// which is guaranteed to already have the source's properties.
    fn grab(&mut self, rect: &Rect, out: &mut FrameBuffer) -> Result<(), RfbError>;
}

// ── ScreenDriver ─────────────────────────────────────────────────

/// Owner of the screen framebuffer and the refresh mechanism.
pub trait ScreenDriver: Send {
    /// Refresh `rect` of the screen buffer from the capture source.
    fn grab(&mut self, rect: &Rect) -> Result<(), RfbError>;

    /// The authoritative screen framebuffer.
    fn screen_buffer(&self) -> &FrameBuffer;

    fn screen_dimension(&self) -> Dimension {
        self.screen_buffer().dimension()
    }

    /// True when the display's size or pixel format no longer matches
    /// the screen buffer. Sticky until [`apply_new_properties`] runs.
    ///
    /// [`apply_new_properties`]: ScreenDriver::apply_new_properties
    fn properties_changed(&mut self) -> bool;

    /// True when specifically the display size drifted.
    fn screen_size_changed(&mut self) -> bool;

    /// Re-allocate the screen buffer to the display's current
    /// properties. Contents are zeroed; the caller must follow with a
    /// full grab.
    fn apply_new_properties(&mut self) -> Result<(), RfbError>;
}

// ── StandardScreenDriver ─────────────────────────────────────────

/// Polling driver over any [`FrameSource`]. Always available.
pub struct StandardScreenDriver {
    source: Box<dyn FrameSource>,
    screen: FrameBuffer,
}

impl StandardScreenDriver {
    pub fn new(mut source: Box<dyn FrameSource>) -> Result<Self, RfbError> {
        let mut screen = FrameBuffer::new(source.dimension(), source.pixel_format());
        let full = source.dimension().rect();
        source.grab(&full, &mut screen)?;
        Ok(Self { source, screen })
    }
}

impl ScreenDriver for StandardScreenDriver {
    fn grab(&mut self, rect: &Rect) -> Result<(), RfbError> {
        let clipped = rect.intersection(&self.screen.dimension().rect());
        if clipped.is_empty() {
            return Ok(());
        }
        self.source.grab(&clipped, &mut self.screen)
    }

    fn screen_buffer(&self) -> &FrameBuffer {
        &self.screen
    }

    fn properties_changed(&mut self) -> bool {
        self.source.dimension() != self.screen.dimension()
            || self.source.pixel_format() != self.screen.format()
    }

    fn screen_size_changed(&mut self) -> bool {
        self.source.dimension() != self.screen.dimension()
    }

    fn apply_new_properties(&mut self) -> Result<(), RfbError> {
        let dim = self.source.dimension();
        let format = self.source.pixel_format();
        debug!(width = dim.width, height = dim.height, "applying new screen properties");
        self.screen.set_properties(dim, format);
        Ok(())
    }
}

// ── MirrorScreenDriver ───────────────────────────────────────────

/// Display-hook driver. Requires a mirror display device, which this
/// build has no backend for, so construction always fails and the
/// factory falls back to polling.
pub struct MirrorScreenDriver {
    _private: (),
}

impl MirrorScreenDriver {
    pub fn new() -> Result<Self, RfbError> {
        Err(RfbError::DriverUnavailable(
            "no mirror display device present".into(),
        ))
    }
}

// ── ScreenDriverFactory ──────────────────────────────────────────

/// Picks the best available driver.
pub struct ScreenDriverFactory {
    prefer_mirror: bool,
}

impl ScreenDriverFactory {
    pub fn new(prefer_mirror: bool) -> Self {
        Self { prefer_mirror }
    }

    /// Try the mirror driver when preferred; on failure log and fall
    /// back to the standard driver rather than erroring out.
    pub fn create(
        &self,
        source: Box<dyn FrameSource>,
    ) -> Result<Box<dyn ScreenDriver>, RfbError> {
        if self.prefer_mirror {
            if let Err(e) = MirrorScreenDriver::new() {
                warn!(error = %e, "mirror driver unavailable, using standard driver");
            }
        }
        Ok(Box::new(StandardScreenDriver::new(source)?))
    }
}
