//! Server-side update orchestration.
//!
//! `LocalUpdateHandler` sits between the detectors and the per-client
//! senders. It owns the screen driver, a backup copy of the last state
//! every client could have seen, and the shared update keeper. An
//! extraction pulls the pending snapshot, refreshes the affected screen
//! pixels, filters out false positives against the backup, and then
//! rolls the backup forward so the next extraction diffs against what
//! was just reported.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::RfbError;
use crate::pixel::{CursorShape, FrameBuffer};
use crate::region::Region;
use crate::update::container::UpdateContainer;
use crate::update::detector::CopyRectDetector;
use crate::update::driver::ScreenDriver;
use crate::update::filter::UpdateFilter;
use crate::update::keeper::UpdateKeeper;
use crate::update::video::VideoRegionTracker;

/// Produces the current cursor image when the shape detector fires.
pub trait CursorShapeGrabber: Send {
    fn grab_shape(&mut self) -> Result<CursorShape, RfbError>;
}

/// Minimum spacing between answered update checks.
const CHECK_INTERVAL: Duration = Duration::from_millis(30);

pub struct LocalUpdateHandler {
    driver: Box<dyn ScreenDriver>,
    backup: FrameBuffer,
    keeper: Arc<Mutex<UpdateKeeper>>,
    copyrect: Box<dyn CopyRectDetector>,
    video: VideoRegionTracker,
    shape_grabber: Option<Box<dyn CursorShapeGrabber>>,
    cursor_shape: CursorShape,
    full_update_requested: bool,
    /// Armed at construction: the first extraction reports the whole
    /// screen, so consumers start from a frame instead of a diff.
    initial_frame_pending: bool,
    last_check: Option<Instant>,
}

impl LocalUpdateHandler {
    pub fn new(
        driver: Box<dyn ScreenDriver>,
        copyrect: Box<dyn CopyRectDetector>,
        video: VideoRegionTracker,
        shape_grabber: Option<Box<dyn CursorShapeGrabber>>,
    ) -> Self {
        let mut backup = FrameBuffer::default();
        backup.clone_from_fb(driver.screen_buffer());
        let border = driver.screen_dimension().rect();
        Self {
            driver,
            backup,
            keeper: Arc::new(Mutex::new(UpdateKeeper::new(border))),
            copyrect,
            video,
            shape_grabber,
            cursor_shape: CursorShape::default(),
            full_update_requested: false,
            initial_frame_pending: true,
            last_check: None,
        }
    }

    /// Shared keeper handle for wiring up detectors.
    pub fn keeper(&self) -> Arc<Mutex<UpdateKeeper>> {
        Arc::clone(&self.keeper)
    }

    pub fn screen_buffer(&self) -> &FrameBuffer {
        self.driver.screen_buffer()
    }

    pub fn cursor_shape(&self) -> &CursorShape {
        &self.cursor_shape
    }

    /// Request that the next extraction covers the whole screen.
    pub fn set_full_update_requested(&mut self) {
        self.full_update_requested = true;
    }

    pub fn set_excluded_region(&mut self, excluded: &Region) {
        self.keeper
            .lock()
            .expect("keeper lock poisoned")
            .set_excluded_region(excluded);
    }

    /// Cheap pre-flight: is there anything at all pending for the area
    /// a client cares about? Answers are rate limited so idle senders
    /// polling in a tight loop do not hammer the keeper lock.
    pub fn check_for_updates(&mut self, interest: &Region) -> bool {
        if let Some(at) = self.last_check {
            if at.elapsed() < CHECK_INTERVAL {
                return false;
            }
        }
        self.last_check = Some(Instant::now());

        let mut peek = UpdateContainer::new();
        self.keeper
            .lock()
            .expect("keeper lock poisoned")
            .peek(&mut peek);
        if peek.cursor_pos_changed || peek.cursor_shape_changed || peek.screen_size_changed {
            return true;
        }
        let mut pending = peek.changed_region;
        pending.add(&peek.copied_region);
        pending.intersect(interest);
        !pending.is_empty()
    }

    /// Pull the pending snapshot and bring the screen buffer up to date
    /// for every area the snapshot reports.
    pub fn extract(&mut self, container: &mut UpdateContainer) -> Result<(), RfbError> {
        // Window moves are only observable at extraction time.
        {
            let mut keeper = self.keeper.lock().expect("keeper lock poisoned");
            self.copyrect.detect(&mut keeper);
            if self.full_update_requested {
                keeper.mark_whole_screen_changed();
            }
            keeper.extract(container);
        }

        if self.driver.properties_changed() {
            self.handle_property_drift(container)?;
        }

        // Refresh the pixels behind everything we are about to report.
        for rect in container.changed_region.rects().to_vec() {
            self.driver.grab(&rect)?;
        }
        for rect in container.copied_region.rects().to_vec() {
            self.driver.grab(&rect)?;
        }

        let fb_rect = self.driver.screen_dimension().rect();
        container.video_region = self.video.region().clone();
        container.video_region.crop(&fb_rect);
        // Streamed areas need no lossless resend.
        container.changed_region.subtract(&container.video_region);

        let full_requested = self.full_update_requested;
        self.full_update_requested = false;

        if !container.screen_size_changed && !full_requested {
            UpdateFilter::filter(
                &mut container.changed_region,
                self.driver.screen_buffer(),
                &self.backup,
            );
        }

        // One-shot: the first extraction covers the whole screen. Added
        // after the filter so an unchanged screen still gets reported.
        if self.initial_frame_pending {
            self.initial_frame_pending = false;
            let full = self.driver.screen_dimension().rect();
            self.driver.grab(&full)?;
            container.changed_region.add_rect(&full);
        }

        self.roll_backup_forward(container)?;

        if container.cursor_shape_changed || full_requested {
            self.regrab_cursor_shape()?;
            container.cursor_shape_changed = true;
        }

        Ok(())
    }

    /// The display changed size or format underneath us. Re-allocate
    /// both buffers and report everything as changed; per-pixel
    /// reconciliation across a mode switch is not worth the complexity.
    fn handle_property_drift(&mut self, container: &mut UpdateContainer) -> Result<(), RfbError> {
        let size_changed = self.driver.screen_size_changed();
        self.driver.apply_new_properties()?;
        let dim = self.driver.screen_dimension();
        debug!(width = dim.width, height = dim.height, "screen properties changed");

        self.driver.grab(&dim.rect())?;
        self.backup.clone_from_fb(self.driver.screen_buffer());

        let mut keeper = self.keeper.lock().expect("keeper lock poisoned");
        keeper.set_border_rect(dim.rect());

        container.clear();
        container.screen_size_changed = size_changed;
        container.changed_region = Region::from_rect(&dim.rect());
        Ok(())
    }

    /// Copy the reported areas from the screen into the backup so the
    /// next filter pass diffs against what clients were just told.
    fn roll_backup_forward(&mut self, container: &UpdateContainer) -> Result<(), RfbError> {
        if !self.backup.same_properties(self.driver.screen_buffer()) {
            self.backup.clone_from_fb(self.driver.screen_buffer());
            return Ok(());
        }
        let mut reported = container.changed_region.clone();
        reported.add(&container.copied_region);
        reported.add(&container.video_region);
        for rect in reported.rects() {
            self.backup
                .copy_rect_from(rect, self.driver.screen_buffer(), rect.left, rect.top)?;
        }
        Ok(())
    }

    fn regrab_cursor_shape(&mut self) -> Result<(), RfbError> {
        if let Some(grabber) = &mut self.shape_grabber {
            self.cursor_shape = grabber.grab_shape()?;
        }
        Ok(())
    }
}
