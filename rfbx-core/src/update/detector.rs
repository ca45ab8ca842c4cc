//! Change detectors feeding the update keeper.
//!
//! Each detector runs as a Tokio task: the poller sweeps the screen in
//! horizontal strips, the mouse detectors watch the cursor position and
//! shape. They all write into a shared [`UpdateKeeper`] and poke an
//! [`UpdateListener`] so the sender side wakes up. The poller
//! over-reports on purpose; the update filter discards the strips whose
//! pixels did not actually change.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::region::{Point, Rect};
use crate::update::keeper::UpdateKeeper;

/// Strips per full-screen sweep of the poller.
const POLL_STRIPS: i32 = 16;

// ── Seams ────────────────────────────────────────────────────────

/// Callback fired after a detector deposited something in the keeper.
pub trait UpdateListener: Send + Sync {
    fn on_update(&self);
}

/// Reports the current pointer position.
pub trait CursorPosSource: Send {
    fn cursor_pos(&mut self) -> Point;
}

/// Reports a counter that changes whenever the cursor image changes.
/// Comparing counters is much cheaper than comparing pixel data.
pub trait CursorShapeSource: Send {
    fn shape_generation(&mut self) -> u64;
}

/// Hook for platforms that can observe window moves as copy operations.
/// The default detects nothing; moved windows then fall back to plain
/// changed-region updates.
pub trait CopyRectDetector: Send {
    fn detect(&mut self, keeper: &mut UpdateKeeper) {
        let _ = keeper;
    }
}

/// The no-op detector used where the platform offers no move events.
pub struct NoCopyRectDetector;

impl CopyRectDetector for NoCopyRectDetector {}

// ── DetectorSet ──────────────────────────────────────────────────

/// Owns the detector tasks and their shared cancellation token.
pub struct DetectorSet {
    keeper: Arc<Mutex<UpdateKeeper>>,
    listener: Arc<dyn UpdateListener>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl DetectorSet {
    pub fn new(keeper: Arc<Mutex<UpdateKeeper>>, listener: Arc<dyn UpdateListener>) -> Self {
        Self {
            keeper,
            listener,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    /// Start the strip poller. Each tick marks one horizontal strip of
    /// the bordered area as changed, cycling top to bottom.
    pub fn spawn_poller(&mut self, interval: Duration) {
        let keeper = Arc::clone(&self.keeper);
        let listener = Arc::clone(&self.listener);
        let cancel = self.cancel.clone();
        self.tasks.push(tokio::spawn(async move {
            let mut strip_index: i32 = 0;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                {
                    let mut keeper = keeper.lock().expect("keeper lock poisoned");
                    let border = keeper.border_rect();
                    let strip = poll_strip(&border, strip_index);
                    keeper.add_changed_rect(&strip);
                }
                strip_index = (strip_index + 1) % POLL_STRIPS;
                listener.on_update();
            }
            debug!("poller stopped");
        }));
    }

    /// Start the cursor position detector.
    pub fn spawn_mouse_detector(&mut self, mut source: Box<dyn CursorPosSource>, interval: Duration) {
        let keeper = Arc::clone(&self.keeper);
        let listener = Arc::clone(&self.listener);
        let cancel = self.cancel.clone();
        self.tasks.push(tokio::spawn(async move {
            let mut last = source.cursor_pos();
            keeper
                .lock()
                .expect("keeper lock poisoned")
                .set_cursor_pos(last);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                let pos = source.cursor_pos();
                if pos != last {
                    last = pos;
                    keeper
                        .lock()
                        .expect("keeper lock poisoned")
                        .set_cursor_pos_changed(pos);
                    listener.on_update();
                }
            }
        }));
    }

    /// Start the cursor shape detector.
    pub fn spawn_shape_detector(
        &mut self,
        mut source: Box<dyn CursorShapeSource>,
        interval: Duration,
    ) {
        let keeper = Arc::clone(&self.keeper);
        let listener = Arc::clone(&self.listener);
        let cancel = self.cancel.clone();
        self.tasks.push(tokio::spawn(async move {
            let mut last = source.shape_generation();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                let generation = source.shape_generation();
                if generation != last {
                    last = generation;
                    keeper
                        .lock()
                        .expect("keeper lock poisoned")
                        .set_cursor_shape_changed();
                    listener.on_update();
                }
            }
        }));
    }

    /// Stop all detectors and wait for their tasks to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

/// Horizontal strip `index` (mod [`POLL_STRIPS`]) of `border`.
fn poll_strip(border: &Rect, index: i32) -> Rect {
    let height = border.height();
    if height <= 0 {
        return Rect::EMPTY;
    }
    let strips = POLL_STRIPS.min(height);
    let index = index % strips;
    let top = border.top + height * index / strips;
    let bottom = border.top + height * (index + 1) / strips;
    Rect::new(border.left, top, border.right, bottom)
}
