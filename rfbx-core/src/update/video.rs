//! Video region tracking.
//!
//! Areas playing video are better served by the streaming encoder than
//! by lossless rect updates. A provider (window-class matcher, client
//! hint, heuristic) reports where video currently plays; the tracker
//! caches that answer and re-queries at most once per interval, since
//! enumerating windows is costly relative to the update tick.

use std::time::{Duration, Instant};

use crate::region::Region;

/// Supplies the current set of on-screen video areas.
pub trait VideoRegionProvider: Send {
    fn video_region(&mut self) -> Region;
}

/// Caches the provider's answer between refreshes.
pub struct VideoRegionTracker {
    provider: Option<Box<dyn VideoRegionProvider>>,
    interval: Duration,
    last_refresh: Option<Instant>,
    current: Region,
}

impl VideoRegionTracker {
    /// A tracker with no provider always reports an empty region.
    pub fn new(provider: Option<Box<dyn VideoRegionProvider>>, interval: Duration) -> Self {
        Self {
            provider,
            interval,
            last_refresh: None,
            current: Region::new(),
        }
    }

    /// The current video region, re-queried from the provider if the
    /// refresh interval has elapsed.
    pub fn region(&mut self) -> &Region {
        let due = match self.last_refresh {
            None => true,
            Some(at) => at.elapsed() >= self.interval,
        };
        if due {
            if let Some(provider) = &mut self.provider {
                self.current = provider.video_region();
            }
            self.last_refresh = Some(Instant::now());
        }
        &self.current
    }
}
