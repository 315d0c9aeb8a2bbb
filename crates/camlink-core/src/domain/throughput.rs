//! Rolling frames-per-second counter.
//!
//! Frames are counted into a fixed window (one second by default).  When a
//! window closes its count becomes the reported rate and a fresh window
//! starts.  If more than one whole window passes without a roll, the last
//! complete window was empty and the rate is 0.
//!
//! Every operation has an `_at(now)` twin taking an explicit instant so that
//! callers driving a mocked clock (and tests) stay deterministic.

use std::time::{Duration, Instant};

/// Default measurement window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

/// Frames counted so far in the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThroughputSample {
    pub frames_in_window: u32,
    pub window_start: Instant,
}

#[derive(Debug, Clone)]
pub struct ThroughputMonitor {
    window: Duration,
    sample: ThroughputSample,
    last_rate: f64,
    total_frames: u64,
}

impl Default for ThroughputMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ThroughputMonitor {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW, Instant::now())
    }

    /// Creates a monitor whose first window starts at `start`.
    ///
    /// A zero `window` is bumped to one millisecond.
    pub fn with_window(window: Duration, start: Instant) -> Self {
        Self {
            window: window.max(Duration::from_millis(1)),
            sample: ThroughputSample {
                frames_in_window: 0,
                window_start: start,
            },
            last_rate: 0.0,
            total_frames: 0,
        }
    }

    pub fn on_frame_received(&mut self) {
        self.on_frame_received_at(Instant::now());
    }

    pub fn on_frame_received_at(&mut self, now: Instant) {
        self.roll(now);
        self.sample.frames_in_window = self.sample.frames_in_window.saturating_add(1);
        self.total_frames += 1;
    }

    /// Frames per second over the last complete window.
    pub fn current_rate(&mut self) -> f64 {
        self.current_rate_at(Instant::now())
    }

    pub fn current_rate_at(&mut self, now: Instant) -> f64 {
        self.roll(now);
        self.last_rate
    }

    /// Starts over from `now`, e.g. when a new connection epoch begins.
    /// The lifetime total is kept.
    pub fn reset(&mut self, now: Instant) {
        self.sample = ThroughputSample {
            frames_in_window: 0,
            window_start: now,
        };
        self.last_rate = 0.0;
    }

    pub fn sample(&self) -> ThroughputSample {
        self.sample
    }

    /// Frames seen since the monitor was created.
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    fn roll(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.sample.window_start);
        if elapsed < self.window {
            return;
        }
        if elapsed < self.window * 2 {
            self.last_rate = f64::from(self.sample.frames_in_window) / self.window.as_secs_f64();
            self.sample.window_start += self.window;
        } else {
            self.last_rate = 0.0;
            self.sample.window_start = now;
        }
        self.sample.frames_in_window = 0;
    }
}
