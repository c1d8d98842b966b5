//! Frame timing.

use std::time::{Duration, Instant};

/// Measures per-frame delta time and a once-per-second frame rate.
#[derive(Debug)]
pub struct FrameTimer {
    start: Instant,
    last_tick: Instant,
    window_start: Instant,
    window_frames: u32,
}

impl FrameTimer {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            window_start: now,
            window_frames: 0,
        }
    }

    /// Total time since the timer was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Seconds since the previous call to `tick`, and counts one frame.
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        self.window_frames += 1;
        delta.as_secs_f32()
    }

    /// Returns the frame rate once at least a second has passed since the
    /// last report, then starts a new measuring window.
    pub fn take_fps(&mut self) -> Option<f32> {
        let window = self.window_start.elapsed();
        if window < Duration::from_secs(1) {
            return None;
        }
        let fps = self.window_frames as f32 / window.as_secs_f32();
        self.window_start = Instant::now();
        self.window_frames = 0;
        Some(fps)
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}
