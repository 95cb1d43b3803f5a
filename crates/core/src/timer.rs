//! High-resolution timer for frame timing.

use std::time::{Duration, Instant};

/// High-resolution timer for measuring elapsed time.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    last_tick: Instant,
    last_lap: Instant,
}

impl Timer {
    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            last_lap: now,
        }
    }

    /// Get the total elapsed time since the timer was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Get the elapsed time in seconds since the timer was created.
    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed().as_secs_f32()
    }

    /// Get the time elapsed since the last call to `tick()`.
    /// This is the frame delta in a render loop.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        delta
    }

    /// Returns the time since the previous lap once at least `period` has
    /// passed, starting a new lap; `None` otherwise. Drives periodic stats.
    pub fn lap(&mut self, period: Duration) -> Option<Duration> {
        let now = Instant::now();
        let since = now - self.last_lap;
        if since < period {
            return None;
        }
        self.last_lap = now;
        Some(since)
    }

    /// Reset the timer to the current time.
    pub fn reset(&mut self) {
        let now = Instant::now();
        self.start = now;
        self.last_tick = now;
        self.last_lap = now;
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
