//! CPU frame timing.

use std::time::{Duration, Instant};

/// Number of frames averaged by [`FrameTimer::average_frame_time`].
const AVERAGE_WINDOW: usize = 60;

/// Measures the CPU time between consecutive run loop iterations.
#[derive(Debug)]
pub struct FrameTimer {
    start: Instant,
    last_tick: Instant,
    last_delta: Duration,
    history: [Duration; AVERAGE_WINDOW],
    cursor: usize,
    samples: usize,
}

impl FrameTimer {
    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            last_delta: Duration::ZERO,
            history: [Duration::ZERO; AVERAGE_WINDOW],
            cursor: 0,
            samples: 0,
        }
    }

    /// Total time since the timer was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Marks the start of a new iteration and returns the time since the previous one.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        self.record(delta);
        delta
    }

    fn record(&mut self, delta: Duration) {
        self.last_delta = delta;
        self.history[self.cursor] = delta;
        self.cursor = (self.cursor + 1) % AVERAGE_WINDOW;
        self.samples = (self.samples + 1).min(AVERAGE_WINDOW);
    }

    /// Delta measured by the most recent `tick()`.
    pub fn last_delta(&self) -> Duration {
        self.last_delta
    }

    /// Mean of the last (up to 60) frame deltas.
    pub fn average_frame_time(&self) -> Duration {
        if self.samples == 0 {
            return Duration::ZERO;
        }
        let total: Duration = self.history.iter().take(self.samples).sum();
        total / self.samples as u32
    }

    /// Frames per second derived from the rolling average, or 0 before the first tick.
    pub fn fps(&self) -> f32 {
        let average = self.average_frame_time().as_secs_f32();
        if average > 0.0 { 1.0 / average } else { 0.0 }
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}
