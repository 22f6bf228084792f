//! Progress report throttling

use std::time::{Duration, Instant};

/// Rate limiter for progress reports
///
/// A report goes out only when the percentage moved by at least `step` since
/// the last report *and* at least `interval` passed. Both start from 0 % at
/// the moment the throttle was created.
#[derive(Clone, Debug)]
pub struct ProgressThrottle {
    interval: Duration,
    step: f32,
    last_percent: f32,
    last_at: Instant,
}

impl ProgressThrottle {
    /// Create a throttle whose clock starts at `started`
    pub fn new(interval: Duration, step: f32, started: Instant) -> Self {
        Self {
            interval,
            step,
            last_percent: 0.0,
            last_at: started,
        }
    }

    /// Whether `percent` observed at `now` should be reported
    ///
    /// Records the report when it returns `true`.
    pub fn should_report(&mut self, percent: f32, now: Instant) -> bool {
        let waited = now.saturating_duration_since(self.last_at) >= self.interval;
        let moved = (percent - self.last_percent).abs() >= self.step;
        if waited && moved {
            self.last_percent = percent;
            self.last_at = now;
            true
        } else {
            false
        }
    }
}
