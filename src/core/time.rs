//! Frame timing

use std::time::{Duration, Instant};

/// Longest step handed to game logic, so a stall does not teleport the
/// simulation.
pub const MAX_DELTA: Duration = Duration::from_millis(250);

/// Wall-clock frame timer
#[derive(Debug, Clone)]
pub struct Time {
    start: Instant,
    last: Instant,
    delta: Duration,
    frame: u64,
}

impl Time {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last: now,
            delta: Duration::ZERO,
            frame: 0,
        }
    }

    /// Start a new frame.
    pub fn update(&mut self) {
        self.tick(Instant::now());
    }

    fn tick(&mut self, now: Instant) {
        self.delta = now.saturating_duration_since(self.last).min(MAX_DELTA);
        self.last = now;
        self.frame += 1;
    }

    /// Clamped time since the previous frame
    pub const fn delta(&self) -> Duration {
        self.delta
    }

    pub fn delta_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    pub fn elapsed(&self) -> Duration {
        self.last.saturating_duration_since(self.start)
    }

    pub const fn frame(&self) -> u64 {
        self.frame
    }

    /// Time left to sleep so the frame takes at least `1 / fps`.
    pub fn frame_budget_remaining(&self, fps: Option<u32>) -> Option<Duration> {
        let fps = fps.filter(|&fps| fps > 0)?;
        let target = Duration::from_secs_f64(1.0 / f64::from(fps));
        target.checked_sub(self.last.elapsed())
    }
}

impl Default for Time {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_is_clamped() {
        let mut time = Time::new();
        let later = time.last + Duration::from_secs(3);
        time.tick(later);
        assert_eq!(time.delta(), MAX_DELTA);
        assert_eq!(time.frame(), 1);
        assert_eq!(time.elapsed(), Duration::from_secs(3));
    }

    #[test]
    fn test_unlimited_frame_rate_has_no_budget() {
        let time = Time::new();
        assert!(time.frame_budget_remaining(None).is_none());
        assert!(time.frame_budget_remaining(Some(0)).is_none());
    }
}
