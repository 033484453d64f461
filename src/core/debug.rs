//! Frame statistics

use std::collections::VecDeque;
use std::time::Duration;

use crate::renderer::RenderStats;

const SAMPLES: usize = 120;

/// Rolling frame-time history
#[derive(Debug, Clone)]
pub struct FrameStats {
    samples: VecDeque<Duration>,
    total: Duration,
    frames: u64,
}

impl FrameStats {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(SAMPLES),
            total: Duration::ZERO,
            frames: 0,
        }
    }

    pub fn record_frame(&mut self, delta: Duration) {
        self.frames += 1;
        if self.samples.len() == SAMPLES
            && let Some(oldest) = self.samples.pop_front()
        {
            self.total -= oldest;
        }
        self.samples.push_back(delta);
        self.total += delta;
    }

    /// Frames per second over the window, `0` before any time has passed.
    pub fn fps(&self) -> f32 {
        let secs = self.total.as_secs_f32();
        if secs > 0.0 {
            self.samples.len() as f32 / secs
        } else {
            0.0
        }
    }

    pub fn avg_frame_time_ms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.total.as_secs_f32() * 1000.0 / self.samples.len() as f32
    }

    /// Slowest frame in the window
    pub fn worst_frame_time_ms(&self) -> f32 {
        self.samples
            .iter()
            .max()
            .map_or(0.0, |d| d.as_secs_f32() * 1000.0)
    }

    pub const fn total_frames(&self) -> u64 {
        self.frames
    }

    /// One-line summary combining timing with the renderer's counters.
    pub fn summary(&self, render: &RenderStats) -> String {
        format!(
            "FPS: {:.1} | {:.2}ms (worst {:.2}) | deferred {} forward {} casters {} lights {} | skipped {}",
            self.fps(),
            self.avg_frame_time_ms(),
            self.worst_frame_time_ms(),
            render.deferred_draws,
            render.forward_draws,
            render.shadow_casters,
            render.lights,
            render.skipped_frames,
        )
    }
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_drops_oldest_samples() {
        let mut stats = FrameStats::new();
        stats.record_frame(Duration::from_millis(100));
        for _ in 0..SAMPLES {
            stats.record_frame(Duration::from_millis(10));
        }
        assert_eq!(stats.total_frames(), SAMPLES as u64 + 1);
        assert!((stats.fps() - 100.0).abs() < 0.01);
        assert!((stats.worst_frame_time_ms() - 10.0).abs() < 0.01);
    }

    #[test]
    fn test_empty_stats_are_zero() {
        let stats = FrameStats::new();
        assert_eq!(stats.fps(), 0.0);
        assert_eq!(stats.avg_frame_time_ms(), 0.0);
        assert!(stats.summary(&RenderStats::default()).starts_with("FPS: 0.0"));
    }
}
