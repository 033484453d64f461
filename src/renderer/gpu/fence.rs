//! Frame fence backed by the queue's completion callback

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::renderer::frame::Fence;

/// Signalled once every submission made before its creation has finished.
#[derive(Debug, Clone)]
pub struct GpuFence {
    signaled: Arc<AtomicBool>,
    device: Arc<wgpu::Device>,
}

impl GpuFence {
    /// Create right after `queue.submit` for the frame it guards.
    pub fn after_submit(device: &Arc<wgpu::Device>, queue: &wgpu::Queue) -> Self {
        let signaled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&signaled);
        queue.on_submitted_work_done(move || flag.store(true, Ordering::Release));
        Self {
            signaled,
            device: Arc::clone(device),
        }
    }
}

impl Fence for GpuFence {
    fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            // Callbacks only fire from inside poll.
            self.device.poll(wgpu::Maintain::Poll);
            if self.is_signaled() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_micros(200));
        }
    }

    fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }
}
