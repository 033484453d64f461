//! Frame pacing and per-frame planning
//!
//! Every CPU-written per-frame resource is replicated once per frame slot.
//! Before slot `i` is reused its previous fence is waited on, with a bound:
//! a fence that never signals is reported as a lost device instead of
//! hanging the render thread.
//!
//! [`FrameScheduler`] is the backend-agnostic half of the renderer. It
//! combines frame sync, the shadow state machine, the command queues and the
//! compiled frame graph into a [`FramePlan`], which the GPU backend then
//! records. Tests drive it with [`SimFence`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use glam::Vec3;

use super::cmd::PrimitiveRenderCmd;
use super::error::RenderError;
use super::graph::{CompiledGraph, GraphOptions, PassAction, PassId, frame_graph};
use super::queue::RenderQueues;
use super::shadow::{ShadowMapSystem, ShadowWork};

/// Default bound on a single fence wait
pub const DEFAULT_FENCE_TIMEOUT: Duration = Duration::from_secs(2);

// ============================================================================
// Fences
// ============================================================================

/// Completion signal for one submitted frame.
pub trait Fence {
    /// Block until signalled or `timeout` elapses. Returns whether the fence
    /// signalled.
    fn wait(&self, timeout: Duration) -> bool;

    fn is_signaled(&self) -> bool;
}

/// CPU-side fence for headless runs and tests. Clones share one flag.
#[derive(Debug, Clone, Default)]
pub struct SimFence {
    signaled: Arc<AtomicBool>,
}

impl SimFence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the simulated GPU work as complete.
    pub fn signal(&self) {
        self.signaled.store(true, Ordering::Release);
    }
}

impl Fence for SimFence {
    fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_signaled() {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::yield_now();
        }
        true
    }

    fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }
}

// ============================================================================
// Frame Sync
// ============================================================================

/// Slot acquired for recording one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSlot {
    /// `frame_number % frame_count`
    pub index: usize,
    pub frame_number: u64,
}

/// One in-flight fence per frame slot.
#[derive(Debug)]
pub struct FrameSync<F> {
    fences: Vec<Option<F>>,
    frame_number: u64,
    timeout: Duration,
}

impl<F: Fence> FrameSync<F> {
    #[must_use]
    pub fn new(frame_count: usize, timeout: Duration) -> Self {
        let mut fences = Vec::with_capacity(frame_count.max(1));
        fences.resize_with(frame_count.max(1), || None);
        Self {
            fences,
            frame_number: 0,
            timeout,
        }
    }

    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.fences.len()
    }

    /// Frames submitted so far.
    #[must_use]
    pub const fn frame_number(&self) -> u64 {
        self.frame_number
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Index the next frame will record into.
    #[must_use]
    pub fn current_index(&self) -> usize {
        (self.frame_number % self.fences.len() as u64) as usize
    }

    /// Whether the CPU may write slot `index` without racing the GPU.
    #[must_use]
    pub fn is_slot_writable(&self, index: usize) -> bool {
        self.fences
            .get(index)
            .is_some_and(|fence| fence.as_ref().is_none_or(Fence::is_signaled))
    }

    /// Number of submitted frames the GPU has not finished.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.fences
            .iter()
            .flatten()
            .filter(|fence| !fence.is_signaled())
            .count()
    }

    /// Wait for the slot's previous frame to retire and hand the slot out.
    ///
    /// # Errors
    ///
    /// `DeviceLost` when the previous fence does not signal within the
    /// configured timeout.
    pub fn begin_frame(&mut self) -> Result<FrameSlot, RenderError> {
        let index = self.current_index();
        if let Some(fence) = &self.fences[index] {
            if !fence.wait(self.timeout) {
                return Err(RenderError::DeviceLost {
                    slot: index,
                    waited: self.timeout,
                });
            }
        }
        self.fences[index] = None;
        Ok(FrameSlot {
            index,
            frame_number: self.frame_number,
        })
    }

    /// Record the fence guarding `slot`'s GPU work and advance the frame.
    pub fn submit(&mut self, slot: FrameSlot, fence: F) {
        debug_assert_eq!(slot.frame_number, self.frame_number, "stale frame slot");
        self.fences[slot.index] = Some(fence);
        self.frame_number += 1;
    }

    /// Block until every submitted frame retired.
    ///
    /// # Errors
    ///
    /// `DeviceLost` on the first fence that times out.
    pub fn wait_idle(&mut self) -> Result<(), RenderError> {
        for (slot, fence) in self.fences.iter_mut().enumerate() {
            if let Some(f) = fence {
                if !f.wait(self.timeout) {
                    return Err(RenderError::DeviceLost {
                        slot,
                        waited: self.timeout,
                    });
                }
            }
            *fence = None;
        }
        Ok(())
    }

    /// Drain the GPU and change the number of slots.
    ///
    /// # Errors
    ///
    /// Propagates [`FrameSync::wait_idle`].
    pub fn resize(&mut self, frame_count: usize) -> Result<(), RenderError> {
        self.wait_idle()?;
        self.fences.clear();
        self.fences.resize_with(frame_count.max(1), || None);
        Ok(())
    }
}

/// One `T` per frame slot.
#[derive(Debug, Clone)]
pub struct PerFrame<T> {
    items: Vec<T>,
}

impl<T> PerFrame<T> {
    pub fn new(frame_count: usize, mut create: impl FnMut(usize) -> T) -> Self {
        Self {
            items: (0..frame_count.max(1)).map(&mut create).collect(),
        }
    }

    #[must_use]
    pub fn get(&self, slot: FrameSlot) -> &T {
        &self.items[slot.index % self.items.len()]
    }

    pub fn get_mut(&mut self, slot: FrameSlot) -> &mut T {
        let len = self.items.len();
        &mut self.items[slot.index % len]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}

// ============================================================================
// Frame Scheduler
// ============================================================================

/// Everything the backend needs to record one frame.
#[derive(Debug, Clone)]
pub struct FramePlan {
    pub slot: FrameSlot,
    pub graph: Arc<CompiledGraph>,
    pub shadow: ShadowWork,
}

impl FramePlan {
    /// Whether `id` records real work this frame.
    #[must_use]
    pub fn executes(&self, id: PassId) -> bool {
        self.graph
            .pass(id)
            .is_some_and(|pass| pass.action == PassAction::Execute)
    }

    #[must_use]
    pub const fn frame_number(&self) -> u64 {
        self.slot.frame_number
    }
}

/// Backend-agnostic per-frame orchestration.
#[derive(Debug)]
pub struct FrameScheduler<F> {
    sync: FrameSync<F>,
    shadows: ShadowMapSystem,
    queues: RenderQueues,
    options: GraphOptions,
    graph: Option<(GraphOptions, Arc<CompiledGraph>)>,
}

impl<F: Fence> FrameScheduler<F> {
    #[must_use]
    pub fn new(frame_count: usize, timeout: Duration) -> Self {
        Self {
            sync: FrameSync::new(frame_count, timeout),
            shadows: ShadowMapSystem::new(),
            queues: RenderQueues::new(),
            options: GraphOptions::default(),
            graph: None,
        }
    }

    #[must_use]
    pub const fn sync(&self) -> &FrameSync<F> {
        &self.sync
    }

    #[must_use]
    pub const fn shadows(&self) -> &ShadowMapSystem {
        &self.shadows
    }

    pub fn shadows_mut(&mut self) -> &mut ShadowMapSystem {
        &mut self.shadows
    }

    #[must_use]
    pub const fn queues(&self) -> &RenderQueues {
        &self.queues
    }

    #[must_use]
    pub const fn options(&self) -> GraphOptions {
        self.options
    }

    /// Takes effect at the next `begin_frame`.
    pub fn set_options(&mut self, options: GraphOptions) {
        self.options = options;
    }

    /// Queue a primitive for this frame. See [`RenderQueues::push_mesh_render`].
    pub fn push_mesh_render(&mut self, cmd: PrimitiveRenderCmd) -> bool {
        self.queues.push_mesh_render(cmd)
    }

    pub fn signal_static_map_update(&mut self) {
        self.shadows.signal_static_map_update();
    }

    /// Feed the current sun and sky color to the shadow system.
    pub fn observe_sky(&mut self, sun_direction: Vec3, air_color: Vec3) -> bool {
        self.shadows.observe_sky(sun_direction, air_color)
    }

    fn compiled_graph(&mut self) -> Result<Arc<CompiledGraph>, RenderError> {
        if let Some((options, graph)) = &self.graph {
            if *options == self.options {
                return Ok(Arc::clone(graph));
            }
        }
        let graph = Arc::new(frame_graph(self.options)?);
        log::debug!(
            "Compiled frame graph: {} passes, {} sync edges ({:?})",
            graph.passes().len(),
            graph.edge_count(),
            self.options
        );
        self.graph = Some((self.options, Arc::clone(&graph)));
        Ok(graph)
    }

    /// Acquire a frame slot, sort the queues and plan the frame.
    ///
    /// # Errors
    ///
    /// `DeviceLost` when the slot's previous frame never retires.
    pub fn begin_frame(&mut self, eye: Vec3) -> Result<FramePlan, RenderError> {
        let slot = self.sync.begin_frame()?;
        let graph = self.compiled_graph()?;

        let static_set_changed = self.queues.take_static_set_change();
        let shadow = self.shadows.begin_frame(self.options.shadows, static_set_changed);
        self.queues.sort(eye);

        Ok(FramePlan {
            slot,
            graph,
            shadow,
        })
    }

    /// Hand the frame's fence over and reset the queues.
    pub fn submit(&mut self, plan: &FramePlan, fence: F) {
        self.sync.submit(plan.slot, fence);
        self.shadows.finish_frame();
        self.queues.clear();
    }

    /// Drop this frame's commands without recording anything.
    pub fn skip_frame(&mut self) {
        self.shadows.abort_frame();
        self.queues.clear();
    }

    /// Drop queued commands outside a frame.
    pub fn clear_queues(&mut self) {
        self.queues.clear();
    }

    /// # Errors
    ///
    /// See [`FrameSync::wait_idle`].
    pub fn wait_idle(&mut self) -> Result<(), RenderError> {
        self.sync.wait_idle()
    }

    /// # Errors
    ///
    /// See [`FrameSync::resize`].
    pub fn set_frame_count(&mut self, frame_count: usize) -> Result<(), RenderError> {
        if frame_count != self.sync.frame_count() {
            self.sync.resize(frame_count)?;
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SHORT: Duration = Duration::from_millis(5);

    #[test]
    fn test_slots_rotate() {
        let mut sync: FrameSync<SimFence> = FrameSync::new(3, SHORT);
        let mut indices = Vec::new();
        for _ in 0..6 {
            let slot = sync.begin_frame().unwrap();
            indices.push(slot.index);
            let fence = SimFence::new();
            fence.signal();
            sync.submit(slot, fence);
        }
        assert_eq!(indices, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn test_unsignaled_fence_reports_device_lost() {
        let mut sync: FrameSync<SimFence> = FrameSync::new(1, SHORT);
        let slot = sync.begin_frame().unwrap();
        sync.submit(slot, SimFence::new());

        let err = sync.begin_frame().unwrap_err();
        assert!(matches!(err, RenderError::DeviceLost { slot: 0, .. }));
        assert_eq!(sync.in_flight(), 1);
    }

    #[test]
    fn test_skipped_frame_reuses_slot() {
        let mut sync: FrameSync<SimFence> = FrameSync::new(2, SHORT);
        let first = sync.begin_frame().unwrap();
        let again = sync.begin_frame().unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn test_resize_drains_and_resets() {
        let mut sync: FrameSync<SimFence> = FrameSync::new(2, SHORT);
        let slot = sync.begin_frame().unwrap();
        let fence = SimFence::new();
        sync.submit(slot, fence.clone());
        fence.signal();

        sync.resize(3).unwrap();
        assert_eq!(sync.frame_count(), 3);
        assert_eq!(sync.in_flight(), 0);
    }

    #[test]
    fn test_per_frame_indexing() {
        let frames = PerFrame::new(2, |i| i * 10);
        let slot = FrameSlot {
            index: 1,
            frame_number: 5,
        };
        assert_eq!(*frames.get(slot), 10);
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn test_graph_is_cached_until_options_change() {
        let mut scheduler: FrameScheduler<SimFence> = FrameScheduler::new(2, SHORT);
        let a = scheduler.begin_frame(Vec3::ZERO).unwrap();
        let fence = SimFence::new();
        fence.signal();
        scheduler.submit(&a, fence);

        let b = scheduler.begin_frame(Vec3::ZERO).unwrap();
        assert!(Arc::ptr_eq(&a.graph, &b.graph));
        scheduler.skip_frame();

        scheduler.set_options(GraphOptions {
            bloom: false,
            ..scheduler.options()
        });
        let c = scheduler.begin_frame(Vec3::ZERO).unwrap();
        assert!(!Arc::ptr_eq(&a.graph, &c.graph));
        assert!(!c.executes(PassId::Glow));
    }
}
