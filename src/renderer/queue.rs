//! Per-frame render queues
//!
//! Every pushed command is classified twice: forward vs deferred by its
//! blending bits, and static vs dynamic by `STATIC`. The main passes read the
//! first partition, the shadow system the second. Only commands flagged
//! `SHADOWS` are drawn into the shadow maps, but every static command counts
//! towards the static set.

use std::hash::{Hash, Hasher};

use glam::Vec3;
use rustc_hash::FxHasher;

use super::cmd::{PrimitiveRenderCmd, RenderFlags};
use super::cmd_list::{CmdList, back_to_front, front_to_back};

/// Initial capacity of each list
const INITIAL_CAPACITY: usize = 256;

/// Order-independent digest of the static caster set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct StaticSetDigest {
    sum: u64,
    xor: u64,
    count: u32,
}

impl StaticSetDigest {
    fn add(&mut self, cmd: &PrimitiveRenderCmd) {
        let mut hasher = FxHasher::default();
        cmd.mesh.hash(&mut hasher);
        cmd.descriptor.hash(&mut hasher);
        cmd.primitive.hash(&mut hasher);
        cmd.flags.hash(&mut hasher);
        let h = hasher.finish();
        self.sum = self.sum.wrapping_add(h);
        self.xor ^= h.rotate_left(17);
        self.count += 1;
    }
}

/// The four command lists rebuilt each frame.
#[derive(Debug)]
pub struct RenderQueues {
    deferred: CmdList<PrimitiveRenderCmd>,
    forward: CmdList<PrimitiveRenderCmd>,
    static_casters: CmdList<PrimitiveRenderCmd>,
    dynamic_casters: CmdList<PrimitiveRenderCmd>,
    digest: StaticSetDigest,
    last_digest: Option<StaticSetDigest>,
}

impl Default for RenderQueues {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderQueues {
    #[must_use]
    pub fn new() -> Self {
        Self {
            deferred: CmdList::with_capacity(INITIAL_CAPACITY).with_comparator(front_to_back),
            forward: CmdList::with_capacity(INITIAL_CAPACITY).with_comparator(back_to_front),
            static_casters: CmdList::with_capacity(INITIAL_CAPACITY),
            dynamic_casters: CmdList::with_capacity(INITIAL_CAPACITY),
            digest: StaticSetDigest::default(),
            last_digest: None,
        }
    }

    /// Classify and store `cmd`. Commands without `RENDERABLE` are dropped
    /// and `false` is returned.
    pub fn push_mesh_render(&mut self, cmd: PrimitiveRenderCmd) -> bool {
        if !cmd.flags.contains(RenderFlags::RENDERABLE) {
            return false;
        }

        if cmd.flags.is_forward() {
            self.forward.push_back(cmd);
        } else {
            self.deferred.push_back(cmd);
        }

        if cmd.flags.contains(RenderFlags::STATIC) {
            self.digest.add(&cmd);
            self.static_casters.push_back(cmd);
        } else {
            self.dynamic_casters.push_back(cmd);
        }
        true
    }

    /// Fill in camera distances and sort the main lists.
    pub fn sort(&mut self, eye: Vec3) {
        for cmd in self.deferred.iter_mut().chain(self.forward.iter_mut()) {
            cmd.sort_distance = cmd.world_center.distance(eye);
        }
        self.deferred.sort();
        self.forward.sort();
    }

    /// True when the static caster set differs from the previous call.
    ///
    /// The first call always reports a change.
    pub fn take_static_set_change(&mut self) -> bool {
        let changed = self.last_digest != Some(self.digest);
        self.last_digest = Some(self.digest);
        changed
    }

    /// Empty every list for the next frame, keeping storage.
    pub fn clear(&mut self) {
        self.deferred.clear();
        self.forward.clear();
        self.static_casters.clear();
        self.dynamic_casters.clear();
        self.digest = StaticSetDigest::default();
    }

    #[must_use]
    pub const fn deferred(&self) -> &CmdList<PrimitiveRenderCmd> {
        &self.deferred
    }

    #[must_use]
    pub const fn forward(&self) -> &CmdList<PrimitiveRenderCmd> {
        &self.forward
    }

    #[must_use]
    pub const fn static_casters(&self) -> &CmdList<PrimitiveRenderCmd> {
        &self.static_casters
    }

    #[must_use]
    pub const fn dynamic_casters(&self) -> &CmdList<PrimitiveRenderCmd> {
        &self.dynamic_casters
    }

    /// Commands drawn into the static or the dynamic shadow map.
    pub fn shadow_casters(&self, static_map: bool) -> impl Iterator<Item = &PrimitiveRenderCmd> {
        let list = if static_map {
            &self.static_casters
        } else {
            &self.dynamic_casters
        };
        list.iter().filter(|cmd| cmd.flags.casts_shadows())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::cmd::PrimitiveRange;
    use crate::renderer::pool::Handle;

    fn cmd(id: u32, flags: RenderFlags) -> PrimitiveRenderCmd {
        PrimitiveRenderCmd::new(
            Handle::from_raw_parts(id, 0),
            Handle::from_raw_parts(id, 0),
            Handle::from_raw_parts(0, 0),
            PrimitiveRange::new(0, 36),
        )
        .with_flags(flags)
    }

    #[test]
    fn test_non_renderable_is_dropped() {
        let mut queues = RenderQueues::new();
        assert!(!queues.push_mesh_render(cmd(0, RenderFlags::STATIC)));
        assert!(queues.deferred().is_empty());
        assert!(queues.static_casters().is_empty());
    }

    #[test]
    fn test_partitions_are_orthogonal() {
        let mut queues = RenderQueues::new();
        let r = RenderFlags::RENDERABLE;
        queues.push_mesh_render(cmd(0, r | RenderFlags::STATIC));
        queues.push_mesh_render(cmd(1, r | RenderFlags::TRANSLUCENT | RenderFlags::STATIC));
        queues.push_mesh_render(cmd(2, r));

        assert_eq!(queues.deferred().len(), 2);
        assert_eq!(queues.forward().len(), 1);
        assert_eq!(queues.static_casters().len(), 2);
        assert_eq!(queues.dynamic_casters().len(), 1);
    }

    #[test]
    fn test_only_flagged_commands_cast_shadows() {
        let mut queues = RenderQueues::new();
        let r = RenderFlags::RENDERABLE;
        queues.push_mesh_render(cmd(0, r | RenderFlags::SHADOWS | RenderFlags::STATIC));
        queues.push_mesh_render(cmd(1, r | RenderFlags::STATIC));
        queues.push_mesh_render(cmd(2, r | RenderFlags::SHADOWS));
        queues.push_mesh_render(cmd(3, r | RenderFlags::SHADOWS | RenderFlags::DEBUG));
        queues.push_mesh_render(cmd(4, r | RenderFlags::DEBUG));

        let ids = |static_map| -> Vec<u32> {
            queues
                .shadow_casters(static_map)
                .map(|c| c.mesh.index())
                .collect()
        };
        assert_eq!(ids(true), vec![0]);
        assert_eq!(ids(false), vec![2]);
        // The static set itself still holds both static commands
        assert_eq!(queues.static_casters().len(), 2);
    }

    #[test]
    fn test_sort_orders_by_distance() {
        let mut queues = RenderQueues::new();
        let r = RenderFlags::RENDERABLE;
        for z in [5.0, 1.0, 3.0] {
            queues.push_mesh_render(cmd(0, r).with_world_center(Vec3::new(0.0, 0.0, z)));
            queues.push_mesh_render(
                cmd(0, r | RenderFlags::TRANSPARENT).with_world_center(Vec3::new(0.0, 0.0, z)),
            );
        }
        queues.sort(Vec3::ZERO);

        let opaque: Vec<f32> = queues.deferred().iter().map(|c| c.sort_distance).collect();
        let blended: Vec<f32> = queues.forward().iter().map(|c| c.sort_distance).collect();
        assert_eq!(opaque, vec![1.0, 3.0, 5.0]);
        assert_eq!(blended, vec![5.0, 3.0, 1.0]);
    }

    #[test]
    fn test_static_set_change_detection() {
        let mut queues = RenderQueues::new();
        let s = RenderFlags::RENDERABLE | RenderFlags::STATIC;

        queues.push_mesh_render(cmd(0, s));
        queues.push_mesh_render(cmd(1, s));
        assert!(queues.take_static_set_change());

        // Same set, different order, plus a dynamic object.
        queues.clear();
        queues.push_mesh_render(cmd(1, s));
        queues.push_mesh_render(cmd(0, s));
        queues.push_mesh_render(cmd(9, RenderFlags::RENDERABLE));
        assert!(!queues.take_static_set_change());

        queues.clear();
        queues.push_mesh_render(cmd(0, s));
        assert!(queues.take_static_set_change());
    }
}
