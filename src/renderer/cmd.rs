//! Render commands
//!
//! A [`PrimitiveRenderCmd`] describes one drawable primitive for one frame.
//! Commands are rebuilt from the scene every frame and only reference GPU
//! resources through pool handles.

use glam::Vec3;

use super::pool::Handle;
use super::resources::{GpuMesh, JointDescriptor, MaterialDescriptor, MeshDescriptor};

bitflags::bitflags! {
    /// Configuration bits carried by every render command.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RenderFlags: u32 {
        /// Command is drawn at all; commands without it are discarded
        const RENDERABLE  = 1 << 0;
        /// Alpha blended, drawn in the forward pass
        const TRANSPARENT = 1 << 1;
        /// Partially transmissive, drawn in the forward pass
        const TRANSLUCENT = 1 << 2;
        /// Vertices are skinned by a joint palette
        const SKINNED     = 1 << 3;
        /// Never moves; contributes to the cached static shadow map
        const STATIC      = 1 << 4;
        /// Vertices blend two morph targets
        const MORPH       = 1 << 5;
        /// Lit inline in the forward pass
        const FORWARD     = 1 << 6;
        /// Casts shadows from the primary light
        const SHADOWS     = 1 << 7;
        /// Debug geometry, drawn in the forward pass
        const DEBUG       = 1 << 8;
    }
}

impl RenderFlags {
    /// Bits that route a command to the forward list.
    pub const FORWARD_MASK: Self = Self::TRANSPARENT
        .union(Self::TRANSLUCENT)
        .union(Self::FORWARD)
        .union(Self::DEBUG);

    /// Drawn in the forward pass rather than the G-buffer.
    #[must_use]
    pub const fn is_forward(self) -> bool {
        self.intersects(Self::FORWARD_MASK)
    }

    /// Drawn into the shadow maps. Debug geometry never casts.
    #[must_use]
    pub const fn casts_shadows(self) -> bool {
        self.contains(Self::SHADOWS) && !self.contains(Self::DEBUG)
    }

    /// Pipeline permutation for the geometry passes.
    #[must_use]
    pub const fn variant(self) -> GeometryVariant {
        match (self.contains(Self::SKINNED), self.contains(Self::MORPH)) {
            (false, false) => GeometryVariant::Static,
            (false, true) => GeometryVariant::StaticMorph,
            (true, false) => GeometryVariant::Skinned,
            (true, true) => GeometryVariant::SkinnedMorph,
        }
    }
}

/// The four `{static, skinned} x {morph, no-morph}` vertex permutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryVariant {
    Static,
    StaticMorph,
    Skinned,
    SkinnedMorph,
}

impl GeometryVariant {
    pub const ALL: [Self; 4] = [
        Self::Static,
        Self::StaticMorph,
        Self::Skinned,
        Self::SkinnedMorph,
    ];

    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Static => 0,
            Self::StaticMorph => 1,
            Self::Skinned => 2,
            Self::SkinnedMorph => 3,
        }
    }

    #[must_use]
    pub const fn skinned(self) -> bool {
        matches!(self, Self::Skinned | Self::SkinnedMorph)
    }

    #[must_use]
    pub const fn morph(self) -> bool {
        matches!(self, Self::StaticMorph | Self::SkinnedMorph)
    }
}

/// Index range of one primitive inside a mesh's index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PrimitiveRange {
    pub first_index: u32,
    pub index_count: u32,
}

impl PrimitiveRange {
    #[must_use]
    pub const fn new(first_index: u32, index_count: u32) -> Self {
        Self {
            first_index,
            index_count,
        }
    }

    #[must_use]
    pub const fn indices(&self) -> std::ops::Range<u32> {
        self.first_index..self.first_index + self.index_count
    }
}

pub type MeshHandle = Handle<GpuMesh>;
pub type MeshDescriptorHandle = Handle<MeshDescriptor>;
pub type MaterialHandle = Handle<MaterialDescriptor>;
pub type JointHandle = Handle<JointDescriptor>;

/// One drawable primitive for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrimitiveRenderCmd {
    /// Vertex and index buffers
    pub mesh: MeshHandle,
    /// Per-object transform uniform
    pub descriptor: MeshDescriptorHandle,
    pub material: MaterialHandle,
    /// Joint palette, required when `SKINNED` is set
    pub joints: Option<JointHandle>,
    pub primitive: PrimitiveRange,
    pub flags: RenderFlags,
    pub instances: u32,
    /// World-space centre of the primitive's bounds
    pub world_center: Vec3,
    /// Camera distance, filled in when the queues are sorted
    pub sort_distance: f32,
}

impl PrimitiveRenderCmd {
    #[must_use]
    pub fn new(
        mesh: MeshHandle,
        descriptor: MeshDescriptorHandle,
        material: MaterialHandle,
        primitive: PrimitiveRange,
    ) -> Self {
        Self {
            mesh,
            descriptor,
            material,
            joints: None,
            primitive,
            flags: RenderFlags::RENDERABLE | RenderFlags::SHADOWS,
            instances: 1,
            world_center: Vec3::ZERO,
            sort_distance: 0.0,
        }
    }

    #[must_use]
    pub fn with_flags(mut self, flags: RenderFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Attach a joint palette and mark the command skinned.
    #[must_use]
    pub fn with_joints(mut self, joints: JointHandle) -> Self {
        self.joints = Some(joints);
        self.flags |= RenderFlags::SKINNED;
        self
    }

    #[must_use]
    pub fn with_world_center(mut self, center: Vec3) -> Self {
        self.world_center = center;
        self
    }

    #[must_use]
    pub fn with_instances(mut self, instances: u32) -> Self {
        self.instances = instances;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_mask() {
        assert!(!RenderFlags::RENDERABLE.is_forward());
        assert!(!(RenderFlags::RENDERABLE | RenderFlags::STATIC).is_forward());
        for bit in [
            RenderFlags::TRANSPARENT,
            RenderFlags::TRANSLUCENT,
            RenderFlags::FORWARD,
            RenderFlags::DEBUG,
        ] {
            assert!((RenderFlags::RENDERABLE | bit).is_forward());
        }
    }

    #[test]
    fn test_variant_selection() {
        assert_eq!(RenderFlags::empty().variant(), GeometryVariant::Static);
        assert_eq!(RenderFlags::MORPH.variant(), GeometryVariant::StaticMorph);
        assert_eq!(RenderFlags::SKINNED.variant(), GeometryVariant::Skinned);
        assert_eq!(
            (RenderFlags::SKINNED | RenderFlags::MORPH).variant(),
            GeometryVariant::SkinnedMorph
        );
        for (i, v) in GeometryVariant::ALL.iter().enumerate() {
            assert_eq!(v.index(), i);
        }
    }

    #[test]
    fn test_primitive_range() {
        assert_eq!(PrimitiveRange::new(6, 3).indices(), 6..9);
    }
}
