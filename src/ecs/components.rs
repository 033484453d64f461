//! Scene components

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::animation::AnimHandleId;
use crate::renderer::{
    DirectionalLight, JointHandle, MaterialHandle, MeshDescriptorHandle, MeshHandle, PointLight,
    PrimitiveRange, RenderFlags, SpotLight,
};

/// Transform component for position, rotation, and scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Position in world space
    pub position: Vec3,
    /// Rotation as a quaternion
    pub rotation: Quat,
    /// Scale factor
    pub scale: Vec3,
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    #[must_use]
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Negative Z in local space
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

/// Name component for debugging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Name(pub String);

impl Name {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

/// GPU resources and per-primitive ranges of one drawn mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderMesh {
    pub mesh: MeshHandle,
    pub descriptor: MeshDescriptorHandle,
    pub material: MaterialHandle,
    pub primitives: SmallVec<[PrimitiveRange; 4]>,
    /// Extra bits such as `STATIC`, `TRANSPARENT` or `MORPH`
    pub flags: RenderFlags,
    /// Bounds centroid in mesh space
    pub local_center: Vec3,
}

impl RenderMesh {
    /// One primitive covering `index_count` indices.
    pub fn new(
        mesh: MeshHandle,
        descriptor: MeshDescriptorHandle,
        material: MaterialHandle,
        index_count: u32,
    ) -> Self {
        let mut primitives = SmallVec::new();
        primitives.push(PrimitiveRange::new(0, index_count));
        Self {
            mesh,
            descriptor,
            material,
            primitives,
            flags: RenderFlags::RENDERABLE | RenderFlags::SHADOWS,
            local_center: Vec3::ZERO,
        }
    }

    #[must_use]
    pub fn with_flags(mut self, flags: RenderFlags) -> Self {
        self.flags |= flags;
        self
    }

    #[must_use]
    pub fn with_local_center(mut self, center: Vec3) -> Self {
        self.local_center = center;
        self
    }
}

/// What kind of drawable an entity is. Submission dispatches on the tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Renderable {
    Static(RenderMesh),
    /// Palette and morph weights come from the entity's animation handle.
    Skinned {
        mesh: RenderMesh,
        joints: JointHandle,
        animation: AnimHandleId,
    },
    /// One mesh drawn `instances` times.
    Batched { mesh: RenderMesh, instances: u32 },
}

impl Renderable {
    pub const fn mesh(&self) -> &RenderMesh {
        match self {
            Self::Static(mesh) | Self::Skinned { mesh, .. } | Self::Batched { mesh, .. } => mesh,
        }
    }
}

/// Light attached to an entity. Position and direction come from its
/// transform.
#[derive(Debug, Clone, PartialEq)]
pub enum LightSource {
    Directional { color: Vec3, intensity: f32 },
    Point(PointLight),
    Spot(SpotLight),
}

impl LightSource {
    pub fn directional(&self, transform: &Transform) -> Option<DirectionalLight> {
        match self {
            Self::Directional { color, intensity } => {
                Some(DirectionalLight::new(transform.forward(), *color, *intensity))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::Handle;

    #[test]
    fn test_render_mesh_keeps_base_flags() {
        let mesh = RenderMesh::new(
            Handle::from_raw_parts(0, 0),
            Handle::from_raw_parts(0, 0),
            Handle::from_raw_parts(0, 0),
            36,
        )
        .with_flags(RenderFlags::STATIC);
        assert!(mesh.flags.contains(RenderFlags::RENDERABLE | RenderFlags::STATIC));
        assert_eq!(mesh.primitives[0].indices(), 0..36);
    }

    #[test]
    fn test_directional_light_follows_forward() {
        let transform =
            Transform::default().with_rotation(Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2));
        let light = LightSource::Directional {
            color: Vec3::ONE,
            intensity: 2.0,
        };
        let sun = light.directional(&transform).unwrap();
        assert!(sun.direction.abs_diff_eq(Vec3::NEG_Y, 1e-5));
        assert!(LightSource::Point(PointLight::new(Vec3::ZERO, Vec3::ONE, 1.0))
            .directional(&transform)
            .is_none());
    }
}
