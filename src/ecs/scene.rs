//! World wrapper that owns entity animation state

use std::sync::Arc;

use hecs::{Entity, World};

use super::components::{LightSource, Name, RenderMesh, Renderable, Transform};
use super::systems::{self, SceneSink, SubmitStats};
use crate::animation::{AnimClip, AnimHandle, AnimHandleId, Animation, AnimationError};
use crate::renderer::JointHandle;

/// The game world: hecs entities plus the animation subsystem that drives
/// their skinned renderables.
#[derive(Default)]
pub struct Scene {
    world: World,
    animation: Animation,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub const fn animation(&self) -> &Animation {
        &self.animation
    }

    pub fn animation_mut(&mut self) -> &mut Animation {
        &mut self.animation
    }

    pub fn spawn_static(&mut self, name: &str, transform: Transform, mesh: RenderMesh) -> Entity {
        self.world
            .spawn((Name::new(name), transform, Renderable::Static(mesh)))
    }

    pub fn spawn_batched(
        &mut self,
        name: &str,
        transform: Transform,
        mesh: RenderMesh,
        instances: u32,
    ) -> Entity {
        self.world.spawn((
            Name::new(name),
            transform,
            Renderable::Batched { mesh, instances },
        ))
    }

    /// Spawn a skinned entity playing `clip`. Its animation handle is keyed
    /// by the entity id.
    pub fn spawn_skinned(
        &mut self,
        name: &str,
        transform: Transform,
        mesh: RenderMesh,
        joints: JointHandle,
        clip: Arc<AnimClip>,
    ) -> Entity {
        let entity = self.world.spawn((Name::new(name), transform));
        let id = anim_id(entity);
        if let Some(handle) = self.animation.create_anim_handle(id) {
            handle.play(clip);
        }
        // hecs hands out fresh ids, so the insert cannot collide
        let _ = self.world.insert_one(
            entity,
            Renderable::Skinned {
                mesh,
                joints,
                animation: id,
            },
        );
        entity
    }

    pub fn spawn_light(&mut self, name: &str, transform: Transform, light: LightSource) -> Entity {
        self.world.spawn((Name::new(name), transform, light))
    }

    /// Remove an entity and its animation handle.
    pub fn despawn(&mut self, entity: Entity) -> bool {
        self.animation.free_anim_handle(anim_id(entity));
        self.world.despawn(entity).is_ok()
    }

    pub fn transform_mut(&mut self, entity: Entity) -> Option<hecs::RefMut<'_, Transform>> {
        self.world.get::<&mut Transform>(entity).ok()
    }

    pub fn anim_handle_mut(&mut self, entity: Entity) -> Option<&mut AnimHandle> {
        self.animation.handle_mut(anim_id(entity))
    }

    /// Blend the entity's current clip into `clip` over `seconds`.
    ///
    /// # Errors
    ///
    /// `SkeletonMismatch` when the clip animates another skeleton,
    /// `UnknownSkeleton` when the entity has no animation handle.
    pub fn crossfade(
        &mut self,
        entity: Entity,
        clip: Arc<AnimClip>,
        seconds: f32,
    ) -> Result<(), AnimationError> {
        self.anim_handle_mut(entity)
            .ok_or(AnimationError::UnknownSkeleton)?
            .crossfade(clip, seconds)
    }

    /// Advance every animation by `dt` seconds.
    pub fn update(&mut self, dt: f32) {
        self.animation.update_state(dt);
    }

    /// Push this frame's renderables and lights into `sink`.
    pub fn submit(&self, sink: &mut impl SceneSink) -> SubmitStats {
        let mut stats = SubmitStats::default();
        systems::submit_renderables(&self.world, &self.animation, sink, &mut stats);
        systems::submit_lights(&self.world, sink, &mut stats);
        if stats.rejected > 0 || stats.dropped_lights > 0 {
            log::trace!(
                "Scene submit dropped {} commands and {} lights",
                stats.rejected,
                stats.dropped_lights
            );
        }
        stats
    }

    pub fn len(&self) -> u32 {
        self.world.len()
    }

    pub fn is_empty(&self) -> bool {
        self.world.is_empty()
    }
}

fn anim_id(entity: Entity) -> AnimHandleId {
    AnimHandleId(entity.to_bits().get())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{AnimPose, Joint, JointPose, Skeleton};
    use crate::renderer::Handle;
    use glam::Vec3;

    fn mesh() -> RenderMesh {
        RenderMesh::new(
            Handle::from_raw_parts(0, 0),
            Handle::from_raw_parts(0, 0),
            Handle::from_raw_parts(0, 0),
            3,
        )
    }

    fn clip(scene: &mut Scene) -> Arc<AnimClip> {
        let skeleton = scene
            .animation_mut()
            .register_skeleton(Skeleton::new(vec![Joint::new("root")]).unwrap());
        let poses = vec![
            AnimPose::new(0.0, vec![JointPose::IDENTITY]),
            AnimPose::new(1.0, vec![JointPose::from_translation(Vec3::X)]),
        ];
        Arc::new(AnimClip::new("slide", skeleton, poses).unwrap())
    }

    #[test]
    fn test_skinned_spawn_creates_and_despawn_frees_handle() {
        let mut scene = Scene::new();
        let clip = clip(&mut scene);
        let joints = Handle::from_raw_parts(0, 0);
        let entity = scene.spawn_skinned("rig", Transform::default(), mesh(), joints, clip);
        assert_eq!(scene.animation().handle_count(), 1);
        assert!(scene.anim_handle_mut(entity).is_some());

        assert!(scene.despawn(entity));
        assert_eq!(scene.animation().handle_count(), 0);
        assert!(scene.is_empty());
        assert!(!scene.despawn(entity));
    }

    #[test]
    fn test_crossfade_without_handle_fails() {
        let mut scene = Scene::new();
        let clip = clip(&mut scene);
        let entity = scene.spawn_static("crate", Transform::default(), mesh());
        assert_eq!(
            scene.crossfade(entity, clip, 0.5),
            Err(AnimationError::UnknownSkeleton)
        );
    }

    #[test]
    fn test_transform_edits_are_visible() {
        let mut scene = Scene::new();
        let entity = scene.spawn_static("crate", Transform::default(), mesh());
        if let Some(mut transform) = scene.transform_mut(entity) {
            transform.position = Vec3::new(0.0, 3.0, 0.0);
        }
        let transform = scene.world().get::<&Transform>(entity).unwrap();
        assert_eq!(transform.position.y, 3.0);
    }
}
