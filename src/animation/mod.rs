//! Skeletal animation
//!
//! The [`Animation`] subsystem owns the skeleton registry and one
//! [`AnimHandle`] per animated object. Each frame `update_state` advances
//! every handle's sampler and rebuilds its skinning palette, which the
//! renderer then uploads into the object's joint descriptor.

mod clip;
mod sampler;
mod skeleton;

pub use clip::{AnimClip, AnimClipState, AnimPose, JointPose, PoseBracket};
pub use sampler::{AnimSampler, JointPalette, compute_palette, sample_palette};
pub use skeleton::{Joint, MAX_JOINTS, Skeleton, SkeletonId, SkeletonRegistry};

use std::sync::Arc;

use rustc_hash::FxHashMap;

/// Errors from building skeletons and clips or driving samplers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnimationError {
    #[error("skeleton has {joints} joints, at most {max} are supported")]
    TooManyJoints { joints: usize, max: usize },
    #[error("joint {joint} has an invalid parent")]
    InvalidParent { joint: usize },
    #[error("skeleton is not registered")]
    UnknownSkeleton,
    #[error("clip has no keyframes")]
    EmptyClip,
    #[error("clips animate different skeletons")]
    SkeletonMismatch,
}

/// Caller-chosen key for an animation handle, typically an entity id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnimHandleId(pub u64);

/// Per-object animation state: a sampler bound to a skeleton.
#[derive(Debug)]
pub struct AnimHandle {
    id: AnimHandleId,
    skeleton: Option<SkeletonId>,
    sampler: AnimSampler,
}

impl AnimHandle {
    #[must_use]
    pub const fn id(&self) -> AnimHandleId {
        self.id
    }

    #[must_use]
    pub const fn skeleton(&self) -> Option<SkeletonId> {
        self.skeleton
    }

    /// Play `clip` from the start; the handle adopts the clip's skeleton.
    pub fn play(&mut self, clip: Arc<AnimClip>) {
        self.skeleton = Some(clip.skeleton());
        self.sampler.play(clip);
    }

    /// Fade from the current clip into `clip`.
    ///
    /// # Errors
    ///
    /// `SkeletonMismatch` when `clip` animates a different skeleton.
    pub fn crossfade(&mut self, clip: Arc<AnimClip>, seconds: f32) -> Result<(), AnimationError> {
        let skeleton = clip.skeleton();
        self.sampler.crossfade_to(clip, seconds)?;
        self.skeleton = Some(skeleton);
        Ok(())
    }

    pub fn stop(&mut self) {
        self.sampler.stop();
    }

    pub fn set_playback_rate(&mut self, rate: f32) {
        self.sampler.set_playback_rate(rate);
    }

    /// Loop mode for the current clip only; see [`AnimSampler::set_looping`].
    pub fn set_looping(&mut self, looping: bool) {
        self.sampler.set_looping(looping);
    }

    #[must_use]
    pub const fn sampler(&self) -> &AnimSampler {
        &self.sampler
    }

    #[must_use]
    pub const fn final_palette(&self) -> &JointPalette {
        self.sampler.final_palette()
    }

    #[must_use]
    pub fn final_morphs(&self) -> &[f32] {
        self.sampler.final_morphs()
    }
}

/// Owner of skeletons and animation handles.
#[derive(Debug, Default)]
pub struct Animation {
    skeletons: SkeletonRegistry,
    handles: FxHashMap<AnimHandleId, AnimHandle>,
}

impl Animation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a skeleton and return its id.
    pub fn register_skeleton(&mut self, skeleton: Skeleton) -> SkeletonId {
        self.skeletons.register(skeleton)
    }

    /// Release a skeleton. Handles still bound to it stop updating.
    pub fn release_skeleton(&mut self, id: SkeletonId) -> bool {
        self.skeletons.release(id)
    }

    #[must_use]
    pub const fn skeletons(&self) -> &SkeletonRegistry {
        &self.skeletons
    }

    /// Allocate a handle for `id`. Returns `None` if one already exists.
    pub fn create_anim_handle(&mut self, id: AnimHandleId) -> Option<&mut AnimHandle> {
        match self.handles.entry(id) {
            std::collections::hash_map::Entry::Occupied(_) => None,
            std::collections::hash_map::Entry::Vacant(slot) => Some(slot.insert(AnimHandle {
                id,
                skeleton: None,
                sampler: AnimSampler::new(),
            })),
        }
    }

    /// Remove a handle and its sampler. Unknown ids are ignored.
    pub fn free_anim_handle(&mut self, id: AnimHandleId) -> bool {
        self.handles.remove(&id).is_some()
    }

    #[must_use]
    pub fn handle(&self, id: AnimHandleId) -> Option<&AnimHandle> {
        self.handles.get(&id)
    }

    pub fn handle_mut(&mut self, id: AnimHandleId) -> Option<&mut AnimHandle> {
        self.handles.get_mut(&id)
    }

    #[must_use]
    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }

    /// Advance every live sampler by `dt` seconds.
    pub fn update_state(&mut self, dt: f32) {
        for handle in self.handles.values_mut() {
            let Some(skeleton) = handle.skeleton.and_then(|id| self.skeletons.get(id)) else {
                continue;
            };
            handle.sampler.step(dt, skeleton);
        }
    }

    /// Pure palette evaluation for `clip` at `local_time`.
    ///
    /// # Errors
    ///
    /// `UnknownSkeleton` if the clip's skeleton is not registered.
    pub fn compute_palette(
        &self,
        clip: &AnimClip,
        local_time: f32,
    ) -> Result<JointPalette, AnimationError> {
        let skeleton = self
            .skeletons
            .get(clip.skeleton())
            .ok_or(AnimationError::UnknownSkeleton)?;
        Ok(sample_palette(clip, skeleton, local_time, clip.looping()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat4, Quat, Vec3};

    fn rig(animation: &mut Animation) -> SkeletonId {
        animation.register_skeleton(
            Skeleton::new(vec![Joint::new("root"), Joint::new("tip").with_parent(0)]).unwrap(),
        )
    }

    fn swing(skeleton: SkeletonId, looping: bool) -> Arc<AnimClip> {
        let pose = |t: f32, angle: f32| {
            AnimPose::new(
                t,
                vec![
                    JointPose::from_rotation(Quat::from_rotation_y(angle)),
                    JointPose::from_translation(Vec3::new(0.0, 1.0, 0.0)),
                ],
            )
        };
        Arc::new(
            AnimClip::new("swing", skeleton, vec![pose(0.0, 0.0), pose(1.0, 1.0), pose(2.0, 0.5)])
                .unwrap()
                .with_looping(looping),
        )
    }

    #[test]
    fn test_create_handle_twice_fails() {
        let mut animation = Animation::new();
        assert!(animation.create_anim_handle(AnimHandleId(7)).is_some());
        assert!(animation.create_anim_handle(AnimHandleId(7)).is_none());
        assert_eq!(animation.handle_count(), 1);
    }

    #[test]
    fn test_free_unknown_handle_is_noop() {
        let mut animation = Animation::new();
        assert!(!animation.free_anim_handle(AnimHandleId(1)));
        animation.create_anim_handle(AnimHandleId(1));
        assert!(animation.free_anim_handle(AnimHandleId(1)));
        assert!(animation.handle(AnimHandleId(1)).is_none());
    }

    #[test]
    fn test_update_state_drives_palette() {
        let mut animation = Animation::new();
        let skeleton = rig(&mut animation);
        let clip = swing(skeleton, true);

        animation
            .create_anim_handle(AnimHandleId(1))
            .unwrap()
            .play(Arc::clone(&clip));
        animation.update_state(1.0);

        let handle = animation.handle(AnimHandleId(1)).unwrap();
        assert!((handle.sampler().state().local_time - 1.0).abs() < 1e-6);
        let expected = animation.compute_palette(&clip, 1.0).unwrap();
        assert_eq!(handle.final_palette(), &expected);
    }

    #[test]
    fn test_zero_rate_freezes_without_removing() {
        let mut animation = Animation::new();
        let skeleton = rig(&mut animation);
        let handle = animation.create_anim_handle(AnimHandleId(3)).unwrap();
        handle.play(swing(skeleton, true));
        handle.set_playback_rate(0.0);

        animation.update_state(0.75);
        animation.update_state(0.75);
        let handle = animation.handle(AnimHandleId(3)).unwrap();
        assert_eq!(handle.sampler().state().local_time, 0.0);
        assert!(handle.final_palette()[0].abs_diff_eq(Mat4::IDENTITY, 1e-6));
    }

    #[test]
    fn test_released_skeleton_stops_updates() {
        let mut animation = Animation::new();
        let skeleton = rig(&mut animation);
        animation
            .create_anim_handle(AnimHandleId(9))
            .unwrap()
            .play(swing(skeleton, true));
        animation.release_skeleton(skeleton);
        animation.update_state(0.5);

        let handle = animation.handle(AnimHandleId(9)).unwrap();
        assert_eq!(handle.sampler().state().local_time, 0.0);
        assert!(animation.compute_palette(&swing(skeleton, true), 0.0).is_err());
    }
}
