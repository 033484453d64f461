//! Clip sampling and skinning palette generation

use std::sync::Arc;

use glam::Mat4;

use super::AnimationError;
use super::clip::{AnimClip, AnimClipState, JointPose};
use super::skeleton::{MAX_JOINTS, Skeleton};

/// Fixed-size skinning palette uploaded to the joint buffer.
pub type JointPalette = [Mat4; MAX_JOINTS];

/// Compose local joint poses through the hierarchy into skinning matrices.
///
/// `global = parent_global * local` in hierarchy order, then each entry is
/// `root_inverse * global * inverse_bind`. Joints past the skeleton's count
/// are left as identity.
pub fn compute_palette(skeleton: &Skeleton, local_poses: &[JointPose], out: &mut JointPalette) {
    let joints = skeleton.joints();
    let mut globals = [Mat4::IDENTITY; MAX_JOINTS];

    for &index in skeleton.eval_order() {
        let index = usize::from(index);
        let local = local_poses
            .get(index)
            .copied()
            .unwrap_or_default()
            .to_matrix();
        globals[index] = match joints[index].parent {
            Some(parent) => globals[usize::from(parent)] * local,
            None => local,
        };
    }

    let root_inverse = skeleton.root_inverse_transform();
    for (index, joint) in joints.iter().enumerate() {
        out[index] = root_inverse * globals[index] * joint.inverse_bind_pose;
    }
    for slot in out.iter_mut().skip(joints.len()) {
        *slot = Mat4::IDENTITY;
    }
}

/// Sample `clip` at `local_time` and return the palette. Pure: identical
/// inputs give bit-identical output.
#[must_use]
pub fn sample_palette(
    clip: &AnimClip,
    skeleton: &Skeleton,
    local_time: f32,
    looping: bool,
) -> JointPalette {
    let mut poses = Vec::with_capacity(skeleton.joint_count());
    let mut morphs = Vec::new();
    let time = clip.normalize_time(local_time, looping);
    clip.sample_into(time, looping, skeleton.joint_count(), &mut poses, &mut morphs);

    let mut palette = [Mat4::IDENTITY; MAX_JOINTS];
    compute_palette(skeleton, &poses, &mut palette);
    palette
}

#[derive(Debug, Clone)]
struct CrossFade {
    from: Arc<AnimClip>,
    from_state: AnimClipState,
    elapsed: f32,
    duration: f32,
}

/// Advances one clip (optionally fading out another) and keeps the
/// resulting palette and morph weights.
#[derive(Debug, Clone)]
pub struct AnimSampler {
    clip: Option<Arc<AnimClip>>,
    state: AnimClipState,
    fade: Option<CrossFade>,
    local_poses: Vec<JointPose>,
    fade_poses: Vec<JointPose>,
    fade_morphs: Vec<f32>,
    palette: JointPalette,
    morphs: Vec<f32>,
}

impl Default for AnimSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl AnimSampler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            clip: None,
            state: AnimClipState::default(),
            fade: None,
            local_poses: Vec::with_capacity(MAX_JOINTS),
            fade_poses: Vec::new(),
            fade_morphs: Vec::new(),
            palette: [Mat4::IDENTITY; MAX_JOINTS],
            morphs: Vec::new(),
        }
    }

    /// Start `clip` from the beginning, cancelling any fade.
    ///
    /// The playback rate carries over; the loop mode comes from `clip`.
    pub fn play(&mut self, clip: Arc<AnimClip>) {
        let rate = self.state.playback_rate;
        self.state = AnimClipState {
            playback_rate: rate,
            ..AnimClipState::for_clip(&clip, 0.0)
        };
        self.clip = Some(clip);
        self.fade = None;
    }

    /// Blend from the current clip to `clip` over `seconds`.
    ///
    /// # Errors
    ///
    /// `SkeletonMismatch` if the clips animate different skeletons.
    pub fn crossfade_to(
        &mut self,
        clip: Arc<AnimClip>,
        seconds: f32,
    ) -> Result<(), AnimationError> {
        let Some(current) = self.clip.take() else {
            self.play(clip);
            return Ok(());
        };
        if current.skeleton() != clip.skeleton() {
            self.clip = Some(current);
            return Err(AnimationError::SkeletonMismatch);
        }
        if seconds <= 0.0 {
            self.play(clip);
            return Ok(());
        }

        let from_state = self.state;
        self.play(clip);
        self.state.weight = 0.0;
        self.fade = Some(CrossFade {
            from: current,
            from_state,
            elapsed: 0.0,
            duration: seconds,
        });
        Ok(())
    }

    /// Stop playback; the palette keeps its last value.
    pub fn stop(&mut self) {
        self.clip = None;
        self.fade = None;
    }

    pub fn set_playback_rate(&mut self, rate: f32) {
        self.state.playback_rate = rate;
    }

    /// Override the loop mode of the clip now playing. The next `play` or
    /// `crossfade_to` takes the new clip's own mode again.
    pub fn set_looping(&mut self, looping: bool) {
        self.state.looping = looping;
    }

    #[must_use]
    pub fn clip(&self) -> Option<&Arc<AnimClip>> {
        self.clip.as_ref()
    }

    #[must_use]
    pub const fn state(&self) -> &AnimClipState {
        &self.state
    }

    #[must_use]
    pub fn is_fading(&self) -> bool {
        self.fade.is_some()
    }

    /// Skinning matrices for the current pose.
    #[must_use]
    pub const fn final_palette(&self) -> &JointPalette {
        &self.palette
    }

    /// Morph target weights for the current pose.
    #[must_use]
    pub fn final_morphs(&self) -> &[f32] {
        &self.morphs
    }

    /// Advance clocks by `dt` and rebuild the palette against `skeleton`.
    pub fn step(&mut self, dt: f32, skeleton: &Skeleton) {
        let Some(clip) = self.clip.clone() else {
            return;
        };

        self.state.advance(dt, clip.duration());
        let time = clip.normalize_time(self.state.local_time, self.state.looping);
        let bracket = clip.sample_into(
            time,
            self.state.looping,
            skeleton.joint_count(),
            &mut self.local_poses,
            &mut self.morphs,
        );
        self.state.next_pose_index = bracket.next;

        if let Some(fade) = self.fade.as_mut() {
            fade.elapsed += dt.abs();
            fade.from_state.advance(dt, fade.from.duration());
            let from_time = fade
                .from
                .normalize_time(fade.from_state.local_time, fade.from_state.looping);
            fade.from.sample_into(
                from_time,
                fade.from_state.looping,
                skeleton.joint_count(),
                &mut self.fade_poses,
                &mut self.fade_morphs,
            );

            let w = (fade.elapsed / fade.duration).clamp(0.0, 1.0);
            self.state.weight = w;
            fade.from_state.weight = 1.0 - w;

            for (to, from) in self.local_poses.iter_mut().zip(&self.fade_poses) {
                *to = from.interpolate(to, w);
            }
            let n = self.morphs.len().max(self.fade_morphs.len());
            self.morphs.resize(n, 0.0);
            for (i, m) in self.morphs.iter_mut().enumerate() {
                let from = self.fade_morphs.get(i).copied().unwrap_or(0.0);
                *m = from + (*m - from) * w;
            }

            if w >= 1.0 {
                self.fade = None;
            }
        }

        compute_palette(skeleton, &self.local_poses, &mut self.palette);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::clip::AnimPose;
    use crate::animation::skeleton::{Joint, SkeletonRegistry};
    use glam::{Quat, Vec3};

    fn two_joint_chain() -> Skeleton {
        Skeleton::new(vec![
            Joint::new("root"),
            Joint::new("tip")
                .with_parent(0)
                .with_inverse_bind_pose(Mat4::from_translation(Vec3::new(0.0, -1.0, 0.0))),
        ])
        .unwrap()
    }

    #[test]
    fn test_palette_composes_parent_first() {
        let skeleton = two_joint_chain();
        let poses = [
            JointPose::from_translation(Vec3::new(2.0, 0.0, 0.0)),
            JointPose::from_translation(Vec3::new(0.0, 1.0, 0.0)),
        ];
        let mut palette = [Mat4::IDENTITY; MAX_JOINTS];
        compute_palette(&skeleton, &poses, &mut palette);

        // global(tip) = T(2,0,0) * T(0,1,0); times inverse bind T(0,-1,0)
        let p = palette[1].transform_point3(Vec3::ZERO);
        assert!(p.abs_diff_eq(Vec3::new(2.0, 0.0, 0.0), 1e-6));
        assert_eq!(palette[2], Mat4::IDENTITY);
    }

    #[test]
    fn test_root_inverse_applied_last() {
        let skeleton = Skeleton::new(vec![Joint::new("root")])
            .unwrap()
            .with_root_inverse_transform(Mat4::from_scale(Vec3::splat(2.0)));
        let mut palette = [Mat4::IDENTITY; MAX_JOINTS];
        compute_palette(
            &skeleton,
            &[JointPose::from_translation(Vec3::X)],
            &mut palette,
        );
        let p = palette[0].transform_point3(Vec3::ZERO);
        assert!(p.abs_diff_eq(Vec3::new(2.0, 0.0, 0.0), 1e-6));
    }

    #[test]
    fn test_crossfade_blends_then_settles() {
        let mut registry = SkeletonRegistry::new();
        let id = registry.register(Skeleton::new(vec![Joint::new("root")]).unwrap());
        let skeleton = Arc::clone(registry.get(id).unwrap());

        let still = |x: f32| {
            Arc::new(
                AnimClip::new(
                    "still",
                    id,
                    vec![AnimPose::new(
                        0.0,
                        vec![JointPose::from_translation(Vec3::new(x, 0.0, 0.0))],
                    )],
                )
                .unwrap(),
            )
        };

        let mut sampler = AnimSampler::new();
        sampler.play(still(0.0));
        sampler.step(0.0, &skeleton);
        sampler.crossfade_to(still(4.0), 1.0).unwrap();

        sampler.step(0.5, &skeleton);
        let mid = sampler.final_palette()[0].transform_point3(Vec3::ZERO);
        assert!((mid.x - 2.0).abs() < 1e-5);
        assert!(sampler.is_fading());

        sampler.step(0.5, &skeleton);
        let end = sampler.final_palette()[0].transform_point3(Vec3::ZERO);
        assert!((end.x - 4.0).abs() < 1e-5);
        assert!(!sampler.is_fading());
    }

    #[test]
    fn test_loop_override_lasts_until_next_clip() {
        let mut registry = SkeletonRegistry::new();
        let id = registry.register(Skeleton::new(vec![Joint::new("root")]).unwrap());
        let clip = || {
            Arc::new(
                AnimClip::new(
                    "swing",
                    id,
                    vec![
                        AnimPose::new(0.0, vec![JointPose::IDENTITY]),
                        AnimPose::new(1.0, vec![JointPose::from_translation(Vec3::X)]),
                    ],
                )
                .unwrap(),
            )
        };

        let mut sampler = AnimSampler::new();
        sampler.set_playback_rate(2.0);
        sampler.play(clip());
        assert!(sampler.state().looping);
        sampler.set_looping(false);
        assert!(!sampler.state().looping);

        sampler.play(clip());
        assert!(sampler.state().looping);
        assert_eq!(sampler.state().playback_rate, 2.0);
    }

    #[test]
    fn test_crossfade_rejects_other_skeleton() {
        let mut registry = SkeletonRegistry::new();
        let a = registry.register(Skeleton::new(vec![Joint::new("a")]).unwrap());
        let b = registry.register(Skeleton::new(vec![Joint::new("b")]).unwrap());
        let pose = || vec![AnimPose::new(0.0, vec![JointPose::from_rotation(Quat::IDENTITY)])];

        let mut sampler = AnimSampler::new();
        sampler.play(Arc::new(AnimClip::new("a", a, pose()).unwrap()));
        let result = sampler.crossfade_to(Arc::new(AnimClip::new("b", b, pose()).unwrap()), 0.5);
        assert!(matches!(result, Err(AnimationError::SkeletonMismatch)));
        assert_eq!(sampler.clip().map(|c| c.skeleton()), Some(a));
    }
}
