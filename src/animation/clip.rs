//! Animation clips and playback state
//!
//! An [`AnimClip`] is immutable keyframe data shared by `Arc` between any
//! number of samplers. Each sampler owns one [`AnimClipState`] cursor.

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::AnimationError;
use super::skeleton::SkeletonId;

/// Local transform of one joint at one keyframe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointPose {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for JointPose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl JointPose {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    #[must_use]
    pub const fn new(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            translation,
            rotation,
            scale,
        }
    }

    #[must_use]
    pub fn from_rotation(rotation: Quat) -> Self {
        Self {
            rotation,
            ..Self::IDENTITY
        }
    }

    #[must_use]
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    /// Scale, then rotate, then translate.
    #[must_use]
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// Lerp translation and scale, slerp rotation.
    #[must_use]
    pub fn interpolate(&self, other: &Self, t: f32) -> Self {
        Self {
            translation: self.translation.lerp(other.translation, t),
            rotation: self.rotation.slerp(other.rotation, t).normalize(),
            scale: self.scale.lerp(other.scale, t),
        }
    }
}

/// One keyframe: a pose per joint plus morph target weights.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnimPose {
    /// Time in seconds from clip start
    pub time: f32,
    /// Local pose per joint; missing trailing joints are identity
    pub local_poses: Vec<JointPose>,
    pub morph_weights: Vec<f32>,
}

impl AnimPose {
    #[must_use]
    pub fn new(time: f32, local_poses: Vec<JointPose>) -> Self {
        Self {
            time,
            local_poses,
            morph_weights: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_morph_weights(mut self, weights: Vec<f32>) -> Self {
        self.morph_weights = weights;
        self
    }

    /// Pose of `joint`, identity when the keyframe has no entry for it.
    #[must_use]
    pub fn joint(&self, joint: usize) -> JointPose {
        self.local_poses.get(joint).copied().unwrap_or_default()
    }
}

/// Immutable keyframed animation for one skeleton.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimClip {
    pub name: String,
    poses: Vec<AnimPose>,
    duration: f32,
    fps: f32,
    looping: bool,
    skeleton: SkeletonId,
}

/// Keyframes surrounding a sample time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseBracket {
    pub prev: usize,
    pub next: usize,
    /// Blend factor from `prev` towards `next`, in `[0, 1]`
    pub alpha: f32,
}

impl AnimClip {
    /// Build a clip from keyframes; they are sorted by time and the duration
    /// defaults to the last keyframe's time.
    ///
    /// # Errors
    ///
    /// Returns `EmptyClip` if `poses` is empty or any time is not finite.
    pub fn new(
        name: impl Into<String>,
        skeleton: SkeletonId,
        mut poses: Vec<AnimPose>,
    ) -> Result<Self, AnimationError> {
        if poses.is_empty() || poses.iter().any(|p| !p.time.is_finite()) {
            return Err(AnimationError::EmptyClip);
        }
        poses.sort_by(|a, b| a.time.total_cmp(&b.time));
        let duration = poses.last().map_or(0.0, |p| p.time).max(0.0);

        Ok(Self {
            name: name.into(),
            poses,
            duration,
            fps: 30.0,
            looping: true,
            skeleton,
        })
    }

    /// Override the duration, e.g. to leave room for the loop back to frame 0.
    #[must_use]
    pub fn with_duration(mut self, duration: f32) -> Self {
        let last = self.poses.last().map_or(0.0, |p| p.time);
        self.duration = duration.max(last);
        self
    }

    #[must_use]
    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    #[must_use]
    pub fn with_fps(mut self, fps: f32) -> Self {
        self.fps = fps;
        self
    }

    #[must_use]
    pub fn poses(&self) -> &[AnimPose] {
        &self.poses
    }

    #[must_use]
    pub const fn duration(&self) -> f32 {
        self.duration
    }

    #[must_use]
    pub const fn fps(&self) -> f32 {
        self.fps
    }

    #[must_use]
    pub const fn looping(&self) -> bool {
        self.looping
    }

    #[must_use]
    pub const fn skeleton(&self) -> SkeletonId {
        self.skeleton
    }

    /// Map an arbitrary time onto the clip's timeline.
    #[must_use]
    pub fn normalize_time(&self, time: f32, looping: bool) -> f32 {
        if self.duration <= 0.0 {
            0.0
        } else if looping {
            time.rem_euclid(self.duration)
        } else {
            time.clamp(0.0, self.duration)
        }
    }

    /// Locate the keyframes around `time` (already normalized).
    #[must_use]
    pub fn bracket(&self, time: f32, looping: bool) -> PoseBracket {
        let count = self.poses.len();
        if count == 1 {
            return PoseBracket {
                prev: 0,
                next: 0,
                alpha: 0.0,
            };
        }

        let next = self.poses.partition_point(|p| p.time <= time);
        if next == 0 {
            // Before the first key a looping clip is still blending in from the last one.
            let first_time = self.poses[0].time;
            let tail = (self.duration - self.poses[count - 1].time).max(0.0);
            if looping && first_time > 0.0 {
                return PoseBracket {
                    prev: count - 1,
                    next: 0,
                    alpha: ((time + tail) / (tail + first_time)).clamp(0.0, 1.0),
                };
            }
            return PoseBracket {
                prev: 0,
                next: 0,
                alpha: 0.0,
            };
        }

        let prev = next - 1;
        if next == count {
            let last = &self.poses[prev];
            // Wrap from the last key back to the first over the clip's tail.
            let tail = self.duration - last.time;
            if looping && tail > f32::EPSILON {
                let first_time = self.poses[0].time;
                let alpha = ((time - last.time) / (tail + first_time)).clamp(0.0, 1.0);
                return PoseBracket {
                    prev,
                    next: 0,
                    alpha,
                };
            }
            return PoseBracket {
                prev,
                next: prev,
                alpha: 0.0,
            };
        }

        let prev_time = self.poses[prev].time;
        let span = self.poses[next].time - prev_time;
        let alpha = if span > 0.0 {
            ((time - prev_time) / span).clamp(0.0, 1.0)
        } else {
            0.0
        };
        PoseBracket { prev, next, alpha }
    }

    /// Interpolated local poses and morph weights at a normalized time.
    pub fn sample_into(
        &self,
        time: f32,
        looping: bool,
        joint_count: usize,
        poses: &mut Vec<JointPose>,
        morphs: &mut Vec<f32>,
    ) -> PoseBracket {
        let bracket = self.bracket(time, looping);
        let a = &self.poses[bracket.prev];
        let b = &self.poses[bracket.next];

        poses.clear();
        poses.extend((0..joint_count).map(|j| a.joint(j).interpolate(&b.joint(j), bracket.alpha)));

        morphs.clear();
        let morph_count = a.morph_weights.len().max(b.morph_weights.len());
        morphs.extend((0..morph_count).map(|i| {
            let wa = a.morph_weights.get(i).copied().unwrap_or(0.0);
            let wb = b.morph_weights.get(i).copied().unwrap_or(0.0);
            wa + (wb - wa) * bracket.alpha
        }));

        bracket
    }
}

/// Playback cursor owned by exactly one sampler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnimClipState {
    pub local_time: f32,
    /// Blend weight, used while cross-fading
    pub weight: f32,
    pub playback_rate: f32,
    pub looping: bool,
    /// Index of the keyframe after `local_time`
    pub next_pose_index: usize,
    /// Engine time at which playback started
    pub global_start_time: f32,
    /// Cleared when a non-looping clip reaches its end
    pub enabled: bool,
}

impl Default for AnimClipState {
    fn default() -> Self {
        Self {
            local_time: 0.0,
            weight: 1.0,
            playback_rate: 1.0,
            looping: true,
            next_pose_index: 0,
            global_start_time: 0.0,
            enabled: true,
        }
    }
}

impl AnimClipState {
    /// Fresh cursor at the start of `clip`, inheriting its loop mode.
    #[must_use]
    pub fn for_clip(clip: &AnimClip, global_start_time: f32) -> Self {
        Self {
            looping: clip.looping(),
            global_start_time,
            ..Self::default()
        }
    }

    /// Move the clock by `dt * playback_rate`, wrapping or clamping.
    pub fn advance(&mut self, dt: f32, duration: f32) {
        if !self.enabled {
            return;
        }
        let time = self.local_time + dt * self.playback_rate;

        if duration <= 0.0 {
            self.local_time = 0.0;
        } else if self.looping {
            self.local_time = time.rem_euclid(duration);
        } else if time >= duration {
            self.local_time = duration;
            self.enabled = false;
        } else {
            self.local_time = time.max(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::skeleton::{Joint, Skeleton, SkeletonRegistry};

    fn skeleton() -> SkeletonId {
        let mut registry = SkeletonRegistry::new();
        registry.register(Skeleton::new(vec![Joint::new("root")]).unwrap())
    }

    fn clip(times: &[f32]) -> AnimClip {
        let poses = times
            .iter()
            .map(|&t| AnimPose::new(t, vec![JointPose::from_translation(Vec3::new(t, 0.0, 0.0))]))
            .collect();
        AnimClip::new("test", skeleton(), poses).unwrap()
    }

    #[test]
    fn test_empty_clip_rejected() {
        assert!(matches!(
            AnimClip::new("empty", skeleton(), Vec::new()),
            Err(AnimationError::EmptyClip)
        ));
    }

    #[test]
    fn test_keys_sorted_and_duration_from_last_key() {
        let c = clip(&[2.0, 0.0, 1.0]);
        let times: Vec<f32> = c.poses().iter().map(|p| p.time).collect();
        assert_eq!(times, vec![0.0, 1.0, 2.0]);
        assert_eq!(c.duration(), 2.0);
    }

    #[test]
    fn test_bracket_interior() {
        let c = clip(&[0.0, 1.0, 3.0]);
        let b = c.bracket(2.0, false);
        assert_eq!((b.prev, b.next), (1, 2));
        assert!((b.alpha - 0.5).abs() < 1e-6);
        assert_eq!(c.bracket(1.0, false).prev, 1);
    }

    #[test]
    fn test_looping_tail_wraps_to_first_key() {
        let c = clip(&[0.0, 1.0]).with_duration(2.0);
        let b = c.bracket(1.5, true);
        assert_eq!((b.prev, b.next), (1, 0));
        assert!((b.alpha - 0.5).abs() < 1e-6);

        let clamped = c.bracket(1.5, false);
        assert_eq!((clamped.prev, clamped.next), (1, 1));
    }

    #[test]
    fn test_looping_lead_in_blends_from_last_key() {
        let c = AnimClip::new(
            "late",
            skeleton(),
            vec![
                AnimPose::new(0.5, vec![JointPose::from_translation(Vec3::ZERO)]),
                AnimPose::new(1.0, vec![JointPose::from_translation(Vec3::new(10.0, 0.0, 0.0))]),
            ],
        )
        .unwrap()
        .with_duration(1.5);

        let b = c.bracket(0.0, true);
        assert_eq!((b.prev, b.next), (1, 0));
        assert!((b.alpha - 0.5).abs() < 1e-6);

        let x_at = |t: f32| {
            let mut poses = Vec::new();
            let mut morphs = Vec::new();
            c.sample_into(c.normalize_time(t, true), true, 1, &mut poses, &mut morphs);
            poses[0].translation.x
        };
        assert!((x_at(0.0) - 5.0).abs() < 1e-4);
        assert!((x_at(0.25) - 2.5).abs() < 1e-4);
        // No jump across the loop seam
        assert!((x_at(1.499) - x_at(1.5)).abs() < 0.05);

        // Without looping the first key is held
        let held = c.bracket(0.25, false);
        assert_eq!((held.prev, held.next, held.alpha), (0, 0, 0.0));
    }

    #[test]
    fn test_missing_joint_defaults_to_identity() {
        let c = AnimClip::new(
            "sparse",
            skeleton(),
            vec![AnimPose::new(0.0, vec![JointPose::from_translation(Vec3::X)])],
        )
        .unwrap();
        let mut poses = Vec::new();
        let mut morphs = Vec::new();
        c.sample_into(0.0, true, 3, &mut poses, &mut morphs);
        assert_eq!(poses.len(), 3);
        assert_eq!(poses[0].translation, Vec3::X);
        assert_eq!(poses[2], JointPose::IDENTITY);
    }

    #[test]
    fn test_morph_weights_interpolate() {
        let c = AnimClip::new(
            "morph",
            skeleton(),
            vec![
                AnimPose::new(0.0, Vec::new()).with_morph_weights(vec![0.0, 1.0]),
                AnimPose::new(1.0, Vec::new()).with_morph_weights(vec![1.0]),
            ],
        )
        .unwrap();
        let mut poses = Vec::new();
        let mut morphs = Vec::new();
        c.sample_into(0.25, false, 0, &mut poses, &mut morphs);
        assert!((morphs[0] - 0.25).abs() < 1e-6);
        assert!((morphs[1] - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_state_advance_modes() {
        let mut looping = AnimClipState::default();
        looping.advance(2.5, 1.0);
        assert!((looping.local_time - 0.5).abs() < 1e-6);

        let mut once = AnimClipState {
            looping: false,
            ..Default::default()
        };
        once.advance(0.4, 1.0);
        assert!(once.enabled);
        once.advance(5.0, 1.0);
        assert_eq!(once.local_time, 1.0);
        assert!(!once.enabled);

        let mut frozen = AnimClipState {
            playback_rate: 0.0,
            local_time: 0.3,
            ..Default::default()
        };
        frozen.advance(10.0, 1.0);
        assert_eq!(frozen.local_time, 0.3);
        assert!(frozen.enabled);
    }
}
