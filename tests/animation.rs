//! Animation sampling through the public API

use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};
use recluse::animation::{
    AnimClip, AnimHandleId, AnimPose, Animation, AnimationError, Joint, JointPose, MAX_JOINTS,
    Skeleton, SkeletonId,
};

fn arm(animation: &mut Animation) -> SkeletonId {
    let joints = vec![
        Joint::new("shoulder"),
        Joint::new("elbow").with_parent(0),
        Joint::new("wrist").with_parent(1),
    ];
    animation.register_skeleton(Skeleton::new(joints).unwrap())
}

fn wave(skeleton: SkeletonId) -> AnimClip {
    let pose = |time: f32, angle: f32| {
        AnimPose::new(
            time,
            vec![
                JointPose::from_rotation(Quat::from_rotation_z(angle)),
                JointPose::new(Vec3::Y, Quat::from_rotation_z(angle * 0.5), Vec3::ONE),
                JointPose::from_translation(Vec3::Y),
            ],
        )
    };
    AnimClip::new(
        "wave",
        skeleton,
        vec![pose(0.0, 0.0), pose(0.75, 0.8), pose(1.5, -0.3)],
    )
    .unwrap()
}

#[test]
fn test_palette_is_pure() {
    let mut animation = Animation::new();
    let clip = wave(arm(&mut animation));

    let first = animation.compute_palette(&clip, 0.6).unwrap();
    let second = animation.compute_palette(&clip, 0.6).unwrap();
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.to_cols_array().map(f32::to_bits), b.to_cols_array().map(f32::to_bits));
    }
}

#[test]
fn test_looping_clip_wraps_by_whole_durations() {
    let mut animation = Animation::new();
    let clip = wave(arm(&mut animation));
    let duration = clip.duration();
    assert!(clip.looping());

    let base = animation.compute_palette(&clip, 0.375).unwrap();
    for k in 1..4 {
        let wrapped = animation
            .compute_palette(&clip, 0.375 + k as f32 * duration)
            .unwrap();
        for (a, b) in base.iter().zip(&wrapped) {
            assert!(a.abs_diff_eq(*b, 1e-5), "k = {k}");
        }
    }
}

#[test]
fn test_one_shot_clip_holds_last_pose() {
    let mut animation = Animation::new();
    let clip = wave(arm(&mut animation)).with_looping(false);
    let duration = clip.duration();

    let end = animation.compute_palette(&clip, duration).unwrap();
    for t in [duration + 0.01, duration * 2.0, duration * 10.0] {
        assert_eq!(animation.compute_palette(&clip, t).unwrap(), end);
    }
}

#[test]
fn test_midpoint_slerps_single_joint() {
    let mut animation = Animation::new();
    let skeleton = animation.register_skeleton(Skeleton::new(vec![Joint::new("root")]).unwrap());
    let clip = AnimClip::new(
        "turn",
        skeleton,
        vec![
            AnimPose::new(0.0, vec![JointPose::IDENTITY]),
            AnimPose::new(
                1.0,
                vec![JointPose::from_rotation(Quat::from_rotation_y(std::f32::consts::FRAC_PI_2))],
            ),
        ],
    )
    .unwrap()
    .with_looping(false);

    let mut poses = Vec::new();
    let mut morphs = Vec::new();
    let time = clip.normalize_time(0.5, false);
    clip.sample_into(time, false, 1, &mut poses, &mut morphs);

    let expected = Quat::from_rotation_y(std::f32::consts::FRAC_PI_4);
    assert!(poses[0].rotation.abs_diff_eq(expected, 1e-5));

    // Root joint with identity bind pose: the palette is the local pose.
    let palette = animation.compute_palette(&clip, 0.5).unwrap();
    assert!(palette[0].abs_diff_eq(Mat4::from_quat(expected), 1e-5));
}

#[test]
fn test_handle_drives_palette_and_crossfade() {
    let mut animation = Animation::new();
    let skeleton = arm(&mut animation);
    let wave = Arc::new(wave(skeleton));
    let rest = Arc::new(
        AnimClip::new(
            "rest",
            skeleton,
            vec![AnimPose::new(
                0.0,
                vec![
                    JointPose::IDENTITY,
                    JointPose::from_translation(Vec3::Y),
                    JointPose::from_translation(Vec3::Y),
                ],
            )],
        )
        .unwrap(),
    );

    let id = AnimHandleId(1);
    animation.create_anim_handle(id).unwrap().play(Arc::clone(&rest));
    animation.update_state(0.1);
    let wrist = animation.handle(id).unwrap().final_palette()[2].transform_point3(Vec3::ZERO);
    assert!(wrist.abs_diff_eq(Vec3::new(0.0, 2.0, 0.0), 1e-5));

    animation.handle_mut(id).unwrap().crossfade(wave, 0.5).unwrap();
    animation.update_state(0.25);
    let halfway = animation.handle(id).unwrap().final_palette()[2].transform_point3(Vec3::ZERO);
    assert!(!halfway.abs_diff_eq(wrist, 1e-4));

    // Untouched palette slots stay identity
    let palette = animation.handle(id).unwrap().final_palette();
    assert_eq!(palette.len(), MAX_JOINTS);
    assert_eq!(palette[MAX_JOINTS - 1], Mat4::IDENTITY);
}

#[test]
fn test_crossfade_rejects_foreign_skeleton() {
    let mut animation = Animation::new();
    let arm = arm(&mut animation);
    let other = animation.register_skeleton(Skeleton::new(vec![Joint::new("root")]).unwrap());
    let id = AnimHandleId(2);
    let handle = animation.create_anim_handle(id).unwrap();
    handle.play(Arc::new(wave(arm)));
    let foreign =
        AnimClip::new("other", other, vec![AnimPose::new(0.0, vec![JointPose::IDENTITY])])
            .unwrap();
    assert_eq!(
        handle.crossfade(Arc::new(foreign), 0.2),
        Err(AnimationError::SkeletonMismatch)
    );
}

#[test]
fn test_released_skeleton_cannot_be_sampled() {
    let mut animation = Animation::new();
    let skeleton = arm(&mut animation);
    let clip = wave(skeleton);
    assert!(animation.release_skeleton(skeleton));
    assert_eq!(
        animation.compute_palette(&clip, 0.0),
        Err(AnimationError::UnknownSkeleton)
    );
}
