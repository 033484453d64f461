//! Systems that feed the renderer from the world
//!
//! Each system is a free function over the hecs world. They talk to the
//! renderer through [`SceneSink`] so they can run against a recorder in
//! tests.

use glam::{Mat4, Vec3};
use hecs::World;

use super::components::{LightSource, Renderable, Transform};
use crate::animation::Animation;
use crate::renderer::{
    DirectionalLight, JointHandle, MeshDescriptorHandle, PointLight, PrimitiveRenderCmd,
    RenderError, Renderer, SpotLight,
};

/// Renderer-facing half of scene submission.
pub trait SceneSink {
    fn push_mesh_render(&mut self, cmd: PrimitiveRenderCmd) -> bool;
    fn update_transform(
        &mut self,
        descriptor: MeshDescriptorHandle,
        transform: Mat4,
        morphs: &[f32],
    ) -> bool;
    fn upload_palette(&mut self, joints: JointHandle, palette: &[Mat4]) -> Result<(), RenderError>;
    fn push_directional(&mut self, light: &DirectionalLight) -> Result<(), RenderError>;
    fn push_point(&mut self, light: &PointLight) -> Result<(), RenderError>;
    fn push_spot(&mut self, light: &SpotLight) -> Result<(), RenderError>;
}

impl SceneSink for Renderer {
    fn push_mesh_render(&mut self, cmd: PrimitiveRenderCmd) -> bool {
        Self::push_mesh_render(self, cmd)
    }

    fn update_transform(
        &mut self,
        descriptor: MeshDescriptorHandle,
        transform: Mat4,
        morphs: &[f32],
    ) -> bool {
        self.update_mesh_descriptor(descriptor, transform, morphs)
    }

    fn upload_palette(&mut self, joints: JointHandle, palette: &[Mat4]) -> Result<(), RenderError> {
        self.update_joint_palette(joints, palette)
    }

    fn push_directional(&mut self, light: &DirectionalLight) -> Result<(), RenderError> {
        self.push_directional_light(light)
    }

    fn push_point(&mut self, light: &PointLight) -> Result<(), RenderError> {
        self.push_point_light(light)
    }

    fn push_spot(&mut self, light: &SpotLight) -> Result<(), RenderError> {
        self.push_spot_light(light)
    }
}

/// Counters from one submission pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SubmitStats {
    pub commands: usize,
    pub rejected: usize,
    pub palettes: usize,
    pub lights: usize,
    pub dropped_lights: usize,
}

/// Upload transforms and palettes, then queue one command per primitive.
pub fn submit_renderables(
    world: &World,
    animation: &Animation,
    sink: &mut impl SceneSink,
    stats: &mut SubmitStats,
) {
    for (_, (transform, renderable)) in world.query::<(&Transform, &Renderable)>().iter() {
        let matrix = transform.matrix();
        let mesh = renderable.mesh();
        let world_center = matrix.transform_point3(mesh.local_center);

        let morphs: &[f32] = match renderable {
            Renderable::Skinned { animation: id, .. } => {
                animation.handle(*id).map_or(&[], |handle| handle.final_morphs())
            }
            _ => &[],
        };
        if !sink.update_transform(mesh.descriptor, matrix, morphs) {
            log::warn!("Skipping renderable with a stale mesh descriptor");
            continue;
        }

        let mut joints = None;
        if let Renderable::Skinned { joints: handle, animation: id, .. } = renderable {
            let Some(anim) = animation.handle(*id) else {
                log::warn!("Skinned renderable has no animation handle {id:?}");
                continue;
            };
            match sink.upload_palette(*handle, anim.final_palette()) {
                Ok(()) => {
                    stats.palettes += 1;
                    joints = Some(*handle);
                }
                Err(err) => {
                    log::warn!("Joint palette upload failed: {err}");
                    continue;
                }
            }
        }

        let instances = match renderable {
            Renderable::Batched { instances, .. } => *instances,
            _ => 1,
        };

        for primitive in &mesh.primitives {
            let mut cmd =
                PrimitiveRenderCmd::new(mesh.mesh, mesh.descriptor, mesh.material, *primitive)
                    .with_flags(mesh.flags)
                    .with_world_center(world_center)
                    .with_instances(instances);
            if let Some(handle) = joints {
                cmd = cmd.with_joints(handle);
            }
            if sink.push_mesh_render(cmd) {
                stats.commands += 1;
            } else {
                stats.rejected += 1;
            }
        }
    }
}

/// Queue every light component, placed by its entity's transform.
pub fn submit_lights(world: &World, sink: &mut impl SceneSink, stats: &mut SubmitStats) {
    for (_, (transform, light)) in world.query::<(&Transform, &LightSource)>().iter() {
        let result = match light {
            LightSource::Directional { .. } => match light.directional(transform) {
                Some(sun) => sink.push_directional(&sun),
                None => continue,
            },
            LightSource::Point(point) => {
                let mut point = point.clone();
                point.position = transform.position;
                sink.push_point(&point)
            }
            LightSource::Spot(spot) => {
                let mut spot = spot.clone();
                spot.position = transform.position;
                spot.direction = transform.forward().normalize_or(Vec3::NEG_Z);
                sink.push_spot(&spot)
            }
        };
        match result {
            Ok(()) => stats.lights += 1,
            Err(err) => {
                log::debug!("Dropping light: {err}");
                stats.dropped_lights += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{AnimClip, AnimHandleId, AnimPose, Joint, JointPose, Skeleton};
    use crate::ecs::components::RenderMesh;
    use crate::renderer::{Handle, LightKind, RenderFlags};
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorder {
        commands: Vec<PrimitiveRenderCmd>,
        transforms: Vec<(MeshDescriptorHandle, Mat4, Vec<f32>)>,
        palettes: Vec<(JointHandle, Mat4)>,
        points: Vec<PointLight>,
        spots: Vec<SpotLight>,
        directionals: Vec<DirectionalLight>,
        point_capacity: usize,
    }

    impl SceneSink for Recorder {
        fn push_mesh_render(&mut self, cmd: PrimitiveRenderCmd) -> bool {
            if !cmd.flags.contains(RenderFlags::RENDERABLE) {
                return false;
            }
            self.commands.push(cmd);
            true
        }

        fn update_transform(
            &mut self,
            descriptor: MeshDescriptorHandle,
            transform: Mat4,
            morphs: &[f32],
        ) -> bool {
            self.transforms.push((descriptor, transform, morphs.to_vec()));
            true
        }

        fn upload_palette(
            &mut self,
            joints: JointHandle,
            palette: &[Mat4],
        ) -> Result<(), RenderError> {
            self.palettes.push((joints, palette[1]));
            Ok(())
        }

        fn push_directional(&mut self, light: &DirectionalLight) -> Result<(), RenderError> {
            self.directionals.push(light.clone());
            Ok(())
        }

        fn push_point(&mut self, light: &PointLight) -> Result<(), RenderError> {
            if self.points.len() >= self.point_capacity {
                return Err(RenderError::LightCapacityExceeded {
                    kind: LightKind::Point,
                    capacity: self.point_capacity,
                });
            }
            self.points.push(light.clone());
            Ok(())
        }

        fn push_spot(&mut self, light: &SpotLight) -> Result<(), RenderError> {
            self.spots.push(light.clone());
            Ok(())
        }
    }

    fn render_mesh(index: u32) -> RenderMesh {
        RenderMesh::new(
            Handle::from_raw_parts(index, 0),
            Handle::from_raw_parts(index, 0),
            Handle::from_raw_parts(0, 0),
            6,
        )
    }

    #[test]
    fn test_static_renderable_queues_one_cmd_per_primitive() {
        let mut world = World::new();
        let mut mesh = render_mesh(1).with_local_center(Vec3::Y);
        mesh.primitives.push(crate::renderer::PrimitiveRange::new(6, 3));
        world.spawn((Transform::from_position(Vec3::new(2.0, 0.0, 0.0)), Renderable::Static(mesh)));

        let mut sink = Recorder::default();
        let mut stats = SubmitStats::default();
        submit_renderables(&world, &Animation::new(), &mut sink, &mut stats);

        assert_eq!(stats.commands, 2);
        assert_eq!(sink.transforms.len(), 1);
        assert!(sink.commands.iter().all(|cmd| cmd.world_center == Vec3::new(2.0, 1.0, 0.0)));
        assert_eq!(sink.commands[1].primitive.indices(), 6..9);
    }

    #[test]
    fn test_skinned_renderable_uploads_palette_first() {
        let mut animation = Animation::new();
        let skeleton = animation.register_skeleton(
            Skeleton::new(vec![Joint::new("root"), Joint::new("tip").with_parent(0)]).unwrap(),
        );
        let pose = |y: f32| {
            AnimPose::new(
                0.0,
                vec![JointPose::IDENTITY, JointPose::from_translation(Vec3::new(0.0, y, 0.0))],
            )
        };
        let clip = AnimClip::new("reach", skeleton, vec![pose(1.0)]).unwrap();
        let id = AnimHandleId(7);
        animation.create_anim_handle(id).unwrap().play(Arc::new(clip));
        animation.update_state(0.0);

        let mut world = World::new();
        world.spawn((
            Transform::default(),
            Renderable::Skinned {
                mesh: render_mesh(2),
                joints: Handle::from_raw_parts(3, 0),
                animation: id,
            },
        ));

        let mut sink = Recorder::default();
        let mut stats = SubmitStats::default();
        submit_renderables(&world, &animation, &mut sink, &mut stats);

        assert_eq!(stats.palettes, 1);
        assert_eq!(sink.commands.len(), 1);
        assert!(sink.commands[0].flags.contains(RenderFlags::SKINNED));
        assert_eq!(sink.commands[0].joints, Some(Handle::from_raw_parts(3, 0)));
        let tip = sink.palettes[0].1.transform_point3(Vec3::ZERO);
        assert!(tip.abs_diff_eq(Vec3::Y, 1e-5));
    }

    #[test]
    fn test_skinned_without_handle_is_skipped() {
        let mut world = World::new();
        world.spawn((
            Transform::default(),
            Renderable::Skinned {
                mesh: render_mesh(2),
                joints: Handle::from_raw_parts(3, 0),
                animation: AnimHandleId(99),
            },
        ));
        let mut sink = Recorder::default();
        let mut stats = SubmitStats::default();
        submit_renderables(&world, &Animation::new(), &mut sink, &mut stats);
        assert!(sink.commands.is_empty());
        assert_eq!(stats.palettes, 0);
    }

    #[test]
    fn test_batched_sets_instance_count() {
        let mut world = World::new();
        world.spawn((
            Transform::default(),
            Renderable::Batched {
                mesh: render_mesh(1),
                instances: 12,
            },
        ));
        let mut sink = Recorder::default();
        let mut stats = SubmitStats::default();
        submit_renderables(&world, &Animation::new(), &mut sink, &mut stats);
        assert_eq!(sink.commands[0].instances, 12);
    }

    #[test]
    fn test_lights_take_entity_position_and_overflow_is_counted() {
        let mut world = World::new();
        for x in 0..3 {
            world.spawn((
                Transform::from_position(Vec3::new(x as f32, 1.0, 0.0)),
                LightSource::Point(PointLight::new(Vec3::ZERO, Vec3::ONE, 1.0)),
            ));
        }
        world.spawn((
            Transform::from_position(Vec3::new(0.0, 5.0, 0.0)),
            LightSource::Spot(SpotLight::new(Vec3::ZERO, Vec3::X, Vec3::ONE, 1.0)),
        ));

        let mut sink = Recorder {
            point_capacity: 2,
            ..Default::default()
        };
        let mut stats = SubmitStats::default();
        submit_lights(&world, &mut sink, &mut stats);

        assert_eq!(stats.lights, 3);
        assert_eq!(stats.dropped_lights, 1);
        assert!(sink.points.iter().all(|light| light.position.y == 1.0));
        assert_eq!(sink.spots[0].position, Vec3::new(0.0, 5.0, 0.0));
        assert!(sink.spots[0].direction.abs_diff_eq(Vec3::NEG_Z, 1e-6));
    }
}
