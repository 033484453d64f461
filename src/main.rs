//! Demo scene: a skinned tentacle swaying over a floor, lit by a sun and
//! two point lights, with an ember emitter and a small HUD.

use std::sync::Arc;

use recluse::prelude::*;

const TENTACLE_JOINTS: u32 = 6;
const TENTACLE_LENGTH: f32 = 3.0;

struct DemoGame {
    orbit_yaw: f32,
    orbit_pitch: f32,
    orbit_distance: f32,
    sun_angle: f32,
    applied_sun: Option<f32>,
    tentacle: Option<Entity>,
    sway: Option<Arc<AnimClip>>,
    curl: Option<Arc<AnimClip>>,
    curling: bool,
}

impl DemoGame {
    fn new() -> Self {
        Self {
            orbit_yaw: 0.6,
            orbit_pitch: 0.35,
            orbit_distance: 9.0,
            sun_angle: 0.9,
            applied_sun: None,
            tentacle: None,
            sway: None,
            curl: None,
            curling: false,
        }
    }

    fn camera(&self) -> Camera {
        let offset = Vec3::new(
            self.orbit_yaw.sin() * self.orbit_pitch.cos(),
            self.orbit_pitch.sin(),
            self.orbit_yaw.cos() * self.orbit_pitch.cos(),
        ) * self.orbit_distance;
        let target = Vec3::new(0.0, 1.5, 0.0);
        Camera::look_at(target + offset, target)
    }

    fn sun(&self) -> DirectionalLight {
        let direction = Vec3::new(self.sun_angle.cos(), -0.8, self.sun_angle.sin() * 0.5);
        DirectionalLight::new(direction, Vec3::new(1.0, 0.95, 0.85), 3.0)
    }
}

/// Chain of joints stacked along +Y, matching `MeshData::tentacle`.
fn tentacle_skeleton() -> Result<Skeleton, AnimationError> {
    let spacing = TENTACLE_LENGTH / TENTACLE_JOINTS as f32;
    let joints = (0..TENTACLE_JOINTS)
        .map(|i| {
            let bind = Mat4::from_translation(Vec3::Y * spacing * i as f32);
            let joint = Joint::new(format!("segment_{i}")).with_inverse_bind_pose(bind.inverse());
            if i == 0 {
                joint
            } else {
                joint.with_parent((i - 1) as u8)
            }
        })
        .collect();
    Skeleton::new(joints)
}

/// Each key bends every joint by the same angle around `axis`, so the
/// chain curls more towards the tip.
fn bend_clip(
    name: &str,
    skeleton: SkeletonId,
    axis: Vec3,
    keys: &[(f32, f32, [f32; 2])],
) -> Result<AnimClip, AnimationError> {
    let spacing = TENTACLE_LENGTH / TENTACLE_JOINTS as f32;
    let poses = keys
        .iter()
        .map(|&(time, angle, morphs)| {
            let joints = (0..TENTACLE_JOINTS)
                .map(|i| {
                    let rotation = Quat::from_axis_angle(axis, angle);
                    if i == 0 {
                        JointPose::from_rotation(rotation)
                    } else {
                        JointPose::new(Vec3::Y * spacing, rotation, Vec3::ONE)
                    }
                })
                .collect();
            AnimPose::new(time, joints).with_morph_weights(morphs.to_vec())
        })
        .collect();
    AnimClip::new(name, skeleton, poses)
}

impl Game for DemoGame {
    fn init(&mut self, ctx: &mut EngineContext) -> Result<(), Box<dyn std::error::Error>> {
        log::info!("Building demo scene");

        let renderer = ctx.renderer_mut();
        renderer.set_sun(self.sun());
        self.applied_sun = Some(self.sun_angle);
        renderer.set_camera(&self.camera());
        renderer.generate_brdf_lut(256, 256);

        // Floor and pillars are static: they land in the cached shadow map.
        let floor_data = MeshData::plane(24.0);
        let floor = RenderMesh::new(
            renderer.create_mesh(&floor_data),
            renderer.create_mesh_descriptor(),
            renderer
                .create_material_descriptor(Material::new(Vec3::splat(0.6)).with_roughness(0.8)),
            floor_data.index_count(),
        )
        .with_flags(RenderFlags::STATIC);

        let pillar_data = MeshData::cube();
        let pillar_mesh = renderer.create_mesh(&pillar_data);
        let stone =
            renderer.create_material_descriptor(Material::metal(Vec3::new(0.8, 0.7, 0.5), 0.35));
        let pillars: Vec<_> = (0..4)
            .map(|_| {
                RenderMesh::new(
                    pillar_mesh,
                    renderer.create_mesh_descriptor(),
                    stone,
                    pillar_data.index_count(),
                )
                .with_flags(RenderFlags::STATIC)
                .with_local_center(pillar_data.center())
            })
            .collect();

        let glass_data = MeshData::sphere(0.6, 32, 16);
        let glass = RenderMesh::new(
            renderer.create_mesh(&glass_data),
            renderer.create_mesh_descriptor(),
            renderer.create_material_descriptor(Material::glass(Vec3::new(0.4, 0.7, 1.0), 0.35)),
            glass_data.index_count(),
        )
        .with_flags(RenderFlags::TRANSPARENT);

        let tentacle_data = MeshData::tentacle(0.35, TENTACLE_LENGTH, 24, 24, TENTACLE_JOINTS);
        let tentacle = RenderMesh::new(
            renderer.create_mesh(&tentacle_data),
            renderer.create_mesh_descriptor(),
            renderer.create_material_descriptor(
                Material::new(Vec3::new(0.7, 0.2, 0.3)).with_roughness(0.4),
            ),
            tentacle_data.index_count(),
        )
        .with_flags(RenderFlags::MORPH)
        .with_local_center(tentacle_data.center());
        let joints = renderer.create_joint_descriptor();

        renderer.create_particle_emitter(
            EmitterConfig::default()
                .with_max_particles(2048)
                .with_spawn_rate(120.0)
                .with_lifetime(1.0, 2.5)
                .with_velocity(Vec3::new(-0.3, 1.0, -0.3), Vec3::new(0.3, 2.2, 0.3))
                .with_colors(Vec4::new(1.0, 0.6, 0.2, 1.0), Vec4::new(0.8, 0.1, 0.0, 0.0)),
        );

        let scene = &mut ctx.scene;
        scene.spawn_static("floor", Transform::default(), floor);
        for (i, pillar) in pillars.into_iter().enumerate() {
            let angle = i as f32 * std::f32::consts::FRAC_PI_2 + 0.4;
            let position = Vec3::new(angle.cos() * 4.0, 1.0, angle.sin() * 4.0);
            scene.spawn_static(
                "pillar",
                Transform::from_position(position).with_scale(Vec3::new(0.6, 2.0, 0.6)),
                pillar,
            );
        }
        scene.spawn_static("glass", Transform::from_position(Vec3::new(2.0, 0.6, 1.5)), glass);

        let skeleton = scene.animation_mut().register_skeleton(tentacle_skeleton()?);
        let sway = Arc::new(bend_clip(
            "sway",
            skeleton,
            Vec3::Z,
            &[(0.0, -0.2, [0.0, 0.0]), (1.5, 0.2, [0.6, 0.0]), (3.0, -0.2, [0.0, 0.0])],
        )?);
        let curl = Arc::new(bend_clip(
            "curl",
            skeleton,
            Vec3::X,
            &[(0.0, 0.1, [0.0, 0.4]), (1.0, 0.45, [0.0, 1.0]), (2.0, 0.1, [0.0, 0.4])],
        )?);

        self.tentacle = Some(scene.spawn_skinned(
            "tentacle",
            Transform::default(),
            tentacle,
            joints,
            Arc::clone(&sway),
        ));
        self.sway = Some(sway);
        self.curl = Some(curl);

        scene.spawn_light(
            "ember",
            Transform::from_position(Vec3::new(0.0, 0.5, 0.0)),
            LightSource::Point(PointLight::new(Vec3::ZERO, Vec3::new(1.0, 0.5, 0.2), 4.0)),
        );
        scene.spawn_light(
            "fill",
            Transform::from_position(Vec3::new(-3.0, 3.0, 3.0)),
            LightSource::Point(PointLight::new(Vec3::ZERO, Vec3::new(0.3, 0.4, 1.0), 2.0)),
        );
        scene.spawn_light(
            "lamp",
            Transform::from_position(Vec3::new(0.0, 5.0, 0.0))
                .with_rotation(Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2)),
            LightSource::Spot(
                SpotLight::new(Vec3::ZERO, Vec3::NEG_Y, Vec3::ONE, 6.0).with_angles(15.0, 30.0),
            ),
        );

        // The probe sees the static set only, so bake after spawning it.
        let (scene, renderer) = ctx.scene_and_renderer();
        scene.submit(renderer);
        let probe = renderer.bake_environment_map(Vec3::new(0.0, 1.5, 0.0), 128);
        renderer.set_global_probe(Some(probe));
        renderer.add_local_probe(LocalProbe {
            position: Vec3::new(0.0, 1.5, 0.0),
            radius: 6.0,
            cube: probe,
        });
        renderer.discard_queued();

        log::info!("Demo scene ready");
        Ok(())
    }

    fn update(&mut self, ctx: &mut EngineContext) {
        let dt = ctx.time.delta_seconds();

        let drag = ctx.input.drag();
        self.orbit_yaw -= drag.x * 0.005;
        self.orbit_pitch = (self.orbit_pitch + drag.y * 0.005).clamp(0.05, 1.4);
        self.orbit_distance = (self.orbit_distance - ctx.input.scroll() * 0.5).clamp(3.0, 25.0);

        if ctx.input.is_key_held(KeyCode::KeyQ) {
            self.sun_angle -= dt * 0.5;
        }
        if ctx.input.is_key_held(KeyCode::KeyE) {
            self.sun_angle += dt * 0.5;
        }

        if ctx.input.is_key_pressed(KeyCode::Space)
            && let Some(entity) = self.tentacle
        {
            let next = if self.curling { &self.sway } else { &self.curl };
            if let Some(clip) = next {
                match ctx.scene.crossfade(entity, Arc::clone(clip), 0.6) {
                    Ok(()) => self.curling = !self.curling,
                    Err(err) => log::warn!("Crossfade failed: {err}"),
                }
            }
        }

        let camera = self.camera();
        let fps = ctx.stats.fps();
        let renderer = ctx.renderer_mut();
        renderer.set_camera(&camera);
        if self.applied_sun != Some(self.sun_angle) {
            renderer.set_sun(self.sun());
            self.applied_sun = Some(self.sun_angle);
        }

        let (width, _) = renderer.size();
        let fps_bar = (fps / 144.0).clamp(0.0, 1.0) * (width as f32 * 0.25);
        renderer.push_ui_rect(
            &Rect::new(16.0, 16.0, width as f32 * 0.25, 10.0).with_color([0.0, 0.0, 0.0, 0.5]),
        );
        renderer.push_ui_rect(
            &Rect::new(16.0, 16.0, fps_bar, 10.0).with_color([0.2, 0.9, 0.4, 0.9]),
        );
        renderer.push_ui_rect(
            &Rect::new(16.0, 16.0, 12.0, 12.0)
                .with_anchor(Anchor::BottomRight)
                .with_color(if self.curling {
                    [1.0, 0.3, 0.3, 1.0]
                } else {
                    [0.3, 0.3, 1.0, 1.0]
                }),
        );
    }

    fn shutdown(&mut self, ctx: &mut EngineContext) {
        log::info!(
            "Shutting down after {} frames, {}",
            ctx.stats.total_frames(),
            ctx.stats.summary(&ctx.renderer().stats())
        );
    }
}

fn main() {
    let config = EngineConfig::default().with_title("Recluse Demo");
    if let Err(err) = Engine::new(config, DemoGame::new()).run() {
        eprintln!("Engine error: {err}");
        std::process::exit(1);
    }
}
