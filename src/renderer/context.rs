//! The wgpu renderer
//!
//! [`Renderer`] owns the device, every render target and pipeline, the
//! resource pools and the frame scheduler. The game layer pushes commands
//! and lights each frame and calls [`Renderer::render`] once.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use bytemuck::Zeroable;
use glam::{Mat4, Vec2, Vec3};
use wgpu::util::DeviceExt;
use winit::window::Window;

use super::camera::{Camera, GlobalUniform, cube_face_projection, cube_face_view};
use super::cmd::{
    JointHandle, MaterialHandle, MeshDescriptorHandle, MeshHandle, PrimitiveRenderCmd, RenderFlags,
};
use super::error::RenderError;
use super::frame::{DEFAULT_FENCE_TIMEOUT, FrameScheduler, PerFrame};
use super::gpu::fence::GpuFence;
use super::gpu::layouts::BindGroupLayouts;
use super::gpu::passes::{FrameContext, ProbeCapture, UiBatch};
use super::gpu::pipelines::Pipelines;
use super::gpu::surface::GpuContext;
use super::gpu::targets::{DEPTH_FORMAT, FrameTargets, HDR_FORMAT, RenderTarget};
use super::graph::GraphOptions;
use super::ibl::{BRDF_LUT_FORMAT, LocalProbe, ProbeSet, ProbeUniform};
use super::lights::{DirectionalLight, LightBuffer, LightSet, PointLight, SpotLight};
use super::material::Material;
use super::mesh::MeshData;
use super::overlay::{Rect, UiRect};
use super::particles::{EmitterConfig, GpuParticles, ParticleEmitter, ParticleSystem};
use super::pool::{Handle, Pool};
use super::postprocess::PostProcessConfig;
use super::resources::{
    GpuMesh, JointDescriptor, MaterialDescriptor, MeshDescriptor, ResourceRegistry,
};
use super::shadow::{ShadowConfig, ShadowMaps};
use super::skybox::{SkySource, Skybox};
use super::texture::{Texture2D, TextureCube, padded_bytes_per_row, unpad_rows, write_png};
use crate::config::{AntiAliasing, GraphicsConfigParams};

/// Edge length of the procedural sky cube
const SKY_SIZE: u32 = 256;
/// Initial UI instance capacity; grows on demand
const UI_CAPACITY: usize = 256;
const PROBE_NEAR: f32 = 0.1;
const PROBE_FAR: f32 = 500.0;

pub type ParticleHandle = Handle<ParticleSystem>;

/// Counters for the last rendered frame plus lifetime totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub frames: u64,
    pub skipped_frames: u64,
    pub reconfigurations: u64,
    pub static_shadow_refreshes: u64,
    pub deferred_draws: usize,
    pub forward_draws: usize,
    pub shadow_casters: usize,
    pub lights: usize,
    pub particle_systems: usize,
    pub ui_rects: usize,
}

/// Uniform buffers replicated per frame slot.
struct FrameResources {
    global_buffer: wgpu::Buffer,
    global_bind_group: wgpu::BindGroup,
    light_buffer: wgpu::Buffer,
    probe_buffer: wgpu::Buffer,
}

impl FrameResources {
    fn new(device: &wgpu::Device, layouts: &BindGroupLayouts) -> Self {
        let global_buffer = uniform_buffer(device, "global_buffer", &GlobalUniform::zeroed());
        let global_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("global_bind_group"),
            layout: &layouts.global,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: global_buffer.as_entire_binding(),
            }],
        });
        Self {
            global_buffer,
            global_bind_group,
            light_buffer: uniform_buffer(device, "light_buffer", &LightBuffer::default()),
            probe_buffer: uniform_buffer(device, "probe_buffer", &ProbeSet::new().uniform(None)),
        }
    }
}

fn uniform_buffer<T: bytemuck::Pod>(device: &wgpu::Device, label: &str, value: &T) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::bytes_of(value),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    })
}

/// Buffers and textures feeding one lighting bind group.
struct LightingInputs<'a> {
    global: &'a wgpu::Buffer,
    lights: &'a wgpu::Buffer,
    probes: &'a wgpu::Buffer,
    global_env: &'a TextureCube,
    local_env: &'a TextureCube,
    brdf_lut: &'a Texture2D,
}

/// Instanced overlay rectangles queued for this frame.
struct UiOverlay {
    rects: Vec<UiRect>,
    instances: wgpu::Buffer,
    capacity: usize,
    screen_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl UiOverlay {
    fn new(device: &wgpu::Device, layouts: &BindGroupLayouts) -> Self {
        let screen_buffer = uniform_buffer(device, "ui_screen", &[1.0f32, 1.0, 0.0, 0.0]);
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ui_bind_group"),
            layout: &layouts.ui,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: screen_buffer.as_entire_binding(),
            }],
        });
        Self {
            rects: Vec::new(),
            instances: Self::instance_buffer(device, UI_CAPACITY),
            capacity: UI_CAPACITY,
            screen_buffer,
            bind_group,
        }
    }

    fn instance_buffer(device: &wgpu::Device, capacity: usize) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("ui_instances"),
            size: (capacity * std::mem::size_of::<UiRect>()) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, screen: (u32, u32)) {
        if self.rects.len() > self.capacity {
            self.capacity = self.rects.len().next_power_of_two();
            self.instances = Self::instance_buffer(device, self.capacity);
        }
        let size = [screen.0 as f32, screen.1 as f32, 0.0, 0.0];
        queue.write_buffer(&self.screen_buffer, 0, bytemuck::cast_slice(&size));
        if !self.rects.is_empty() {
            queue.write_buffer(&self.instances, 0, bytemuck::cast_slice(&self.rects));
        }
    }
}

/// Deferred PBR renderer drawing into one window surface.
pub struct Renderer {
    gpu: GpuContext,
    params: GraphicsConfigParams,
    layouts: BindGroupLayouts,
    pipelines: Pipelines,
    targets: FrameTargets,
    scheduler: FrameScheduler<GpuFence>,
    frames: PerFrame<FrameResources>,
    shadow_config: ShadowConfig,
    shadow_maps: ShadowMaps,
    caster_bind_groups: [wgpu::BindGroup; 2],
    skybox: Skybox,
    baked_sky: Option<wgpu::BindGroup>,
    probes: ProbeSet,
    lights: LightSet,
    post: PostProcessConfig,
    resources: ResourceRegistry,
    particles: Pool<ParticleSystem>,
    ui: UiOverlay,
    camera: Camera,
    white_texture: Texture2D,
    black_cube: TextureCube,
    linear_sampler: wgpu::Sampler,
    stats: RenderStats,
    last_frame: Option<Instant>,
    started: Instant,
}

impl Renderer {
    /// Create the device, swapchain and every size-dependent resource.
    ///
    /// # Errors
    ///
    /// Surface, adapter or device creation failures. These are fatal; the
    /// caller is expected to log and exit.
    pub async fn initialize(
        window: Arc<Window>,
        params: GraphicsConfigParams,
    ) -> Result<Self, RenderError> {
        let params = sanitize(params);
        let gpu = GpuContext::new(window, &params).await?;
        let device = Arc::clone(&gpu.device);
        let queue = Arc::clone(&gpu.queue);

        let layouts = BindGroupLayouts::new(&device);
        let pipelines = Pipelines::new(&device, &layouts, gpu.format());
        let targets = FrameTargets::new(&device, &layouts, scaled(gpu.size(), params.render_scale));

        let shadow_config = ShadowConfig::from_params(&params);
        let shadow_maps = ShadowMaps::new(&device, &shadow_config);
        let caster_bind_groups = caster_bind_groups(&device, &layouts, &shadow_maps);

        let frame_count = params.frame_count();
        let mut scheduler = FrameScheduler::new(frame_count, DEFAULT_FENCE_TIMEOUT);
        scheduler.set_options(graph_options(&params, &shadow_config));
        let frames = PerFrame::new(frame_count, |_| FrameResources::new(&device, &layouts));

        let mut camera = Camera::new();
        camera.set_aspect(gpu.size().0, gpu.size().1);
        let mut lights = LightSet::new();
        lights.set_quality(params.light_quality);

        let linear_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("linear_sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let black: &[u8] = &[0; 4];
        let black_cube =
            TextureCube::from_faces(&device, &queue, [black; 6], 1, Some("black_cube"))?;

        let renderer = Self {
            skybox: Skybox::new(&device, &layouts, SKY_SIZE),
            ui: UiOverlay::new(&device, &layouts),
            white_texture: Texture2D::solid_color(&device, &queue, [255; 4]),
            post: PostProcessConfig::from_params(&params),
            gpu,
            params,
            layouts,
            pipelines,
            targets,
            scheduler,
            frames,
            shadow_config,
            shadow_maps,
            caster_bind_groups,
            baked_sky: None,
            probes: ProbeSet::new(),
            lights,
            resources: ResourceRegistry::new(),
            particles: Pool::new(),
            camera,
            black_cube,
            linear_sampler,
            stats: RenderStats::default(),
            last_frame: None,
            started: Instant::now(),
        };
        log::info!(
            "Renderer initialized at {:?} with {} frames in flight",
            renderer.gpu.size(),
            frame_count
        );
        Ok(renderer)
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.gpu.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.gpu.queue
    }

    pub const fn params(&self) -> &GraphicsConfigParams {
        &self.params
    }

    pub const fn stats(&self) -> RenderStats {
        self.stats
    }

    pub const fn size(&self) -> (u32, u32) {
        self.gpu.size()
    }

    pub const fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn post_process_mut(&mut self) -> &mut PostProcessConfig {
        &mut self.post
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Apply new graphics settings, rebuilding whatever they affect.
    ///
    /// # Errors
    ///
    /// `DeviceLost` if in-flight frames never retire while draining.
    pub fn update_renderer_configs(
        &mut self,
        params: GraphicsConfigParams,
    ) -> Result<(), RenderError> {
        let params = sanitize(params);
        self.scheduler.wait_idle()?;

        let frame_count = params.frame_count();
        if frame_count != self.frames.len() {
            self.scheduler.set_frame_count(frame_count)?;
            self.frames = PerFrame::new(frame_count, |_| {
                FrameResources::new(&self.gpu.device, &self.layouts)
            });
        }

        let shadow_config = ShadowConfig::from_params(&params);
        let sizes = |c: &ShadowConfig| (c.resolution, c.dynamic_resolution);
        if sizes(&shadow_config) != sizes(&self.shadow_config) {
            self.shadow_maps = ShadowMaps::new(&self.gpu.device, &shadow_config);
            self.caster_bind_groups =
                caster_bind_groups(&self.gpu.device, &self.layouts, &self.shadow_maps);
        }
        self.shadow_config = shadow_config;
        self.scheduler.signal_static_map_update();
        self.scheduler
            .set_options(graph_options(&params, &self.shadow_config));

        self.post.apply_params(&params);
        self.lights.set_quality(params.light_quality);
        self.params = params;
        self.reconfigure(self.gpu.size());
        log::info!("Renderer configuration updated: {:?}", self.scheduler.options());
        Ok(())
    }

    /// Rebuild the swapchain and every size-dependent target.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.reconfigure((width, height));
    }

    fn reconfigure(&mut self, size: (u32, u32)) {
        self.gpu.reconfigure(size, &self.params);
        let size = self.gpu.size();
        self.targets = FrameTargets::new(
            &self.gpu.device,
            &self.layouts,
            scaled(size, self.params.render_scale),
        );
        self.camera.set_aspect(size.0, size.1);
        self.stats.reconfigurations += 1;
        log::debug!("Reconfigured to {}x{} (render {:?})", size.0, size.1, self.targets.size);
    }

    // ========================================================================
    // Frame
    // ========================================================================

    /// Record, submit and present one frame.
    ///
    /// Surface loss and timeouts skip the frame; they are not errors.
    ///
    /// # Errors
    ///
    /// `DeviceLost` when a frame slot never retires, `WorkerPanicked` if
    /// multithreaded recording failed.
    pub fn render(&mut self) -> Result<(), RenderError> {
        let now = Instant::now();
        let delta = self
            .last_frame
            .map_or(0.0, |last| now.duration_since(last).as_secs_f32());
        self.last_frame = Some(now);
        let elapsed = now.duration_since(self.started).as_secs_f32();

        let plan = self.scheduler.begin_frame(self.camera.position)?;

        let output = match self.gpu.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("Surface lost or outdated, reconfiguring");
                self.reconfigure(self.gpu.size());
                self.skip_frame();
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("Timed out acquiring the next surface image");
                self.skip_frame();
                return Ok(());
            }
            Err(err) => {
                log::error!("Surface error: {err}");
                self.skip_frame();
                return Ok(());
            }
        };
        let backbuffer = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let device = Arc::clone(&self.gpu.device);
        let queue = Arc::clone(&self.gpu.queue);

        // Frame-global uniforms
        let frame = self.frames.get(plan.slot);
        let global = GlobalUniform::from_camera(
            &self.camera,
            self.targets.size,
            elapsed,
            delta,
            self.post.exposure,
        )
        .with_bloom_threshold(self.post.bloom_threshold);
        queue.write_buffer(&frame.global_buffer, 0, bytemuck::bytes_of(&global));
        let light_buffer = self.lights.build_buffer();
        queue.write_buffer(&frame.light_buffer, 0, bytemuck::bytes_of(&light_buffer));

        let local = if self.params.local_reflections {
            self.probes
                .select_local_probe(self.camera.position)
                .filter(|probe| self.resources.cubes.contains(probe.cube))
                .copied()
        } else {
            None
        };
        let probe_uniform: ProbeUniform = self.probes.uniform(local.as_ref());
        queue.write_buffer(&frame.probe_buffer, 0, bytemuck::bytes_of(&probe_uniform));

        let sun = self.lights.primary().direction;
        self.shadow_maps.update(
            &queue,
            &self.shadow_config,
            sun,
            self.camera.position,
            self.scheduler.options().shadows,
        );
        self.targets.write_post_uniforms(&queue, &self.post);
        self.ui.upload(&device, &queue, self.gpu.size());

        let mut live_systems = 0;
        for system in self.particles.iter_mut() {
            let batch = system.emitter.update(delta);
            let uniform = system.emitter.sim_uniform(delta);
            system.gpu.upload(&queue, &batch, &uniform);
            if system.emitter.particle_count() > 0 {
                live_systems += 1;
            }
        }

        let mut prologue = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame_prologue"),
        });
        if self.skybox.bake_if_dirty(&queue, &mut prologue, &self.pipelines.sky_bake) {
            log::debug!("Procedural sky re-baked");
        }

        let frame = self.frames.get(plan.slot);
        let local_env = local
            .and_then(|probe| self.resources.cubes.get(probe.cube))
            .unwrap_or(&self.black_cube);
        let lighting_bind_group = self.lighting_bind_group(&LightingInputs {
            global: &frame.global_buffer,
            lights: &frame.light_buffer,
            probes: &frame.probe_buffer,
            global_env: self.global_environment(),
            local_env,
            brdf_lut: self.brdf_lut(),
        });

        let queues = self.scheduler.queues();
        let ui_count = self.ui.rects.len() as u32;
        let context = FrameContext {
            plan: &plan,
            queues,
            resources: &self.resources,
            pipelines: &self.pipelines,
            targets: &self.targets,
            shadow_maps: &self.shadow_maps,
            caster_bind_groups: &self.caster_bind_groups,
            global_bind_group: &frame.global_bind_group,
            lighting_bind_group: &lighting_bind_group,
            skybox: &self.skybox,
            sky_bind_group: self.sky_bind_group(),
            particles: &self.particles,
            ui: Some(UiBatch {
                instances: &self.ui.instances,
                count: ui_count,
                bind_group: &self.ui.bind_group,
            }),
            backbuffer: &backbuffer,
            local_reflections: local.is_some(),
        };
        let passes = context.record(&device, self.params.multithreaded_rendering)?;

        self.stats.deferred_draws = queues.deferred().len();
        self.stats.forward_draws = queues.forward().len();
        self.stats.shadow_casters =
            queues.shadow_casters(true).count() + queues.shadow_casters(false).count();

        queue.submit(std::iter::once(prologue.finish()).chain(passes));
        let fence = GpuFence::after_submit(&device, &queue);
        output.present();

        self.scheduler.submit(&plan, fence);
        self.stats.frames += 1;
        self.stats.static_shadow_refreshes = self.scheduler.shadows().static_refreshes();
        self.stats.lights = self.lights.light_count();
        self.stats.particle_systems = live_systems;
        self.stats.ui_rects = self.ui.rects.len();
        self.end_frame();
        Ok(())
    }

    fn skip_frame(&mut self) {
        self.scheduler.skip_frame();
        self.stats.skipped_frames += 1;
        self.end_frame();
    }

    fn end_frame(&mut self) {
        self.lights.clear();
        self.ui.rects.clear();
    }

    /// Block until the GPU finished every submitted frame.
    ///
    /// # Errors
    ///
    /// `DeviceLost` on a fence that never signals.
    pub fn wait_idle(&mut self) -> Result<(), RenderError> {
        self.scheduler.wait_idle()
    }

    fn global_environment(&self) -> &TextureCube {
        self.probes
            .global
            .and_then(|cube| self.resources.cubes.get(cube))
            .unwrap_or(&self.skybox.procedural)
    }

    fn brdf_lut(&self) -> &Texture2D {
        self.probes
            .brdf_lut
            .and_then(|lut| self.resources.textures.get(lut))
            .unwrap_or(&self.white_texture)
    }

    fn sky_bind_group(&self) -> &wgpu::BindGroup {
        self.baked_sky
            .as_ref()
            .unwrap_or(&self.skybox.procedural_bind_group)
    }

    fn lighting_bind_group(&self, inputs: &LightingInputs<'_>) -> wgpu::BindGroup {
        let view = wgpu::BindingResource::TextureView;
        self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("lighting_bind_group"),
            layout: &self.layouts.lighting,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: inputs.global.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: inputs.lights.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.shadow_maps.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: view(&self.shadow_maps.static_view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: view(&self.shadow_maps.dynamic_view),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::Sampler(&self.shadow_maps.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: view(&inputs.global_env.view),
                },
                wgpu::BindGroupEntry {
                    binding: 7,
                    resource: view(&inputs.local_env.view),
                },
                wgpu::BindGroupEntry {
                    binding: 8,
                    resource: view(&inputs.brdf_lut.view),
                },
                wgpu::BindGroupEntry {
                    binding: 9,
                    resource: wgpu::BindingResource::Sampler(&self.linear_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 10,
                    resource: inputs.probes.as_entire_binding(),
                },
            ],
        })
    }

    // ========================================================================
    // Scene submission
    // ========================================================================

    /// Queue a primitive for the next frame. Returns `false` for a command
    /// without the `RENDERABLE` bit.
    pub fn push_mesh_render(&mut self, cmd: PrimitiveRenderCmd) -> bool {
        self.scheduler.push_mesh_render(cmd)
    }

    /// # Errors
    ///
    /// `LightCapacityExceeded` when the frame's directional lights are full.
    pub fn push_directional_light(&mut self, light: &DirectionalLight) -> Result<(), RenderError> {
        self.lights.push_directional(light)
    }

    /// # Errors
    ///
    /// `LightCapacityExceeded` when the frame's point lights are full.
    pub fn push_point_light(&mut self, light: &PointLight) -> Result<(), RenderError> {
        self.lights.push_point(light)
    }

    /// # Errors
    ///
    /// `LightCapacityExceeded` when the frame's spot lights are full.
    pub fn push_spot_light(&mut self, light: &SpotLight) -> Result<(), RenderError> {
        self.lights.push_spot(light)
    }

    pub fn set_camera(&mut self, camera: &Camera) {
        let aspect = self.camera.aspect;
        self.camera = camera.clone();
        self.camera.aspect = aspect;
    }

    /// Set the shadow-casting sun. A changed direction re-bakes the sky and
    /// refreshes the static shadow map.
    pub fn set_sun(&mut self, light: DirectionalLight) {
        self.skybox.set_sun_direction(light.direction);
        self.lights.set_primary(light);
        self.lights
            .set_ambient(self.skybox.ambient_estimate().truncate() * 0.25);
        self.scheduler
            .observe_sky(self.skybox.params().sun_direction, self.skybox.params().air_color);
    }

    pub fn set_air_color(&mut self, color: Vec3) {
        self.skybox.set_air_color(color);
        self.scheduler
            .observe_sky(self.skybox.params().sun_direction, self.skybox.params().air_color);
    }

    pub fn set_ambient(&mut self, color: Vec3) {
        self.lights.set_ambient(color);
    }

    /// Static geometry moved without being added or removed.
    pub fn signal_static_map_update(&mut self) {
        self.scheduler.signal_static_map_update();
    }

    /// Show a baked cube instead of the procedural sky. `None` returns to
    /// the procedural sky.
    pub fn set_sky_cube(&mut self, cube: Option<Handle<TextureCube>>) -> bool {
        match cube {
            Some(handle) => {
                let Some(texture) = self.resources.cubes.get(handle) else {
                    return false;
                };
                self.baked_sky = Some(Skybox::cube_bind_group(
                    &self.gpu.device,
                    &self.layouts,
                    texture,
                ));
                self.skybox.set_source(SkySource::Baked(handle));
            }
            None => {
                self.baked_sky = None;
                self.skybox.set_source(SkySource::Procedural);
            }
        }
        true
    }

    pub fn set_global_probe(&mut self, cube: Option<Handle<TextureCube>>) {
        self.probes.global = cube;
    }

    pub fn add_local_probe(&mut self, probe: LocalProbe) {
        self.probes.add_local(probe);
    }

    /// Queue an overlay rectangle for this frame.
    pub fn push_ui_rect(&mut self, rect: &Rect) {
        let (width, height) = self.gpu.size();
        let screen = Vec2::new(width as f32, height as f32);
        self.ui.rects.push(rect.to_instance(screen));
    }

    // ========================================================================
    // Resources
    // ========================================================================

    pub fn create_mesh(&mut self, data: &MeshData) -> MeshHandle {
        let mesh = GpuMesh::upload(&self.gpu.device, data, "mesh");
        self.resources.meshes.insert(mesh)
    }

    pub fn free_mesh(&mut self, handle: MeshHandle) -> bool {
        self.resources.meshes.remove(handle).is_some()
    }

    pub fn mesh(&self, handle: MeshHandle) -> Option<&GpuMesh> {
        self.resources.meshes.get(handle)
    }

    pub fn create_mesh_descriptor(&mut self) -> MeshDescriptorHandle {
        let descriptor = MeshDescriptor::new(&self.gpu.device, &self.layouts);
        self.resources.mesh_descriptors.insert(descriptor)
    }

    /// Upload a new transform and morph weights. `false` for a stale handle.
    pub fn update_mesh_descriptor(
        &mut self,
        handle: MeshDescriptorHandle,
        transform: Mat4,
        morph_weights: &[f32],
    ) -> bool {
        let Some(descriptor) = self.resources.mesh_descriptors.get_mut(handle) else {
            return false;
        };
        descriptor.update(&self.gpu.queue, transform, morph_weights);
        true
    }

    pub fn mesh_descriptor(&self, handle: MeshDescriptorHandle) -> Option<&MeshDescriptor> {
        self.resources.mesh_descriptors.get(handle)
    }

    pub fn free_mesh_descriptor(&mut self, handle: MeshDescriptorHandle) -> bool {
        self.resources.mesh_descriptors.remove(handle).is_some()
    }

    /// The albedo map must be a live texture or the material falls back to
    /// plain white.
    pub fn create_material_descriptor(&mut self, material: Material) -> MaterialHandle {
        let albedo = material
            .albedo
            .and_then(|texture| self.resources.textures.get(texture))
            .unwrap_or(&self.white_texture);
        let descriptor =
            MaterialDescriptor::new(&self.gpu.device, &self.layouts, material, albedo);
        self.resources.materials.insert(descriptor)
    }

    pub fn update_material_descriptor(
        &mut self,
        handle: MaterialHandle,
        material: Material,
    ) -> bool {
        let Some(descriptor) = self.resources.materials.get_mut(handle) else {
            return false;
        };
        descriptor.update(&self.gpu.queue, material);
        true
    }

    pub fn free_material_descriptor(&mut self, handle: MaterialHandle) -> bool {
        self.resources.materials.remove(handle).is_some()
    }

    pub fn create_joint_descriptor(&mut self) -> JointHandle {
        let descriptor = JointDescriptor::new(&self.gpu.device, &self.layouts);
        self.resources.joints.insert(descriptor)
    }

    /// # Errors
    ///
    /// `InvalidHandle` for a stale handle, `JointCapacityExceeded` for a
    /// palette longer than the skinning uniform.
    pub fn update_joint_palette(
        &mut self,
        handle: JointHandle,
        palette: &[Mat4],
    ) -> Result<(), RenderError> {
        let descriptor = self
            .resources
            .joints
            .get_mut(handle)
            .ok_or(RenderError::InvalidHandle("joint descriptor"))?;
        descriptor.update(&self.gpu.queue, palette)
    }

    pub fn free_joint_descriptor(&mut self, handle: JointHandle) -> bool {
        self.resources.joints.remove(handle).is_some()
    }

    /// # Errors
    ///
    /// `Texture` when `rgba` does not match `dimensions`.
    pub fn create_texture2d(
        &mut self,
        rgba: &[u8],
        dimensions: (u32, u32),
    ) -> Result<Handle<Texture2D>, RenderError> {
        let texture = Texture2D::from_rgba(
            &self.gpu.device,
            &self.gpu.queue,
            rgba,
            dimensions,
            Some("texture2d"),
        )?;
        Ok(self.resources.textures.insert(texture))
    }

    /// Load an image file, downscaled to the `texture_quality` cap.
    ///
    /// # Errors
    ///
    /// `Texture` when the file cannot be read or decoded.
    pub fn load_texture2d(
        &mut self,
        path: impl AsRef<Path>,
    ) -> Result<Handle<Texture2D>, RenderError> {
        let label = path.as_ref().display().to_string();
        let texture = Texture2D::from_path(
            &self.gpu.device,
            &self.gpu.queue,
            path,
            self.params.texture_quality.max_texture_dimension(),
            Some(&label),
        )?;
        Ok(self.resources.textures.insert(texture))
    }

    pub fn free_texture2d(&mut self, handle: Handle<Texture2D>) -> bool {
        if self.probes.brdf_lut == Some(handle) {
            self.probes.brdf_lut = None;
        }
        self.resources.textures.remove(handle).is_some()
    }

    /// # Errors
    ///
    /// `Texture` when a face does not hold `size * size` pixels.
    pub fn create_texture_cube(
        &mut self,
        faces: [&[u8]; 6],
        size: u32,
    ) -> Result<Handle<TextureCube>, RenderError> {
        let cube = TextureCube::from_faces(
            &self.gpu.device,
            &self.gpu.queue,
            faces,
            size,
            Some("texture_cube"),
        )?;
        Ok(self.resources.cubes.insert(cube))
    }

    /// Also detaches the cube from probes and the sky.
    pub fn free_texture_cube(&mut self, handle: Handle<TextureCube>) -> bool {
        self.probes.remove_cube(handle);
        if self.skybox.source() == SkySource::Baked(handle) {
            self.set_sky_cube(None);
        }
        self.resources.cubes.remove(handle).is_some()
    }

    pub fn create_particle_emitter(&mut self, config: EmitterConfig) -> ParticleHandle {
        let emitter = ParticleEmitter::new(config);
        let gpu = GpuParticles::new(&self.gpu.device, &self.layouts, emitter.capacity());
        self.particles.insert(ParticleSystem { emitter, gpu })
    }

    pub fn particle_emitter_mut(&mut self, handle: ParticleHandle) -> Option<&mut ParticleEmitter> {
        self.particles.get_mut(handle).map(|system| &mut system.emitter)
    }

    pub fn free_particle_emitter(&mut self, handle: ParticleHandle) -> bool {
        self.particles.remove(handle).is_some()
    }

    // ========================================================================
    // Tools
    // ========================================================================

    /// Render the split-sum BRDF lookup table and use it for image-based
    /// lighting from now on.
    pub fn generate_brdf_lut(&mut self, width: u32, height: u32) -> Handle<Texture2D> {
        let lut = Texture2D::render_target(
            &self.gpu.device,
            (width, height),
            BRDF_LUT_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT,
            "brdf_lut",
        );
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("brdf_lut_encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("brdf_lut_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &lut.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipelines.brdf_lut);
            pass.draw(0..3, 0..1);
        }
        self.gpu.queue.submit(std::iter::once(encoder.finish()));

        let handle = self.resources.textures.insert(lut);
        self.probes.brdf_lut = Some(handle);
        log::info!("Generated {width}x{height} BRDF lookup table");
        handle
    }

    /// Render the sky and the static commands queued for the next frame
    /// into a new cube around `position`.
    pub fn bake_environment_map(&mut self, position: Vec3, size: u32) -> Handle<TextureCube> {
        let device = Arc::clone(&self.gpu.device);
        let queue = Arc::clone(&self.gpu.queue);
        let size = size.max(1);

        let cube = TextureCube::render_target(
            &device,
            size,
            HDR_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT,
            "environment_map",
        );
        let usage = wgpu::TextureUsages::empty();
        let bright = RenderTarget::new(&device, (size, size), HDR_FORMAT, usage, "probe_bright");
        let depth = RenderTarget::new(&device, (size, size), DEPTH_FORMAT, usage, "probe_depth");

        let frame = FrameResources::new(&device, &self.layouts);
        let light_buffer = self.lights.build_buffer();
        queue.write_buffer(&frame.light_buffer, 0, bytemuck::bytes_of(&light_buffer));
        queue.write_buffer(
            &frame.probe_buffer,
            0,
            bytemuck::bytes_of(&self.probes.uniform(None)),
        );
        let lighting_bind_group = self.lighting_bind_group(&LightingInputs {
            global: &frame.global_buffer,
            lights: &frame.light_buffer,
            probes: &frame.probe_buffer,
            global_env: self.global_environment(),
            local_env: &self.black_cube,
            brdf_lut: self.brdf_lut(),
        });

        let queues = self.scheduler.queues();
        let mut commands: Vec<PrimitiveRenderCmd> = queues
            .deferred()
            .iter()
            .chain(queues.forward())
            .filter(|cmd| cmd.flags.contains(RenderFlags::STATIC))
            .map(|cmd| PrimitiveRenderCmd {
                sort_distance: cmd.world_center.distance(position),
                ..*cmd
            })
            .collect();
        commands.sort_by(|a, b| b.sort_distance.total_cmp(&a.sort_distance));

        // Sky bake must land before faces sample it.
        let mut prologue = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("probe_sky_bake"),
        });
        self.skybox
            .bake_if_dirty(&queue, &mut prologue, &self.pipelines.sky_bake);
        queue.submit(std::iter::once(prologue.finish()));

        let projection = cube_face_projection(PROBE_NEAR, PROBE_FAR);
        for face in 0..6 {
            let view = cube_face_view(position, face);
            let global = GlobalUniform::new(
                view,
                projection,
                position,
                PROBE_NEAR,
                (size, size),
                0.0,
                0.0,
                self.post.exposure,
            )
            .with_bloom_threshold(f32::MAX);
            queue.write_buffer(&frame.global_buffer, 0, bytemuck::bytes_of(&global));

            let face_view = cube.face_view(face as u32);
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("probe_capture_encoder"),
            });
            ProbeCapture {
                resources: &self.resources,
                pipelines: &self.pipelines,
                commands: &commands,
                global_bind_group: &frame.global_bind_group,
                lighting_bind_group: &lighting_bind_group,
                skybox: &self.skybox,
                sky_bind_group: self.sky_bind_group(),
                color: &face_view,
                bright: &bright.view,
                depth: &depth.view,
            }
            .record(&mut encoder);
            // One submit per face: the global buffer is rewritten in between.
            queue.submit(std::iter::once(encoder.finish()));
        }

        log::info!(
            "Baked {size}px environment map at {position} from {} static commands",
            commands.len()
        );
        self.resources.cubes.insert(cube)
    }

    /// Drop the commands and lights queued for the next frame, e.g. after
    /// submitting a scene only to bake it.
    pub fn discard_queued(&mut self) {
        self.scheduler.clear_queues();
        self.lights.clear();
    }

    /// Read back the tonemapped image of the last frame and write a PNG.
    ///
    /// # Errors
    ///
    /// `Snapshot` if the readback fails, `Texture` if encoding fails.
    pub fn take_snapshot(&mut self, path: impl AsRef<Path>) -> Result<(), RenderError> {
        const BYTES_PER_PIXEL: u32 = 4;
        let (width, height) = self.targets.hdr_output.size;
        let padded = padded_bytes_per_row(width, BYTES_PER_PIXEL);
        let device = &self.gpu.device;

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("snapshot_readback"),
            size: u64::from(padded) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("snapshot_encoder"),
        });
        encoder.copy_texture_to_buffer(
            self.targets.hdr_output.texture.as_image_copy(),
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.gpu.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|err| RenderError::Snapshot(err.to_string()))?
            .map_err(|err| RenderError::Snapshot(err.to_string()))?;

        let pixels = unpad_rows(&slice.get_mapped_range(), width, height, BYTES_PER_PIXEL);
        buffer.unmap();
        write_png(path.as_ref(), width, height, pixels)?;
        log::info!("Snapshot written to {}", path.as_ref().display());
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(err) = self.scheduler.wait_idle() {
            log::error!("GPU did not go idle on shutdown: {err}");
        }
        self.particles.clear();
        self.resources.clear();
    }
}

fn caster_bind_groups(
    device: &wgpu::Device,
    layouts: &BindGroupLayouts,
    maps: &ShadowMaps,
) -> [wgpu::BindGroup; 2] {
    std::array::from_fn(|i| {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("caster_bind_group"),
            layout: &layouts.caster,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: maps.caster_buffers[i].as_entire_binding(),
            }],
        })
    })
}

/// Internal render size for a surface size and render scale.
fn scaled((width, height): (u32, u32), scale: f32) -> (u32, u32) {
    let scale = if scale.is_finite() { scale.clamp(0.25, 2.0) } else { 1.0 };
    (
        ((width as f32 * scale).round() as u32).max(1),
        ((height as f32 * scale).round() as u32).max(1),
    )
}

fn graph_options(params: &GraphicsConfigParams, shadows: &ShadowConfig) -> GraphOptions {
    GraphOptions {
        shadows: shadows.enabled(),
        bloom: params.bloom,
        antialiasing: params.antialiasing_enabled(),
    }
}

/// SMAA has no pass of its own; FXAA stands in for it.
fn sanitize(mut params: GraphicsConfigParams) -> GraphicsConfigParams {
    if params.anti_aliasing == AntiAliasing::Smaa2x {
        log::warn!("SMAA is not available, using FXAA instead");
        params.anti_aliasing = AntiAliasing::Fxaa2x;
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_scale_clamps_and_never_reaches_zero() {
        assert_eq!(scaled((1280, 720), 1.0), (1280, 720));
        assert_eq!(scaled((1280, 720), 0.5), (640, 360));
        assert_eq!(scaled((1280, 720), 100.0), (2560, 1440));
        assert_eq!(scaled((1, 1), 0.25), (1, 1));
        assert_eq!(scaled((800, 600), f32::NAN), (800, 600));
    }

    #[test]
    fn test_smaa_falls_back_to_fxaa() {
        let params =
            sanitize(GraphicsConfigParams::default().with_anti_aliasing(AntiAliasing::Smaa2x));
        assert_eq!(params.anti_aliasing, AntiAliasing::Fxaa2x);
        assert!(params.antialiasing_enabled());
    }

    #[test]
    fn test_graph_options_follow_shadow_resolution() {
        use crate::config::GraphicsQuality;

        let params = GraphicsConfigParams::default()
            .with_shadow_quality(GraphicsQuality::None)
            .with_bloom(false);
        let options = graph_options(&params, &ShadowConfig::from_params(&params));
        assert!(!options.shadows);
        assert!(!options.bloom);
        assert!(!options.antialiasing);
    }
}
