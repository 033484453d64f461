//! Command recording for each frame graph pass
//!
//! Every pass records into its own command buffer so that passes can be
//! recorded on different threads and still be submitted in graph order.

use crate::renderer::cmd::{GeometryVariant, PrimitiveRenderCmd};
use crate::renderer::error::RenderError;
use crate::renderer::frame::FramePlan;
use crate::renderer::graph::{PassAction, PassId, ScheduledPass};
use crate::renderer::particles::ParticleSystem;
use crate::renderer::pool::Pool;
use crate::renderer::queue::RenderQueues;
use crate::renderer::resources::{
    GpuMesh, JointDescriptor, MaterialDescriptor, MeshDescriptor, ResourceRegistry,
};
use crate::renderer::shadow::ShadowMaps;
use crate::renderer::skybox::Skybox;

use super::pipelines::Pipelines;
use super::targets::FrameTargets;

/// Passes handed to the recording worker in multithreaded mode.
const WORKER_PASSES: [PassId; 2] = [PassId::GBuffer, PassId::Forward];

/// Uploaded overlay instances of this frame.
#[derive(Debug, Clone, Copy)]
pub struct UiBatch<'a> {
    pub instances: &'a wgpu::Buffer,
    pub count: u32,
    pub bind_group: &'a wgpu::BindGroup,
}

/// Everything a pass reads while recording. Shared across threads.
pub struct FrameContext<'a> {
    pub plan: &'a FramePlan,
    pub queues: &'a RenderQueues,
    pub resources: &'a ResourceRegistry,
    pub pipelines: &'a Pipelines,
    pub targets: &'a FrameTargets,
    pub shadow_maps: &'a ShadowMaps,
    /// Static and dynamic light cameras
    pub caster_bind_groups: &'a [wgpu::BindGroup; 2],
    pub global_bind_group: &'a wgpu::BindGroup,
    pub lighting_bind_group: &'a wgpu::BindGroup,
    pub skybox: &'a Skybox,
    /// Procedural or baked sky cube
    pub sky_bind_group: &'a wgpu::BindGroup,
    pub particles: &'a Pool<ParticleSystem>,
    pub ui: Option<UiBatch<'a>>,
    pub backbuffer: &'a wgpu::TextureView,
    pub local_reflections: bool,
}

/// GPU objects referenced by one render command.
struct Draw<'a> {
    mesh: &'a GpuMesh,
    descriptor: &'a MeshDescriptor,
    material: &'a MaterialDescriptor,
    joints: Option<&'a JointDescriptor>,
    variant: GeometryVariant,
}

impl<'a> Draw<'a> {
    /// `None` when a handle went stale or the mesh lacks the buffers its
    /// flags ask for.
    fn resolve(resources: &'a ResourceRegistry, cmd: &PrimitiveRenderCmd) -> Option<Self> {
        let mesh = resources.meshes.get(cmd.mesh)?;
        let descriptor = resources.mesh_descriptors.get(cmd.descriptor)?;
        let material = resources.materials.get(cmd.material)?;
        let variant = cmd.flags.variant();

        let joints = match (variant.skinned(), cmd.joints) {
            (true, Some(handle)) if mesh.is_skinned() => Some(resources.joints.get(handle)?),
            (true, _) => return None,
            (false, _) => None,
        };
        if variant.morph() && !mesh.has_morph_targets() {
            return None;
        }

        Some(Self {
            mesh,
            descriptor,
            material,
            joints,
            variant,
        })
    }

    /// Bind vertex streams in the slot order of `variant`.
    fn bind_streams(&self, pass: &mut wgpu::RenderPass<'_>, variant: GeometryVariant) {
        let mut slot = 0;
        pass.set_vertex_buffer(slot, self.mesh.vertex_buffer.slice(..));
        if variant.skinned() {
            if let Some(skin) = &self.mesh.skin_buffer {
                slot += 1;
                pass.set_vertex_buffer(slot, skin.slice(..));
            }
        }
        if variant.morph() {
            if let Some(targets) = &self.mesh.morph_buffers {
                for target in targets {
                    slot += 1;
                    pass.set_vertex_buffer(slot, target.slice(..));
                }
            }
        }
        pass.set_index_buffer(self.mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
    }

    fn draw(&self, pass: &mut wgpu::RenderPass<'_>, cmd: &PrimitiveRenderCmd) {
        pass.draw_indexed(cmd.primitive.indices(), 0, 0..cmd.instances.max(1));
    }
}

fn color_attachment(
    view: &wgpu::TextureView,
    load: wgpu::LoadOp<wgpu::Color>,
) -> Option<wgpu::RenderPassColorAttachment<'_>> {
    Some(wgpu::RenderPassColorAttachment {
        view,
        resolve_target: None,
        ops: wgpu::Operations {
            load,
            store: wgpu::StoreOp::Store,
        },
    })
}

fn depth_attachment(
    view: &wgpu::TextureView,
    load: wgpu::LoadOp<f32>,
) -> Option<wgpu::RenderPassDepthStencilAttachment<'_>> {
    Some(wgpu::RenderPassDepthStencilAttachment {
        view,
        depth_ops: Some(wgpu::Operations {
            load,
            store: wgpu::StoreOp::Store,
        }),
        stencil_ops: None,
    })
}

fn begin<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    label: &str,
    colors: &[Option<wgpu::RenderPassColorAttachment<'_>>],
    depth: Option<wgpu::RenderPassDepthStencilAttachment<'_>>,
) -> wgpu::RenderPass<'e> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: colors,
        depth_stencil_attachment: depth,
        timestamp_writes: None,
        occlusion_query_set: None,
    })
}

/// Draw a full-screen triangle reading `bind_group` into `target`.
fn fullscreen_pass(
    encoder: &mut wgpu::CommandEncoder,
    label: &str,
    pipeline: &wgpu::RenderPipeline,
    bind_group: &wgpu::BindGroup,
    target: &wgpu::TextureView,
) {
    let mut pass = begin(
        encoder,
        label,
        &[color_attachment(target, wgpu::LoadOp::Clear(wgpu::Color::BLACK))],
        None,
    );
    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, bind_group, &[]);
    pass.draw(0..3, 0..1);
}

/// Draw `commands` with the object, material and joint groups at 1..=3.
fn draw_geometry<'c, 'p>(
    pass: &mut wgpu::RenderPass<'_>,
    resources: &ResourceRegistry,
    commands: impl IntoIterator<Item = &'c PrimitiveRenderCmd>,
    pipeline: impl Fn(GeometryVariant) -> &'p wgpu::RenderPipeline,
) {
    let mut bound: Option<GeometryVariant> = None;
    for cmd in commands {
        let Some(draw) = Draw::resolve(resources, cmd) else {
            log::trace!("Skipping command with stale handles: {:?}", cmd.mesh);
            continue;
        };
        if bound != Some(draw.variant) {
            pass.set_pipeline(pipeline(draw.variant));
            bound = Some(draw.variant);
        }
        pass.set_bind_group(1, &draw.descriptor.bind_group, &[]);
        pass.set_bind_group(2, &draw.material.bind_group, &[]);
        if let Some(joints) = draw.joints {
            pass.set_bind_group(3, &joints.bind_group, &[]);
        }
        draw.bind_streams(pass, draw.variant);
        draw.draw(pass, cmd);
    }
}

fn draw_sky(
    pass: &mut wgpu::RenderPass<'_>,
    pipelines: &Pipelines,
    skybox: &Skybox,
    global_bind_group: &wgpu::BindGroup,
    sky_bind_group: &wgpu::BindGroup,
) {
    pass.set_pipeline(&pipelines.skybox);
    pass.set_bind_group(0, global_bind_group, &[]);
    pass.set_bind_group(1, sky_bind_group, &[]);
    pass.set_vertex_buffer(0, skybox.vertex_buffer.slice(..));
    pass.set_index_buffer(skybox.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
    pass.draw_indexed(0..skybox.index_count, 0, 0..1);
}

impl FrameContext<'_> {
    /// Record the whole frame, one command buffer per pass in graph order.
    ///
    /// # Errors
    ///
    /// `WorkerPanicked` if the recording worker thread panicked.
    pub fn record(
        &self,
        device: &wgpu::Device,
        multithreaded: bool,
    ) -> Result<Vec<wgpu::CommandBuffer>, RenderError> {
        let passes = self.plan.graph.passes();
        if !multithreaded {
            return Ok(passes.iter().map(|pass| self.record_pass(device, pass)).collect());
        }

        let (worker, main): (Vec<_>, Vec<_>) = passes
            .iter()
            .enumerate()
            .partition(|(_, pass)| WORKER_PASSES.contains(&pass.id));

        let mut buffers = std::thread::scope(|scope| {
            let handle = scope.spawn(|| {
                worker
                    .iter()
                    .map(|&(order, pass)| (order, self.record_pass(device, pass)))
                    .collect::<Vec<_>>()
            });
            let mut recorded: Vec<(usize, wgpu::CommandBuffer)> = main
                .iter()
                .map(|&(order, pass)| (order, self.record_pass(device, pass)))
                .collect();
            let from_worker = handle.join().map_err(|_| RenderError::WorkerPanicked)?;
            recorded.extend(from_worker);
            Ok::<_, RenderError>(recorded)
        })?;

        buffers.sort_by_key(|(order, _)| *order);
        Ok(buffers.into_iter().map(|(_, buffer)| buffer).collect())
    }

    fn record_pass(&self, device: &wgpu::Device, pass: &ScheduledPass) -> wgpu::CommandBuffer {
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(pass.id.name()),
        });
        match pass.action {
            PassAction::Execute => self.execute(&mut encoder, pass.id),
            PassAction::TransitionOnly => self.transition(&mut encoder, pass.id),
        }
        encoder.finish()
    }

    fn execute(&self, encoder: &mut wgpu::CommandEncoder, id: PassId) {
        match id {
            PassId::Shadow => self.shadow_pass(encoder),
            PassId::GBuffer => self.gbuffer_pass(encoder),
            PassId::PbrLighting => self.lighting_pass(encoder),
            PassId::Skybox => self.skybox_pass(encoder),
            PassId::Forward => self.forward_pass(encoder),
            PassId::Bloom2x => self.bloom_pass(encoder, 0),
            PassId::Bloom4x => self.bloom_pass(encoder, 1),
            PassId::Bloom8x => self.bloom_pass(encoder, 2),
            PassId::Bloom16x => self.bloom_pass(encoder, 3),
            PassId::Glow => fullscreen_pass(
                encoder,
                "glow_pass",
                &self.pipelines.glow,
                &self.targets.glow_bind_group,
                &self.targets.glow.view,
            ),
            PassId::Fxaa => fullscreen_pass(
                encoder,
                "fxaa_pass",
                &self.pipelines.fxaa,
                &self.targets.fxaa_bind_group,
                &self.targets.aa_output.view,
            ),
            PassId::Hdr => {
                let source = usize::from(self.plan.executes(PassId::Fxaa));
                fullscreen_pass(
                    encoder,
                    "hdr_pass",
                    &self.pipelines.hdr,
                    &self.targets.hdr_bind_groups[source],
                    &self.targets.hdr_output.view,
                );
            }
            PassId::Final => fullscreen_pass(
                encoder,
                "final_pass",
                &self.pipelines.final_blit,
                &self.targets.final_bind_group,
                self.backbuffer,
            ),
            PassId::Ui => self.ui_pass(encoder),
        }
    }

    /// Disabled passes keep their outputs readable without rendering.
    fn transition(&self, encoder: &mut wgpu::CommandEncoder, id: PassId) {
        if id == PassId::Shadow {
            for view in [&self.shadow_maps.static_view, &self.shadow_maps.dynamic_view] {
                begin(
                    encoder,
                    "shadow_transition",
                    &[],
                    depth_attachment(view, wgpu::LoadOp::Load),
                );
            }
        }
    }

    fn shadow_pass(&self, encoder: &mut wgpu::CommandEncoder) {
        let work = self.plan.shadow;
        let maps = [
            (
                work.render_static,
                &self.shadow_maps.static_view,
                self.queues.shadow_casters(true),
            ),
            (
                work.render_dynamic,
                &self.shadow_maps.dynamic_view,
                self.queues.shadow_casters(false),
            ),
        ];
        for (caster, (render, view, casters)) in maps.into_iter().enumerate() {
            if !render {
                continue;
            }
            let mut pass = begin(
                encoder,
                "shadow_pass",
                &[],
                depth_attachment(view, wgpu::LoadOp::Clear(1.0)),
            );
            pass.set_bind_group(0, &self.caster_bind_groups[caster], &[]);
            for cmd in casters {
                let Some(draw) = Draw::resolve(self.resources, cmd) else {
                    continue;
                };
                let skinned = draw.variant.skinned();
                let variant = if skinned {
                    GeometryVariant::Skinned
                } else {
                    GeometryVariant::Static
                };
                pass.set_pipeline(self.pipelines.shadow(skinned));
                pass.set_bind_group(1, &draw.descriptor.bind_group, &[]);
                if let Some(joints) = draw.joints {
                    pass.set_bind_group(2, &joints.bind_group, &[]);
                }
                draw.bind_streams(&mut pass, variant);
                draw.draw(&mut pass, cmd);
            }
        }
    }

    fn gbuffer_pass(&self, encoder: &mut wgpu::CommandEncoder) {
        let clear = wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT);
        let colors: Vec<_> = self
            .targets
            .gbuffer
            .iter()
            .map(|target| color_attachment(&target.view, clear))
            .collect();
        let mut pass = begin(
            encoder,
            "gbuffer_pass",
            &colors,
            depth_attachment(&self.targets.depth.view, wgpu::LoadOp::Clear(1.0)),
        );
        // An empty list still clears the attachments for the lighting pass.
        let deferred = self.queues.deferred();
        if deferred.is_empty() {
            return;
        }
        pass.set_bind_group(0, self.global_bind_group, &[]);
        draw_geometry(&mut pass, self.resources, deferred, |variant| {
            self.pipelines.geometry(variant)
        });
    }

    #[cfg(not(feature = "compute-lighting"))]
    fn lighting_pass(&self, encoder: &mut wgpu::CommandEncoder) {
        let clear = wgpu::LoadOp::Clear(wgpu::Color::BLACK);
        let mut pass = begin(
            encoder,
            "pbr_lighting_pass",
            &[
                color_attachment(&self.targets.scene_color.view, clear),
                color_attachment(&self.targets.bright.view, clear),
            ],
            None,
        );
        pass.set_pipeline(self.pipelines.lighting(self.local_reflections));
        pass.set_bind_group(0, self.lighting_bind_group, &[]);
        pass.set_bind_group(1, &self.targets.gbuffer_bind_group, &[]);
        pass.draw(0..3, 0..1);
    }

    #[cfg(feature = "compute-lighting")]
    fn lighting_pass(&self, encoder: &mut wgpu::CommandEncoder) {
        let (width, height) = self.targets.size;
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("pbr_lighting_compute"),
            timestamp_writes: None,
        });
        pass.set_pipeline(self.pipelines.lighting_compute(self.local_reflections));
        pass.set_bind_group(0, self.lighting_bind_group, &[]);
        pass.set_bind_group(1, &self.targets.gbuffer_bind_group, &[]);
        pass.dispatch_workgroups(width.div_ceil(8), height.div_ceil(8), 1);
    }

    fn skybox_pass(&self, encoder: &mut wgpu::CommandEncoder) {
        let mut pass = begin(
            encoder,
            "skybox_pass",
            &[
                color_attachment(&self.targets.scene_color.view, wgpu::LoadOp::Load),
                color_attachment(&self.targets.bright.view, wgpu::LoadOp::Load),
            ],
            depth_attachment(&self.targets.depth.view, wgpu::LoadOp::Load),
        );
        draw_sky(
            &mut pass,
            self.pipelines,
            self.skybox,
            self.global_bind_group,
            self.sky_bind_group,
        );
    }

    fn forward_pass(&self, encoder: &mut wgpu::CommandEncoder) {
        let live: Vec<&ParticleSystem> = self
            .particles
            .iter()
            .map(|(_, system)| system)
            .filter(|system| system.emitter.particle_count() > 0)
            .collect();
        if !live.is_empty() {
            let mut compute = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("particle_sim"),
                timestamp_writes: None,
            });
            compute.set_pipeline(&self.pipelines.particle_sim);
            for system in &live {
                compute.set_bind_group(0, &system.gpu.sim_bind_group, &[]);
                compute.dispatch_workgroups(system.gpu.workgroups(), 1, 1);
            }
        }

        let mut pass = begin(
            encoder,
            "forward_pass",
            &[
                color_attachment(&self.targets.scene_color.view, wgpu::LoadOp::Load),
                color_attachment(&self.targets.bright.view, wgpu::LoadOp::Load),
            ],
            depth_attachment(&self.targets.depth.view, wgpu::LoadOp::Load),
        );

        let forward = self.queues.forward();
        if !forward.is_empty() {
            pass.set_bind_group(0, self.lighting_bind_group, &[]);
            draw_geometry(&mut pass, self.resources, forward, |variant| {
                self.pipelines.forward(variant)
            });
        }

        if !live.is_empty() {
            pass.set_pipeline(&self.pipelines.particle_draw);
            pass.set_bind_group(0, self.global_bind_group, &[]);
            for system in &live {
                pass.set_bind_group(1, &system.gpu.draw_bind_group, &[]);
                pass.draw(0..6, 0..system.gpu.capacity);
            }
        }
    }

    fn bloom_pass(&self, encoder: &mut wgpu::CommandEncoder, level: usize) {
        let bindings = &self.targets.bloom_bindings[level];
        let scale = &self.targets.bloom[level].view;
        let ping = &self.targets.bloom_ping[level].view;
        fullscreen_pass(
            encoder,
            "bloom_downscale",
            &self.pipelines.bloom_downscale,
            &bindings.downscale,
            scale,
        );
        fullscreen_pass(
            encoder,
            "bloom_blur_h",
            &self.pipelines.bloom_blur,
            &bindings.blur_h,
            ping,
        );
        fullscreen_pass(
            encoder,
            "bloom_blur_v",
            &self.pipelines.bloom_blur,
            &bindings.blur_v,
            scale,
        );
    }

    fn ui_pass(&self, encoder: &mut wgpu::CommandEncoder) {
        let Some(ui) = self.ui.filter(|ui| ui.count > 0) else {
            return;
        };
        let mut pass = begin(
            encoder,
            "ui_pass",
            &[color_attachment(self.backbuffer, wgpu::LoadOp::Load)],
            None,
        );
        pass.set_pipeline(&self.pipelines.ui);
        pass.set_bind_group(0, ui.bind_group, &[]);
        pass.set_vertex_buffer(0, ui.instances.slice(..));
        pass.draw(0..6, 0..ui.count);
    }
}

/// One face of an environment cube rendered from a probe position.
pub struct ProbeCapture<'a> {
    pub resources: &'a ResourceRegistry,
    pub pipelines: &'a Pipelines,
    /// Sorted back to front; the forward pipelines do not write depth.
    pub commands: &'a [PrimitiveRenderCmd],
    pub global_bind_group: &'a wgpu::BindGroup,
    pub lighting_bind_group: &'a wgpu::BindGroup,
    pub skybox: &'a Skybox,
    pub sky_bind_group: &'a wgpu::BindGroup,
    pub color: &'a wgpu::TextureView,
    pub bright: &'a wgpu::TextureView,
    pub depth: &'a wgpu::TextureView,
}

impl ProbeCapture<'_> {
    pub fn record(&self, encoder: &mut wgpu::CommandEncoder) {
        let clear = wgpu::LoadOp::Clear(wgpu::Color::BLACK);
        let mut pass = begin(
            encoder,
            "probe_capture",
            &[
                color_attachment(self.color, clear),
                color_attachment(self.bright, clear),
            ],
            depth_attachment(self.depth, wgpu::LoadOp::Clear(1.0)),
        );
        draw_sky(
            &mut pass,
            self.pipelines,
            self.skybox,
            self.global_bind_group,
            self.sky_bind_group,
        );
        pass.set_bind_group(0, self.lighting_bind_group, &[]);
        draw_geometry(&mut pass, self.resources, self.commands, |variant| {
            self.pipelines.forward(variant)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_passes_skip_the_shadow_pass() {
        let graph = crate::renderer::graph::frame_graph(Default::default()).unwrap();
        assert!(graph.pass(PassId::GBuffer).unwrap().waits.is_empty());
        assert!(!WORKER_PASSES.contains(&PassId::Shadow));
        assert!(graph.position(PassId::Shadow) < graph.position(PassId::Forward));
    }
}
