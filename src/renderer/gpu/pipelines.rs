//! Render and compute pipelines
//!
//! Shader modules are assembled from the WGSL sources under `shaders/`:
//! shared declarations first, then the stage-specific file.

use super::layouts::BindGroupLayouts;
use super::targets::{DEPTH_FORMAT, GBUFFER_FORMATS, HDR_FORMAT, LDR_FORMAT};
use crate::renderer::cmd::GeometryVariant;
use crate::renderer::ibl::BRDF_LUT_FORMAT;
use crate::renderer::mesh::variant_layouts;
use crate::renderer::overlay::UiRect;
use crate::renderer::skybox::SKY_FORMAT;

const COMMON: &str = include_str!("../shaders/common.wgsl");
const GEOMETRY: &str = include_str!("../shaders/geometry.wgsl");
const LIGHTING: &str = include_str!("../shaders/lighting.wgsl");

const ADDITIVE: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
};

const SKY_VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 1] =
    wgpu::vertex_attr_array![0 => Float32x3];

fn shader(device: &wgpu::Device, label: &str, sources: &[&str]) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(sources.concat().into()),
    })
}

fn pipeline_layout(
    device: &wgpu::Device,
    label: &str,
    groups: &[&wgpu::BindGroupLayout],
) -> wgpu::PipelineLayout {
    device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: groups,
        push_constant_ranges: &[],
    })
}

fn color_target(
    format: wgpu::TextureFormat,
    blend: Option<wgpu::BlendState>,
) -> Option<wgpu::ColorTargetState> {
    Some(wgpu::ColorTargetState {
        format,
        blend,
        write_mask: wgpu::ColorWrites::ALL,
    })
}

fn depth_state(write: bool, compare: wgpu::CompareFunction) -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: write,
        depth_compare: compare,
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    }
}

/// Vertex entry point of a geometry permutation.
const fn vertex_entry(variant: GeometryVariant) -> &'static str {
    match variant {
        GeometryVariant::Static => "vs_static",
        GeometryVariant::StaticMorph => "vs_static_morph",
        GeometryVariant::Skinned => "vs_skinned",
        GeometryVariant::SkinnedMorph => "vs_skinned_morph",
    }
}

struct RasterDesc<'a> {
    label: &'a str,
    layout: &'a wgpu::PipelineLayout,
    module: &'a wgpu::ShaderModule,
    vertex_entry: &'a str,
    fragment_entry: Option<&'a str>,
    buffers: &'a [wgpu::VertexBufferLayout<'a>],
    targets: &'a [Option<wgpu::ColorTargetState>],
    depth: Option<wgpu::DepthStencilState>,
    cull_mode: Option<wgpu::Face>,
}

fn raster(device: &wgpu::Device, desc: RasterDesc<'_>) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(desc.label),
        layout: Some(desc.layout),
        vertex: wgpu::VertexState {
            module: desc.module,
            entry_point: Some(desc.vertex_entry),
            buffers: desc.buffers,
            compilation_options: Default::default(),
        },
        fragment: desc.fragment_entry.map(|entry| wgpu::FragmentState {
            module: desc.module,
            entry_point: Some(entry),
            targets: desc.targets,
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: desc.cull_mode,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: desc.depth,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

fn compute(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    entry: &str,
) -> wgpu::ComputePipeline {
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        module,
        entry_point: Some(entry),
        compilation_options: Default::default(),
        cache: None,
    })
}

/// Full-screen triangle pass reading one bind group.
fn fullscreen(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    fragment_entry: &str,
    target: Option<wgpu::ColorTargetState>,
) -> wgpu::RenderPipeline {
    raster(
        device,
        RasterDesc {
            label,
            layout,
            module,
            vertex_entry: "vs_fullscreen",
            fragment_entry: Some(fragment_entry),
            buffers: &[],
            targets: &[target],
            depth: None,
            cull_mode: None,
        },
    )
}

/// Every pipeline of the frame, created once per device and surface format.
#[derive(Debug)]
pub struct Pipelines {
    gbuffer: [wgpu::RenderPipeline; 4],
    forward: [wgpu::RenderPipeline; 4],
    shadow: [wgpu::RenderPipeline; 2],
    pbr: [wgpu::RenderPipeline; 2],
    #[cfg(feature = "compute-lighting")]
    pbr_compute: [wgpu::ComputePipeline; 2],
    pub skybox: wgpu::RenderPipeline,
    pub sky_bake: wgpu::RenderPipeline,
    pub particle_sim: wgpu::ComputePipeline,
    pub particle_draw: wgpu::RenderPipeline,
    pub bloom_downscale: wgpu::RenderPipeline,
    pub bloom_blur: wgpu::RenderPipeline,
    pub glow: wgpu::RenderPipeline,
    pub fxaa: wgpu::RenderPipeline,
    pub hdr: wgpu::RenderPipeline,
    pub final_blit: wgpu::RenderPipeline,
    pub ui: wgpu::RenderPipeline,
    pub brdf_lut: wgpu::RenderPipeline,
}

impl Pipelines {
    pub fn new(
        device: &wgpu::Device,
        layouts: &BindGroupLayouts,
        surface_format: wgpu::TextureFormat,
    ) -> Self {
        let hdr_pair = [color_target(HDR_FORMAT, None), color_target(HDR_FORMAT, None)];

        // Geometry and forward share the vertex stage and bind group slots 1-3.
        let gbuffer_module = shader(
            device,
            "gbuffer_shader",
            &[COMMON, GEOMETRY, include_str!("../shaders/gbuffer.wgsl")],
        );
        let forward_module = shader(
            device,
            "forward_shader",
            &[COMMON, GEOMETRY, LIGHTING, include_str!("../shaders/forward.wgsl")],
        );
        let gbuffer_layouts = [
            pipeline_layout(
                device,
                "gbuffer_layout",
                &[&layouts.global, &layouts.object, &layouts.material],
            ),
            pipeline_layout(
                device,
                "gbuffer_skinned_layout",
                &[&layouts.global, &layouts.object, &layouts.material, &layouts.joints],
            ),
        ];
        let forward_layouts = [
            pipeline_layout(
                device,
                "forward_layout",
                &[&layouts.lighting, &layouts.object, &layouts.material],
            ),
            pipeline_layout(
                device,
                "forward_skinned_layout",
                &[&layouts.lighting, &layouts.object, &layouts.material, &layouts.joints],
            ),
        ];
        let gbuffer_targets = GBUFFER_FORMATS.map(|format| color_target(format, None));
        let blended_pair = [
            color_target(HDR_FORMAT, Some(wgpu::BlendState::ALPHA_BLENDING)),
            color_target(HDR_FORMAT, Some(wgpu::BlendState::ALPHA_BLENDING)),
        ];

        let gbuffer = GeometryVariant::ALL.map(|variant| {
            let buffers = variant_layouts(variant);
            raster(
                device,
                RasterDesc {
                    label: "gbuffer_pipeline",
                    layout: &gbuffer_layouts[usize::from(variant.skinned())],
                    module: &gbuffer_module,
                    vertex_entry: vertex_entry(variant),
                    fragment_entry: Some("fs_main"),
                    buffers: &buffers,
                    targets: &gbuffer_targets,
                    depth: Some(depth_state(true, wgpu::CompareFunction::Less)),
                    cull_mode: Some(wgpu::Face::Back),
                },
            )
        });
        let forward = GeometryVariant::ALL.map(|variant| {
            let buffers = variant_layouts(variant);
            raster(
                device,
                RasterDesc {
                    label: "forward_pipeline",
                    layout: &forward_layouts[usize::from(variant.skinned())],
                    module: &forward_module,
                    vertex_entry: vertex_entry(variant),
                    fragment_entry: Some("fs_main"),
                    buffers: &buffers,
                    targets: &blended_pair,
                    depth: Some(depth_state(false, wgpu::CompareFunction::Less)),
                    cull_mode: Some(wgpu::Face::Back),
                },
            )
        });

        let shadow_module = shader(
            device,
            "shadow_shader",
            &[COMMON, include_str!("../shaders/shadow.wgsl")],
        );
        let shadow = [GeometryVariant::Static, GeometryVariant::Skinned].map(|variant| {
            let groups: &[&wgpu::BindGroupLayout] = if variant.skinned() {
                &[&layouts.caster, &layouts.object, &layouts.joints]
            } else {
                &[&layouts.caster, &layouts.object]
            };
            let layout = pipeline_layout(device, "shadow_layout", groups);
            let buffers = variant_layouts(variant);
            let mut depth = depth_state(true, wgpu::CompareFunction::LessEqual);
            depth.bias = wgpu::DepthBiasState {
                constant: 2,
                slope_scale: 2.0,
                clamp: 0.0,
            };
            raster(
                device,
                RasterDesc {
                    label: "shadow_pipeline",
                    layout: &layout,
                    module: &shadow_module,
                    vertex_entry: vertex_entry(variant),
                    fragment_entry: None,
                    buffers: &buffers,
                    targets: &[],
                    depth: Some(depth),
                    cull_mode: Some(wgpu::Face::Back),
                },
            )
        });

        let pbr_module = shader(
            device,
            "pbr_shader",
            &[COMMON, LIGHTING, include_str!("../shaders/pbr.wgsl")],
        );
        let pbr_layout =
            pipeline_layout(device, "pbr_layout", &[&layouts.lighting, &layouts.gbuffer]);
        let pbr = ["fs_main", "fs_local_reflections"].map(|entry| {
            raster(
                device,
                RasterDesc {
                    label: "pbr_pipeline",
                    layout: &pbr_layout,
                    module: &pbr_module,
                    vertex_entry: "vs_fullscreen",
                    fragment_entry: Some(entry),
                    buffers: &[],
                    targets: &hdr_pair,
                    depth: None,
                    cull_mode: None,
                },
            )
        });

        #[cfg(feature = "compute-lighting")]
        let pbr_compute = {
            let module = shader(
                device,
                "pbr_compute_shader",
                &[COMMON, LIGHTING, include_str!("../shaders/pbr_compute.wgsl")],
            );
            let layout = pipeline_layout(
                device,
                "pbr_compute_layout",
                &[&layouts.lighting, &layouts.gbuffer_compute],
            );
            ["cs_main", "cs_local_reflections"]
                .map(|entry| compute(device, "pbr_compute_pipeline", &layout, &module, entry))
        };

        let skybox_module = shader(
            device,
            "skybox_shader",
            &[COMMON, include_str!("../shaders/skybox.wgsl")],
        );
        let skybox = raster(
            device,
            RasterDesc {
                label: "skybox_pipeline",
                layout: &pipeline_layout(device, "skybox_layout", &[&layouts.global, &layouts.sky]),
                module: &skybox_module,
                vertex_entry: "vs_main",
                fragment_entry: Some("fs_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &SKY_VERTEX_ATTRIBUTES,
                }],
                targets: &hdr_pair,
                depth: Some(depth_state(false, wgpu::CompareFunction::LessEqual)),
                cull_mode: None,
            },
        );

        let sky_bake_module = shader(
            device,
            "sky_bake_shader",
            &[COMMON, include_str!("../shaders/sky_bake.wgsl")],
        );
        let sky_bake = fullscreen(
            device,
            "sky_bake_pipeline",
            &pipeline_layout(device, "sky_bake_layout", &[&layouts.sky_bake]),
            &sky_bake_module,
            "fs_main",
            color_target(SKY_FORMAT, None),
        );

        let particle_module = shader(
            device,
            "particle_shader",
            &[COMMON, include_str!("../shaders/particle.wgsl")],
        );
        let particle_draw = raster(
            device,
            RasterDesc {
                label: "particle_pipeline",
                layout: &pipeline_layout(
                    device,
                    "particle_layout",
                    &[&layouts.global, &layouts.particle_draw],
                ),
                module: &particle_module,
                vertex_entry: "vs_main",
                fragment_entry: Some("fs_main"),
                buffers: &[],
                targets: &[
                    color_target(HDR_FORMAT, Some(ADDITIVE)),
                    color_target(HDR_FORMAT, Some(ADDITIVE)),
                ],
                depth: Some(depth_state(false, wgpu::CompareFunction::Less)),
                cull_mode: None,
            },
        );
        let particle_sim_module = shader(
            device,
            "particle_sim_shader",
            &[include_str!("../shaders/particle_sim.wgsl")],
        );
        let particle_sim = compute(
            device,
            "particle_sim_pipeline",
            &pipeline_layout(device, "particle_sim_layout", &[&layouts.particle_sim]),
            &particle_sim_module,
            "cs_main",
        );

        let post_layout = pipeline_layout(device, "post_layout", &[&layouts.post]);
        let bloom_module = shader(
            device,
            "bloom_shader",
            &[COMMON, include_str!("../shaders/bloom.wgsl")],
        );
        let bloom_downscale = fullscreen(
            device,
            "bloom_downscale_pipeline",
            &post_layout,
            &bloom_module,
            "fs_downscale",
            color_target(HDR_FORMAT, None),
        );
        let bloom_blur = fullscreen(
            device,
            "bloom_blur_pipeline",
            &post_layout,
            &bloom_module,
            "fs_blur",
            color_target(HDR_FORMAT, None),
        );
        let glow = fullscreen(
            device,
            "glow_pipeline",
            &pipeline_layout(device, "glow_layout", &[&layouts.glow]),
            &shader(device, "glow_shader", &[COMMON, include_str!("../shaders/glow.wgsl")]),
            "fs_main",
            color_target(HDR_FORMAT, None),
        );
        let fxaa = fullscreen(
            device,
            "fxaa_pipeline",
            &post_layout,
            &shader(device, "fxaa_shader", &[COMMON, include_str!("../shaders/fxaa.wgsl")]),
            "fs_main",
            color_target(HDR_FORMAT, None),
        );
        let hdr = fullscreen(
            device,
            "hdr_pipeline",
            &pipeline_layout(device, "hdr_layout", &[&layouts.hdr]),
            &shader(device, "hdr_shader", &[COMMON, include_str!("../shaders/hdr.wgsl")]),
            "fs_main",
            color_target(LDR_FORMAT, None),
        );
        let final_blit = fullscreen(
            device,
            "final_pipeline",
            &post_layout,
            &shader(device, "final_shader", &[COMMON, include_str!("../shaders/final.wgsl")]),
            "fs_main",
            color_target(surface_format, None),
        );
        let brdf_lut = fullscreen(
            device,
            "brdf_lut_pipeline",
            &pipeline_layout(device, "brdf_lut_layout", &[]),
            &shader(
                device,
                "brdf_lut_shader",
                &[COMMON, include_str!("../shaders/brdf_lut.wgsl")],
            ),
            "fs_main",
            color_target(BRDF_LUT_FORMAT, None),
        );

        let ui_module = shader(device, "ui_shader", &[include_str!("../shaders/ui.wgsl")]);
        let ui = raster(
            device,
            RasterDesc {
                label: "ui_pipeline",
                layout: &pipeline_layout(device, "ui_layout", &[&layouts.ui]),
                module: &ui_module,
                vertex_entry: "vs_main",
                fragment_entry: Some("fs_main"),
                buffers: &[UiRect::layout()],
                targets: &[color_target(surface_format, Some(wgpu::BlendState::ALPHA_BLENDING))],
                depth: None,
                cull_mode: None,
            },
        );

        Self {
            gbuffer,
            forward,
            shadow,
            pbr,
            #[cfg(feature = "compute-lighting")]
            pbr_compute,
            skybox,
            sky_bake,
            particle_sim,
            particle_draw,
            bloom_downscale,
            bloom_blur,
            glow,
            fxaa,
            hdr,
            final_blit,
            ui,
            brdf_lut,
        }
    }

    /// G-buffer permutation for a command's geometry.
    pub fn geometry(&self, variant: GeometryVariant) -> &wgpu::RenderPipeline {
        &self.gbuffer[variant.index()]
    }

    pub fn forward(&self, variant: GeometryVariant) -> &wgpu::RenderPipeline {
        &self.forward[variant.index()]
    }

    /// Casters ignore morph targets.
    pub fn shadow(&self, skinned: bool) -> &wgpu::RenderPipeline {
        &self.shadow[usize::from(skinned)]
    }

    pub fn lighting(&self, local_reflections: bool) -> &wgpu::RenderPipeline {
        &self.pbr[usize::from(local_reflections)]
    }

    #[cfg(feature = "compute-lighting")]
    pub fn lighting_compute(&self, local_reflections: bool) -> &wgpu::ComputePipeline {
        &self.pbr_compute[usize::from(local_reflections)]
    }
}
