//! Offscreen attachments and the bind groups that read them
//!
//! Everything here depends on the render size and is rebuilt on resize.

use wgpu::util::DeviceExt;

use super::layouts::BindGroupLayouts;
use crate::renderer::graph::Attachment;
use crate::renderer::postprocess::{
    BLOOM_LEVELS, HdrUniform, PostProcessConfig, PostUniform, bloom_level_size,
};

pub const ALBEDO_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const HDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
/// Tonemapped output, also the snapshot source
pub const LDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// G-buffer color formats in attachment order: albedo, normal, position, emission
pub const GBUFFER_FORMATS: [wgpu::TextureFormat; 4] =
    [ALBEDO_FORMAT, HDR_FORMAT, HDR_FORMAT, HDR_FORMAT];

#[derive(Debug)]
pub struct RenderTarget {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub size: (u32, u32),
}

impl RenderTarget {
    pub fn new(
        device: &wgpu::Device,
        (width, height): (u32, u32),
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
        label: &str,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: usage | wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            size: (width.max(1), height.max(1)),
        }
    }
}

/// Bind groups of one bloom scale.
#[derive(Debug)]
pub struct BloomBindings {
    /// Samples the previous scale (or the bright target) into the scale
    pub downscale: wgpu::BindGroup,
    /// Samples the scale into its ping target
    pub blur_h: wgpu::BindGroup,
    /// Samples the ping target back into the scale
    pub blur_v: wgpu::BindGroup,
}

#[derive(Debug)]
pub struct FrameTargets {
    pub size: (u32, u32),
    pub gbuffer: [RenderTarget; 4],
    pub depth: RenderTarget,
    pub scene_color: RenderTarget,
    pub bright: RenderTarget,
    pub bloom: [RenderTarget; BLOOM_LEVELS],
    pub bloom_ping: [RenderTarget; BLOOM_LEVELS],
    pub bloom_bindings: [BloomBindings; BLOOM_LEVELS],
    pub glow: RenderTarget,
    pub aa_output: RenderTarget,
    pub hdr_output: RenderTarget,

    pub gbuffer_bind_group: wgpu::BindGroup,
    pub glow_bind_group: wgpu::BindGroup,
    pub fxaa_bind_group: wgpu::BindGroup,
    /// Tonemap input without and with the AA pass
    pub hdr_bind_groups: [wgpu::BindGroup; 2],
    pub final_bind_group: wgpu::BindGroup,
    glow_buffer: wgpu::Buffer,
    hdr_buffer: wgpu::Buffer,
}

impl FrameTargets {
    pub fn new(device: &wgpu::Device, layouts: &BindGroupLayouts, size: (u32, u32)) -> Self {
        let size = (size.0.max(1), size.1.max(1));
        let sampled = wgpu::TextureUsages::TEXTURE_BINDING;
        #[cfg(feature = "compute-lighting")]
        let lit = sampled | wgpu::TextureUsages::STORAGE_BINDING;
        #[cfg(not(feature = "compute-lighting"))]
        let lit = sampled;

        let gbuffer = [
            RenderTarget::new(device, size, GBUFFER_FORMATS[0], sampled, "gbuffer_albedo"),
            RenderTarget::new(device, size, GBUFFER_FORMATS[1], sampled, "gbuffer_normal"),
            RenderTarget::new(device, size, GBUFFER_FORMATS[2], sampled, "gbuffer_position"),
            RenderTarget::new(device, size, GBUFFER_FORMATS[3], sampled, "gbuffer_emission"),
        ];
        let depth = RenderTarget::new(device, size, DEPTH_FORMAT, sampled, "scene_depth");
        let scene_color = RenderTarget::new(device, size, HDR_FORMAT, lit, "scene_color");
        let bright = RenderTarget::new(device, size, HDR_FORMAT, lit, "bright_color");
        let glow_size = bloom_level_size(size, 0);
        let glow = RenderTarget::new(device, glow_size, HDR_FORMAT, sampled, "glow");
        let aa_output = RenderTarget::new(device, size, HDR_FORMAT, sampled, "aa_output");
        let hdr_output = RenderTarget::new(
            device,
            size,
            LDR_FORMAT,
            sampled | wgpu::TextureUsages::COPY_SRC,
            "hdr_output",
        );

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("post_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let post_group = |source: &wgpu::TextureView, uniform: PostUniform, label: &str| {
            let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::bytes_of(&uniform),
                usage: wgpu::BufferUsages::UNIFORM,
            });
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &layouts.post,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(source),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: buffer.as_entire_binding(),
                    },
                ],
            })
        };

        let bloom_target = |level: usize, label: &str| {
            RenderTarget::new(device, bloom_level_size(size, level), HDR_FORMAT, sampled, label)
        };
        let bloom: [RenderTarget; BLOOM_LEVELS] =
            std::array::from_fn(|level| bloom_target(level, "bloom"));
        let bloom_ping: [RenderTarget; BLOOM_LEVELS] =
            std::array::from_fn(|level| bloom_target(level, "bloom_ping"));
        let bloom_bindings = std::array::from_fn(|level| {
            let (source, source_size) = match level.checked_sub(1) {
                Some(previous) => (&bloom[previous].view, bloom[previous].size),
                None => (&bright.view, size),
            };
            let level_size = bloom[level].size;
            let horizontal = PostUniform::blur(true, level_size);
            let vertical = PostUniform::blur(false, level_size);
            BloomBindings {
                downscale: post_group(source, PostUniform::texel(source_size), "bloom_downscale"),
                blur_h: post_group(&bloom[level].view, horizontal, "bloom_blur_h"),
                blur_v: post_group(&bloom_ping[level].view, vertical, "bloom_blur_v"),
            }
        });

        let config = PostProcessConfig::default();
        let glow_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("glow_uniform"),
            contents: bytemuck::bytes_of(&config.glow_uniform()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let glow_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("glow_bind_group"),
            layout: &layouts.glow,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&bloom[0].view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&bloom[1].view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&bloom[2].view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&bloom[3].view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: glow_buffer.as_entire_binding(),
                },
            ],
        });

        let fxaa_bind_group = post_group(&scene_color.view, PostUniform::texel(size), "fxaa");
        let final_bind_group = post_group(&hdr_output.view, PostUniform::texel(size), "final");

        let hdr_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("hdr_uniform"),
            contents: bytemuck::bytes_of(&config.hdr_uniform()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let hdr_group = |scene: &wgpu::TextureView| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("hdr_bind_group"),
                layout: &layouts.hdr,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(scene),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&glow.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(&sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: hdr_buffer.as_entire_binding(),
                    },
                ],
            })
        };
        let hdr_bind_groups = [hdr_group(&scene_color.view), hdr_group(&aa_output.view)];

        let gbuffer_bind_group =
            Self::gbuffer_bind_group(device, layouts, &gbuffer, &scene_color, &bright);

        Self {
            size,
            gbuffer,
            depth,
            scene_color,
            bright,
            bloom,
            bloom_ping,
            bloom_bindings,
            glow,
            aa_output,
            hdr_output,
            gbuffer_bind_group,
            glow_bind_group,
            fxaa_bind_group,
            hdr_bind_groups,
            final_bind_group,
            glow_buffer,
            hdr_buffer,
        }
    }

    #[cfg(not(feature = "compute-lighting"))]
    fn gbuffer_bind_group(
        device: &wgpu::Device,
        layouts: &BindGroupLayouts,
        gbuffer: &[RenderTarget; 4],
        _scene_color: &RenderTarget,
        _bright: &RenderTarget,
    ) -> wgpu::BindGroup {
        let entries: Vec<wgpu::BindGroupEntry> = gbuffer
            .iter()
            .enumerate()
            .map(|(binding, target)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: wgpu::BindingResource::TextureView(&target.view),
            })
            .collect();
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("gbuffer_bind_group"),
            layout: &layouts.gbuffer,
            entries: &entries,
        })
    }

    #[cfg(feature = "compute-lighting")]
    fn gbuffer_bind_group(
        device: &wgpu::Device,
        layouts: &BindGroupLayouts,
        gbuffer: &[RenderTarget; 4],
        scene_color: &RenderTarget,
        bright: &RenderTarget,
    ) -> wgpu::BindGroup {
        let entries: Vec<wgpu::BindGroupEntry> = gbuffer
            .iter()
            .chain([scene_color, bright])
            .enumerate()
            .map(|(binding, target)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: wgpu::BindingResource::TextureView(&target.view),
            })
            .collect();
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("gbuffer_compute_bind_group"),
            layout: &layouts.gbuffer_compute,
            entries: &entries,
        })
    }

    /// Upload this frame's tonemap and glow parameters.
    pub fn write_post_uniforms(&self, queue: &wgpu::Queue, config: &PostProcessConfig) {
        let hdr: HdrUniform = config.hdr_uniform();
        queue.write_buffer(&self.hdr_buffer, 0, bytemuck::bytes_of(&hdr));
        queue.write_buffer(&self.glow_buffer, 0, bytemuck::bytes_of(&config.glow_uniform()));
    }

    /// Render target view backing a graph attachment. Shadow maps and the
    /// backbuffer live elsewhere.
    pub fn view(&self, attachment: Attachment) -> Option<&wgpu::TextureView> {
        let target = match attachment {
            Attachment::GAlbedo => &self.gbuffer[0],
            Attachment::GNormal => &self.gbuffer[1],
            Attachment::GPosition => &self.gbuffer[2],
            Attachment::GEmission => &self.gbuffer[3],
            Attachment::SceneDepth => &self.depth,
            Attachment::SceneColor => &self.scene_color,
            Attachment::BrightColor => &self.bright,
            Attachment::Bloom2x => &self.bloom[0],
            Attachment::Bloom4x => &self.bloom[1],
            Attachment::Bloom8x => &self.bloom[2],
            Attachment::Bloom16x => &self.bloom[3],
            Attachment::Glow => &self.glow,
            Attachment::AaOutput => &self.aa_output,
            Attachment::HdrOutput => &self.hdr_output,
            Attachment::ShadowStatic | Attachment::ShadowDynamic | Attachment::Backbuffer => {
                return None;
            }
        };
        Some(&target.view)
    }
}
