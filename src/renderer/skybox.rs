//! Skybox rendering
//!
//! The sky is a cubemap drawn behind the lit scene. It is either procedural
//! (a gradient with a sun disc, re-baked into [`Skybox::procedural`] whenever
//! the sun or the air color changes) or a user-supplied baked cube.

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};
use wgpu::util::DeviceExt;

use super::camera::cube_face_view_projection;
use super::gpu::layouts::BindGroupLayouts;
use super::mesh::MeshData;
use super::pool::Handle;
use super::texture::TextureCube;

/// HDR format of sky and environment cubemaps
pub const SKY_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Procedural sky description
#[derive(Debug, Clone, PartialEq)]
pub struct SkyParams {
    /// Direction the sunlight travels, normalized
    pub sun_direction: Vec3,
    /// Scattering tint of the atmosphere
    pub air_color: Vec3,
    pub sun_intensity: f32,
    pub zenith_color: Vec3,
    pub ground_color: Vec3,
}

impl Default for SkyParams {
    fn default() -> Self {
        Self {
            sun_direction: Vec3::new(-0.4, -1.0, -0.3).normalize(),
            air_color: Vec3::new(0.5, 0.7, 1.0),
            sun_intensity: 20.0,
            zenith_color: Vec3::new(0.1, 0.2, 0.5),
            ground_color: Vec3::new(0.3, 0.25, 0.2),
        }
    }
}

impl SkyParams {
    pub fn to_uniform(&self) -> SkyUniform {
        SkyUniform {
            sun_direction: self
                .sun_direction
                .normalize_or(Vec3::NEG_Y)
                .extend(self.sun_intensity)
                .into(),
            air_color: self.air_color.extend(1.0).into(),
            zenith_color: self.zenith_color.extend(1.0).into(),
            ground_color: self.ground_color.extend(1.0).into(),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct SkyUniform {
    /// w = sun intensity
    pub sun_direction: [f32; 4],
    pub air_color: [f32; 4],
    pub zenith_color: [f32; 4],
    pub ground_color: [f32; 4],
}

/// Inverse view-projection of the cube face being baked
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct FaceUniform {
    inv_view_proj: [[f32; 4]; 4],
}

/// Where the skybox pass samples from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SkySource {
    #[default]
    Procedural,
    Baked(Handle<TextureCube>),
}

/// Sky cube geometry, the procedural cubemap and its bake inputs.
#[derive(Debug)]
pub struct Skybox {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
    pub procedural: TextureCube,
    /// Samples `procedural`
    pub procedural_bind_group: wgpu::BindGroup,
    sky_buffer: wgpu::Buffer,
    face_bind_groups: Vec<wgpu::BindGroup>,
    params: SkyParams,
    source: SkySource,
    dirty: bool,
}

impl Skybox {
    pub fn new(device: &wgpu::Device, layouts: &BindGroupLayouts, size: u32) -> Self {
        let cube = MeshData::cube();
        let positions: Vec<[f32; 3]> = cube
            .vertices
            .iter()
            .map(|v| (Vec3::from(v.position) * 2.0).into())
            .collect();
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("skybox_vertices"),
            contents: bytemuck::cast_slice(&positions),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("skybox_indices"),
            contents: bytemuck::cast_slice(&cube.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let procedural = TextureCube::render_target(
            device,
            size,
            SKY_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            "procedural_sky",
        );
        let procedural_bind_group = Self::cube_bind_group(device, layouts, &procedural);

        let params = SkyParams::default();
        let sky_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("sky_uniform"),
            contents: bytemuck::bytes_of(&params.to_uniform()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let face_bind_groups = (0..6)
            .map(|face| {
                let inv = cube_face_view_projection(Vec3::ZERO, face, 0.1, 10.0).inverse();
                let face_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("sky_face_uniform"),
                    contents: bytemuck::bytes_of(&FaceUniform {
                        inv_view_proj: inv.to_cols_array_2d(),
                    }),
                    usage: wgpu::BufferUsages::UNIFORM,
                });
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("sky_face_bind_group"),
                    layout: &layouts.sky_bake,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: sky_buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: face_buffer.as_entire_binding(),
                        },
                    ],
                })
            })
            .collect();

        Self {
            vertex_buffer,
            index_buffer,
            index_count: cube.index_count(),
            procedural,
            procedural_bind_group,
            sky_buffer,
            face_bind_groups,
            params,
            source: SkySource::Procedural,
            dirty: true,
        }
    }

    /// Bind group sampling `cube` with the layout of the skybox pass.
    pub fn cube_bind_group(
        device: &wgpu::Device,
        layouts: &BindGroupLayouts,
        cube: &TextureCube,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sky_bind_group"),
            layout: &layouts.sky,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&cube.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&cube.sampler),
                },
            ],
        })
    }

    pub const fn params(&self) -> &SkyParams {
        &self.params
    }

    pub const fn source(&self) -> SkySource {
        self.source
    }

    pub fn set_source(&mut self, source: SkySource) {
        self.source = source;
    }

    /// Replace the sky description; the procedural cube is re-baked only if
    /// something changed.
    pub fn set_params(&mut self, params: SkyParams) {
        if params != self.params {
            self.params = params;
            self.dirty = true;
        }
    }

    pub fn set_sun_direction(&mut self, direction: Vec3) {
        let params = SkyParams {
            sun_direction: direction,
            ..self.params.clone()
        };
        self.set_params(params);
    }

    pub fn set_air_color(&mut self, color: Vec3) {
        let params = SkyParams {
            air_color: color,
            ..self.params.clone()
        };
        self.set_params(params);
    }

    pub const fn needs_bake(&self) -> bool {
        self.dirty
    }

    /// Render the procedural sky into its six faces if it is stale.
    pub fn bake_if_dirty(
        &mut self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &wgpu::RenderPipeline,
    ) -> bool {
        if !self.dirty {
            return false;
        }
        queue.write_buffer(&self.sky_buffer, 0, bytemuck::bytes_of(&self.params.to_uniform()));
        for (face, bind_group) in self.face_bind_groups.iter().enumerate() {
            let view = self.procedural.face_view(face as u32);
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("sky_bake_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
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
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        self.dirty = false;
        true
    }

    /// Rough average sky radiance, used as the ambient term.
    pub fn ambient_estimate(&self) -> Vec4 {
        let p = &self.params;
        let sun_height = (-p.sun_direction.normalize_or(Vec3::NEG_Y).y).clamp(0.0, 1.0);
        ((p.zenith_color + p.air_color) * 0.5 * (0.2 + 0.8 * sun_height)).extend(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_normalizes_sun() {
        let params = SkyParams {
            sun_direction: Vec3::new(0.0, -3.0, 0.0),
            ..Default::default()
        };
        let uniform = params.to_uniform();
        assert_eq!(uniform.sun_direction, [0.0, -1.0, 0.0, params.sun_intensity]);
    }

    #[test]
    fn test_degenerate_sun_falls_back_to_down() {
        let params = SkyParams {
            sun_direction: Vec3::ZERO,
            ..Default::default()
        };
        assert_eq!(params.to_uniform().sun_direction[1], -1.0);
    }
}
