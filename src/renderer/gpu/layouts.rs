//! Bind group layouts shared by pipelines and resource descriptors

use wgpu::ShaderStages;

const VS: ShaderStages = ShaderStages::VERTEX;
const FS: ShaderStages = ShaderStages::FRAGMENT;
const CS: ShaderStages = ShaderStages::COMPUTE;

pub(crate) fn uniform_entry(binding: u32, visibility: ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn storage_entry(
    binding: u32,
    visibility: ShaderStages,
    read_only: bool,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn texture_entry(
    binding: u32,
    visibility: ShaderStages,
    sample_type: wgpu::TextureSampleType,
    view_dimension: wgpu::TextureViewDimension,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Texture {
            sample_type,
            view_dimension,
            multisampled: false,
        },
        count: None,
    }
}

fn color_2d(binding: u32, visibility: ShaderStages) -> wgpu::BindGroupLayoutEntry {
    texture_entry(
        binding,
        visibility,
        wgpu::TextureSampleType::Float { filterable: true },
        wgpu::TextureViewDimension::D2,
    )
}

fn unfiltered_2d(binding: u32, visibility: ShaderStages) -> wgpu::BindGroupLayoutEntry {
    texture_entry(
        binding,
        visibility,
        wgpu::TextureSampleType::Float { filterable: false },
        wgpu::TextureViewDimension::D2,
    )
}

fn cube(binding: u32, visibility: ShaderStages) -> wgpu::BindGroupLayoutEntry {
    texture_entry(
        binding,
        visibility,
        wgpu::TextureSampleType::Float { filterable: true },
        wgpu::TextureViewDimension::Cube,
    )
}

fn depth_2d(binding: u32, visibility: ShaderStages) -> wgpu::BindGroupLayoutEntry {
    texture_entry(
        binding,
        visibility,
        wgpu::TextureSampleType::Depth,
        wgpu::TextureViewDimension::D2,
    )
}

fn sampler_entry(
    binding: u32,
    visibility: ShaderStages,
    ty: wgpu::SamplerBindingType,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Sampler(ty),
        count: None,
    }
}

/// Every bind group layout the renderer creates, built once per device.
#[derive(Debug)]
pub struct BindGroupLayouts {
    /// `GlobalUniform`
    pub global: wgpu::BindGroupLayout,
    /// `ObjectUniform` of a mesh descriptor
    pub object: wgpu::BindGroupLayout,
    /// `MaterialUniform`, albedo map, sampler
    pub material: wgpu::BindGroupLayout,
    /// Skinning palette
    pub joints: wgpu::BindGroupLayout,
    /// Light camera of one shadow map
    pub caster: wgpu::BindGroupLayout,
    /// Global uniform, lights, shadows and image-based lighting
    pub lighting: wgpu::BindGroupLayout,
    /// G-buffer attachments read by the lighting pass
    pub gbuffer: wgpu::BindGroupLayout,
    /// G-buffer inputs plus storage outputs for the compute lighting path
    #[cfg(feature = "compute-lighting")]
    pub gbuffer_compute: wgpu::BindGroupLayout,
    /// Sky cubemap and sampler
    pub sky: wgpu::BindGroupLayout,
    /// Procedural sky parameters and the face being rendered
    pub sky_bake: wgpu::BindGroupLayout,
    /// Single texture, sampler, parameters
    pub post: wgpu::BindGroupLayout,
    /// Four bloom scales, sampler, parameters
    pub glow: wgpu::BindGroupLayout,
    /// Scene color, glow, sampler, tonemap parameters
    pub hdr: wgpu::BindGroupLayout,
    pub particle_sim: wgpu::BindGroupLayout,
    pub particle_draw: wgpu::BindGroupLayout,
    pub ui: wgpu::BindGroupLayout,
}

impl BindGroupLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let create = |label, entries: &[wgpu::BindGroupLayoutEntry]| {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries,
            })
        };
        let filtering = wgpu::SamplerBindingType::Filtering;

        Self {
            global: create("global_layout", &[uniform_entry(0, VS | FS | CS)]),
            object: create("object_layout", &[uniform_entry(0, VS | FS)]),
            material: create(
                "material_layout",
                &[
                    uniform_entry(0, FS),
                    color_2d(1, FS),
                    sampler_entry(2, FS, filtering),
                ],
            ),
            joints: create("joints_layout", &[uniform_entry(0, VS)]),
            caster: create("caster_layout", &[uniform_entry(0, VS)]),
            lighting: create(
                "lighting_layout",
                &[
                    uniform_entry(0, VS | FS | CS),
                    uniform_entry(1, FS | CS),
                    uniform_entry(2, FS | CS),
                    depth_2d(3, FS | CS),
                    depth_2d(4, FS | CS),
                    sampler_entry(5, FS | CS, wgpu::SamplerBindingType::Comparison),
                    cube(6, FS | CS),
                    cube(7, FS | CS),
                    color_2d(8, FS | CS),
                    sampler_entry(9, FS | CS, filtering),
                    uniform_entry(10, FS | CS),
                ],
            ),
            gbuffer: create(
                "gbuffer_layout",
                &[
                    unfiltered_2d(0, FS),
                    unfiltered_2d(1, FS),
                    unfiltered_2d(2, FS),
                    unfiltered_2d(3, FS),
                ],
            ),
            #[cfg(feature = "compute-lighting")]
            gbuffer_compute: create(
                "gbuffer_compute_layout",
                &[
                    unfiltered_2d(0, CS),
                    unfiltered_2d(1, CS),
                    unfiltered_2d(2, CS),
                    unfiltered_2d(3, CS),
                    storage_texture_entry(4),
                    storage_texture_entry(5),
                ],
            ),
            sky: create("sky_layout", &[cube(0, FS), sampler_entry(1, FS, filtering)]),
            sky_bake: create("sky_bake_layout", &[uniform_entry(0, FS), uniform_entry(1, FS)]),
            post: create(
                "post_layout",
                &[
                    color_2d(0, FS),
                    sampler_entry(1, FS, filtering),
                    uniform_entry(2, FS),
                ],
            ),
            glow: create(
                "glow_layout",
                &[
                    color_2d(0, FS),
                    color_2d(1, FS),
                    color_2d(2, FS),
                    color_2d(3, FS),
                    sampler_entry(4, FS, filtering),
                    uniform_entry(5, FS),
                ],
            ),
            hdr: create(
                "hdr_layout",
                &[
                    color_2d(0, FS),
                    color_2d(1, FS),
                    sampler_entry(2, FS, filtering),
                    uniform_entry(3, FS),
                ],
            ),
            particle_sim: create(
                "particle_sim_layout",
                &[storage_entry(0, CS, false), uniform_entry(1, CS)],
            ),
            particle_draw: create("particle_draw_layout", &[storage_entry(0, VS, true)]),
            ui: create("ui_layout", &[uniform_entry(0, VS)]),
        }
    }
}

#[cfg(feature = "compute-lighting")]
fn storage_texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: CS,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format: wgpu::TextureFormat::Rgba16Float,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        count: None,
    }
}
