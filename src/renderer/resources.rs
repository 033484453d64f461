//! GPU-side descriptors handed out by the renderer
//!
//! Everything here is owned by a [`ResourceRegistry`] and referenced by
//! handle from render commands. Freeing a descriptor drops its buffers; a
//! command still holding the old handle is skipped at record time.

use glam::{Mat4, Vec3};
use wgpu::util::DeviceExt;

use super::error::RenderError;
use super::gpu::layouts::BindGroupLayouts;
use super::material::{Material, MaterialUniform};
use super::mesh::MeshData;
use super::pool::Pool;
use super::texture::{Texture2D, TextureCube};
use crate::animation::MAX_JOINTS;

// ============================================================================
// Geometry
// ============================================================================

/// Uploaded vertex and index buffers of one mesh.
#[derive(Debug)]
pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub skin_buffer: Option<wgpu::Buffer>,
    pub morph_buffers: Option<[wgpu::Buffer; 2]>,
    pub index_count: u32,
    /// Bounds centroid in mesh space
    pub local_center: Vec3,
}

impl GpuMesh {
    pub fn upload(device: &wgpu::Device, data: &MeshData, label: &str) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}_vertices")),
            contents: bytemuck::cast_slice(&data.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}_indices")),
            contents: bytemuck::cast_slice(&data.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        let skin_buffer = data.skin.as_ref().map(|skin| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label}_skin")),
                contents: bytemuck::cast_slice(skin),
                usage: wgpu::BufferUsages::VERTEX,
            })
        });
        let morph_buffers = data.morph_targets.as_ref().map(|targets| {
            [0, 1].map(|i| {
                device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&format!("{label}_morph{i}")),
                    contents: bytemuck::cast_slice(&targets[i]),
                    usage: wgpu::BufferUsages::VERTEX,
                })
            })
        });

        Self {
            vertex_buffer,
            index_buffer,
            skin_buffer,
            morph_buffers,
            index_count: data.index_count(),
            local_center: data.center(),
        }
    }

    pub const fn is_skinned(&self) -> bool {
        self.skin_buffer.is_some()
    }

    pub const fn has_morph_targets(&self) -> bool {
        self.morph_buffers.is_some()
    }
}

// ============================================================================
// Per-object transform
// ============================================================================

/// Model transform and morph weights of one drawn object
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ObjectUniform {
    pub model: [[f32; 4]; 4],
    pub normal_matrix: [[f32; 4]; 4],
    /// Weights of morph targets 0 and 1
    pub morph_weights: [f32; 4],
}

impl ObjectUniform {
    pub fn new(model: Mat4, morph_weights: &[f32]) -> Self {
        let weight = |i: usize| morph_weights.get(i).copied().unwrap_or(0.0);
        Self {
            model: model.to_cols_array_2d(),
            normal_matrix: model.inverse().transpose().to_cols_array_2d(),
            morph_weights: [weight(0), weight(1), 0.0, 0.0],
        }
    }
}

#[derive(Debug)]
pub struct MeshDescriptor {
    buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    transform: Mat4,
}

impl MeshDescriptor {
    pub fn new(device: &wgpu::Device, layouts: &BindGroupLayouts) -> Self {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("object_buffer"),
            contents: bytemuck::bytes_of(&ObjectUniform::new(Mat4::IDENTITY, &[])),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("object_bind_group"),
            layout: &layouts.object,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });
        Self {
            buffer,
            bind_group,
            transform: Mat4::IDENTITY,
        }
    }

    pub fn update(&mut self, queue: &wgpu::Queue, transform: Mat4, morph_weights: &[f32]) {
        self.transform = transform;
        let uniform = ObjectUniform::new(transform, morph_weights);
        queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(&uniform));
    }

    pub const fn transform(&self) -> Mat4 {
        self.transform
    }

    /// World-space position of a mesh-space point, used for sort distances.
    pub fn world_point(&self, local: Vec3) -> Vec3 {
        self.transform.transform_point3(local)
    }
}

// ============================================================================
// Material
// ============================================================================

#[derive(Debug)]
pub struct MaterialDescriptor {
    buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    material: Material,
}

impl MaterialDescriptor {
    /// `albedo` is the material's map, or the renderer's white fallback.
    pub fn new(
        device: &wgpu::Device,
        layouts: &BindGroupLayouts,
        material: Material,
        albedo: &Texture2D,
    ) -> Self {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("material_buffer"),
            contents: bytemuck::bytes_of(&material.to_uniform()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("material_bind_group"),
            layout: &layouts.material,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&albedo.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&albedo.sampler),
                },
            ],
        });
        Self {
            buffer,
            bind_group,
            material,
        }
    }

    /// Rewrite the scalar factors. The albedo map is fixed at creation.
    pub fn update(&mut self, queue: &wgpu::Queue, material: Material) {
        let uniform: MaterialUniform = material.to_uniform();
        queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(&uniform));
        self.material = material;
    }

    pub const fn material(&self) -> &Material {
        &self.material
    }
}

// ============================================================================
// Joints
// ============================================================================

/// Skinning palette as uploaded to the GPU
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct JointUniform {
    pub joints: [[[f32; 4]; 4]; MAX_JOINTS],
}

#[derive(Debug)]
pub struct JointDescriptor {
    buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    joint_count: usize,
}

impl JointDescriptor {
    pub fn new(device: &wgpu::Device, layouts: &BindGroupLayouts) -> Self {
        let identity = JointUniform {
            joints: [Mat4::IDENTITY.to_cols_array_2d(); MAX_JOINTS],
        };
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("joint_buffer"),
            contents: bytemuck::bytes_of(&identity),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("joint_bind_group"),
            layout: &layouts.joints,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });
        Self {
            buffer,
            bind_group,
            joint_count: 0,
        }
    }

    /// Upload `palette`; entries past its end keep their previous value.
    pub fn update(&mut self, queue: &wgpu::Queue, palette: &[Mat4]) -> Result<(), RenderError> {
        if palette.len() > MAX_JOINTS {
            return Err(RenderError::JointCapacityExceeded {
                joints: palette.len(),
                capacity: MAX_JOINTS,
            });
        }
        let data: Vec<[[f32; 4]; 4]> = palette.iter().map(Mat4::to_cols_array_2d).collect();
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&data));
        self.joint_count = palette.len();
        Ok(())
    }

    pub const fn joint_count(&self) -> usize {
        self.joint_count
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Owner of every handle-addressed GPU resource.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    pub meshes: Pool<GpuMesh>,
    pub mesh_descriptors: Pool<MeshDescriptor>,
    pub materials: Pool<MaterialDescriptor>,
    pub joints: Pool<JointDescriptor>,
    pub textures: Pool<Texture2D>,
    pub cubes: Pool<TextureCube>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live resource count across all pools.
    pub fn len(&self) -> usize {
        self.meshes.len()
            + self.mesh_descriptors.len()
            + self.materials.len()
            + self.joints.len()
            + self.textures.len()
            + self.cubes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop everything. Called on teardown after the device is idle.
    pub fn clear(&mut self) {
        self.meshes.clear();
        self.mesh_descriptors.clear();
        self.materials.clear();
        self.joints.clear();
        self.textures.clear();
        self.cubes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_uniform_pads_morph_weights() {
        let uniform = ObjectUniform::new(Mat4::from_translation(Vec3::X), &[0.25]);
        assert_eq!(uniform.morph_weights, [0.25, 0.0, 0.0, 0.0]);
        assert_eq!(uniform.model[3], [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_normal_matrix_undoes_nonuniform_scale() {
        let model = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let uniform = ObjectUniform::new(model, &[]);
        assert_eq!(uniform.normal_matrix[0][0], 0.5);
    }

    #[test]
    fn test_joint_uniform_matches_palette_size() {
        assert_eq!(std::mem::size_of::<JointUniform>(), MAX_JOINTS * 64);
        assert!(ResourceRegistry::new().is_empty());
    }
}
