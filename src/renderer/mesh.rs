//! Mesh and vertex definitions
//!
//! Geometry is split across up to four vertex buffers so that the four
//! geometry permutations share one base layout:
//!
//! | slot | contents        | used by            |
//! |------|-----------------|--------------------|
//! | 0    | [`Vertex`]      | every variant      |
//! | 1    | [`SkinWeights`] | skinned variants   |
//! | 2, 3 | [`MorphDelta`]  | morph variants     |

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use super::cmd::GeometryVariant;

/// Vertex with position, normal, and UV coordinates
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

    pub const fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
        }
    }

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Up to four joint influences per vertex
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SkinWeights {
    pub joints: [u32; 4],
    pub weights: [f32; 4],
}

impl SkinWeights {
    const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![3 => Uint32x4, 4 => Float32x4];

    /// Influences normalized to sum to one. All-zero weights bind to joint 0.
    #[must_use]
    pub fn new(joints: [u32; 4], weights: [f32; 4]) -> Self {
        let sum: f32 = weights.iter().sum();
        let weights = if sum > f32::EPSILON {
            weights.map(|w| w / sum)
        } else {
            [1.0, 0.0, 0.0, 0.0]
        };
        Self { joints, weights }
    }

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<SkinWeights>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Per-vertex offset of one morph target
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MorphDelta {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

impl MorphDelta {
    const FIRST: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![5 => Float32x3, 6 => Float32x3];
    const SECOND: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![7 => Float32x3, 8 => Float32x3];

    /// Layout of morph target `target` (0 or 1).
    pub fn layout(target: usize) -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<MorphDelta>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: if target == 0 {
                &Self::FIRST
            } else {
                &Self::SECOND
            },
        }
    }
}

/// Vertex buffer layouts of a geometry permutation, in slot order.
pub fn variant_layouts(variant: GeometryVariant) -> Vec<wgpu::VertexBufferLayout<'static>> {
    let mut layouts = vec![Vertex::layout()];
    if variant.skinned() {
        layouts.push(SkinWeights::layout());
    }
    if variant.morph() {
        layouts.push(MorphDelta::layout(0));
        layouts.push(MorphDelta::layout(1));
    }
    layouts
}

/// CPU-side geometry, uploaded into a `GpuMesh`
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    /// One entry per vertex when the mesh is skinned
    pub skin: Option<Vec<SkinWeights>>,
    /// Zero or two morph targets, one delta per vertex each
    pub morph_targets: Option<[Vec<MorphDelta>; 2]>,
}

impl MeshData {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self {
            vertices,
            indices,
            skin: None,
            morph_targets: None,
        }
    }

    /// Attach skin weights. Lengths must match the vertex count.
    #[must_use]
    pub fn with_skin(mut self, skin: Vec<SkinWeights>) -> Self {
        debug_assert_eq!(skin.len(), self.vertices.len());
        self.skin = Some(skin);
        self
    }

    #[must_use]
    pub fn with_morph_targets(mut self, first: Vec<MorphDelta>, second: Vec<MorphDelta>) -> Self {
        debug_assert_eq!(first.len(), self.vertices.len());
        debug_assert_eq!(second.len(), self.vertices.len());
        self.morph_targets = Some([first, second]);
        self
    }

    #[must_use]
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Axis-aligned bounds as `(min, max)`; both zero for an empty mesh.
    #[must_use]
    pub fn bounds(&self) -> (Vec3, Vec3) {
        let mut iter = self.vertices.iter().map(|v| Vec3::from(v.position));
        let Some(first) = iter.next() else {
            return (Vec3::ZERO, Vec3::ZERO);
        };
        iter.fold((first, first), |(min, max), p| (min.min(p), max.max(p)))
    }

    /// Centroid of the bounds, used as the sort anchor.
    #[must_use]
    pub fn center(&self) -> Vec3 {
        let (min, max) = self.bounds();
        (min + max) * 0.5
    }

    /// Unit cube centered at the origin.
    pub fn cube() -> Self {
        const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            // normal, right, up
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, right, up) in FACES {
            let (n, r, u) = (Vec3::from(normal), Vec3::from(right), Vec3::from(up));
            let base = vertices.len() as u32;
            for (x, y) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
                let position = n * 0.5 + r * x + u * y;
                vertices.push(Vertex::new(position.into(), normal, [x + 0.5, 0.5 - y]));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }

        Self::new(vertices, indices)
    }

    /// Plane on the XZ axis
    pub fn plane(size: f32) -> Self {
        let half = size / 2.0;
        let vertices = vec![
            Vertex::new([-half, 0.0, half], [0.0, 1.0, 0.0], [0.0, 0.0]),
            Vertex::new([half, 0.0, half], [0.0, 1.0, 0.0], [size, 0.0]),
            Vertex::new([half, 0.0, -half], [0.0, 1.0, 0.0], [size, size]),
            Vertex::new([-half, 0.0, -half], [0.0, 1.0, 0.0], [0.0, size]),
        ];

        Self::new(vertices, vec![0, 1, 2, 2, 3, 0])
    }

    /// UV sphere
    pub fn sphere(radius: f32, segments: u32, rings: u32) -> Self {
        let (segments, rings) = (segments.max(3), rings.max(2));
        let mut vertices = Vec::with_capacity(((segments + 1) * (rings + 1)) as usize);
        let mut indices = Vec::with_capacity((segments * rings * 6) as usize);

        for ring in 0..=rings {
            let phi = std::f32::consts::PI * ring as f32 / rings as f32;
            for segment in 0..=segments {
                let theta = std::f32::consts::TAU * segment as f32 / segments as f32;
                let normal = Vec3::new(phi.sin() * theta.cos(), phi.cos(), phi.sin() * theta.sin());
                vertices.push(Vertex::new(
                    (normal * radius).into(),
                    normal.into(),
                    [segment as f32 / segments as f32, ring as f32 / rings as f32],
                ));
            }
        }

        grid_indices(&mut indices, segments, rings);
        Self::new(vertices, indices)
    }

    /// Capped-free cylinder along +Y, skinned to a chain of `joints` bones.
    ///
    /// Joint `i` sits at height `i * length / joints`. Each ring is weighted
    /// between the two nearest joints. The two morph targets bulge the
    /// surface outward and pinch it inward.
    pub fn tentacle(radius: f32, length: f32, segments: u32, rings: u32, joints: u32) -> Self {
        let (segments, rings, joints) = (segments.max(3), rings.max(1), joints.max(1));
        let spacing = length / joints as f32;
        let mut vertices = Vec::new();
        let mut skin = Vec::new();
        let mut bulge = Vec::new();
        let mut pinch = Vec::new();
        let mut indices = Vec::new();

        for ring in 0..=rings {
            let v = ring as f32 / rings as f32;
            let y = v * length;
            // Taper towards the tip.
            let r = radius * (1.0 - 0.7 * v);

            let bone = (y / spacing).clamp(0.0, (joints - 1) as f32);
            let lower = bone.floor() as u32;
            let upper = (lower + 1).min(joints - 1);
            let blend = if upper == lower { 0.0 } else { bone - lower as f32 };
            let weights = SkinWeights::new([lower, upper, 0, 0], [1.0 - blend, blend, 0.0, 0.0]);

            for segment in 0..=segments {
                let theta = std::f32::consts::TAU * segment as f32 / segments as f32;
                let normal = Vec3::new(theta.cos(), 0.0, theta.sin());
                vertices.push(Vertex::new(
                    (normal * r + Vec3::Y * y).into(),
                    normal.into(),
                    [segment as f32 / segments as f32, v],
                ));
                skin.push(weights);
                let swell = (v * std::f32::consts::PI).sin() * r * 0.5;
                bulge.push(MorphDelta {
                    position: (normal * swell).into(),
                    normal: [0.0; 3],
                });
                pinch.push(MorphDelta {
                    position: (-normal * swell * 0.5).into(),
                    normal: [0.0; 3],
                });
            }
        }

        grid_indices(&mut indices, segments, rings);
        Self::new(vertices, indices)
            .with_skin(skin)
            .with_morph_targets(bulge, pinch)
    }
}

fn grid_indices(indices: &mut Vec<u32>, segments: u32, rings: u32) {
    for ring in 0..rings {
        for segment in 0..segments {
            let current = ring * (segments + 1) + segment;
            let next = current + segments + 1;
            indices.extend_from_slice(&[current, next, current + 1, current + 1, next, next + 1]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_faces_point_outward() {
        let cube = MeshData::cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.index_count(), 36);
        for vertex in &cube.vertices {
            let p = Vec3::from(vertex.position);
            let n = Vec3::from(vertex.normal);
            assert!((p.dot(n) - 0.5).abs() < 1e-6);
        }
        let (min, max) = cube.bounds();
        assert!(min.abs_diff_eq(Vec3::splat(-0.5), 1e-6));
        assert!(max.abs_diff_eq(Vec3::splat(0.5), 1e-6));
    }

    #[test]
    fn test_tentacle_weights_are_normalized() {
        let mesh = MeshData::tentacle(0.3, 4.0, 8, 16, 4);
        let skin = mesh.skin.as_ref().map_or(0, Vec::len);
        assert_eq!(skin, mesh.vertices.len());
        for weights in mesh.skin.iter().flatten() {
            let sum: f32 = weights.weights.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
            assert!(weights.joints.iter().all(|&j| j < 4));
        }
        assert!(mesh.morph_targets.is_some());
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));
    }

    #[test]
    fn test_variant_layouts_slot_count() {
        assert_eq!(variant_layouts(GeometryVariant::Static).len(), 1);
        assert_eq!(variant_layouts(GeometryVariant::Skinned).len(), 2);
        assert_eq!(variant_layouts(GeometryVariant::StaticMorph).len(), 3);
        assert_eq!(variant_layouts(GeometryVariant::SkinnedMorph).len(), 4);
    }

    #[test]
    fn test_empty_mesh_bounds() {
        assert_eq!(MeshData::default().bounds(), (Vec3::ZERO, Vec3::ZERO));
    }
}
