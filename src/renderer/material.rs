//! PBR material definitions

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

use super::pool::Handle;
use super::texture::Texture2D;

/// Material properties as seen by the geometry and forward shaders
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct MaterialUniform {
    /// Linear base color, alpha in w
    pub base_color: [f32; 4],
    /// Emissive color, strength in w
    pub emissive: [f32; 4],
    /// roughness, metallic, uses albedo map, alpha cutoff
    pub params: [f32; 4],
}

impl Default for MaterialUniform {
    fn default() -> Self {
        Material::default().to_uniform()
    }
}

/// Surface description for one material descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub base_color: Vec4,
    pub emissive: Vec3,
    pub emissive_strength: f32,
    /// Perceptual roughness in `[0.04, 1]`
    pub roughness: f32,
    pub metallic: f32,
    /// Fragments with alpha below this are discarded in the G-buffer
    pub alpha_cutoff: f32,
    /// Albedo map multiplied with `base_color`
    pub albedo: Option<Handle<Texture2D>>,
}

impl Material {
    pub fn new(color: Vec3) -> Self {
        Self {
            base_color: color.extend(1.0),
            emissive: Vec3::ZERO,
            emissive_strength: 0.0,
            roughness: 0.6,
            metallic: 0.0,
            alpha_cutoff: 0.0,
            albedo: None,
        }
    }

    pub fn metal(color: Vec3, roughness: f32) -> Self {
        Self {
            metallic: 1.0,
            roughness,
            ..Self::new(color)
        }
    }

    /// Self-lit material; strength above 1 feeds the bloom bright-pass.
    pub fn emissive(color: Vec3, strength: f32) -> Self {
        Self {
            emissive: color,
            emissive_strength: strength,
            ..Self::new(color)
        }
    }

    /// Alpha-blended material for the forward pass.
    pub fn glass(color: Vec3, alpha: f32) -> Self {
        Self {
            base_color: color.extend(alpha.clamp(0.0, 1.0)),
            roughness: 0.1,
            ..Self::new(color)
        }
    }

    #[must_use]
    pub fn with_albedo(mut self, texture: Handle<Texture2D>) -> Self {
        self.albedo = Some(texture);
        self
    }

    #[must_use]
    pub fn with_roughness(mut self, roughness: f32) -> Self {
        self.roughness = roughness;
        self
    }

    /// Whether the material needs blending rather than the G-buffer.
    #[must_use]
    pub fn is_transparent(&self) -> bool {
        self.base_color.w < 1.0
    }

    pub fn gray() -> Self {
        Self::new(Vec3::splat(0.5))
    }

    pub fn to_uniform(&self) -> MaterialUniform {
        MaterialUniform {
            base_color: self.base_color.into(),
            emissive: self.emissive.extend(self.emissive_strength).into(),
            params: [
                self.roughness.clamp(0.04, 1.0),
                self.metallic.clamp(0.0, 1.0),
                if self.albedo.is_some() { 1.0 } else { 0.0 },
                self.alpha_cutoff,
            ],
        }
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::new(Vec3::splat(0.8))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_clamps_roughness() {
        let uniform = Material::metal(Vec3::ONE, 0.0).to_uniform();
        assert_eq!(uniform.params[0], 0.04);
        assert_eq!(uniform.params[1], 1.0);
        assert_eq!(uniform.params[2], 0.0);
    }

    #[test]
    fn test_glass_is_transparent() {
        assert!(Material::glass(Vec3::X, 0.4).is_transparent());
        assert!(!Material::default().is_transparent());
        let uniform = Material::default()
            .with_albedo(Handle::from_raw_parts(0, 0))
            .to_uniform();
        assert_eq!(uniform.params[2], 1.0);
    }
}
