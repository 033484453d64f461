//! Post-processing settings
//!
//! Bloom chain, glow composite, FXAA and HDR tonemapping parameters, plus
//! the uniforms the full-screen passes read.

use bytemuck::{Pod, Zeroable};

use crate::config::GraphicsConfigParams;

/// Number of downscaled bloom levels (1/2, 1/4, 1/8, 1/16).
pub const BLOOM_LEVELS: usize = 4;

/// Post-processing configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PostProcessConfig {
    pub bloom_enabled: bool,
    /// Strength of the glow composite in the tonemap pass
    pub bloom_intensity: f32,
    /// Luminance above which the lighting pass writes the bright target
    pub bloom_threshold: f32,
    /// Relative weight of each bloom scale in the glow pass
    pub bloom_weights: [f32; BLOOM_LEVELS],
    pub exposure: f32,
    pub gamma: f32,
    pub chromatic_aberration: bool,
    /// Edge offset in UV units at the screen border
    pub chromatic_strength: f32,
    pub vignette_intensity: f32,
    pub fxaa_enabled: bool,
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self {
            bloom_enabled: true,
            bloom_intensity: 0.6,
            bloom_threshold: 1.0,
            bloom_weights: [0.4, 0.3, 0.2, 0.1],
            exposure: 1.0,
            gamma: 2.2,
            chromatic_aberration: false,
            chromatic_strength: 0.003,
            vignette_intensity: 0.25,
            fxaa_enabled: false,
        }
    }
}

impl PostProcessConfig {
    pub fn from_params(params: &GraphicsConfigParams) -> Self {
        Self {
            bloom_enabled: params.bloom,
            chromatic_aberration: params.chromatic_aberration && params.post_processing,
            fxaa_enabled: params.antialiasing_enabled(),
            vignette_intensity: if params.post_processing { 0.25 } else { 0.0 },
            ..Self::default()
        }
    }

    /// Apply the toggles of `params`, keeping artistic values.
    pub fn apply_params(&mut self, params: &GraphicsConfigParams) {
        let fresh = Self::from_params(params);
        self.bloom_enabled = fresh.bloom_enabled;
        self.chromatic_aberration = fresh.chromatic_aberration;
        self.fxaa_enabled = fresh.fxaa_enabled;
        self.vignette_intensity = fresh.vignette_intensity;
    }

    pub fn hdr_uniform(&self) -> HdrUniform {
        HdrUniform {
            tonemap: [self.exposure, self.gamma, self.vignette_intensity, 0.0],
            bloom: [
                if self.bloom_enabled { self.bloom_intensity } else { 0.0 },
                self.bloom_threshold,
                0.0,
                0.0,
            ],
            chromatic: [
                if self.chromatic_aberration {
                    self.chromatic_strength
                } else {
                    0.0
                },
                0.0,
                0.0,
                0.0,
            ],
        }
    }

    pub fn glow_uniform(&self) -> PostUniform {
        PostUniform {
            params: self.bloom_weights,
        }
    }
}

/// Tonemap pass parameters
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct HdrUniform {
    /// exposure, gamma, vignette, unused
    pub tonemap: [f32; 4],
    /// glow strength (0 when bloom is off), bright threshold, unused, unused
    pub bloom: [f32; 4],
    /// chromatic aberration offset, unused...
    pub chromatic: [f32; 4],
}

/// Generic four-float parameter block of the full-screen passes.
///
/// Blur passes store `[dx, dy, 0, 0]` in texels of the source; the glow
/// pass stores the per-scale weights; FXAA stores `[1/w, 1/h, 0, 0]`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PostUniform {
    pub params: [f32; 4],
}

impl PostUniform {
    pub fn blur(horizontal: bool, (width, height): (u32, u32)) -> Self {
        let texel = [1.0 / width.max(1) as f32, 1.0 / height.max(1) as f32];
        Self {
            params: if horizontal {
                [texel[0], 0.0, 0.0, 0.0]
            } else {
                [0.0, texel[1], 0.0, 0.0]
            },
        }
    }

    pub fn texel((width, height): (u32, u32)) -> Self {
        Self {
            params: [1.0 / width.max(1) as f32, 1.0 / height.max(1) as f32, 0.0, 0.0],
        }
    }
}

/// Size of bloom level `level` (0 = half resolution), never below 1x1.
pub fn bloom_level_size((width, height): (u32, u32), level: usize) -> (u32, u32) {
    let shift = level as u32 + 1;
    ((width >> shift).max(1), (height >> shift).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AntiAliasing;

    #[test]
    fn test_bloom_off_zeroes_glow_strength() {
        let params = GraphicsConfigParams::default().with_bloom(false);
        let config = PostProcessConfig::from_params(&params);
        assert_eq!(config.hdr_uniform().bloom[0], 0.0);
    }

    #[test]
    fn test_bloom_level_sizes_halve() {
        let sizes: Vec<_> = (0..BLOOM_LEVELS)
            .map(|level| bloom_level_size((1920, 1080), level))
            .collect();
        assert_eq!(sizes, vec![(960, 540), (480, 270), (240, 135), (120, 67)]);
        assert_eq!(bloom_level_size((8, 8), 3), (1, 1));
    }

    #[test]
    fn test_apply_params_keeps_exposure() {
        let mut config = PostProcessConfig {
            exposure: 2.5,
            ..Default::default()
        };
        let params = GraphicsConfigParams::default().with_anti_aliasing(AntiAliasing::Fxaa2x);
        config.apply_params(&params);
        assert!(config.fxaa_enabled);
        assert_eq!(config.exposure, 2.5);
    }

    #[test]
    fn test_blur_direction() {
        let uniform = PostUniform::blur(false, (100, 50));
        assert_eq!(uniform.params, [0.0, 0.02, 0.0, 0.0]);
    }
}
