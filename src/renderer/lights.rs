//! Multi-light system
//!
//! One primary directional light (the sun, which owns the shadow maps) plus
//! fixed-capacity arrays of directional, point and spot lights. Lights are
//! pushed every frame; a push past capacity is reported instead of dropped.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use super::error::{LightKind, RenderError};
use crate::config::GraphicsQuality;

/// Maximum number of secondary directional lights
pub const MAX_DIRECTIONAL_LIGHTS: usize = 4;
/// Maximum number of point lights
pub const MAX_POINT_LIGHTS: usize = 64;
/// Maximum number of spot lights
pub const MAX_SPOT_LIGHTS: usize = 32;

/// Point and spot lights shaded at `quality`.
#[must_use]
pub const fn light_budget(quality: GraphicsQuality) -> (usize, usize) {
    match quality {
        GraphicsQuality::None => (0, 0),
        GraphicsQuality::Potato => (8, 4),
        GraphicsQuality::Low => (16, 8),
        GraphicsQuality::Medium => (32, 16),
        GraphicsQuality::High | GraphicsQuality::Ultra => (MAX_POINT_LIGHTS, MAX_SPOT_LIGHTS),
    }
}

/// GPU-compatible directional light
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable, Default)]
pub struct GpuDirectionalLight {
    /// Direction the light travels, w = enabled
    pub direction: [f32; 4],
    /// Color, w = intensity
    pub color: [f32; 4],
}

/// GPU-compatible point light
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable, Default)]
pub struct GpuPointLight {
    /// World position, w = intensity
    pub position: [f32; 4],
    pub color: [f32; 4],
    /// Constant, linear, quadratic, unused
    pub attenuation: [f32; 4],
}

/// GPU-compatible spot light
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable, Default)]
pub struct GpuSpotLight {
    /// World position, w = intensity
    pub position: [f32; 4],
    /// Direction, w = cosine of the outer cone angle
    pub direction: [f32; 4],
    /// Color, w = cosine of the inner cone angle
    pub color: [f32; 4],
    /// Constant, linear, quadratic, unused
    pub attenuation: [f32; 4],
}

/// Light uniform read by the lighting and forward passes
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct LightBuffer {
    pub primary: GpuDirectionalLight,
    pub directional: [GpuDirectionalLight; MAX_DIRECTIONAL_LIGHTS],
    pub point: [GpuPointLight; MAX_POINT_LIGHTS],
    pub spot: [GpuSpotLight; MAX_SPOT_LIGHTS],
    /// Ambient color, w = unused
    pub ambient: [f32; 4],
    /// Directional, point and spot counts, w = unused
    pub counts: [u32; 4],
}

impl Default for LightBuffer {
    fn default() -> Self {
        Self {
            primary: GpuDirectionalLight::default(),
            directional: [GpuDirectionalLight::default(); MAX_DIRECTIONAL_LIGHTS],
            point: [GpuPointLight::default(); MAX_POINT_LIGHTS],
            spot: [GpuSpotLight::default(); MAX_SPOT_LIGHTS],
            ambient: [0.05, 0.05, 0.05, 0.0],
            counts: [0; 4],
        }
    }
}

/// Point light
#[derive(Debug, Clone, PartialEq)]
pub struct PointLight {
    /// World position
    pub position: Vec3,
    /// Light color
    pub color: Vec3,
    /// Intensity
    pub intensity: f32,
    /// Attenuation: constant, linear, quadratic
    pub attenuation: (f32, f32, f32),
}

impl PointLight {
    /// Create a new point light
    #[must_use]
    pub fn new(position: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            position,
            color,
            intensity,
            attenuation: (1.0, 0.09, 0.032),
        }
    }

    /// Set attenuation values
    #[must_use]
    pub fn with_attenuation(mut self, constant: f32, linear: f32, quadratic: f32) -> Self {
        self.attenuation = (constant, linear, quadratic);
        self
    }

    #[must_use]
    pub fn to_gpu(&self) -> GpuPointLight {
        GpuPointLight {
            position: self.position.extend(self.intensity).into(),
            color: self.color.extend(1.0).into(),
            attenuation: [self.attenuation.0, self.attenuation.1, self.attenuation.2, 0.0],
        }
    }
}

/// Directional light (like the sun)
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionalLight {
    /// Light direction (normalized)
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl DirectionalLight {
    /// Create a new directional light
    #[must_use]
    pub fn new(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            direction: direction.normalize_or(Vec3::NEG_Y),
            color,
            intensity,
        }
    }

    #[must_use]
    pub fn to_gpu(&self) -> GpuDirectionalLight {
        GpuDirectionalLight {
            direction: self.direction.extend(1.0).into(),
            color: self.color.extend(self.intensity).into(),
        }
    }
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self::new(Vec3::new(-0.3, -1.0, -0.4), Vec3::ONE, 3.0)
    }
}

/// Spot light
#[derive(Debug, Clone, PartialEq)]
pub struct SpotLight {
    pub position: Vec3,
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    /// Inner cone angle in radians
    pub inner_angle: f32,
    /// Outer cone angle in radians
    pub outer_angle: f32,
    pub attenuation: (f32, f32, f32),
}

impl SpotLight {
    /// Create a new spot light
    #[must_use]
    pub fn new(position: Vec3, direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            position,
            direction: direction.normalize_or(Vec3::NEG_Y),
            color,
            intensity,
            inner_angle: 25.0_f32.to_radians(),
            outer_angle: 35.0_f32.to_radians(),
            attenuation: (1.0, 0.09, 0.032),
        }
    }

    /// Set cone angles
    #[must_use]
    pub fn with_angles(mut self, inner_degrees: f32, outer_degrees: f32) -> Self {
        self.inner_angle = inner_degrees.to_radians();
        self.outer_angle = outer_degrees.max(inner_degrees).to_radians();
        self
    }

    #[must_use]
    pub fn to_gpu(&self) -> GpuSpotLight {
        GpuSpotLight {
            position: self.position.extend(self.intensity).into(),
            direction: self.direction.extend(self.outer_angle.cos()).into(),
            color: self.color.extend(self.inner_angle.cos()).into(),
            attenuation: [self.attenuation.0, self.attenuation.1, self.attenuation.2, 0.0],
        }
    }
}

/// Lights submitted for the current frame.
#[derive(Debug, Clone)]
pub struct LightSet {
    primary: DirectionalLight,
    primary_enabled: bool,
    ambient: Vec3,
    directional: Vec<GpuDirectionalLight>,
    point: Vec<GpuPointLight>,
    spot: Vec<GpuSpotLight>,
    point_capacity: usize,
    spot_capacity: usize,
    overflowed: bool,
}

impl Default for LightSet {
    fn default() -> Self {
        Self::new()
    }
}

impl LightSet {
    #[must_use]
    pub fn new() -> Self {
        Self {
            primary: DirectionalLight::default(),
            primary_enabled: true,
            ambient: Vec3::splat(0.05),
            directional: Vec::with_capacity(MAX_DIRECTIONAL_LIGHTS),
            point: Vec::with_capacity(MAX_POINT_LIGHTS),
            spot: Vec::with_capacity(MAX_SPOT_LIGHTS),
            point_capacity: MAX_POINT_LIGHTS,
            spot_capacity: MAX_SPOT_LIGHTS,
            overflowed: false,
        }
    }

    /// Limit point and spot lights to the budget of `quality`. Lights
    /// already queued past the new budget are dropped.
    pub fn set_quality(&mut self, quality: GraphicsQuality) {
        let (point, spot) = light_budget(quality);
        self.point_capacity = point;
        self.spot_capacity = spot;
        self.point.truncate(point);
        self.spot.truncate(spot);
    }

    #[must_use]
    pub const fn capacities(&self) -> (usize, usize) {
        (self.point_capacity, self.spot_capacity)
    }

    /// Replace the primary (shadow-casting) light. Persists across frames.
    pub fn set_primary(&mut self, light: DirectionalLight) {
        self.primary = light;
        self.primary_enabled = true;
    }

    pub fn set_primary_enabled(&mut self, enabled: bool) {
        self.primary_enabled = enabled;
    }

    #[must_use]
    pub const fn primary(&self) -> &DirectionalLight {
        &self.primary
    }

    pub fn set_ambient(&mut self, color: Vec3) {
        self.ambient = color;
    }

    /// # Errors
    ///
    /// `LightCapacityExceeded` once `MAX_DIRECTIONAL_LIGHTS` are queued.
    pub fn push_directional(&mut self, light: &DirectionalLight) -> Result<(), RenderError> {
        let gpu = light.to_gpu();
        Self::push(
            &mut self.directional,
            gpu,
            LightKind::Directional,
            MAX_DIRECTIONAL_LIGHTS,
            &mut self.overflowed,
        )
    }

    /// # Errors
    ///
    /// `LightCapacityExceeded` once the point budget is used up.
    pub fn push_point(&mut self, light: &PointLight) -> Result<(), RenderError> {
        let gpu = light.to_gpu();
        Self::push(
            &mut self.point,
            gpu,
            LightKind::Point,
            self.point_capacity,
            &mut self.overflowed,
        )
    }

    /// # Errors
    ///
    /// `LightCapacityExceeded` once the spot budget is used up.
    pub fn push_spot(&mut self, light: &SpotLight) -> Result<(), RenderError> {
        let gpu = light.to_gpu();
        Self::push(
            &mut self.spot,
            gpu,
            LightKind::Spot,
            self.spot_capacity,
            &mut self.overflowed,
        )
    }

    fn push<T>(
        list: &mut Vec<T>,
        light: T,
        kind: LightKind,
        capacity: usize,
        overflowed: &mut bool,
    ) -> Result<(), RenderError> {
        if list.len() >= capacity {
            if !*overflowed {
                log::warn!("{kind} light capacity ({capacity}) exceeded this frame");
                *overflowed = true;
            }
            return Err(RenderError::LightCapacityExceeded { kind, capacity });
        }
        list.push(light);
        Ok(())
    }

    /// Forget this frame's secondary lights. The primary light and ambient
    /// color are kept.
    pub fn clear(&mut self) {
        self.directional.clear();
        self.point.clear();
        self.spot.clear();
        self.overflowed = false;
    }

    /// Total queued secondary lights
    #[must_use]
    pub fn light_count(&self) -> usize {
        self.directional.len() + self.point.len() + self.spot.len()
    }

    /// Pack the frame's lights into the uniform layout.
    #[must_use]
    pub fn build_buffer(&self) -> LightBuffer {
        let mut buffer = LightBuffer {
            ambient: self.ambient.extend(0.0).into(),
            ..LightBuffer::default()
        };
        if self.primary_enabled {
            buffer.primary = self.primary.to_gpu();
        }
        buffer.directional[..self.directional.len()].copy_from_slice(&self.directional);
        buffer.point[..self.point.len()].copy_from_slice(&self.point);
        buffer.spot[..self.spot.len()].copy_from_slice(&self.spot);
        buffer.counts = [
            self.directional.len() as u32,
            self.point.len() as u32,
            self.spot.len() as u32,
            0,
        ];
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_capacity_reported() {
        let mut lights = LightSet::new();
        let light = PointLight::new(Vec3::ZERO, Vec3::ONE, 1.0);
        for _ in 0..MAX_POINT_LIGHTS {
            lights.push_point(&light).unwrap();
        }
        let err = lights.push_point(&light).unwrap_err();
        assert!(matches!(
            err,
            RenderError::LightCapacityExceeded {
                kind: LightKind::Point,
                capacity: MAX_POINT_LIGHTS
            }
        ));
        assert_eq!(lights.build_buffer().counts[1], MAX_POINT_LIGHTS as u32);

        lights.clear();
        assert!(lights.push_point(&light).is_ok());
    }

    #[test]
    fn test_light_quality_limits_budget() {
        let mut lights = LightSet::new();
        let point = PointLight::new(Vec3::ZERO, Vec3::ONE, 1.0);
        for _ in 0..10 {
            lights.push_point(&point).unwrap();
        }
        lights.set_quality(GraphicsQuality::Potato);
        assert_eq!(lights.capacities(), (8, 4));
        assert_eq!(lights.build_buffer().counts[1], 8);
        assert!(matches!(
            lights.push_point(&point),
            Err(RenderError::LightCapacityExceeded {
                kind: LightKind::Point,
                capacity: 8
            })
        ));

        lights.set_quality(GraphicsQuality::None);
        let spot = SpotLight::new(Vec3::Y, Vec3::NEG_Y, Vec3::ONE, 1.0);
        assert!(lights.push_spot(&spot).is_err());
        assert_eq!(lights.light_count(), 0);

        lights.set_quality(GraphicsQuality::Ultra);
        assert_eq!(lights.capacities(), (MAX_POINT_LIGHTS, MAX_SPOT_LIGHTS));
    }

    #[test]
    fn test_build_buffer_packs_counts() {
        let mut lights = LightSet::new();
        lights
            .push_directional(&DirectionalLight::new(Vec3::NEG_Y, Vec3::ONE, 1.0))
            .unwrap();
        lights
            .push_spot(
                &SpotLight::new(Vec3::Y, Vec3::NEG_Y, Vec3::ONE, 2.0).with_angles(10.0, 20.0),
            )
            .unwrap();

        let buffer = lights.build_buffer();
        assert_eq!(buffer.counts, [1, 0, 1, 0]);
        assert!((buffer.spot[0].position[3] - 2.0).abs() < 1e-6);
        assert!(buffer.spot[0].color[3] > buffer.spot[0].direction[3]);
        assert_eq!(buffer.primary.direction[3], 1.0);
    }

    #[test]
    fn test_disabled_primary_is_zeroed() {
        let mut lights = LightSet::new();
        lights.set_primary_enabled(false);
        assert_eq!(lights.build_buffer().primary.direction, [0.0; 4]);
    }
}
