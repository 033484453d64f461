//! Image-based lighting probes
//!
//! One global environment cube lights everything; local reflection probes
//! override it inside their radius when local reflections are enabled.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use super::pool::Handle;
use super::texture::{Texture2D, TextureCube};

/// Format of the split-sum BRDF lookup table
pub const BRDF_LUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// A baked environment cube valid inside a sphere
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalProbe {
    pub position: Vec3,
    pub radius: f32,
    pub cube: Handle<TextureCube>,
}

/// Probe uniform read by the lighting and forward passes
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ProbeUniform {
    /// has global cube, intensity, has BRDF LUT, unused
    pub global: [f32; 4],
    /// Local probe center, w = radius (0 when none is active)
    pub local: [f32; 4],
}

#[derive(Debug, Clone)]
pub struct ProbeSet {
    pub global: Option<Handle<TextureCube>>,
    pub brdf_lut: Option<Handle<Texture2D>>,
    pub intensity: f32,
    locals: Vec<LocalProbe>,
}

impl Default for ProbeSet {
    fn default() -> Self {
        Self {
            global: None,
            brdf_lut: None,
            intensity: 1.0,
            locals: Vec::new(),
        }
    }
}

impl ProbeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_local(&mut self, probe: LocalProbe) {
        self.locals.push(probe);
    }

    /// Forget every probe referencing `cube`, e.g. after it was freed.
    pub fn remove_cube(&mut self, cube: Handle<TextureCube>) {
        self.locals.retain(|probe| probe.cube != cube);
        if self.global == Some(cube) {
            self.global = None;
        }
    }

    pub fn locals(&self) -> &[LocalProbe] {
        &self.locals
    }

    /// Closest probe whose sphere contains `position`.
    pub fn select_local_probe(&self, position: Vec3) -> Option<&LocalProbe> {
        self.locals
            .iter()
            .map(|probe| (probe, probe.position.distance_squared(position)))
            .filter(|(probe, d2)| *d2 <= probe.radius * probe.radius)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(probe, _)| probe)
    }

    pub fn uniform(&self, local: Option<&LocalProbe>) -> ProbeUniform {
        ProbeUniform {
            global: [
                if self.global.is_some() { 1.0 } else { 0.0 },
                self.intensity,
                if self.brdf_lut.is_some() { 1.0 } else { 0.0 },
                0.0,
            ],
            local: local.map_or([0.0; 4], |probe| probe.position.extend(probe.radius).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(x: f32, radius: f32, index: u32) -> LocalProbe {
        LocalProbe {
            position: Vec3::new(x, 0.0, 0.0),
            radius,
            cube: Handle::from_raw_parts(index, 0),
        }
    }

    #[test]
    fn test_select_nearest_containing_probe() {
        let mut probes = ProbeSet::new();
        probes.add_local(probe(0.0, 10.0, 0));
        probes.add_local(probe(4.0, 2.0, 1));
        probes.add_local(probe(20.0, 1.0, 2));

        let hit = probes.select_local_probe(Vec3::new(3.5, 0.0, 0.0));
        assert_eq!(hit.map(|p| p.cube.index()), Some(1));
        let hit = probes.select_local_probe(Vec3::new(-5.0, 0.0, 0.0));
        assert_eq!(hit.map(|p| p.cube.index()), Some(0));
        assert!(probes.select_local_probe(Vec3::new(15.0, 0.0, 0.0)).is_none());
    }

    #[test]
    fn test_remove_cube_clears_global_and_locals() {
        let mut probes = ProbeSet::new();
        let cube = Handle::from_raw_parts(1, 0);
        probes.global = Some(cube);
        probes.add_local(probe(0.0, 1.0, 1));
        probes.remove_cube(cube);
        assert!(probes.global.is_none());
        assert!(probes.locals().is_empty());
        assert_eq!(probes.uniform(None).global[0], 0.0);
    }
}
