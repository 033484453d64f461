//! Shadow mapping for the primary directional light
//!
//! Two depth maps are kept: a static map holding every `STATIC` caster,
//! re-rendered only when the sun, the sky or the static caster set changes,
//! and a dynamic map re-rendered every frame around the viewer. When shadows
//! are disabled both maps are still cleared each frame so the lighting passes
//! always sample initialized depth.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use wgpu::util::DeviceExt;

use crate::config::GraphicsConfigParams;

/// Filtering kernel used when sampling a shadow map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShadowTechnique {
    /// Percentage-closer filtering, fixed kernel
    #[default]
    Pcf,
    /// Percentage-closer soft shadows, kernel scaled by blocker distance
    Pcss,
}

impl ShadowTechnique {
    #[must_use]
    pub const fn from_soft(soft: bool) -> Self {
        if soft { Self::Pcss } else { Self::Pcf }
    }

    const fn shader_id(self) -> f32 {
        match self {
            Self::Pcf => 0.0,
            Self::Pcss => 1.0,
        }
    }
}

/// Shadow map configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowConfig {
    /// Static map resolution (width and height); 0 disables shadows
    pub resolution: u32,
    /// Dynamic map resolution
    pub dynamic_resolution: u32,
    /// Near plane for the light camera
    pub near: f32,
    /// Far plane for the light camera
    pub far: f32,
    /// Half-extent of the static map's orthographic frustum
    pub static_frustum_size: f32,
    /// Half-extent of the dynamic map's frustum, centred on the viewer
    pub dynamic_frustum_size: f32,
    /// Depth bias to prevent shadow acne
    pub bias: f32,
    /// Light source size used by PCSS penumbra estimation
    pub light_size: f32,
    pub static_technique: ShadowTechnique,
    pub dynamic_technique: ShadowTechnique,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            resolution: 2048,
            dynamic_resolution: 2048,
            near: 0.1,
            far: 200.0,
            static_frustum_size: 60.0,
            dynamic_frustum_size: 20.0,
            bias: 0.0015,
            light_size: 2.0,
            static_technique: ShadowTechnique::Pcf,
            dynamic_technique: ShadowTechnique::Pcf,
        }
    }
}

impl ShadowConfig {
    /// Derive shadow settings from the graphics configuration.
    #[must_use]
    pub fn from_params(params: &GraphicsConfigParams) -> Self {
        let technique = ShadowTechnique::from_soft(params.soft_shadows);
        Self {
            resolution: params.static_shadow_resolution(),
            dynamic_resolution: params.dynamic_shadow_resolution(),
            static_technique: technique,
            dynamic_technique: technique,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.resolution > 0
    }

    /// Static map resolution clamped to what the device can allocate (at least 1).
    #[must_use]
    pub fn texture_size(&self, max_dimension: u32) -> u32 {
        self.resolution.clamp(1, max_dimension.max(1))
    }

    #[must_use]
    pub fn dynamic_texture_size(&self, max_dimension: u32) -> u32 {
        self.dynamic_resolution.clamp(1, max_dimension.max(1))
    }

    /// Orthographic light camera of half-extent `half_size` looking at `center`.
    #[must_use]
    pub fn light_view_projection(&self, direction: Vec3, center: Vec3, half_size: f32) -> Mat4 {
        let direction = direction.try_normalize().unwrap_or(Vec3::NEG_Y);
        let light_pos = center - direction * (self.far * 0.5);
        let up = if direction.y.abs() > 0.999 { Vec3::Z } else { Vec3::Y };
        let projection = Mat4::orthographic_rh(
            -half_size,
            half_size,
            -half_size,
            half_size,
            self.near,
            self.far,
        );
        projection * Mat4::look_at_rh(light_pos, center, up)
    }
}

// ============================================================================
// State Machine
// ============================================================================

/// Lifecycle of the cached static map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShadowState {
    StaticMapClean,
    /// Needs re-rendering on the next shadow-enabled frame
    #[default]
    StaticMapDirty,
    /// Re-render recorded this frame, not yet finished
    Rendering,
}

/// Shadow work for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShadowWork {
    pub render_static: bool,
    pub render_dynamic: bool,
    /// Only clear the maps into a readable state
    pub transition_only: bool,
}

/// Tracks when the static map must be refreshed.
#[derive(Debug, Clone, Default)]
pub struct ShadowMapSystem {
    state: ShadowState,
    /// Update requested while a refresh was in flight
    pending: bool,
    sun_direction: Option<Vec3>,
    air_color: Option<Vec3>,
    static_refreshes: u64,
}

impl ShadowMapSystem {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn state(&self) -> ShadowState {
        self.state
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.state == ShadowState::StaticMapDirty || self.pending
    }

    /// Number of completed static map refreshes.
    #[must_use]
    pub const fn static_refreshes(&self) -> u64 {
        self.static_refreshes
    }

    /// Mark the static map stale. Repeated calls before the next refresh
    /// collapse into one.
    pub fn signal_static_map_update(&mut self) {
        match self.state {
            ShadowState::StaticMapClean => self.state = ShadowState::StaticMapDirty,
            ShadowState::StaticMapDirty => {}
            ShadowState::Rendering => self.pending = true,
        }
    }

    /// Compare the sky against the last observed values and signal an
    /// update on any change. Returns whether it changed.
    pub fn observe_sky(&mut self, sun_direction: Vec3, air_color: Vec3) -> bool {
        let changed =
            self.sun_direction != Some(sun_direction) || self.air_color != Some(air_color);
        if changed {
            self.sun_direction = Some(sun_direction);
            self.air_color = Some(air_color);
            self.signal_static_map_update();
        }
        changed
    }

    /// Decide this frame's shadow work.
    pub fn begin_frame(&mut self, enabled: bool, static_set_changed: bool) -> ShadowWork {
        if static_set_changed {
            self.signal_static_map_update();
        }
        if !enabled {
            return ShadowWork {
                render_static: false,
                render_dynamic: false,
                transition_only: true,
            };
        }

        let render_static = self.state == ShadowState::StaticMapDirty;
        if render_static {
            self.state = ShadowState::Rendering;
        }
        ShadowWork {
            render_static,
            render_dynamic: true,
            transition_only: false,
        }
    }

    /// Frame abandoned before submission; a started refresh is redone.
    pub fn abort_frame(&mut self) {
        if self.state == ShadowState::Rendering {
            self.state = ShadowState::StaticMapDirty;
        }
        self.pending = false;
    }

    /// Close out the frame's refresh, if one was recorded.
    pub fn finish_frame(&mut self) {
        if self.state == ShadowState::Rendering {
            self.state = ShadowState::StaticMapClean;
            self.static_refreshes += 1;
        }
        if self.pending {
            self.pending = false;
            self.state = ShadowState::StaticMapDirty;
        }
    }
}

// ============================================================================
// GPU Resources
// ============================================================================

/// Light camera of one shadow map
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct LightViewSpace {
    pub view_proj: [[f32; 4]; 4],
    /// bias, light size, near plane, technique
    pub params: [f32; 4],
}

impl LightViewSpace {
    #[must_use]
    pub fn new(view_proj: Mat4, config: &ShadowConfig, technique: ShadowTechnique) -> Self {
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            params: [config.bias, config.light_size, config.near, technique.shader_id()],
        }
    }
}

/// Shadow uniform shared by the caster and lighting passes
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ShadowUniform {
    pub static_space: LightViewSpace,
    pub dynamic_space: LightViewSpace,
    /// enabled, unused, unused, unused
    pub flags: [f32; 4],
}

/// Static and dynamic depth maps plus their sampling state.
pub struct ShadowMaps {
    pub static_view: wgpu::TextureView,
    pub dynamic_view: wgpu::TextureView,
    /// Comparison sampler for PCF taps
    pub sampler: wgpu::Sampler,
    pub uniform_buffer: wgpu::Buffer,
    /// One light camera per map, bound by the caster passes
    pub caster_buffers: [wgpu::Buffer; 2],
    /// Static and dynamic map sides
    pub sizes: [u32; 2],
}

impl ShadowMaps {
    pub fn new(device: &wgpu::Device, config: &ShadowConfig) -> Self {
        let max_dimension = device.limits().max_texture_dimension_2d;
        let sizes = [
            config.texture_size(max_dimension),
            config.dynamic_texture_size(max_dimension),
        ];
        let create_map = |label, size| {
            device
                .create_texture(&wgpu::TextureDescriptor {
                    label: Some(label),
                    size: wgpu::Extent3d {
                        width: size,
                        height: size,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: wgpu::TextureFormat::Depth32Float,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                        | wgpu::TextureUsages::TEXTURE_BINDING,
                    view_formats: &[],
                })
                .create_view(&wgpu::TextureViewDescriptor::default())
        };

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("shadow_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });

        let space = LightViewSpace::new(Mat4::IDENTITY, config, config.static_technique);
        let uniform = ShadowUniform {
            static_space: space,
            dynamic_space: space,
            flags: [0.0; 4],
        };
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("shadow_uniform_buffer"),
            contents: bytemuck::bytes_of(&uniform),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let caster_buffer = |label| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::bytes_of(&space),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            })
        };

        Self {
            static_view: create_map("shadow_static_map", sizes[0]),
            dynamic_view: create_map("shadow_dynamic_map", sizes[1]),
            sampler,
            uniform_buffer,
            caster_buffers: [
                caster_buffer("shadow_static_caster_buffer"),
                caster_buffer("shadow_dynamic_caster_buffer"),
            ],
            sizes,
        }
    }

    /// Recompute both light cameras and upload them.
    ///
    /// The static camera is anchored at the world origin so it stays valid
    /// while the viewer moves; the dynamic one follows the viewer.
    pub fn update(
        &self,
        queue: &wgpu::Queue,
        config: &ShadowConfig,
        sun_direction: Vec3,
        viewer: Vec3,
        enabled: bool,
    ) {
        let static_space = LightViewSpace::new(
            config.light_view_projection(sun_direction, Vec3::ZERO, config.static_frustum_size),
            config,
            config.static_technique,
        );
        let dynamic_space = LightViewSpace::new(
            config.light_view_projection(sun_direction, viewer, config.dynamic_frustum_size),
            config,
            config.dynamic_technique,
        );
        let uniform = ShadowUniform {
            static_space,
            dynamic_space,
            flags: [if enabled { 1.0 } else { 0.0 }, 0.0, 0.0, 0.0],
        };
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniform));
        queue.write_buffer(&self.caster_buffers[0], 0, bytemuck::bytes_of(&static_space));
        queue.write_buffer(&self.caster_buffers[1], 0, bytemuck::bytes_of(&dynamic_space));
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GraphicsQuality;

    #[test]
    fn test_double_signal_refreshes_once() {
        let mut shadows = ShadowMapSystem::new();
        shadows.begin_frame(true, false);
        shadows.finish_frame();
        assert_eq!(shadows.state(), ShadowState::StaticMapClean);
        assert_eq!(shadows.static_refreshes(), 1);

        shadows.signal_static_map_update();
        shadows.signal_static_map_update();
        assert_eq!(shadows.state(), ShadowState::StaticMapDirty);

        let work = shadows.begin_frame(true, false);
        assert!(work.render_static);
        shadows.finish_frame();
        assert_eq!(shadows.static_refreshes(), 2);

        let work = shadows.begin_frame(true, false);
        assert!(!work.render_static);
        assert!(work.render_dynamic);
        shadows.finish_frame();
        assert_eq!(shadows.static_refreshes(), 2);
    }

    #[test]
    fn test_signal_during_refresh_is_not_lost() {
        let mut shadows = ShadowMapSystem::new();
        shadows.begin_frame(true, false);
        shadows.signal_static_map_update();
        assert_eq!(shadows.state(), ShadowState::Rendering);
        shadows.finish_frame();
        assert_eq!(shadows.state(), ShadowState::StaticMapDirty);
    }

    #[test]
    fn test_disabled_shadows_only_transition() {
        let mut shadows = ShadowMapSystem::new();
        let work = shadows.begin_frame(false, true);
        assert_eq!(
            work,
            ShadowWork {
                render_static: false,
                render_dynamic: false,
                transition_only: true
            }
        );
        shadows.finish_frame();
        assert!(shadows.is_dirty());
        assert!(shadows.begin_frame(true, false).render_static);
    }

    #[test]
    fn test_sky_change_detection() {
        let mut shadows = ShadowMapSystem::new();
        let sun = Vec3::new(0.3, -1.0, 0.2);
        let air = Vec3::new(0.4, 0.6, 1.0);
        assert!(shadows.observe_sky(sun, air));
        shadows.begin_frame(true, false);
        shadows.finish_frame();

        assert!(!shadows.observe_sky(sun, air));
        assert!(!shadows.is_dirty());
        assert!(shadows.observe_sky(sun, air * 0.99));
        assert!(shadows.is_dirty());
    }

    #[test]
    fn test_config_from_quality() {
        let params = GraphicsConfigParams::default()
            .with_shadow_quality(GraphicsQuality::None)
            .with_soft_shadows(true);
        let config = ShadowConfig::from_params(&params);
        assert!(!config.enabled());
        assert_eq!(config.texture_size(8192), 1);
        assert_eq!(config.static_technique, ShadowTechnique::Pcss);

        let params = params.with_shadow_quality(GraphicsQuality::Ultra);
        assert_eq!(ShadowConfig::from_params(&params).texture_size(4096), 4096);
    }

    #[test]
    fn test_config_uses_explicit_map_sizes() {
        let params = GraphicsConfigParams {
            cascade_shadow_map_res: 3072,
            shadow_map_array_res: 512,
            ..Default::default()
        };
        let config = ShadowConfig::from_params(&params);
        assert_eq!(config.texture_size(8192), 3072);
        assert_eq!(config.dynamic_texture_size(8192), 512);
        assert_eq!(config.texture_size(2048), 2048);
    }

    #[test]
    fn test_light_camera_maps_center_to_clip_origin() {
        let config = ShadowConfig::default();
        let center = Vec3::new(4.0, 0.0, -2.0);
        let vp = config.light_view_projection(Vec3::new(-0.4, -1.0, -0.3), center, 10.0);
        let clip = vp.project_point3(center);
        assert!(clip.x.abs() < 1e-4 && clip.y.abs() < 1e-4);
        assert!((0.0..=1.0).contains(&clip.z));
    }
}
