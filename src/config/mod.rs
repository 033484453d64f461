//! Graphics configuration
//!
//! [`GraphicsConfigParams`] is the single value the renderer is configured
//! from, both at `initialize` time and on every `update_renderer_configs`
//! call. Every option a settings menu exposes maps onto one enum variant.

mod file;

pub use file::{ConfigError, load_renderer_configs, parse_renderer_configs, save_renderer_configs};

use serde::{Deserialize, Serialize};

/// Default location of the persisted renderer configuration.
pub const RENDERER_CONFIG_PATH: &str = "Configs/RendererConfigs.recluse";

/// Number of frames the CPU may record ahead of the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FrameBuffering {
    Single,
    #[default]
    Double,
    Triple,
}

impl FrameBuffering {
    /// Number of frame slots (and therefore in-flight fences).
    #[must_use]
    pub const fn frame_count(self) -> usize {
        match self {
            Self::Single => 1,
            Self::Double => 2,
            Self::Triple => 3,
        }
    }
}

/// Screen-space antialiasing technique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AntiAliasing {
    #[default]
    None,
    Fxaa2x,
    Smaa2x,
}

/// Generic quality ladder used for shadows, textures and lights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum GraphicsQuality {
    None,
    Potato,
    Low,
    Medium,
    #[default]
    High,
    Ultra,
}

impl GraphicsQuality {
    /// Side length of the shadow map for this quality, `0` when shadows are off.
    #[must_use]
    pub const fn shadow_map_resolution(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Potato => 512,
            Self::Low => 1024,
            Self::Medium => 2048,
            Self::High => 4096,
            Self::Ultra => 8192,
        }
    }

    /// Largest texture side kept when decoding images, `None` for no limit.
    #[must_use]
    pub const fn max_texture_dimension(self) -> Option<u32> {
        match self {
            Self::None | Self::Potato => Some(256),
            Self::Low => Some(512),
            Self::Medium => Some(1024),
            Self::High => Some(2048),
            Self::Ultra => None,
        }
    }
}

/// Fixed set of supported output resolutions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Resolution {
    #[default]
    R800x600,
    R1200x800,
    R1280x720,
    R1440x900,
    R1920x1080,
    R1920x1200,
    R2048x1440,
    R3840x2160,
    R7680x4320,
}

impl Resolution {
    pub const ALL: [Self; 9] = [
        Self::R800x600,
        Self::R1200x800,
        Self::R1280x720,
        Self::R1440x900,
        Self::R1920x1080,
        Self::R1920x1200,
        Self::R2048x1440,
        Self::R3840x2160,
        Self::R7680x4320,
    ];

    /// Width and height in pixels.
    #[must_use]
    pub const fn dimensions(self) -> (u32, u32) {
        match self {
            Self::R800x600 => (800, 600),
            Self::R1200x800 => (1200, 800),
            Self::R1280x720 => (1280, 720),
            Self::R1440x900 => (1440, 900),
            Self::R1920x1080 => (1920, 1080),
            Self::R1920x1200 => (1920, 1200),
            Self::R2048x1440 => (2048, 1440),
            Self::R3840x2160 => (3840, 2160),
            Self::R7680x4320 => (7680, 4320),
        }
    }

    /// Look up the enum entry matching exact pixel dimensions.
    #[must_use]
    pub fn from_dimensions(width: u32, height: u32) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|r| r.dimensions() == (width, height))
    }
}

/// How the window is presented by the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WindowMode {
    #[default]
    Windowed,
    Borderless,
    Fullscreen,
}

/// Every user-tweakable renderer option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphicsConfigParams {
    /// Frames in flight
    pub buffering: FrameBuffering,
    /// Swapchain images requested from the surface
    pub desired_swap_images: u32,
    pub anti_aliasing: AntiAliasing,
    /// Shadow map resolution tier; `None` disables the primary light's shadow
    pub shadow_quality: GraphicsQuality,
    /// Caps the resolution of textures decoded from image files
    pub texture_quality: GraphicsQuality,
    /// Caps how many point and spot lights are shaded per frame
    pub light_quality: GraphicsQuality,
    /// Side of the sun's static shadow map; `0` follows `shadow_quality`
    pub cascade_shadow_map_res: u32,
    /// Side of the per-frame dynamic shadow map; `0` matches the static map
    pub shadow_map_array_res: u32,
    pub resolution: Resolution,
    pub window_mode: WindowMode,
    /// Scale applied to offscreen targets relative to the window
    pub render_scale: f32,
    pub vsync: bool,
    pub bloom: bool,
    pub chromatic_aberration: bool,
    /// PCSS when enabled, plain PCF otherwise
    pub soft_shadows: bool,
    /// Record scene passes on a worker thread
    pub multithreaded_rendering: bool,
    /// Sample the local reflection probe in the lighting pass
    pub local_reflections: bool,
    pub post_processing: bool,
    /// Cap on frames per second, `None` for unlimited
    pub frame_limit: Option<u32>,
}

impl Default for GraphicsConfigParams {
    fn default() -> Self {
        Self {
            buffering: FrameBuffering::Double,
            desired_swap_images: 3,
            anti_aliasing: AntiAliasing::None,
            shadow_quality: GraphicsQuality::High,
            texture_quality: GraphicsQuality::Ultra,
            light_quality: GraphicsQuality::High,
            cascade_shadow_map_res: 0,
            shadow_map_array_res: 0,
            resolution: Resolution::R800x600,
            window_mode: WindowMode::Windowed,
            render_scale: 1.0,
            vsync: true,
            bloom: true,
            chromatic_aberration: true,
            soft_shadows: true,
            multithreaded_rendering: true,
            local_reflections: true,
            post_processing: true,
            frame_limit: None,
        }
    }
}

impl GraphicsConfigParams {
    /// Whether the primary light casts shadows at all.
    #[must_use]
    pub const fn shadows_enabled(&self) -> bool {
        !matches!(self.shadow_quality, GraphicsQuality::None)
    }

    /// Frames in flight.
    #[must_use]
    pub const fn frame_count(&self) -> usize {
        self.buffering.frame_count()
    }

    /// Side of the static sun shadow map, `0` when shadows are off.
    #[must_use]
    pub const fn static_shadow_resolution(&self) -> u32 {
        if !self.shadows_enabled() {
            0
        } else if self.cascade_shadow_map_res > 0 {
            self.cascade_shadow_map_res
        } else {
            self.shadow_quality.shadow_map_resolution()
        }
    }

    /// Side of the dynamic sun shadow map, `0` when shadows are off.
    #[must_use]
    pub const fn dynamic_shadow_resolution(&self) -> u32 {
        let base = self.static_shadow_resolution();
        if base > 0 && self.shadow_map_array_res > 0 {
            self.shadow_map_array_res
        } else {
            base
        }
    }

    /// Whether a screen-space AA pass runs. SMAA is served by the FXAA pass.
    #[must_use]
    pub const fn antialiasing_enabled(&self) -> bool {
        !matches!(self.anti_aliasing, AntiAliasing::None)
    }

    #[must_use]
    pub fn with_shadow_quality(mut self, quality: GraphicsQuality) -> Self {
        self.shadow_quality = quality;
        self
    }

    #[must_use]
    pub fn with_buffering(mut self, buffering: FrameBuffering) -> Self {
        self.buffering = buffering;
        self
    }

    #[must_use]
    pub fn with_anti_aliasing(mut self, aa: AntiAliasing) -> Self {
        self.anti_aliasing = aa;
        self
    }

    #[must_use]
    pub fn with_bloom(mut self, bloom: bool) -> Self {
        self.bloom = bloom;
        self
    }

    #[must_use]
    pub fn with_soft_shadows(mut self, soft: bool) -> Self {
        self.soft_shadows = soft;
        self
    }

    #[must_use]
    pub fn with_multithreaded_rendering(mut self, enabled: bool) -> Self {
        self.multithreaded_rendering = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_shipping_profile() {
        let params = GraphicsConfigParams::default();
        assert_eq!(params.frame_count(), 2);
        assert!(params.shadows_enabled());
        assert!(!params.antialiasing_enabled());
        assert_eq!(params.resolution.dimensions(), (800, 600));
        assert_eq!(params.window_mode, WindowMode::Windowed);
    }

    #[test]
    fn test_shadow_quality_none_disables_shadows() {
        let params = GraphicsConfigParams::default().with_shadow_quality(GraphicsQuality::None);
        assert!(!params.shadows_enabled());
        assert_eq!(params.shadow_quality.shadow_map_resolution(), 0);
    }

    #[test]
    fn test_explicit_shadow_resolutions_override_quality() {
        let mut params = GraphicsConfigParams::default();
        assert_eq!(params.static_shadow_resolution(), 4096);
        assert_eq!(params.dynamic_shadow_resolution(), 4096);

        params.cascade_shadow_map_res = 3000;
        params.shadow_map_array_res = 1024;
        assert_eq!(params.static_shadow_resolution(), 3000);
        assert_eq!(params.dynamic_shadow_resolution(), 1024);

        // Disabled shadows win over explicit sizes
        params.shadow_quality = GraphicsQuality::None;
        assert_eq!(params.static_shadow_resolution(), 0);
        assert_eq!(params.dynamic_shadow_resolution(), 0);
    }

    #[test]
    fn test_resolution_lookup() {
        assert_eq!(
            Resolution::from_dimensions(1920, 1080),
            Some(Resolution::R1920x1080)
        );
        assert_eq!(Resolution::from_dimensions(1000, 1000), None);
    }
}
