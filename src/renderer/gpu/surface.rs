//! Device, queue and window surface

use std::sync::Arc;

use winit::window::Window;

use crate::config::GraphicsConfigParams;
use crate::renderer::error::RenderError;

/// Everything tied to the adapter and the window surface.
pub struct GpuContext {
    pub surface: wgpu::Surface<'static>,
    pub adapter: wgpu::Adapter,
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub config: wgpu::SurfaceConfiguration,
}

impl GpuContext {
    pub async fn new(
        window: Arc<Window>,
        params: &GraphicsConfigParams,
    ) -> Result<Self, RenderError> {
        let size = window.inner_size();
        let size = (size.width.max(1), size.height.max(1));

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance.create_surface(window)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RenderError::AdapterUnavailable)?;

        log::info!("Using GPU: {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("recluse_device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;

        let caps = surface.get_capabilities(&adapter);
        // Tonemapping applies gamma itself, so prefer a linear swapchain.
        let format = caps
            .formats
            .iter()
            .find(|f| !f.is_srgb())
            .or_else(|| caps.formats.first())
            .copied()
            .ok_or(RenderError::AdapterUnavailable)?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.0,
            height: size.1,
            present_mode: present_mode(params.vsync),
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: params.desired_swap_images.clamp(1, 3),
        };
        surface.configure(&device, &config);

        Ok(Self {
            surface,
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
            config,
        })
    }

    pub const fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    pub const fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    /// Rebuild the swapchain for a new size or presentation setting.
    pub fn reconfigure(&mut self, size: (u32, u32), params: &GraphicsConfigParams) {
        self.config.width = size.0.max(1);
        self.config.height = size.1.max(1);
        self.config.present_mode = present_mode(params.vsync);
        self.config.desired_maximum_frame_latency = params.desired_swap_images.clamp(1, 3);
        self.surface.configure(&self.device, &self.config);
        log::debug!("Surface configured at {}x{}", self.config.width, self.config.height);
    }

    /// Re-apply the current configuration after the surface was lost.
    pub fn recover_surface(&self) {
        self.surface.configure(&self.device, &self.config);
    }
}

const fn present_mode(vsync: bool) -> wgpu::PresentMode {
    if vsync {
        wgpu::PresentMode::AutoVsync
    } else {
        wgpu::PresentMode::AutoNoVsync
    }
}
