//! Core Engine struct and main game loop

use std::path::PathBuf;
use std::sync::Arc;

use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Fullscreen, Window, WindowId},
};

use crate::config::{
    AntiAliasing, GraphicsConfigParams, GraphicsQuality, RENDERER_CONFIG_PATH, WindowMode,
    load_renderer_configs, save_renderer_configs,
};
use crate::core::debug::FrameStats;
use crate::core::input::Input;
use crate::core::time::Time;
use crate::ecs::Scene;
use crate::renderer::Renderer;

/// Frames between two stats lines in the debug log
const STATS_INTERVAL: u64 = 300;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Window title
    pub title: String,
    /// Renderer settings file, created on the first toggle
    pub config_path: PathBuf,
    /// Graphics hotkeys (F1-F4, F12)
    pub hotkeys: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            title: String::from("Recluse"),
            config_path: PathBuf::from(RENDERER_CONFIG_PATH),
            hotkeys: true,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    #[must_use]
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = path.into();
        self
    }
}

/// Game trait that users implement
pub trait Game: 'static {
    /// Called once the renderer exists. Resource creation goes here.
    ///
    /// # Errors
    ///
    /// Any error aborts startup.
    fn init(&mut self, engine: &mut EngineContext) -> Result<(), Box<dyn std::error::Error>>;

    /// Called every frame before the scene is submitted.
    fn update(&mut self, engine: &mut EngineContext);

    /// Called when the game is shutting down
    fn shutdown(&mut self, _engine: &mut EngineContext) {}
}

/// Context passed to game callbacks
pub struct EngineContext {
    pub time: Time,
    pub input: Input,
    pub scene: Scene,
    pub stats: FrameStats,
    renderer: Renderer,
    config_path: PathBuf,
    should_quit: bool,
}

impl EngineContext {
    pub const fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut Renderer {
        &mut self.renderer
    }

    /// Split borrow for systems that read the scene while writing the
    /// renderer.
    pub fn scene_and_renderer(&mut self) -> (&mut Scene, &mut Renderer) {
        (&mut self.scene, &mut self.renderer)
    }

    /// Apply and persist new graphics settings.
    pub fn apply_graphics(&mut self, params: GraphicsConfigParams) {
        if let Err(err) = save_renderer_configs(&self.config_path, &params) {
            log::warn!("Could not save renderer configs: {err}");
        }
        if let Err(err) = self.renderer.update_renderer_configs(params) {
            log::error!("Failed to apply renderer configs: {err}");
            self.should_quit = true;
        }
    }

    /// Request engine shutdown
    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    pub const fn should_quit(&self) -> bool {
        self.should_quit
    }
}

/// Settings after a graphics hotkey, `None` for keys without a binding.
pub fn toggle_for_key(key: KeyCode, params: &GraphicsConfigParams) -> Option<GraphicsConfigParams> {
    let params = params.clone();
    match key {
        KeyCode::F1 => {
            let bloom = !params.bloom;
            Some(params.with_bloom(bloom))
        }
        KeyCode::F2 => {
            let quality = if params.shadows_enabled() {
                GraphicsQuality::None
            } else {
                GraphicsQuality::High
            };
            Some(params.with_shadow_quality(quality))
        }
        KeyCode::F3 => {
            let aa = if params.antialiasing_enabled() {
                AntiAliasing::None
            } else {
                AntiAliasing::Fxaa2x
            };
            Some(params.with_anti_aliasing(aa))
        }
        KeyCode::F4 => {
            let soft = !params.soft_shadows;
            Some(params.with_soft_shadows(soft))
        }
        _ => None,
    }
}

/// Main engine struct
pub struct Engine<G: Game> {
    config: EngineConfig,
    params: GraphicsConfigParams,
    game: G,
    window: Option<Arc<Window>>,
    context: Option<EngineContext>,
}

impl<G: Game> Engine<G> {
    /// Create a new engine with the given game
    pub fn new(config: EngineConfig, game: G) -> Self {
        Self {
            config,
            params: GraphicsConfigParams::default(),
            game,
            window: None,
            context: None,
        }
    }

    /// Run the engine
    pub fn run(mut self) -> Result<(), Box<dyn std::error::Error>> {
        env_logger::init();
        log::info!("Starting engine: {}", self.config.title);

        self.params = load_renderer_configs(&self.config.config_path).unwrap_or_else(|err| {
            log::warn!("Using default renderer configs: {err}");
            GraphicsConfigParams::default()
        });

        let event_loop = EventLoop::new()?;
        event_loop.set_control_flow(ControlFlow::Poll);
        event_loop.run_app(&mut self)?;

        Ok(())
    }

    fn create_context(
        &mut self,
        event_loop: &ActiveEventLoop,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let (width, height) = self.params.resolution.dimensions();
        let mut attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(width, height));
        attrs = match self.params.window_mode {
            WindowMode::Windowed => attrs,
            WindowMode::Borderless => attrs.with_decorations(false),
            WindowMode::Fullscreen => attrs.with_fullscreen(Some(Fullscreen::Borderless(None))),
        };

        let window = Arc::new(event_loop.create_window(attrs)?);
        let renderer =
            pollster::block_on(Renderer::initialize(Arc::clone(&window), self.params.clone()))?;

        let mut context = EngineContext {
            time: Time::new(),
            input: Input::new(),
            scene: Scene::new(),
            stats: FrameStats::new(),
            renderer,
            config_path: self.config.config_path.clone(),
            should_quit: false,
        };
        self.game.init(&mut context)?;

        self.window = Some(window);
        self.context = Some(context);
        log::info!("Engine initialized successfully");
        Ok(())
    }

    fn frame(&mut self, event_loop: &ActiveEventLoop) {
        let Some(context) = self.context.as_mut() else {
            return;
        };

        context.time.update();
        context.stats.record_frame(context.time.delta());

        if self.config.hotkeys {
            handle_hotkeys(context);
        }

        self.game.update(context);
        if context.should_quit() {
            self.shutdown(event_loop);
            return;
        }

        let dt = context.time.delta_seconds();
        let (scene, renderer) = context.scene_and_renderer();
        scene.update(dt);
        scene.submit(renderer);

        if let Err(err) = context.renderer.render() {
            log::error!("Rendering failed, shutting down: {err}");
            self.shutdown(event_loop);
            return;
        }

        if context.time.frame() % STATS_INTERVAL == 0 {
            log::debug!("{}", context.stats.summary(&context.renderer.stats()));
        }
        context.input.end_frame();

        if let Some(remaining) = context
            .time
            .frame_budget_remaining(context.renderer.params().frame_limit)
        {
            std::thread::sleep(remaining);
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(context) = self.context.as_mut() {
            self.game.shutdown(context);
        }
        // Renderer drops before the window it presents to
        self.context = None;
        self.window = None;
        event_loop.exit();
    }
}

fn handle_hotkeys(context: &mut EngineContext) {
    for key in [KeyCode::F1, KeyCode::F2, KeyCode::F3, KeyCode::F4] {
        if !context.input.is_key_pressed(key) {
            continue;
        }
        if let Some(params) = toggle_for_key(key, context.renderer.params()) {
            log::info!("{key:?} toggled graphics settings");
            context.apply_graphics(params);
        }
    }

    if context.input.is_key_pressed(KeyCode::F12) {
        let path = format!("snapshot_{}.png", context.time.frame());
        if let Err(err) = context.renderer.take_snapshot(&path) {
            log::warn!("Snapshot failed: {err}");
        }
    }
}

impl<G: Game> ApplicationHandler for Engine<G> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(err) = self.create_context(event_loop) {
            log::error!("Failed to initialize: {err}");
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down");
                self.shutdown(event_loop);
            }

            WindowEvent::Resized(new_size) => {
                if let Some(context) = self.context.as_mut() {
                    context.renderer.resize(new_size.width, new_size.height);
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if let Some(context) = self.context.as_mut()
                    && let PhysicalKey::Code(key) = event.physical_key
                {
                    if key == KeyCode::Escape {
                        context.quit();
                    }
                    context.input.process_keyboard(key, event.state);
                }
            }

            WindowEvent::MouseInput { state, button, .. } => {
                if let Some(context) = self.context.as_mut() {
                    context.input.process_mouse_button(button, state);
                }
            }

            WindowEvent::CursorMoved { position, .. } => {
                if let Some(context) = self.context.as_mut() {
                    context
                        .input
                        .process_cursor(glam::Vec2::new(position.x as f32, position.y as f32));
                }
            }

            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 40.0,
                };
                if let Some(context) = self.context.as_mut() {
                    context.input.process_scroll(lines);
                }
            }

            WindowEvent::RedrawRequested => {
                self.frame(event_loop);
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hotkeys_flip_one_setting() {
        let params = GraphicsConfigParams::default();

        let bloom = toggle_for_key(KeyCode::F1, &params).unwrap();
        assert_eq!(bloom.bloom, !params.bloom);
        assert_eq!(bloom.soft_shadows, params.soft_shadows);

        let shadows = toggle_for_key(KeyCode::F2, &params).unwrap();
        assert!(!shadows.shadows_enabled());
        assert!(toggle_for_key(KeyCode::F2, &shadows).unwrap().shadows_enabled());

        let fxaa = toggle_for_key(KeyCode::F3, &params).unwrap();
        assert_eq!(fxaa.anti_aliasing, AntiAliasing::Fxaa2x);

        let soft = toggle_for_key(KeyCode::F4, &params).unwrap();
        assert_eq!(soft.soft_shadows, !params.soft_shadows);
    }

    #[test]
    fn test_unbound_key_changes_nothing() {
        assert!(toggle_for_key(KeyCode::KeyW, &GraphicsConfigParams::default()).is_none());
        assert!(toggle_for_key(KeyCode::F12, &GraphicsConfigParams::default()).is_none());
    }
}
