//! Entity Component System module
//!
//! Built on top of the hecs ECS library. Entities carry transforms,
//! renderables and lights; [`Scene`] turns them into renderer commands
//! each frame.

mod components;
mod scene;
mod systems;

pub use components::{LightSource, Name, RenderMesh, Renderable, Transform};
pub use scene::Scene;
pub use systems::{SceneSink, SubmitStats, submit_lights, submit_renderables};
