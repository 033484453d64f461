//! A deferred 3D renderer with skeletal animation, built in Rust
//!
//! This engine provides:
//! - Deferred PBR rendering on wgpu with cached and dynamic shadow maps
//! - A frame graph that orders passes and synchronizes frames in flight
//! - Skeletal animation with cross-fades and morph weights
//! - Entity Component System (ECS) scenes on hecs
//! - A winit game loop with persisted graphics settings

pub mod animation;
pub mod config;
pub mod core;
pub mod ecs;
pub mod renderer;

// Re-exports for convenience
pub use glam;
pub use hecs;
pub use wgpu;
pub use winit;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::animation::{
        AnimClip, AnimPose, Animation, AnimationError, Joint, JointPose, Skeleton, SkeletonId,
    };
    pub use crate::config::GraphicsConfigParams;
    pub use crate::core::{Engine, EngineConfig, EngineContext, FrameStats, Game, Input, Time};
    pub use crate::ecs::{LightSource, Name, RenderMesh, Renderable, Scene, Transform};
    pub use crate::renderer::{
        Anchor, Camera, DirectionalLight, EmitterConfig, LocalProbe, Material, MeshData,
        PointLight, Rect, RenderError, RenderFlags, Renderer, SpotLight,
    };
    pub use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
    pub use hecs::Entity;
    pub use winit::keyboard::KeyCode;
}
