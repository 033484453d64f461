//! wgpu backend
//!
//! Everything in here talks to the device. The modules one level up only
//! describe what a frame contains.

pub mod fence;
pub mod layouts;
pub mod passes;
pub mod pipelines;
pub mod surface;
pub mod targets;

pub use fence::GpuFence;
pub use layouts::BindGroupLayouts;
pub use pipelines::Pipelines;
pub use surface::GpuContext;
pub use targets::{FrameTargets, RenderTarget};
