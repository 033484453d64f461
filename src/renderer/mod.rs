//! Rendering module
//!
//! Deferred PBR renderer on wgpu. The backend-agnostic core (commands,
//! queues, the frame graph, frame sync, shadow bookkeeping, lights and
//! resource pools) is testable without a GPU; `gpu` records it.

mod camera;
mod cmd;
mod cmd_list;
mod context;
mod error;
mod frame;
pub mod gpu;
mod graph;
mod ibl;
mod lights;
mod material;
mod mesh;
mod overlay;
mod particles;
mod pool;
mod postprocess;
mod queue;
mod resources;
mod shadow;
mod skybox;
mod texture;

pub use camera::{Camera, GlobalUniform, cube_face_view_projection};
pub use cmd::{
    GeometryVariant, JointHandle, MaterialHandle, MeshDescriptorHandle, MeshHandle,
    PrimitiveRange, PrimitiveRenderCmd, RenderFlags,
};
pub use cmd_list::{CmdComparator, CmdList, back_to_front, front_to_back};
pub use context::{ParticleHandle, RenderStats, Renderer};
pub use error::{LightKind, RenderError};
pub use frame::{
    DEFAULT_FENCE_TIMEOUT, Fence, FramePlan, FrameScheduler, FrameSlot, FrameSync, PerFrame,
    SimFence,
};
pub use graph::{
    Attachment, CompiledGraph, GraphError, GraphOptions, PassAction, PassId, RenderGraphBuilder,
    ScheduledPass, frame_graph,
};
pub use ibl::{LocalProbe, ProbeSet};
pub use lights::{
    DirectionalLight, LightSet, MAX_DIRECTIONAL_LIGHTS, MAX_POINT_LIGHTS, MAX_SPOT_LIGHTS,
    PointLight, SpotLight,
};
pub use material::Material;
pub use mesh::{MeshData, MorphDelta, SkinWeights, Vertex};
pub use overlay::{Anchor, Rect};
pub use particles::{EmitterConfig, ParticleEmitter};
pub use pool::{Handle, Pool};
pub use postprocess::PostProcessConfig;
pub use queue::RenderQueues;
pub use resources::{GpuMesh, MeshDescriptor, ResourceRegistry};
pub use shadow::{ShadowConfig, ShadowMapSystem, ShadowState, ShadowTechnique, ShadowWork};
pub use skybox::{SkyParams, SkySource};
pub use texture::{Texture2D, TextureCube, TextureError};
