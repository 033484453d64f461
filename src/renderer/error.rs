//! Renderer error types

use std::fmt;
use std::time::Duration;

use super::graph::GraphError;
use super::texture::TextureError;

/// Light categories with fixed GPU-side capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightKind {
    Directional,
    Point,
    Spot,
}

impl fmt::Display for LightKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Directional => "directional",
            Self::Point => "point",
            Self::Spot => "spot",
        })
    }
}

/// Errors surfaced by the renderer.
///
/// Surface loss and resizes are not errors: `render` reconfigures and skips
/// the frame instead.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to create window surface: {0}")]
    SurfaceCreation(#[from] wgpu::CreateSurfaceError),
    #[error("no compatible GPU adapter found")]
    AdapterUnavailable,
    #[error("failed to create GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),
    #[error("frame slot {slot} did not retire within {waited:?}, device lost")]
    DeviceLost { slot: usize, waited: Duration },
    #[error("{kind} light capacity of {capacity} exceeded")]
    LightCapacityExceeded { kind: LightKind, capacity: usize },
    #[error("stale or unknown {0} handle")]
    InvalidHandle(&'static str),
    #[error("palette has {joints} joints, joint buffers hold {capacity}")]
    JointCapacityExceeded { joints: usize, capacity: usize },
    #[error("command recording worker panicked")]
    WorkerPanicked,
    #[error("snapshot failed: {0}")]
    Snapshot(String),
    #[error(transparent)]
    Texture(#[from] TextureError),
    #[error("invalid frame graph: {0}")]
    Graph(#[from] GraphError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_limit() {
        let err = RenderError::LightCapacityExceeded {
            kind: LightKind::Point,
            capacity: 64,
        };
        assert_eq!(err.to_string(), "point light capacity of 64 exceeded");

        let err = RenderError::DeviceLost {
            slot: 1,
            waited: Duration::from_secs(2),
        };
        assert!(err.to_string().contains("slot 1"));
    }
}
