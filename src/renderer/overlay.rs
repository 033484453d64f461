//! UI overlay rectangles
//!
//! Solid, anchored rectangles drawn after the final composite. Layout is
//! resolved on the CPU into pixel-space instances.

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

/// Anchor point for positioning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Anchor {
    #[default]
    TopLeft,
    TopRight,
    Center,
    BottomLeft,
    BottomRight,
}

impl Anchor {
    /// Offset of the anchor inside its parent, normalized to `[0, 1]`.
    #[must_use]
    pub const fn offset(self) -> (f32, f32) {
        match self {
            Self::TopLeft => (0.0, 0.0),
            Self::TopRight => (1.0, 0.0),
            Self::Center => (0.5, 0.5),
            Self::BottomLeft => (0.0, 1.0),
            Self::BottomRight => (1.0, 1.0),
        }
    }
}

/// Rectangle instance as read by the UI shader, in pixels
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct UiRect {
    pub position: [f32; 2],
    pub size: [f32; 2],
    pub color: [f32; 4],
}

impl UiRect {
    const ATTRIBUTES: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2, 2 => Float32x4];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<UiRect>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Anchored rectangle in layout space
#[derive(Debug, Clone, PartialEq)]
pub struct Rect {
    /// Offset from the anchor, in pixels
    pub position: Vec2,
    pub size: Vec2,
    pub anchor: Anchor,
    pub color: [f32; 4],
}

impl Rect {
    #[must_use]
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            position: Vec2::new(x, y),
            size: Vec2::new(width, height),
            anchor: Anchor::TopLeft,
            color: [0.2, 0.2, 0.2, 0.8],
        }
    }

    #[must_use]
    pub fn with_anchor(mut self, anchor: Anchor) -> Self {
        self.anchor = anchor;
        self
    }

    #[must_use]
    pub fn with_color(mut self, color: [f32; 4]) -> Self {
        self.color = color;
        self
    }

    /// Top-left corner in screen pixels
    #[must_use]
    pub fn absolute_position(&self, screen: Vec2) -> Vec2 {
        let offset = Vec2::from(self.anchor.offset());
        screen * offset + self.position - self.size * offset
    }

    #[must_use]
    pub fn contains(&self, point: Vec2, screen: Vec2) -> bool {
        let min = self.absolute_position(screen);
        let max = min + self.size;
        point.cmpge(min).all() && point.cmple(max).all()
    }

    #[must_use]
    pub fn to_instance(&self, screen: Vec2) -> UiRect {
        UiRect {
            position: self.absolute_position(screen).into(),
            size: self.size.into(),
            color: self.color,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_contains() {
        let rect = Rect::new(10.0, 10.0, 100.0, 50.0);
        let screen = Vec2::new(800.0, 600.0);

        assert!(rect.contains(Vec2::new(50.0, 30.0), screen));
        assert!(!rect.contains(Vec2::new(5.0, 5.0), screen));
    }

    #[test]
    fn test_bottom_right_anchor_hugs_corner() {
        let rect = Rect::new(-10.0, -10.0, 100.0, 50.0).with_anchor(Anchor::BottomRight);
        let instance = rect.to_instance(Vec2::new(800.0, 600.0));
        assert_eq!(instance.position, [690.0, 540.0]);
        assert_eq!(instance.size, [100.0, 50.0]);
    }
}
