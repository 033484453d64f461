//! Camera and per-frame global uniform

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Perspective camera for 3D rendering
#[derive(Debug, Clone)]
pub struct Camera {
    /// Camera position in world space
    pub position: Vec3,
    /// Direction the camera is looking at
    pub direction: Vec3,
    /// Up vector
    pub up: Vec3,
    /// Field of view in radians
    pub fov: f32,
    /// Near clipping plane
    pub near: f32,
    /// Far clipping plane
    pub far: f32,
    /// Aspect ratio (width / height)
    pub aspect: f32,
    yaw: f32,
    pitch: f32,
}

impl Camera {
    #[must_use]
    pub fn new() -> Self {
        Self {
            position: Vec3::new(0.0, 2.0, 8.0),
            direction: Vec3::NEG_Z,
            up: Vec3::Y,
            fov: std::f32::consts::FRAC_PI_4,
            near: 0.1,
            far: 500.0,
            aspect: 16.0 / 9.0,
            yaw: -90.0_f32.to_radians(),
            pitch: 0.0,
        }
    }

    /// Create a camera at a specific position looking at a target
    #[must_use]
    pub fn look_at(position: Vec3, target: Vec3) -> Self {
        let direction = (target - position).normalize_or(Vec3::NEG_Z);
        Self {
            position,
            direction,
            yaw: direction.z.atan2(direction.x),
            pitch: direction.y.clamp(-1.0, 1.0).asin(),
            ..Self::new()
        }
    }

    #[must_use]
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.direction, self.up)
    }

    #[must_use]
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far)
    }

    #[must_use]
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    pub fn set_aspect(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / height.max(1) as f32;
    }

    /// Turn by yaw/pitch deltas in radians
    pub fn rotate(&mut self, delta_yaw: f32, delta_pitch: f32) {
        self.yaw += delta_yaw;
        let max_pitch = 89.0_f32.to_radians();
        self.pitch = (self.pitch + delta_pitch).clamp(-max_pitch, max_pitch);

        self.direction = Vec3::new(
            self.yaw.cos() * self.pitch.cos(),
            self.pitch.sin(),
            self.yaw.sin() * self.pitch.cos(),
        )
        .normalize();
    }

    #[must_use]
    pub fn right(&self) -> Vec3 {
        self.direction.cross(self.up).normalize_or(Vec3::X)
    }

    /// Move along the view direction, the right vector and world up.
    pub fn translate_local(&mut self, forward: f32, right: f32, up: f32) {
        self.position += self.direction * forward + self.right() * right + Vec3::Y * up;
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

/// View matrix looking down one of the six cube faces from `position`.
///
/// Faces follow the +X, -X, +Y, -Y, +Z, -Z layer order.
#[must_use]
pub fn cube_face_view(position: Vec3, face: usize) -> Mat4 {
    const FACES: [(Vec3, Vec3); 6] = [
        (Vec3::X, Vec3::NEG_Y),
        (Vec3::NEG_X, Vec3::NEG_Y),
        (Vec3::Y, Vec3::Z),
        (Vec3::NEG_Y, Vec3::NEG_Z),
        (Vec3::Z, Vec3::NEG_Y),
        (Vec3::NEG_Z, Vec3::NEG_Y),
    ];
    let (forward, up) = FACES[face % 6];
    Mat4::look_at_rh(position, position + forward, up)
}

/// 90 degree square projection shared by all cube faces.
#[must_use]
pub fn cube_face_projection(near: f32, far: f32) -> Mat4 {
    Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, near, far)
}

#[must_use]
pub fn cube_face_view_projection(position: Vec3, face: usize, near: f32, far: f32) -> Mat4 {
    cube_face_projection(near, far) * cube_face_view(position, face)
}

/// Frame-global uniform shared by every pass
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GlobalUniform {
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub view_proj: [[f32; 4]; 4],
    pub inv_view_proj: [[f32; 4]; 4],
    /// Camera position, w = near plane
    pub camera_pos: [f32; 4],
    /// Render width, height, 1/width, 1/height
    pub screen: [f32; 4],
    /// Seconds since start, frame delta, exposure, bloom threshold
    pub time: [f32; 4],
}

impl GlobalUniform {
    #[must_use]
    pub fn new(
        view: Mat4,
        projection: Mat4,
        position: Vec3,
        near: f32,
        (width, height): (u32, u32),
        time: f32,
        delta: f32,
        exposure: f32,
    ) -> Self {
        let view_proj = projection * view;
        let (w, h) = (width.max(1) as f32, height.max(1) as f32);
        Self {
            view: view.to_cols_array_2d(),
            projection: projection.to_cols_array_2d(),
            view_proj: view_proj.to_cols_array_2d(),
            inv_view_proj: view_proj.inverse().to_cols_array_2d(),
            camera_pos: position.extend(near).into(),
            screen: [w, h, 1.0 / w, 1.0 / h],
            time: [time, delta, exposure, 1.0],
        }
    }

    /// Luminance above which lit pixels also land in the bright target.
    #[must_use]
    pub const fn with_bloom_threshold(mut self, threshold: f32) -> Self {
        self.time[3] = threshold;
        self
    }

    #[must_use]
    pub fn from_camera(
        camera: &Camera,
        size: (u32, u32),
        time: f32,
        delta: f32,
        exposure: f32,
    ) -> Self {
        Self::new(
            camera.view_matrix(),
            camera.projection_matrix(),
            camera.position,
            camera.near,
            size,
            time,
            delta,
            exposure,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_look_at_faces_target() {
        let camera = Camera::look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO);
        assert!(camera.direction.abs_diff_eq(Vec3::NEG_Z, 1e-6));
        let clip = camera.view_projection_matrix().project_point3(Vec3::ZERO);
        assert!(clip.x.abs() < 1e-5 && clip.y.abs() < 1e-5);
    }

    #[test]
    fn test_cube_faces_center_their_axis() {
        let origin = Vec3::new(1.0, 2.0, 3.0);
        let axes = [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z];
        for (face, axis) in axes.into_iter().enumerate() {
            let vp = cube_face_view_projection(origin, face, 0.1, 100.0);
            let clip = vp.project_point3(origin + axis * 5.0);
            assert!(clip.x.abs() < 1e-4 && clip.y.abs() < 1e-4, "face {face}");
        }
    }
}
