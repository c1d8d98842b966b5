//! Free-flying camera.
//!
//! Orientation is stored as yaw/pitch in degrees; the basis vectors are
//! re-derived from them after every change. Pitch is clamped to ±89° so the
//! view never flips at the poles, and zoom (the vertical field of view) stays
//! within [1°, 45°].

use glam::{Mat4, Vec3};

pub const PITCH_LIMIT: f32 = 89.0;
pub const MIN_ZOOM: f32 = 1.0;
pub const MAX_ZOOM: f32 = 45.0;

pub const DEFAULT_YAW: f32 = -90.0;
pub const DEFAULT_SPEED: f32 = 2.5;
pub const DEFAULT_SENSITIVITY: f32 = 0.1;

/// Degrees per frame of the model spin.
pub const MODEL_SPIN_DEGREES_PER_FRAME: f32 = 0.4;

/// Keyboard movement directions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CameraMovement {
    Forward,
    Backward,
    Left,
    Right,
}

#[derive(Clone, Debug)]
pub struct FlyCamera {
    pub position: Vec3,
    world_up: Vec3,
    front: Vec3,
    right: Vec3,
    up: Vec3,
    yaw: f32,
    pitch: f32,
    zoom: f32,
    pub speed: f32,
    pub sensitivity: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for FlyCamera {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 0.0, 3.0))
    }
}

impl FlyCamera {
    pub fn new(position: Vec3) -> Self {
        let mut camera = Self {
            position,
            world_up: Vec3::Y,
            front: Vec3::NEG_Z,
            right: Vec3::X,
            up: Vec3::Y,
            yaw: DEFAULT_YAW,
            pitch: 0.0,
            zoom: MAX_ZOOM,
            speed: DEFAULT_SPEED,
            sensitivity: DEFAULT_SENSITIVITY,
            near: 0.1,
            far: 200.0,
        };
        camera.update_vectors();
        camera
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_sensitivity(mut self, sensitivity: f32) -> Self {
        self.sensitivity = sensitivity;
        self
    }

    #[inline]
    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    #[inline]
    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    /// Vertical field of view in degrees.
    #[inline]
    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    #[inline]
    pub fn front(&self) -> Vec3 {
        self.front
    }

    #[inline]
    pub fn right(&self) -> Vec3 {
        self.right
    }

    #[inline]
    pub fn up(&self) -> Vec3 {
        self.up
    }

    /// Moves along the camera basis by `speed * delta_time`.
    pub fn process_keyboard(&mut self, direction: CameraMovement, delta_time: f32) {
        let velocity = self.speed * delta_time;
        match direction {
            CameraMovement::Forward => self.position += self.front * velocity,
            CameraMovement::Backward => self.position -= self.front * velocity,
            CameraMovement::Left => self.position -= self.right * velocity,
            CameraMovement::Right => self.position += self.right * velocity,
        }
    }

    /// Applies a mouse delta in pixels. Positive `dy` looks up.
    pub fn process_mouse(&mut self, dx: f32, dy: f32) {
        self.rotate(dx * self.sensitivity, dy * self.sensitivity);
    }

    /// Adds yaw/pitch in degrees, clamping pitch.
    pub fn rotate(&mut self, yaw_degrees: f32, pitch_degrees: f32) {
        self.yaw += yaw_degrees;
        self.pitch = (self.pitch + pitch_degrees).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.update_vectors();
    }

    /// Scrolling up zooms in.
    pub fn process_scroll(&mut self, dy: f32) {
        self.zoom = (self.zoom - dy).clamp(MIN_ZOOM, MAX_ZOOM);
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.front, self.up)
    }

    /// Perspective projection with the Y axis negated for Vulkan's
    /// downward-pointing viewport Y.
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        let mut proj = Mat4::perspective_rh(self.zoom.to_radians(), aspect, self.near, self.far);
        proj.y_axis.y *= -1.0;
        proj
    }

    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        self.projection_matrix(aspect) * self.view_matrix()
    }

    fn update_vectors(&mut self) {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        self.front = Vec3::new(
            yaw.cos() * pitch.cos(),
            pitch.sin(),
            yaw.sin() * pitch.cos(),
        )
        .normalize();
        self.right = self.front.cross(self.world_up).normalize();
        self.up = self.right.cross(self.front).normalize();
    }
}

/// Model matrix for frame `frame_number`: a steady spin about +Y.
pub fn model_spin(frame_number: u64) -> Mat4 {
    let degrees = (frame_number as f64 * MODEL_SPIN_DEGREES_PER_FRAME as f64) % 360.0;
    Mat4::from_rotation_y((degrees as f32).to_radians())
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    #[test]
    fn test_default_looks_down_negative_z() {
        let camera = FlyCamera::default();
        assert!((camera.front() - Vec3::NEG_Z).length() < EPS);
        assert!((camera.right() - Vec3::X).length() < EPS);
        assert!((camera.up() - Vec3::Y).length() < EPS);
        assert_eq!(camera.zoom(), 45.0);
    }

    #[test]
    fn test_pitch_clamps_at_89() {
        let mut camera = FlyCamera::default();
        for _ in 0..20 {
            camera.rotate(0.0, 10.0);
            assert!(camera.pitch() <= PITCH_LIMIT);
        }
        assert_eq!(camera.pitch(), 89.0);
        assert!((camera.front().y - 89.0_f32.to_radians().sin()).abs() < EPS);
        assert!((camera.front().y - 200.0_f32.to_radians().sin()).abs() > 0.1);
    }

    #[test]
    fn test_pitch_clamps_negative() {
        let mut camera = FlyCamera::default();
        camera.rotate(0.0, -500.0);
        assert_eq!(camera.pitch(), -89.0);
    }

    #[test]
    fn test_mouse_scaled_by_sensitivity() {
        let mut camera = FlyCamera::default().with_sensitivity(0.5);
        camera.process_mouse(10.0, 4.0);
        assert!((camera.yaw() - (DEFAULT_YAW + 5.0)).abs() < EPS);
        assert!((camera.pitch() - 2.0).abs() < EPS);
    }

    #[test]
    fn test_zoom_clamped() {
        let mut camera = FlyCamera::default();
        camera.process_scroll(100.0);
        assert_eq!(camera.zoom(), MIN_ZOOM);
        camera.process_scroll(-100.0);
        assert_eq!(camera.zoom(), MAX_ZOOM);
        camera.process_scroll(5.0);
        assert_eq!(camera.zoom(), 40.0);
    }

    #[test]
    fn test_movement_scaled_by_delta_time() {
        let mut camera = FlyCamera::new(Vec3::ZERO).with_speed(2.0);
        camera.process_keyboard(CameraMovement::Forward, 0.5);
        assert!((camera.position - Vec3::new(0.0, 0.0, -1.0)).length() < EPS);

        camera.process_keyboard(CameraMovement::Right, 0.25);
        assert!((camera.position - Vec3::new(0.5, 0.0, -1.0)).length() < EPS);

        camera.process_keyboard(CameraMovement::Backward, 0.5);
        camera.process_keyboard(CameraMovement::Left, 0.25);
        assert!(camera.position.length() < EPS);
    }

    #[test]
    fn test_projection_y_flipped() {
        let camera = FlyCamera::default();
        let flipped = camera.projection_matrix(16.0 / 9.0);
        let plain = Mat4::perspective_rh(45.0_f32.to_radians(), 16.0 / 9.0, 0.1, 200.0);
        assert!(flipped.y_axis.y < 0.0);
        assert!((flipped.y_axis.y + plain.y_axis.y).abs() < EPS);
        assert_eq!(flipped.x_axis, plain.x_axis);
        assert_eq!(flipped.z_axis, plain.z_axis);
    }

    #[test]
    fn test_model_spin() {
        assert_eq!(model_spin(0), Mat4::IDENTITY);

        let quarter = model_spin(225);
        let rotated = quarter.transform_vector3(Vec3::X);
        assert!((rotated - Vec3::NEG_Z).length() < 1e-4);
    }
}
