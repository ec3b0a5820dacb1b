//! Camera snapshots and sources.
//!
//! The driver never tracks camera motion through flags: it compares the
//! [`CameraPose`] it gets each frame against the last one it saw.

use glam::Mat4;

#[cfg(feature = "cli")]
use dolly::prelude::*;
#[cfg(feature = "cli")]
use glam::Vec3;

const OPENGL_TO_WGPU_MATRIX: Mat4 = Mat4::from_cols_array(&[
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
]);

pub fn wgpu_projection(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    // wgpu uses 0..1 depth; no Y flip needed for NDC orientation.
    OPENGL_TO_WGPU_MATRIX * Mat4::perspective_rh(fov_y, aspect, near, far)
}

/// Immutable camera state for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub camera_to_world: Mat4,
    pub inverse_projection: Mat4,
}

impl CameraPose {
    pub fn new(camera_to_world: Mat4, inverse_projection: Mat4) -> Self {
        Self { camera_to_world, inverse_projection }
    }

    /// Pose from a view matrix and a projection matrix.
    pub fn from_view_projection(view: Mat4, projection: Mat4) -> Self {
        Self::new(view.inverse(), projection.inverse())
    }

    /// Largest absolute per-element difference across both matrices.
    pub fn max_delta(&self, other: &CameraPose) -> f32 {
        let a = self.camera_to_world.to_cols_array().into_iter().chain(self.inverse_projection.to_cols_array());
        let b = other.camera_to_world.to_cols_array().into_iter().chain(other.inverse_projection.to_cols_array());
        a.zip(b).map(|(a, b)| (a - b).abs()).fold(0.0, f32::max)
    }

    /// Whether `other` differs by more than `epsilon` in any element.
    /// With `epsilon == 0.0` any change counts.
    pub fn differs(&self, other: &CameraPose, epsilon: f32) -> bool {
        if epsilon == 0.0 {
            return self != other;
        }
        self.max_delta(other) > epsilon
    }
}

/// Anything that can report the camera matrices for the current frame.
pub trait CameraSource {
    fn camera_to_world(&self) -> Mat4;

    fn inverse_projection(&self) -> Mat4;

    fn snapshot(&self) -> CameraPose {
        CameraPose::new(self.camera_to_world(), self.inverse_projection())
    }
}

impl CameraSource for CameraPose {
    fn camera_to_world(&self) -> Mat4 {
        self.camera_to_world
    }

    fn inverse_projection(&self) -> Mat4 {
        self.inverse_projection
    }

    fn snapshot(&self) -> CameraPose {
        *self
    }
}

/// Orbit camera rig around a target point
#[cfg(feature = "cli")]
pub struct OrbitCamera {
    rig: CameraRig,
    /// Vertical FOV in degrees
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    /// Viewport width / height
    pub aspect: f32,
}

#[cfg(feature = "cli")]
impl OrbitCamera {
    pub fn new(target: Vec3, distance: f32) -> Self {
        let rig = CameraRig::builder()
            .with(YawPitch::new().yaw_degrees(45.0).pitch_degrees(-30.0))
            .with(Smooth::new_rotation(0.0))
            .with(Arm::new(mint::Vector3 { x: 0.0, y: 0.0, z: distance }))
            .with(Smooth::new_position(0.0))
            .with(LookAt::new(mint::Point3 { x: target.x, y: target.y, z: target.z }).tracking_smoothness(0.0))
            .build();

        Self {
            rig,
            fov: 60.0,
            near: 0.1,
            far: 1000.0,
            aspect: 16.0 / 9.0,
        }
    }

    /// Orbit around target by degrees
    pub fn orbit(&mut self, delta_yaw: f32, delta_pitch: f32) {
        self.rig.driver_mut::<YawPitch>().rotate_yaw_pitch(delta_yaw, delta_pitch);
    }

    /// Set yaw and pitch angles in degrees
    pub fn set_angles(&mut self, yaw: f32, pitch: f32) {
        let yp = self.rig.driver_mut::<YawPitch>();
        yp.set_rotation_quat(mint::Quaternion::from(glam::Quat::from_euler(
            glam::EulerRot::YXZ,
            yaw.to_radians(),
            pitch.to_radians(),
            0.0,
        )));
    }

    pub fn set_distance(&mut self, dist: f32) {
        self.rig.driver_mut::<Arm>().offset.z = dist.clamp(0.1, 5000.0);
    }

    /// Settle the rig (call after changing angles/distance)
    pub fn update(&mut self, dt: f32) {
        self.rig.update(dt);
    }

    pub fn position(&self) -> Vec3 {
        let p = self.rig.final_transform.position;
        Vec3::new(p.x, p.y, p.z)
    }

    pub fn view_matrix(&self) -> Mat4 {
        let t = &self.rig.final_transform;
        let pos = Vec3::new(t.position.x, t.position.y, t.position.z);
        let fwd: Vec3 = t.forward();
        let up: Vec3 = t.up();
        Mat4::look_at_rh(pos, pos + fwd, up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        wgpu_projection(self.fov.to_radians(), self.aspect, self.near, self.far)
    }
}

#[cfg(feature = "cli")]
impl CameraSource for OrbitCamera {
    fn camera_to_world(&self) -> Mat4 {
        self.view_matrix().inverse()
    }

    fn inverse_projection(&self) -> Mat4 {
        self.projection_matrix().inverse()
    }
}

#[cfg(feature = "cli")]
impl Default for OrbitCamera {
    fn default() -> Self {
        Self::new(Vec3::ZERO, 5.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pose_at(x: f32) -> CameraPose {
        let view = Mat4::look_at_rh(glam::Vec3::new(x, 1.0, 5.0), glam::Vec3::ZERO, glam::Vec3::Y);
        CameraPose::from_view_projection(view, wgpu_projection(1.0, 1.5, 0.1, 100.0))
    }

    #[test]
    fn test_exact_comparison() {
        let a = pose_at(0.0);
        assert!(!a.differs(&a, 0.0));
        assert!(a.differs(&pose_at(1e-3), 0.0));
    }

    #[test]
    fn test_epsilon_comparison() {
        let a = pose_at(0.0);
        let b = pose_at(1e-4);
        assert!(a.max_delta(&b) > 0.0);
        assert!(!a.differs(&b, 1e-2));
        assert!(a.differs(&pose_at(2.0), 1e-2));
    }

    #[test]
    fn test_camera_to_world_is_inverse_view() {
        let view = Mat4::look_at_rh(glam::Vec3::new(0.0, 2.0, 4.0), glam::Vec3::ZERO, glam::Vec3::Y);
        let pose = CameraPose::from_view_projection(view, Mat4::IDENTITY);
        let origin = pose.camera_to_world.transform_point3(glam::Vec3::ZERO);
        assert!((origin - glam::Vec3::new(0.0, 2.0, 4.0)).length() < 1e-5);
    }

    #[cfg(feature = "cli")]
    #[test]
    fn test_orbit_changes_pose() {
        let mut cam = OrbitCamera::default();
        cam.update(1.0);
        let before = cam.snapshot();

        cam.orbit(15.0, 0.0);
        cam.update(1.0);
        assert!(before.differs(&cam.snapshot(), 0.0));
    }
}
