// Camera-to-world pose for ray generation
//
// Stored the way trained radiance-field scenes ship it: a 3x4 row-major
// matrix whose left 3x3 block rotates camera-space directions into world
// space and whose last column is the camera origin.

use glam::{Mat3, Vec3};

/// A rigid camera-to-world transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    /// Camera-to-world rotation (columns are the camera axes in world space)
    pub rotation: Mat3,
    /// Camera position in world space
    pub origin: Vec3,
}

impl CameraPose {
    /// Create a pose from its rotation and origin.
    pub fn new(rotation: Mat3, origin: Vec3) -> Self {
        Self { rotation, origin }
    }

    /// Build a pose from 12 floats in 3x4 row-major order.
    pub fn from_row_major(m: &[f32; 12]) -> Self {
        // glam matrices are column-major, so gather the columns
        let rotation = Mat3::from_cols(
            Vec3::new(m[0], m[4], m[8]),
            Vec3::new(m[1], m[5], m[9]),
            Vec3::new(m[2], m[6], m[10]),
        );
        let origin = Vec3::new(m[3], m[7], m[11]);
        Self { rotation, origin }
    }

    /// Flatten back to 3x4 row-major order.
    pub fn to_row_major(&self) -> [f32; 12] {
        let r = self.rotation;
        let o = self.origin;
        [
            r.x_axis.x, r.y_axis.x, r.z_axis.x, o.x,
            r.x_axis.y, r.y_axis.y, r.z_axis.y, o.y,
            r.x_axis.z, r.y_axis.z, r.z_axis.z, o.z,
        ]
    }

    /// Pose of a camera at `eye` looking at `target`.
    ///
    /// Uses the OpenGL camera convention shared by synthetic NeRF datasets:
    /// the camera looks down its local -Z axis with +Y up.
    pub fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Self {
        let back = (eye - target).normalize();
        let right = up.cross(back).normalize();
        let cam_up = back.cross(right);
        Self::new(Mat3::from_cols(right, cam_up, back), eye)
    }

    /// Rotate a camera-space direction into world space (no translation).
    #[inline]
    pub fn transform_direction(&self, direction: Vec3) -> Vec3 {
        self.rotation * direction
    }
}

impl Default for CameraPose {
    fn default() -> Self {
        Self::new(Mat3::IDENTITY, Vec3::ZERO)
    }
}
