//! Rigid-body primitives for the tracked camera.
//!
//! The upstream tracker reports a camera [`Pose`] in a right-handed world
//! frame (metres) whose camera looks down its local **−Z** axis.  Obstacle
//! detection needs the inverse direction: world points expressed in the
//! camera frame, which [`Pose::world_to_camera`] provides.
//!
//! # Example
//!
//! ```rust
//! use depthlink_perception::transform::{Pose, Quaternion, Vec3};
//!
//! // Camera 1 m up, looking straight ahead.
//! let pose = Pose::new(Vec3::new(0.0, 1.0, 0.0), Quaternion::identity());
//!
//! // A point 2 m in front of it.
//! let p = pose.world_to_camera(Vec3::new(0.0, 1.0, -2.0));
//! assert!((p.z + 2.0).abs() < 1e-5);
//! ```

use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Primitive types
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D vector or point (metres).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    /// Create a new vector.
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// The zero vector.
    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    pub fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }

    pub fn scale(self, k: f32) -> Self {
        Self::new(self.x * k, self.y * k, self.z * k)
    }

    /// Euclidean norm.
    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Euclidean distance between two points.
    pub fn distance(self, other: Self) -> f32 {
        self.sub(other).length()
    }
}

/// A unit quaternion representing a 3-D rotation (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Quaternion {
    /// Create a quaternion.  The caller is responsible for providing a unit
    /// quaternion (|q| = 1).
    pub fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }

    /// The identity rotation (no rotation).
    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Rotation of `angle_rad` about the world up (+Y) axis.
    pub fn from_yaw(angle_rad: f32) -> Self {
        let half = angle_rad * 0.5;
        Self::new(half.cos(), 0.0, half.sin(), 0.0)
    }

    /// Hamilton product: compose two rotations.
    pub fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        )
    }

    /// Conjugate (== inverse for a unit quaternion).
    pub fn conjugate(self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    /// Rotate a vector by this quaternion: p' = q * p * q*.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let p = Self::new(0.0, v.x, v.y, v.z);
        let rotated = self.mul(p).mul(self.conjugate());
        Vec3::new(rotated.x, rotated.y, rotated.z)
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pose
// ────────────────────────────────────────────────────────────────────────────

/// Camera pose in the world frame: position plus orientation.
///
/// To convert a point expressed in the camera frame into the world frame,
/// rotate it by `orientation` then add `position`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quaternion,
}

impl Pose {
    pub fn new(position: Vec3, orientation: Quaternion) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// The pose at the world origin with no rotation.
    pub fn identity() -> Self {
        Self::new(Vec3::zero(), Quaternion::identity())
    }

    /// Express a world-frame point in this camera's frame.
    pub fn world_to_camera(&self, point: Vec3) -> Vec3 {
        self.orientation
            .conjugate()
            .rotate(point.sub(self.position))
    }

    /// Express a camera-frame point in the world frame.
    pub fn camera_to_world(&self, point: Vec3) -> Vec3 {
        self.orientation.rotate(point).add(self.position)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_1_SQRT_2, FRAC_PI_2};

    fn approx(a: Vec3, b: Vec3) -> bool {
        a.distance(b) < 1e-5
    }

    #[test]
    fn quaternion_identity_rotate_is_noop() {
        let v = Vec3::new(1.0, 2.0, 3.0);
        assert!(approx(Quaternion::identity().rotate(v), v));
    }

    #[test]
    fn quaternion_conjugate_is_inverse() {
        let q = Quaternion::new(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2);
        let prod = q.mul(q.conjugate());
        assert!((prod.w - 1.0).abs() < 1e-5);
        assert!(prod.x.abs() < 1e-5);
        assert!(prod.y.abs() < 1e-5);
        assert!(prod.z.abs() < 1e-5);
    }

    #[test]
    fn yaw_90deg_turns_forward_to_minus_x() {
        // Forward is −Z; a +90° yaw about +Y turns it toward −X.
        let q = Quaternion::from_yaw(FRAC_PI_2);
        let r = q.rotate(Vec3::new(0.0, 0.0, -1.0));
        assert!(approx(r, Vec3::new(-1.0, 0.0, 0.0)), "got {r:?}");
    }

    #[test]
    fn distance_is_euclidean() {
        let d = Vec3::new(0.0, 0.0, 0.0).distance(Vec3::new(3.0, 4.0, 0.0));
        assert!((d - 5.0).abs() < 1e-6);
    }

    #[test]
    fn world_to_camera_removes_translation() {
        let pose = Pose::new(Vec3::new(1.0, 2.0, 3.0), Quaternion::identity());
        let p = pose.world_to_camera(Vec3::new(1.0, 2.0, 2.0));
        assert!(approx(p, Vec3::new(0.0, 0.0, -1.0)));
    }

    #[test]
    fn world_to_camera_undoes_rotation() {
        // Camera yawed toward −X: a world point at −X is straight ahead.
        let pose = Pose::new(Vec3::zero(), Quaternion::from_yaw(FRAC_PI_2));
        let p = pose.world_to_camera(Vec3::new(-2.0, 0.0, 0.0));
        assert!(approx(p, Vec3::new(0.0, 0.0, -2.0)), "got {p:?}");
    }

    #[test]
    fn camera_to_world_inverts_world_to_camera() {
        let pose = Pose::new(Vec3::new(0.5, -1.0, 4.0), Quaternion::from_yaw(0.7));
        let w = Vec3::new(2.0, 0.3, -1.5);
        assert!(approx(pose.camera_to_world(pose.world_to_camera(w)), w));
    }
}
