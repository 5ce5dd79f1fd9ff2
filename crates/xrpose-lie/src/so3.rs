use std::ops::Mul;

use glam::{DMat3, DQuat, DVec3};
use rand::Rng;

/// Threshold under which angles are treated as zero by `exp`/`log`.
const SMALL_ANGLE: f64 = 1e-12;

/// A 3D rotation stored as a unit quaternion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SO3 {
    /// Unit quaternion representing the rotation.
    pub q: DQuat,
}

impl SO3 {
    /// The identity rotation.
    pub const IDENTITY: Self = Self { q: DQuat::IDENTITY };

    /// Create a rotation from a quaternion.
    ///
    /// PRECONDITION: the quaternion is unit norm. Use
    /// [`pose_to_transform`](crate::pose::pose_to_transform) to validate raw data.
    pub fn from_quaternion(quat: &DQuat) -> Self {
        Self { q: *quat }
    }

    /// Create a rotation from an orthonormal 3x3 matrix.
    pub fn from_matrix(mat: &DMat3) -> Self {
        Self {
            q: DQuat::from_mat3(mat).normalize(),
        }
    }

    /// Create a rotation of `angle` radians around `axis`.
    pub fn from_axis_angle(axis: DVec3, angle: f64) -> Self {
        Self {
            q: DQuat::from_axis_angle(axis.normalize(), angle),
        }
    }

    /// Sample a rotation uniformly over SO(3).
    pub fn from_random() -> Self {
        let mut rng = rand::rng();

        let r1: f64 = rng.random();
        let r2: f64 = rng.random();
        let r3: f64 = rng.random();

        let tau = std::f64::consts::TAU;
        let w = (1.0 - r1).sqrt() * (tau * r2).sin();
        let x = (1.0 - r1).sqrt() * (tau * r2).cos();
        let y = r1.sqrt() * (tau * r3).sin();
        let z = r1.sqrt() * (tau * r3).cos();

        Self {
            q: DQuat::from_xyzw(x, y, z, w),
        }
    }

    /// Rotation matrix.
    pub fn matrix(&self) -> DMat3 {
        DMat3::from_quat(self.q)
    }

    /// Inverse rotation.
    pub fn inverse(&self) -> Self {
        Self {
            q: self.q.conjugate(),
        }
    }

    /// Rotation angle in radians, in `[0, pi]`.
    pub fn angle(&self) -> f64 {
        2.0 * self.q.w.abs().min(1.0).acos()
    }

    /// Lie algebra -> Lie group
    pub fn exp(v: DVec3) -> Self {
        let theta = v.length();
        if theta < SMALL_ANGLE {
            return Self::IDENTITY;
        }
        let half = theta / 2.0;
        let xyz = v * (half.sin() / theta);
        Self {
            q: DQuat::from_xyzw(xyz.x, xyz.y, xyz.z, half.cos()),
        }
    }

    /// Lie group -> Lie algebra
    pub fn log(&self) -> DVec3 {
        // shortest path: q and -q are the same rotation
        let q = if self.q.w < 0.0 { -self.q } else { self.q };
        let vec = DVec3::new(q.x, q.y, q.z);
        let n = vec.length();
        if n < SMALL_ANGLE {
            return vec * 2.0;
        }
        vec * (2.0 * n.atan2(q.w) / n)
    }
}

impl Default for SO3 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for SO3 {
    type Output = SO3;

    fn mul(self, rhs: Self) -> Self::Output {
        Self {
            q: (self.q * rhs.q).normalize(),
        }
    }
}

impl Mul<DVec3> for SO3 {
    type Output = DVec3;

    fn mul(self, rhs: DVec3) -> Self::Output {
        self.q * rhs
    }
}
