use std::ops::Mul;

use glam::{DMat3, DMat4, DVec3, DVec4};
use rand::Rng;

use crate::so3::SO3;

/// A rigid transform in 3D: rotation followed by translation.
///
/// Equivalent to the 4x4 homogeneous matrix
///
/// ```text
/// | R t |
/// | 0 1 |
/// ```
///
/// Naming follows `dst_T_src`: the transform maps points expressed in `src` into `dst`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SE3 {
    /// Rotation component.
    pub r: SO3,
    /// Translation component.
    pub t: DVec3,
}

impl SE3 {
    /// The identity transform.
    pub const IDENTITY: Self = Self {
        r: SO3::IDENTITY,
        t: DVec3::ZERO,
    };

    /// Create a transform from a rotation and a translation.
    pub fn new(r: SO3, t: DVec3) -> Self {
        Self { r, t }
    }

    /// Create a pure translation.
    pub fn from_translation(t: DVec3) -> Self {
        Self { r: SO3::IDENTITY, t }
    }

    /// Create from a 4x4 homogeneous matrix.
    ///
    /// PRECONDITION: the upper-left 3x3 block is orthonormal.
    pub fn from_matrix(mat: &DMat4) -> Self {
        let rotation = DMat3::from_mat4(*mat);
        Self {
            r: SO3::from_matrix(&rotation),
            t: mat.w_axis.truncate(),
        }
    }

    /// Sample a random transform with a uniform rotation and a translation in `[-1, 1)^3`.
    pub fn from_random() -> Self {
        let mut rng = rand::rng();
        let t = DVec3::new(
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
        );
        Self {
            r: SO3::from_random(),
            t,
        }
    }

    /// 4x4 homogeneous matrix.
    pub fn matrix(&self) -> DMat4 {
        let mut matrix = DMat4::from_mat3(self.r.matrix());
        matrix.w_axis = DVec4::new(self.t.x, self.t.y, self.t.z, 1.0);
        matrix
    }

    /// Inverse transform.
    pub fn inverse(&self) -> Self {
        let r_inv = self.r.inverse();
        Self {
            r: r_inv,
            t: -(r_inv * self.t),
        }
    }

    /// Whether every component is finite.
    pub fn is_finite(&self) -> bool {
        self.r.q.is_finite() && self.t.is_finite()
    }
}

impl Default for SE3 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for SE3 {
    type Output = SE3;

    fn mul(self, rhs: Self) -> Self::Output {
        Self {
            r: self.r * rhs.r,
            t: self.t + self.r * rhs.t,
        }
    }
}

impl Mul<DVec3> for SE3 {
    type Output = DVec3;

    fn mul(self, rhs: DVec3) -> Self::Output {
        self.r * rhs + self.t
    }
}
