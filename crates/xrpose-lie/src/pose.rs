use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};

use crate::{se3::SE3, so3::SO3, LieError};

/// Default tolerance on `| |q| - 1 |` before a quaternion is rejected.
pub const DEFAULT_ORIENTATION_TOLERANCE: f64 = 1e-3;

/// A position and orientation reported by a device, in meters.
///
/// Serialized as `{ "position": [x, y, z], "orientation": [w, x, y, z] }`, the layout
/// the device drivers report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "PoseRepr", into = "PoseRepr")]
pub struct Pose {
    /// Position in the frame's own coordinate system.
    pub position: DVec3,
    /// Orientation as a unit quaternion.
    pub orientation: DQuat,
}

#[derive(Serialize, Deserialize)]
struct PoseRepr {
    position: [f64; 3],
    orientation: [f64; 4],
}

impl From<PoseRepr> for Pose {
    fn from(repr: PoseRepr) -> Self {
        Pose::from_arrays(repr.position, repr.orientation)
    }
}

impl From<Pose> for PoseRepr {
    fn from(pose: Pose) -> Self {
        PoseRepr {
            position: pose.position.to_array(),
            orientation: pose.wxyz(),
        }
    }
}

impl Pose {
    /// The origin pose: zero position and identity orientation.
    pub const IDENTITY: Self = Self {
        position: DVec3::ZERO,
        orientation: DQuat::IDENTITY,
    };

    /// Create a pose from a position and an orientation.
    pub fn new(position: DVec3, orientation: DQuat) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Create a pose from `[x, y, z]` and a `[w, x, y, z]` quaternion.
    pub fn from_arrays(position: [f64; 3], wxyz: [f64; 4]) -> Self {
        Self {
            position: DVec3::from_array(position),
            orientation: DQuat::from_xyzw(wxyz[1], wxyz[2], wxyz[3], wxyz[0]),
        }
    }

    /// Orientation as a `[w, x, y, z]` array.
    pub fn wxyz(&self) -> [f64; 4] {
        let q = self.orientation;
        [q.w, q.x, q.y, q.z]
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// What to do with a quaternion whose norm is not one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrientationPolicy {
    /// Fail with [`LieError::InvalidOrientation`] beyond `tolerance`.
    Reject {
        /// Allowed deviation of the norm from one.
        tolerance: f64,
    },
    /// Renormalize any finite, non-zero quaternion.
    Normalize,
}

impl Default for OrientationPolicy {
    fn default() -> Self {
        OrientationPolicy::Reject {
            tolerance: DEFAULT_ORIENTATION_TOLERANCE,
        }
    }
}

/// Build a rigid transform from a pose.
///
/// # Arguments
///
/// * `pose` - The pose to convert.
/// * `policy` - How to treat quaternions that are not unit norm.
///
/// # Returns
///
/// The rigid transform, or an error if the pose is not finite or its orientation is
/// rejected by the policy.
pub fn pose_to_transform(pose: &Pose, policy: OrientationPolicy) -> Result<SE3, LieError> {
    if !pose.position.is_finite() || !pose.orientation.is_finite() {
        return Err(LieError::NonFinite);
    }

    let norm = pose.orientation.length();
    let q = match policy {
        OrientationPolicy::Reject { tolerance } => {
            if (norm - 1.0).abs() > tolerance {
                return Err(LieError::InvalidOrientation { norm });
            }
            // absorb the tolerated drift so downstream math sees a unit quaternion
            pose.orientation / norm
        }
        OrientationPolicy::Normalize => {
            if norm < f64::EPSILON {
                return Err(LieError::InvalidOrientation { norm });
            }
            pose.orientation / norm
        }
    };

    Ok(SE3::new(SO3::from_quaternion(&q), pose.position))
}

/// Extract a pose from a rigid transform.
///
/// The rotation goes through the matrix form so that transforms assembled from
/// matrices are handled the same way. The sign of the returned quaternion is not
/// constrained: compare orientations with a quaternion dot product.
pub fn transform_to_pose(transform: &SE3) -> Pose {
    let rotation = SO3::from_matrix(&transform.r.matrix());
    Pose {
        position: transform.t,
        orientation: rotation.q,
    }
}

/// Distance between two rigid transforms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeltaError {
    /// Translation error in meters.
    pub translation_m: f64,
    /// Rotation error in degrees, in `[0, 180]`.
    pub rotation_deg: f64,
}

impl DeltaError {
    /// Whether both errors are within the given thresholds (inclusive).
    pub fn within(&self, translation_m: f64, rotation_deg: f64) -> bool {
        self.translation_m <= translation_m && self.rotation_deg <= rotation_deg
    }
}

/// Compute the translation and rotation error between transforms `a` and `b`.
///
/// The relative transform is `b⁻¹ * a`; its translation norm equals `|t_a - t_b|`
/// and its rotation angle is `2 * acos(w)` folded into `[0, 180]` degrees.
/// Non-finite input yields infinite errors so that it never passes a threshold.
pub fn delta_error(a: &SE3, b: &SE3) -> DeltaError {
    let delta = b.inverse() * *a;
    if !delta.is_finite() {
        return DeltaError {
            translation_m: f64::INFINITY,
            rotation_deg: f64::INFINITY,
        };
    }

    let w = delta.r.q.w.clamp(-1.0, 1.0);
    let mut rotation_deg = (2.0 * w.acos()).to_degrees();
    if rotation_deg > 180.0 {
        rotation_deg = 360.0 - rotation_deg;
    }

    DeltaError {
        translation_m: delta.t.length(),
        rotation_deg,
    }
}
