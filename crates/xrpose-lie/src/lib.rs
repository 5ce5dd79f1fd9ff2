#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # xrpose Lie groups
//!
//! Rotations, rigid transforms and the pose value type shared by every device
//! family. All transforms use the column-vector convention: `a * b` applies `b`
//! first and then `a`.
//!
//! ## Example
//!
//! ```rust
//! use glam::{DQuat, DVec3};
//! use xrpose_lie::pose::{delta_error, pose_to_transform, OrientationPolicy, Pose};
//!
//! let pose = Pose::new(DVec3::new(0.1, 0.2, 0.3), DQuat::from_rotation_z(0.5));
//! let transform = pose_to_transform(&pose, OrientationPolicy::default()).unwrap();
//! let err = delta_error(&transform, &transform);
//! assert!(err.translation_m < 1e-12);
//! ```

mod error;
pub use error::LieError;

/// Pose value type and conversions to and from rigid transforms.
pub mod pose;

/// Special Euclidean group SE(3) for 3D rigid transformations.
pub mod se3;

/// Special Orthogonal group SO(3) for 3D rotations.
pub mod so3;

pub use pose::{
    delta_error, pose_to_transform, transform_to_pose, DeltaError, OrientationPolicy, Pose,
};
pub use se3::SE3;
pub use so3::SO3;
