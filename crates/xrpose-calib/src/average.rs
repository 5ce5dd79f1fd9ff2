use glam::{DQuat, DVec3, DVec4};
use xrpose_lie::{SE3, SO3};

use crate::CalibError;

/// Norm under which the summed quaternion is considered degenerate.
const DEGENERATE_NORM: f64 = 1e-12;

/// Average a set of rigid transforms.
///
/// The translation is the arithmetic mean. Rotations are averaged on the quaternion
/// manifold: every quaternion is sign-aligned with the first sample before summing,
/// since `q` and `-q` are the same rotation and would otherwise cancel. The sum is
/// renormalized; a degenerate sum (near-antipodal samples) yields the identity
/// rotation.
///
/// # Arguments
///
/// * `transforms` - The transforms to average.
///
/// # Returns
///
/// The averaged transform, or [`CalibError::EmptyInput`] if `transforms` is empty.
pub fn average_transforms(transforms: &[SE3]) -> Result<SE3, CalibError> {
    let Some(first) = transforms.first() else {
        return Err(CalibError::EmptyInput);
    };

    let reference = DVec4::from(first.r.q);
    let mut acc_q = DVec4::ZERO;
    let mut acc_t = DVec3::ZERO;

    for transform in transforms {
        acc_t += transform.t;
        let q = DVec4::from(transform.r.q);
        acc_q += if q.dot(reference) < 0.0 { -q } else { q };
    }

    let mean_t = acc_t / transforms.len() as f64;
    let norm = acc_q.length();
    let rotation = if norm <= DEGENERATE_NORM {
        log::warn!("degenerate quaternion average, falling back to identity rotation");
        SO3::IDENTITY
    } else {
        SO3::from_quaternion(&DQuat::from_vec4(acc_q / norm))
    };

    Ok(SE3::new(rotation, mean_t))
}
