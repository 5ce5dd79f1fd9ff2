use xrpose_lie::{delta_error, SE3};

use crate::config::ClusterThresholds;

/// Select the largest group of mutually close transforms.
///
/// Every transform is tried as a cluster center; the cluster holds all transforms
/// within both thresholds of the center (inclusive). The largest cluster wins and
/// ties go to the first center seen. Quadratic in the input size, which is fine
/// for the tens of samples a calibration window holds.
///
/// # Arguments
///
/// * `transforms` - Candidate transforms, possibly with outliers.
/// * `thresholds` - Maximum translation and rotation distance to the center.
///
/// # Returns
///
/// The members of the largest cluster in input order. Empty only if `transforms` is
/// empty.
pub fn select_mode_cluster(transforms: &[SE3], thresholds: &ClusterThresholds) -> Vec<SE3> {
    let mut best_center = None;
    let mut best_size = 0;

    for (i, center) in transforms.iter().enumerate() {
        let size = transforms
            .iter()
            .filter(|t| {
                delta_error(t, center).within(thresholds.translation_m, thresholds.rotation_deg)
            })
            .count();
        if size > best_size {
            best_size = size;
            best_center = Some(i);
        }
    }

    let Some(center) = best_center.map(|i| transforms[i]) else {
        return Vec::new();
    };

    log::debug!(
        "mode cluster: {} of {} transforms",
        best_size,
        transforms.len()
    );

    transforms
        .iter()
        .filter(|t| delta_error(t, &center).within(thresholds.translation_m, thresholds.rotation_deg))
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::average_transforms;
    use glam::DVec3;
    use rand::Rng;
    use xrpose_lie::SO3;

    fn perturb(t: &SE3, trans: f64, rot: f64, rng: &mut impl Rng) -> SE3 {
        let dt = DVec3::new(
            rng.random_range(-trans..trans),
            rng.random_range(-trans..trans),
            rng.random_range(-trans..trans),
        );
        let dr = SO3::exp(DVec3::new(
            rng.random_range(-rot..rot),
            rng.random_range(-rot..rot),
            rng.random_range(-rot..rot),
        ));
        SE3::new(t.r * dr, t.t + dt)
    }

    #[test]
    fn test_empty() {
        assert!(select_mode_cluster(&[], &ClusterThresholds::default()).is_empty());
    }

    #[test]
    fn test_single() {
        let t = SE3::from_random();
        assert_eq!(select_mode_cluster(&[t], &ClusterThresholds::default()), vec![t]);
    }

    #[test]
    fn test_rejects_outliers() -> Result<(), crate::CalibError> {
        let mut rng = rand::rng();
        let truth = SE3::from_random();

        // 10 samples within ~2 mm / ~0.3 deg of the truth
        let mut samples: Vec<SE3> = (0..10)
            .map(|_| perturb(&truth, 0.001, 0.003, &mut rng))
            .collect();
        let inliers = samples.clone();

        // 3 far outliers
        samples.push(SE3::new(truth.r, truth.t + DVec3::new(0.5, 0.0, 0.0)));
        samples.push(SE3::new(
            truth.r * SO3::from_axis_angle(DVec3::Y, 1.0),
            truth.t,
        ));
        samples.push(SE3::new(truth.r, truth.t + DVec3::new(0.0, -0.4, 0.3)));

        let thresholds = ClusterThresholds {
            translation_m: 0.02,
            rotation_deg: 5.0,
        };
        let cluster = select_mode_cluster(&samples, &thresholds);
        assert_eq!(cluster, inliers);

        let robust = delta_error(&average_transforms(&cluster)?, &truth);
        let naive = delta_error(&average_transforms(&samples)?, &truth);
        assert!(robust.translation_m < naive.translation_m);
        assert!(robust.rotation_deg < naive.rotation_deg);
        Ok(())
    }

    #[test]
    fn test_tie_goes_to_first_center() {
        let a = SE3::from_translation(DVec3::ZERO);
        let b = SE3::from_translation(DVec3::new(1.0, 0.0, 0.0));
        let cluster = select_mode_cluster(&[a, b], &ClusterThresholds::default());
        assert_eq!(cluster, vec![a]);
    }

    #[test]
    fn test_thresholds_are_inclusive() {
        let a = SE3::from_translation(DVec3::ZERO);
        let b = SE3::from_translation(DVec3::new(0.5, 0.0, 0.0));
        let thresholds = ClusterThresholds {
            translation_m: 0.5,
            rotation_deg: 0.0,
        };
        assert_eq!(select_mode_cluster(&[a, b], &thresholds).len(), 2);
    }
}
