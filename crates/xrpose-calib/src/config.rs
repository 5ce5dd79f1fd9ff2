use std::path::Path;

use serde::{Deserialize, Serialize};
use xrpose_lie::pose::OrientationPolicy;

use crate::CalibError;

/// Proximity thresholds used to group transforms into a mode cluster.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterThresholds {
    /// Maximum translation distance to the cluster center, in meters.
    pub translation_m: f64,
    /// Maximum rotation distance to the cluster center, in degrees.
    pub rotation_deg: f64,
}

impl Default for ClusterThresholds {
    fn default() -> Self {
        Self {
            translation_m: 0.02,
            rotation_deg: 5.0,
        }
    }
}

/// Tolerances for dropping a single calibration sample on arrival.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RejectionThresholds {
    /// Maximum translation error of the re-derived reference pose, in meters.
    pub translation_m: f64,
    /// Maximum rotation error of the re-derived reference pose, in degrees.
    pub rotation_deg: f64,
}

impl Default for RejectionThresholds {
    fn default() -> Self {
        Self {
            translation_m: 0.03,
            rotation_deg: 7.5,
        }
    }
}

/// Tracker ids known in advance to sit on the left and right wrists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownPairing {
    /// Tracker id mounted on the left wrist.
    pub left: String,
    /// Tracker id mounted on the right wrist.
    pub right: String,
}

/// Tuning parameters for pairing resolution and calibration sessions.
///
/// Every field has a default, so a JSON file only needs the values it overrides:
///
/// ```json
/// { "min_samples": 10, "cluster": { "translation_m": 0.01, "rotation_deg": 3.0 } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Samples needed before a pairing hypothesis is chosen or a session finalizes.
    pub min_samples: usize,
    /// Pairing candidates and consistency errors kept per hypothesis while the
    /// pairing is undecided. Older entries are dropped first.
    pub max_history: usize,
    /// Length of a collection window in seconds.
    pub max_collection_secs: f64,
    /// Largest aggregate pairing error accepted for a hypothesis.
    pub pairing_tolerance: f64,
    /// Weight of the median rotation error (degrees) in the aggregate pairing error.
    pub rotation_weight: f64,
    /// Mode-cluster thresholds applied at finalization.
    pub cluster: ClusterThresholds,
    /// Per-sample rejection, disabled when `None`.
    pub rejection: Option<RejectionThresholds>,
    /// Policy for quaternions that are not unit norm.
    pub orientation: OrientationPolicy,
    /// Only tracker ids starting with this prefix take part in pairing.
    pub device_id_prefix: Option<String>,
    /// Skip pairing resolution and use these tracker ids.
    pub known_pairing: Option<KnownPairing>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            min_samples: 6,
            max_history: 60,
            max_collection_secs: 1.0,
            pairing_tolerance: 3.0,
            rotation_weight: 0.01,
            cluster: ClusterThresholds::default(),
            rejection: Some(RejectionThresholds::default()),
            orientation: OrientationPolicy::default(),
            device_id_prefix: None,
            known_pairing: None,
        }
    }
}

impl CalibrationConfig {
    /// Parse and validate a config from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, CalibError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CalibError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Check that every value is in range.
    pub fn validate(&self) -> Result<(), CalibError> {
        if self.min_samples == 0 {
            return Err(CalibError::InvalidConfig(
                "min_samples must be at least 1".to_string(),
            ));
        }
        if self.max_history < self.min_samples {
            return Err(CalibError::InvalidConfig(format!(
                "max_history ({}) must be at least min_samples ({})",
                self.max_history, self.min_samples
            )));
        }
        if self.max_collection_secs.is_nan() || self.max_collection_secs <= 0.0 {
            return Err(CalibError::InvalidConfig(format!(
                "max_collection_secs must be positive, got {}",
                self.max_collection_secs
            )));
        }
        if self.pairing_tolerance.is_nan()
            || self.pairing_tolerance <= 0.0
            || self.rotation_weight < 0.0
        {
            return Err(CalibError::InvalidConfig(
                "pairing_tolerance must be positive and rotation_weight non-negative"
                    .to_string(),
            ));
        }
        if self.cluster.translation_m < 0.0 || self.cluster.rotation_deg < 0.0 {
            return Err(CalibError::InvalidConfig(
                "cluster thresholds must be non-negative".to_string(),
            ));
        }
        if let Some(rejection) = &self.rejection {
            if rejection.translation_m < 0.0 || rejection.rotation_deg < 0.0 {
                return Err(CalibError::InvalidConfig(
                    "rejection thresholds must be non-negative".to_string(),
                ));
            }
        }
        if let Some(known) = &self.known_pairing {
            if known.left == known.right {
                return Err(CalibError::InvalidConfig(format!(
                    "known_pairing uses tracker {} for both wrists",
                    known.left
                )));
            }
        }
        Ok(())
    }

    /// Samples a session must hold to finalize on the time trigger: half of
    /// `min_samples`, rounded up.
    pub fn min_window_samples(&self) -> usize {
        self.min_samples.div_ceil(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_is_valid() -> Result<(), CalibError> {
        let config = CalibrationConfig::default();
        config.validate()?;
        assert_eq!(config.min_window_samples(), 3);
        Ok(())
    }

    #[test]
    fn test_partial_json_keeps_defaults() -> Result<(), CalibError> {
        let config = CalibrationConfig::from_json_str(
            r#"{ "min_samples": 9, "cluster": { "translation_m": 0.01, "rotation_deg": 3.0 } }"#,
        )?;
        assert_eq!(config.min_samples, 9);
        assert_eq!(config.min_window_samples(), 5);
        assert_eq!(config.cluster.translation_m, 0.01);
        assert_eq!(config.max_collection_secs, 1.0);
        assert_eq!(config.rejection, Some(RejectionThresholds::default()));
        Ok(())
    }

    #[test]
    fn test_orientation_policy_json() -> Result<(), CalibError> {
        let config = CalibrationConfig::from_json_str(
            r#"{ "orientation": "normalize", "rejection": null }"#,
        )?;
        assert_eq!(config.orientation, OrientationPolicy::Normalize);
        assert!(config.rejection.is_none());
        Ok(())
    }

    #[test]
    fn test_invalid_values() {
        let config = CalibrationConfig {
            min_samples: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(CalibError::InvalidConfig(_))));

        let config = CalibrationConfig {
            known_pairing: Some(KnownPairing {
                left: "WM0".to_string(),
                right: "WM0".to_string(),
            }),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        assert!(CalibrationConfig::from_json_str(r#"{ "max_collection_secs": -1.0 }"#).is_err());
        assert!(
            CalibrationConfig::from_json_str(r#"{ "min_samples": 10, "max_history": 8 }"#).is_err()
        );
    }

    #[test]
    fn test_from_json_file() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(
            file,
            r#"{{ "device_id_prefix": "WM", "known_pairing": {{ "left": "WM1", "right": "WM0" }} }}"#
        )?;
        let config = CalibrationConfig::from_json_file(file.path())?;
        assert_eq!(config.device_id_prefix.as_deref(), Some("WM"));
        assert_eq!(
            config.known_pairing,
            Some(KnownPairing {
                left: "WM1".to_string(),
                right: "WM0".to_string(),
            })
        );
        Ok(())
    }

    #[test]
    fn test_missing_file() {
        let err = CalibrationConfig::from_json_file("/nonexistent/xrpose.json");
        assert!(matches!(err, Err(CalibError::Io(_))));
    }
}
