use std::collections::BTreeMap;

use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};
use xrpose_calib::{average_transforms, Side};
use xrpose_lie::{pose_to_transform, transform_to_pose, OrientationPolicy, Pose, SE3};

use crate::{device::JointId, IntegrationError};

/// Mounting rotation between a wrist tracker and the anatomical wrist frame,
/// as `[w, x, y, z]`.
const MOUNT_ROTATION_WXYZ: [f64; 4] = [0.5, -0.5, 0.5, 0.5];

/// Offset of the tracker from the wrist after flipping the palm, in meters.
const MOUNT_OFFSET: [f64; 3] = [0.0, -0.1, 0.0];

/// What to output for lighthouse devices while no calibration exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassThrough {
    /// Raw device and joint poses, unmodified.
    #[default]
    Raw,
    /// The origin pose for every tracker; joints are placed relative to an
    /// identity wrist.
    Origin,
}

/// Synthesis of a palm pose from two hand joints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PalmConfig {
    /// Index of the middle metacarpal joint.
    pub metacarpal_index: u32,
    /// Index of the middle proximal joint.
    pub proximal_index: u32,
    /// Joint index the palm is emitted under.
    pub palm_index: u32,
}

impl Default for PalmConfig {
    fn default() -> Self {
        Self {
            metacarpal_index: 10,
            proximal_index: 11,
            palm_index: 25,
        }
    }
}

/// Configuration of the retargeting pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetargetConfig {
    /// Output mode before calibration.
    pub pass_through: PassThrough,
    /// Correction applied to calibrated trackers, in the tracker's local frame.
    pub tracker_correction: Pose,
    /// Correction applied to glove joints, in the joint's local frame.
    pub glove_correction: Pose,
    /// Palm synthesis, disabled when `None`.
    pub palm: Option<PalmConfig>,
}

impl Default for RetargetConfig {
    fn default() -> Self {
        Self {
            pass_through: PassThrough::Raw,
            tracker_correction: Pose::new(DVec3::from_array(MOUNT_OFFSET), mount_rotation()),
            glove_correction: Pose::new(DVec3::ZERO, mount_rotation().conjugate()),
            palm: Some(PalmConfig::default()),
        }
    }
}

impl RetargetConfig {
    /// Config without any mounting correction.
    pub fn uncorrected() -> Self {
        Self {
            tracker_correction: Pose::IDENTITY,
            glove_correction: Pose::IDENTITY,
            ..Default::default()
        }
    }
}

/// Scene-space output of one retargeting pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenePoses {
    /// Tracker poses keyed by tracker id.
    pub per_device: BTreeMap<String, Pose>,
    /// Joint poses keyed by `{side}_{index}`, including the synthesized palm.
    pub per_joint: BTreeMap<String, Pose>,
}

/// Maps raw device poses into scene space.
#[derive(Debug, Clone)]
pub struct Retargeter {
    pass_through: PassThrough,
    tracker_correction: SE3,
    glove_correction: SE3,
    palm: Option<PalmConfig>,
}

/// Calibration inputs the retargeter needs for one pass.
#[derive(Debug, Clone, Copy)]
pub struct Calibration<'a> {
    /// The frozen `scene_T_lighthouse`.
    pub scene_t_lighthouse: &'a SE3,
    /// Tracker on the left wrist.
    pub left_device_id: Option<&'a str>,
    /// Tracker on the right wrist.
    pub right_device_id: Option<&'a str>,
}

impl<'a> Calibration<'a> {
    fn device_id(&self, side: Side) -> Option<&'a str> {
        match side {
            Side::Left => self.left_device_id,
            Side::Right => self.right_device_id,
        }
    }
}

impl Retargeter {
    /// Build a retargeter, validating the correction poses.
    pub fn new(config: &RetargetConfig) -> Result<Self, IntegrationError> {
        let policy = OrientationPolicy::default();
        Ok(Self {
            pass_through: config.pass_through,
            tracker_correction: pose_to_transform(&config.tracker_correction, policy)?,
            glove_correction: pose_to_transform(&config.glove_correction, policy)?,
            palm: config.palm,
        })
    }

    /// Scene transform of one tracker under a calibration.
    pub fn tracker_to_scene(&self, device: &SE3, scene_t_lighthouse: &SE3) -> SE3 {
        *scene_t_lighthouse * *device * self.tracker_correction
    }

    /// Scene transform of one glove joint relative to a scene-space wrist.
    pub fn joint_to_scene(&self, joint: &SE3, wrist_scene: &SE3) -> SE3 {
        *wrist_scene * *joint * self.glove_correction
    }

    /// Run one retargeting pass.
    ///
    /// # Arguments
    ///
    /// * `trackers` - Latest tracker transforms in lighthouse space.
    /// * `joints` - Latest joint transforms relative to their wrist.
    /// * `calibration` - The frozen calibration, if any.
    pub fn retarget(
        &self,
        trackers: &BTreeMap<String, SE3>,
        joints: &BTreeMap<JointId, SE3>,
        calibration: Option<Calibration<'_>>,
    ) -> ScenePoses {
        let mut scene_trackers: BTreeMap<&str, SE3> = BTreeMap::new();
        for (id, device) in trackers {
            let scene = match (&calibration, self.pass_through) {
                (Some(calib), _) => self.tracker_to_scene(device, calib.scene_t_lighthouse),
                (None, PassThrough::Raw) => *device,
                (None, PassThrough::Origin) => SE3::IDENTITY,
            };
            scene_trackers.insert(id.as_str(), scene);
        }

        let mut scene_joints: BTreeMap<JointId, SE3> = BTreeMap::new();
        for (joint_id, joint) in joints {
            let scene = match (&calibration, self.pass_through) {
                (None, PassThrough::Raw) => *joint,
                (calibration, _) => {
                    let wrist = calibration
                        .and_then(|calib| calib.device_id(joint_id.side))
                        .and_then(|id| scene_trackers.get(id))
                        .copied()
                        .unwrap_or(SE3::IDENTITY);
                    self.joint_to_scene(joint, &wrist)
                }
            };
            scene_joints.insert(*joint_id, scene);
        }

        if let Some(palm) = &self.palm {
            for side in Side::BOTH {
                if let Some(palm_pose) = synthesize_palm(&scene_joints, side, palm) {
                    scene_joints.insert(JointId::new(side, palm.palm_index), palm_pose);
                }
            }
        }

        ScenePoses {
            per_device: scene_trackers
                .into_iter()
                .map(|(id, t)| (id.to_string(), transform_to_pose(&t)))
                .collect(),
            per_joint: scene_joints
                .into_iter()
                .map(|(id, t)| (id.to_string(), transform_to_pose(&t)))
                .collect(),
        }
    }
}

fn synthesize_palm(
    joints: &BTreeMap<JointId, SE3>,
    side: Side,
    palm: &PalmConfig,
) -> Option<SE3> {
    let metacarpal = joints.get(&JointId::new(side, palm.metacarpal_index))?;
    let proximal = joints.get(&JointId::new(side, palm.proximal_index))?;
    average_transforms(&[*metacarpal, *proximal]).ok()
}

/// The default tracker mounting rotation: a quarter turn about Y followed by a
/// quarter turn about Z.
pub fn mount_rotation() -> DQuat {
    let [w, x, y, z] = MOUNT_ROTATION_WXYZ;
    DQuat::from_xyzw(x, y, z, w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use xrpose_lie::{delta_error, SO3};

    fn assert_pose_eq(actual: &Pose, expected: &SE3) -> Result<(), IntegrationError> {
        let actual = pose_to_transform(actual, OrientationPolicy::default())?;
        let err = delta_error(&actual, expected);
        assert!(err.within(1e-9, 1e-4), "{err:?}");
        Ok(())
    }

    fn calibration(s: &SE3) -> Calibration<'_> {
        Calibration {
            scene_t_lighthouse: s,
            left_device_id: Some("WM0"),
            right_device_id: Some("WM1"),
        }
    }

    #[test]
    fn test_default_corrections() {
        let config = RetargetConfig::default();
        assert_eq!(config.tracker_correction.position, DVec3::new(0.0, -0.1, 0.0));
        assert_relative_eq!(config.tracker_correction.orientation.length(), 1.0);
        let combined =
            config.tracker_correction.orientation * config.glove_correction.orientation;
        assert_relative_eq!(combined, DQuat::IDENTITY, epsilon = 1e-12);
        assert_eq!(mount_rotation(), config.tracker_correction.orientation);
    }

    #[test]
    fn test_raw_pass_through() -> Result<(), IntegrationError> {
        let retargeter = Retargeter::new(&RetargetConfig::default())?;
        let device = SE3::from_random();
        let joint = SE3::from_random();
        let trackers = BTreeMap::from([("WM0".to_string(), device)]);
        let joints = BTreeMap::from([(JointId::new(Side::Left, 0), joint)]);
        let out = retargeter.retarget(&trackers, &joints, None);
        assert_pose_eq(&out.per_device["WM0"], &device)?;
        assert_pose_eq(&out.per_joint["left_0"], &joint)?;
        Ok(())
    }

    #[test]
    fn test_origin_pass_through() -> Result<(), IntegrationError> {
        let config = RetargetConfig {
            pass_through: PassThrough::Origin,
            ..RetargetConfig::uncorrected()
        };
        let retargeter = Retargeter::new(&config)?;
        let joint = SE3::from_random();
        let trackers = BTreeMap::from([("WM0".to_string(), SE3::from_random())]);
        let joints = BTreeMap::from([(JointId::new(Side::Right, 4), joint)]);
        let out = retargeter.retarget(&trackers, &joints, None);
        assert_eq!(out.per_device["WM0"], Pose::IDENTITY);
        assert_pose_eq(&out.per_joint["right_4"], &joint)?;
        Ok(())
    }

    #[test]
    fn test_calibrated_tracker_and_joints() -> Result<(), IntegrationError> {
        let retargeter = Retargeter::new(&RetargetConfig::default())?;
        let s = SE3::from_random();
        let left = SE3::from_random();
        let right = SE3::from_random();
        let joint = SE3::new(SO3::from_axis_angle(DVec3::X, 0.3), DVec3::new(0.05, 0.0, 0.01));
        let trackers = BTreeMap::from([("WM0".to_string(), left), ("WM1".to_string(), right)]);
        let joints = BTreeMap::from([
            (JointId::new(Side::Left, 2), joint),
            (JointId::new(Side::Right, 2), joint),
        ]);
        let out = retargeter.retarget(&trackers, &joints, Some(calibration(&s)));

        let correction = pose_to_transform(
            &RetargetConfig::default().tracker_correction,
            OrientationPolicy::default(),
        )?;
        let left_scene = s * left * correction;
        let right_scene = s * right * correction;
        assert_pose_eq(&out.per_device["WM0"], &left_scene)?;
        assert_pose_eq(&out.per_device["WM1"], &right_scene)?;

        let glove = correction.r.inverse();
        assert_pose_eq(
            &out.per_joint["left_2"],
            &(left_scene * joint * SE3::new(glove, DVec3::ZERO)),
        )?;
        assert_pose_eq(
            &out.per_joint["right_2"],
            &(right_scene * joint * SE3::new(glove, DVec3::ZERO)),
        )?;
        Ok(())
    }

    #[test]
    fn test_unknown_wrist_uses_identity() -> Result<(), IntegrationError> {
        let retargeter = Retargeter::new(&RetargetConfig::uncorrected())?;
        let s = SE3::from_random();
        let joint = SE3::from_random();
        let joints = BTreeMap::from([(JointId::new(Side::Left, 1), joint)]);
        // calibrated, but the left tracker has not reported yet
        let out = retargeter.retarget(&BTreeMap::new(), &joints, Some(calibration(&s)));
        assert_pose_eq(&out.per_joint["left_1"], &joint)?;
        Ok(())
    }

    #[test]
    fn test_palm_synthesis() -> Result<(), IntegrationError> {
        let retargeter = Retargeter::new(&RetargetConfig::uncorrected())?;
        let metacarpal = SE3::from_translation(DVec3::new(0.0, 0.0, 0.0));
        let proximal = SE3::from_translation(DVec3::new(0.0, 0.08, 0.0));
        let joints = BTreeMap::from([
            (JointId::new(Side::Left, 10), metacarpal),
            (JointId::new(Side::Left, 11), proximal),
            (JointId::new(Side::Right, 10), metacarpal),
        ]);
        let out = retargeter.retarget(&BTreeMap::new(), &joints, None);
        let expected = SE3::from_translation(DVec3::new(0.0, 0.04, 0.0));
        assert_pose_eq(&out.per_joint["left_25"], &expected)?;
        // the right hand lacks the proximal joint
        assert!(!out.per_joint.contains_key("right_25"));
        Ok(())
    }

    #[test]
    fn test_palm_disabled() -> Result<(), IntegrationError> {
        let config = RetargetConfig {
            palm: None,
            ..RetargetConfig::uncorrected()
        };
        let retargeter = Retargeter::new(&config)?;
        let joints = BTreeMap::from([
            (JointId::new(Side::Left, 10), SE3::IDENTITY),
            (JointId::new(Side::Left, 11), SE3::IDENTITY),
        ]);
        let out = retargeter.retarget(&BTreeMap::new(), &joints, None);
        assert_eq!(out.per_joint.len(), 2);
        Ok(())
    }

    #[test]
    fn test_invalid_correction() {
        let config = RetargetConfig {
            tracker_correction: Pose::from_arrays([0.0; 3], [2.0, 0.0, 0.0, 0.0]),
            ..Default::default()
        };
        assert!(matches!(
            Retargeter::new(&config),
            Err(IntegrationError::InvalidCorrection(_))
        ));
    }

    #[test]
    fn test_config_json() -> Result<(), serde_json::Error> {
        let config: RetargetConfig =
            serde_json::from_str(r#"{ "pass_through": "origin", "palm": null }"#)?;
        assert_eq!(config.pass_through, PassThrough::Origin);
        assert!(config.palm.is_none());
        assert_eq!(config.tracker_correction, RetargetConfig::default().tracker_correction);
        Ok(())
    }
}
