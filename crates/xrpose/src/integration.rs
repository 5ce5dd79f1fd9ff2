use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use xrpose_calib::{
    CalibrationConfig, CalibrationSample, CalibrationSession, CalibrationState, PairingDecision,
    PairingFrame, PairingResolver, PushOutcome, Side,
};
use xrpose_lie::{pose_to_transform, Pose, SE3};

use crate::{
    clock::Clock,
    device::{
        try_poll_source, DeviceFamily, DeviceSample, JointId, PoseSource, ReferencePoses,
        ReferenceSource,
    },
    pipeline::{Calibration, RetargetConfig, Retargeter, ScenePoses},
    IntegrationError,
};

/// Which device families are polled on a tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateSchedule {
    /// Poll both families every tick.
    #[default]
    Simultaneous,
    /// Alternate between gloves and trackers, gloves first.
    Interleaved,
}

/// Configuration of a [`DeviceIntegration`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationConfig {
    /// Pairing and calibration parameters.
    pub calibration: CalibrationConfig,
    /// Retargeting parameters.
    pub retarget: RetargetConfig,
    /// Polling schedule used by [`DeviceIntegration::tick`].
    pub schedule: UpdateSchedule,
    /// Maximum updates drained from one source per tick.
    pub max_polls_per_tick: usize,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            calibration: CalibrationConfig::default(),
            retarget: RetargetConfig::default(),
            schedule: UpdateSchedule::default(),
            max_polls_per_tick: 10,
        }
    }
}

impl IntegrationConfig {
    /// Parse and validate a config from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, IntegrationError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, IntegrationError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Check that every value is in range.
    pub fn validate(&self) -> Result<(), IntegrationError> {
        self.calibration.validate()?;
        if self.max_polls_per_tick == 0 {
            return Err(IntegrationError::ZeroPollBudget);
        }
        Retargeter::new(&self.retarget)?;
        Ok(())
    }
}

/// The frozen calibration of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationResult {
    /// Maps lighthouse space into scene space.
    pub scene_t_lighthouse: SE3,
    /// Tracker on the left wrist, if known.
    pub left_device_id: Option<String>,
    /// Tracker on the right wrist, if known.
    pub right_device_id: Option<String>,
}

impl CalibrationResult {
    fn as_calibration(&self) -> Calibration<'_> {
        Calibration {
            scene_t_lighthouse: &self.scene_t_lighthouse,
            left_device_id: self.left_device_id.as_deref(),
            right_device_id: self.right_device_id.as_deref(),
        }
    }
}

/// Connection state of one device family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FamilyStatus {
    /// Whether the last poll succeeded and the family has reported data.
    pub connected: bool,
    /// Time of the latest sample, in clock seconds.
    pub last_data_time: Option<f64>,
}

impl FamilyStatus {
    fn mark(&mut self, now: f64) {
        self.connected = true;
        self.last_data_time = Some(now);
    }
}

/// Connection state of all devices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DeviceStatus {
    /// Glove joints.
    pub gloves: FamilyStatus,
    /// Lighthouse trackers.
    pub trackers: FamilyStatus,
    /// Whether a left glove joint has been seen.
    pub left_hand_connected: bool,
    /// Whether a right glove joint has been seen.
    pub right_hand_connected: bool,
}

/// Calibrates lighthouse trackers against wrist reference poses and retargets
/// tracker and glove poses into scene space every frame.
///
/// Until calibration completes, poses are passed through as configured by
/// [`crate::PassThrough`].
#[derive(Debug)]
pub struct DeviceIntegration {
    config: IntegrationConfig,
    resolver: PairingResolver,
    session: CalibrationSession,
    retargeter: Retargeter,
    trackers: BTreeMap<String, SE3>,
    joints: BTreeMap<JointId, SE3>,
    calibration: Option<CalibrationResult>,
    scene: ScenePoses,
    status: DeviceStatus,
    poll_gloves_next: bool,
}

impl DeviceIntegration {
    /// Create an integration with a validated config.
    pub fn new(config: IntegrationConfig) -> Result<Self, IntegrationError> {
        config.validate()?;
        Ok(Self {
            resolver: PairingResolver::new(&config.calibration),
            session: CalibrationSession::new(config.calibration.clone()),
            retargeter: Retargeter::new(&config.retarget)?,
            config,
            trackers: BTreeMap::new(),
            joints: BTreeMap::new(),
            calibration: None,
            scene: ScenePoses::default(),
            status: DeviceStatus::default(),
            poll_gloves_next: true,
        })
    }

    /// The config the integration runs with.
    pub fn config(&self) -> &IntegrationConfig {
        &self.config
    }

    /// Scene-space poses from the latest update.
    pub fn scene_poses(&self) -> &ScenePoses {
        &self.scene
    }

    /// The frozen calibration, once available.
    pub fn calibration(&self) -> Option<&CalibrationResult> {
        self.calibration.as_ref()
    }

    /// The tracker pairing, once resolved.
    pub fn pairing(&self) -> Option<&PairingDecision> {
        self.resolver.decision()
    }

    /// State of the calibration session.
    pub fn calibration_state(&self) -> CalibrationState {
        self.session.state()
    }

    /// Connection state of all devices.
    pub fn status(&self) -> &DeviceStatus {
        &self.status
    }

    /// Drop the calibration and start a new session, e.g. after the trackers were
    /// power-cycled. Poses pass through until the new session finalizes.
    pub fn reset_calibration(&mut self) {
        log::info!("resetting calibration");
        self.resolver.reset();
        self.session.reset();
        self.calibration = None;
    }

    /// Poll the sources, then [`Self::update`] with their samples.
    ///
    /// A failing source contributes no samples and marks its family disconnected.
    pub fn tick(
        &mut self,
        trackers: &mut impl PoseSource,
        gloves: &mut impl PoseSource,
        references: &impl ReferenceSource,
        clock: &impl Clock,
    ) {
        let (poll_gloves, poll_trackers) = match self.config.schedule {
            UpdateSchedule::Simultaneous => (true, true),
            UpdateSchedule::Interleaved => {
                let gloves_turn = self.poll_gloves_next;
                self.poll_gloves_next = !gloves_turn;
                (gloves_turn, !gloves_turn)
            }
        };

        let max_polls = self.config.max_polls_per_tick;
        let mut samples = Vec::new();
        if poll_gloves {
            match try_poll_source(gloves, max_polls) {
                Ok(polled) => samples.extend(polled),
                Err(err) => {
                    log::warn!("glove source: {err}, treating as zero samples this frame");
                    self.status.gloves.connected = false;
                }
            }
        }
        if poll_trackers {
            match try_poll_source(trackers, max_polls) {
                Ok(polled) => samples.extend(polled),
                Err(err) => {
                    log::warn!("tracker source: {err}, treating as zero samples this frame");
                    self.status.trackers.connected = false;
                }
            }
        }

        let references = ReferencePoses::from_source(references);
        self.update(&samples, &references, clock.now());
    }

    /// Advance pairing and calibration with one frame of samples, then retarget.
    ///
    /// Samples that cannot be converted to rigid transforms are dropped with a
    /// warning.
    pub fn update(&mut self, samples: &[DeviceSample], references: &ReferencePoses, now: f64) {
        let policy = self.config.calibration.orientation;
        let mut fresh_trackers: BTreeMap<String, SE3> = BTreeMap::new();

        for sample in samples {
            let transform = match pose_to_transform(&sample.pose, policy) {
                Ok(transform) => transform,
                Err(err) => {
                    log::warn!("dropping sample from {}: {err}", sample.device_id);
                    continue;
                }
            };
            match sample.family {
                DeviceFamily::Lighthouse => {
                    self.trackers.insert(sample.device_id.clone(), transform);
                    fresh_trackers.insert(sample.device_id.clone(), transform);
                    self.status.trackers.mark(now);
                }
                DeviceFamily::Glove => match sample.device_id.parse::<JointId>() {
                    Ok(joint) => {
                        self.joints.insert(joint, transform);
                        self.status.gloves.mark(now);
                        match joint.side {
                            Side::Left => self.status.left_hand_connected = true,
                            Side::Right => self.status.right_hand_connected = true,
                        }
                    }
                    Err(err) => log::warn!("dropping glove sample: {err}"),
                },
            }
        }

        if self.calibration.is_none() {
            self.calibrate(fresh_trackers.into_iter().collect(), references, now);
        }

        self.scene = self.retargeter.retarget(
            &self.trackers,
            &self.joints,
            self.calibration.as_ref().map(CalibrationResult::as_calibration),
        );
    }

    fn calibrate(&mut self, devices: Vec<(String, SE3)>, references: &ReferencePoses, now: f64) {
        let policy = self.config.calibration.orientation;
        let reference = |side: Side| {
            let pose: Pose = references.get(side)?;
            match pose_to_transform(&pose, policy) {
                Ok(transform) => Some(transform),
                Err(err) => {
                    log::warn!("dropping {side} reference pose: {err}");
                    None
                }
            }
        };
        let frame = PairingFrame {
            devices,
            left: reference(Side::Left),
            right: reference(Side::Right),
        };
        self.resolver.observe(&frame);

        let Some(decision) = self.resolver.resolve().cloned() else {
            return;
        };

        // the chosen pool feeds the session, the other one is no longer needed
        let chosen = self.resolver.take_candidates(decision.hypothesis);
        self.resolver.take_candidates(decision.hypothesis.other());

        let mut finalized = None;
        for candidate in &chosen {
            if let PushOutcome::Finalized(transform) =
                self.session.push(CalibrationSample::from(candidate), now)
            {
                finalized = Some(transform);
            }
        }
        if finalized.is_none() {
            finalized = self.session.poll(now);
        }

        if let Some(scene_t_lighthouse) = finalized {
            log::info!(
                "calibration complete: left tracker {}, right tracker {}",
                decision.left_device_id.as_deref().unwrap_or("<none>"),
                decision.right_device_id.as_deref().unwrap_or("<none>"),
            );
            self.calibration = Some(CalibrationResult {
                scene_t_lighthouse,
                left_device_id: decision.left_device_id,
                right_device_id: decision.right_device_id,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ReplaySource;
    use crate::{DeviceError, ManualClock};
    use glam::{DQuat, DVec3};
    use std::io::Write;

    struct BrokenSource;

    impl PoseSource for BrokenSource {
        fn next_update(&mut self) -> Result<Option<Vec<DeviceSample>>, DeviceError> {
            Err(DeviceError::Unavailable("no dongle".to_string()))
        }
    }

    fn tracker(id: &str, x: f64) -> DeviceSample {
        DeviceSample::lighthouse(id, Pose::new(DVec3::new(x, 0.0, 0.0), DQuat::IDENTITY), 0)
    }

    fn joint(side: Side, index: u32) -> DeviceSample {
        DeviceSample::glove(JointId::new(side, index), Pose::IDENTITY, 0)
    }

    #[test]
    fn test_config_defaults() -> Result<(), IntegrationError> {
        let config = IntegrationConfig::from_json_str("{}")?;
        assert_eq!(config, IntegrationConfig::default());
        assert_eq!(config.max_polls_per_tick, 10);
        assert_eq!(config.schedule, UpdateSchedule::Simultaneous);
        Ok(())
    }

    #[test]
    fn test_config_file() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(
            file,
            r#"{{ "schedule": "interleaved", "max_polls_per_tick": 4,
                 "calibration": {{ "min_samples": 12 }},
                 "retarget": {{ "pass_through": "origin" }} }}"#
        )?;
        let config = IntegrationConfig::from_json_file(file.path())?;
        assert_eq!(config.schedule, UpdateSchedule::Interleaved);
        assert_eq!(config.max_polls_per_tick, 4);
        assert_eq!(config.calibration.min_samples, 12);
        assert_eq!(config.retarget.pass_through, crate::PassThrough::Origin);
        Ok(())
    }

    #[test]
    fn test_config_invalid() {
        assert!(matches!(
            IntegrationConfig::from_json_str(r#"{ "max_polls_per_tick": 0 }"#),
            Err(IntegrationError::ZeroPollBudget)
        ));
        assert!(matches!(
            IntegrationConfig::from_json_str(r#"{ "calibration": { "min_samples": 0 } }"#),
            Err(IntegrationError::Calibration(_))
        ));
        assert!(matches!(
            IntegrationConfig::from_json_str("{ not json"),
            Err(IntegrationError::Json(_))
        ));
    }

    #[test]
    fn test_pass_through_before_calibration() -> Result<(), IntegrationError> {
        let mut integration = DeviceIntegration::new(IntegrationConfig {
            retarget: RetargetConfig {
                palm: None,
                ..RetargetConfig::uncorrected()
            },
            ..Default::default()
        })?;
        integration.update(
            &[tracker("WM0", 1.0), joint(Side::Left, 0)],
            &ReferencePoses::default(),
            0.0,
        );
        assert!(integration.calibration().is_none());
        let scene = integration.scene_poses();
        assert_eq!(scene.per_device["WM0"].position, DVec3::new(1.0, 0.0, 0.0));
        assert_eq!(scene.per_joint.len(), 1);
        assert!(integration.status().left_hand_connected);
        assert!(!integration.status().right_hand_connected);
        assert_eq!(integration.status().trackers.last_data_time, Some(0.0));
        Ok(())
    }

    #[test]
    fn test_invalid_samples_are_dropped() -> Result<(), IntegrationError> {
        let mut integration = DeviceIntegration::new(IntegrationConfig::default())?;
        let bad_orientation = DeviceSample::lighthouse(
            "WM0",
            Pose::from_arrays([0.0; 3], [3.0, 0.0, 0.0, 0.0]),
            0,
        );
        let bad_joint_id = DeviceSample {
            device_id: "thumb".to_string(),
            family: DeviceFamily::Glove,
            pose: Pose::IDENTITY,
            frame_index: 0,
        };
        integration.update(
            &[bad_orientation, bad_joint_id, tracker("WM1", 0.5)],
            &ReferencePoses::default(),
            0.0,
        );
        let scene = integration.scene_poses();
        assert_eq!(scene.per_device.keys().collect::<Vec<_>>(), vec!["WM1"]);
        assert!(scene.per_joint.is_empty());
        Ok(())
    }

    #[test]
    fn test_tick_polls_both_families() -> Result<(), IntegrationError> {
        let mut integration = DeviceIntegration::new(IntegrationConfig::default())?;
        let mut trackers = ReplaySource::new();
        let mut gloves = ReplaySource::new();
        trackers.push(vec![tracker("WM0", 0.0)]);
        gloves.push(vec![joint(Side::Right, 3)]);
        let clock = ManualClock::new(2.0);

        integration.tick(&mut trackers, &mut gloves, &ReferencePoses::default(), &clock);
        assert!(integration.scene_poses().per_device.contains_key("WM0"));
        assert!(integration.scene_poses().per_joint.contains_key("right_3"));
        assert_eq!(integration.status().gloves.last_data_time, Some(2.0));
        Ok(())
    }

    #[test]
    fn test_tick_interleaved() -> Result<(), IntegrationError> {
        let mut integration = DeviceIntegration::new(IntegrationConfig {
            schedule: UpdateSchedule::Interleaved,
            ..Default::default()
        })?;
        let mut trackers = ReplaySource::new();
        let mut gloves = ReplaySource::new();
        trackers.push(vec![tracker("WM0", 0.0)]);
        gloves.push(vec![joint(Side::Left, 1)]);
        let clock = ManualClock::new(0.0);
        let references = ReferencePoses::default();

        integration.tick(&mut trackers, &mut gloves, &references, &clock);
        assert_eq!(gloves.pending(), 0);
        assert_eq!(trackers.pending(), 1);

        clock.advance(0.01);
        integration.tick(&mut trackers, &mut gloves, &references, &clock);
        assert_eq!(trackers.pending(), 0);
        assert!(integration.scene_poses().per_device.contains_key("WM0"));
        // joints persist across frames
        assert!(integration.scene_poses().per_joint.contains_key("left_1"));
        Ok(())
    }

    #[test]
    fn test_tick_bounded_polling() -> Result<(), IntegrationError> {
        let mut integration = DeviceIntegration::new(IntegrationConfig {
            max_polls_per_tick: 3,
            ..Default::default()
        })?;
        let mut trackers = ReplaySource::new();
        for k in 0..10 {
            trackers.push(vec![tracker("WM0", k as f64)]);
        }
        let mut gloves = ReplaySource::new();
        let clock = ManualClock::new(0.0);

        integration.tick(&mut trackers, &mut gloves, &ReferencePoses::default(), &clock);
        assert_eq!(trackers.pending(), 7);
        assert_eq!(integration.scene_poses().per_device["WM0"].position.x, 2.0);
        Ok(())
    }

    #[test]
    fn test_tick_source_failure() -> Result<(), IntegrationError> {
        let mut integration = DeviceIntegration::new(IntegrationConfig::default())?;
        let mut gloves = ReplaySource::new();
        gloves.push(vec![joint(Side::Left, 0)]);
        let clock = ManualClock::new(0.0);

        integration.tick(&mut BrokenSource, &mut gloves, &ReferencePoses::default(), &clock);
        assert!(integration.scene_poses().per_device.is_empty());
        assert!(integration.scene_poses().per_joint.contains_key("left_0"));
        assert!(!integration.status().trackers.connected);
        assert!(integration.status().gloves.connected);
        Ok(())
    }
}
