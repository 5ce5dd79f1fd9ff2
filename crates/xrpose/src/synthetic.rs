//! A simulated two-hand rig for tests and demos.
//!
//! Two wrists move along smooth paths in scene space. A lighthouse tracker on each
//! wrist reports the wrist pose in lighthouse space, optionally with noise and
//! occasional gross outliers, and each glove reports a fixed set of joints relative
//! to its wrist.

use std::collections::BTreeMap;

use glam::DVec3;
use rand::{rngs::StdRng, Rng, SeedableRng};
use xrpose_calib::Side;
use xrpose_lie::{transform_to_pose, SE3, SO3};

use crate::device::{DeviceSample, JointId, ReferencePoses};

/// Measurement noise of the simulated trackers.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SyntheticNoise {
    /// Half-width of the uniform translation noise per axis, in meters.
    pub translation_m: f64,
    /// Half-width of the uniform rotation noise per axis, in radians.
    pub rotation_rad: f64,
    /// Probability that a tracker sample is replaced by a gross outlier.
    pub outlier_probability: f64,
}

/// The poses a synthetic frame was generated from.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundTruth {
    /// Left wrist in scene space.
    pub left_wrist: SE3,
    /// Right wrist in scene space.
    pub right_wrist: SE3,
    /// Joint poses relative to their wrist.
    pub joints: BTreeMap<JointId, SE3>,
}

impl GroundTruth {
    /// The wrist of one side.
    pub fn wrist(&self, side: Side) -> &SE3 {
        match side {
            Side::Left => &self.left_wrist,
            Side::Right => &self.right_wrist,
        }
    }
}

/// One frame of simulated device output.
#[derive(Debug, Clone)]
pub struct SyntheticFrame {
    /// Tracker samples in lighthouse space.
    pub trackers: Vec<DeviceSample>,
    /// Glove joint samples relative to the wrist.
    pub gloves: Vec<DeviceSample>,
    /// Wrist reference poses in scene space.
    pub references: ReferencePoses,
    /// Noise-free poses behind the samples.
    pub truth: GroundTruth,
}

/// Generates frames of a two-hand rig seen by lighthouse trackers and gloves.
#[derive(Debug, Clone)]
pub struct SyntheticRig {
    scene_t_lighthouse: SE3,
    left_tracker_id: String,
    right_tracker_id: String,
    joints_per_hand: u32,
    noise: SyntheticNoise,
    frame_index: u64,
    rng: StdRng,
}

impl SyntheticRig {
    /// Create a noise-free rig with trackers `WM0` on the left and `WM1` on the right
    /// wrist and 12 joints per glove.
    pub fn new(scene_t_lighthouse: SE3, seed: u64) -> Self {
        Self {
            scene_t_lighthouse,
            left_tracker_id: "WM0".to_string(),
            right_tracker_id: "WM1".to_string(),
            joints_per_hand: 12,
            noise: SyntheticNoise::default(),
            frame_index: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Use other tracker ids.
    pub fn with_tracker_ids(mut self, left: impl Into<String>, right: impl Into<String>) -> Self {
        self.left_tracker_id = left.into();
        self.right_tracker_id = right.into();
        self
    }

    /// Add measurement noise to the trackers.
    pub fn with_noise(mut self, noise: SyntheticNoise) -> Self {
        self.noise = noise;
        self
    }

    /// Change the number of joints per glove.
    pub fn with_joints_per_hand(mut self, joints_per_hand: u32) -> Self {
        self.joints_per_hand = joints_per_hand;
        self
    }

    /// The true `scene_T_lighthouse`.
    pub fn scene_t_lighthouse(&self) -> &SE3 {
        &self.scene_t_lighthouse
    }

    /// Id of the tracker on one wrist.
    pub fn tracker_id(&self, side: Side) -> &str {
        match side {
            Side::Left => &self.left_tracker_id,
            Side::Right => &self.right_tracker_id,
        }
    }

    /// Generate the frame at `time` seconds.
    pub fn frame(&mut self, time: f64) -> SyntheticFrame {
        let frame_index = self.frame_index;
        self.frame_index += 1;

        let truth = GroundTruth {
            left_wrist: wrist_path(Side::Left, time),
            right_wrist: wrist_path(Side::Right, time),
            joints: Side::BOTH
                .into_iter()
                .flat_map(|side| {
                    (0..self.joints_per_hand)
                        .map(move |index| (JointId::new(side, index), joint_local(index, time)))
                })
                .collect(),
        };

        let lighthouse_t_scene = self.scene_t_lighthouse.inverse();
        let mut trackers = Vec::with_capacity(2);
        for side in Side::BOTH {
            let device = self.perturb(&(lighthouse_t_scene * *truth.wrist(side)));
            trackers.push(DeviceSample::lighthouse(
                self.tracker_id(side),
                transform_to_pose(&device),
                frame_index,
            ));
        }

        let gloves = truth
            .joints
            .iter()
            .map(|(joint, local)| {
                DeviceSample::glove(*joint, transform_to_pose(local), frame_index)
            })
            .collect();

        SyntheticFrame {
            trackers,
            gloves,
            references: ReferencePoses {
                left: Some(transform_to_pose(&truth.left_wrist)),
                right: Some(transform_to_pose(&truth.right_wrist)),
            },
            truth,
        }
    }

    fn perturb(&mut self, device: &SE3) -> SE3 {
        if self.noise.outlier_probability > 0.0
            && self.rng.random_bool(self.noise.outlier_probability.min(1.0))
        {
            let jump = DVec3::new(
                self.rng.random_range(-0.5..0.5),
                self.rng.random_range(-0.5..0.5),
                self.rng.random_range(-0.5..0.5),
            );
            let spin = DVec3::new(
                self.rng.random_range(-1.5..1.5),
                self.rng.random_range(-1.5..1.5),
                self.rng.random_range(-1.5..1.5),
            );
            return SE3::new(device.r * SO3::exp(spin), device.t + jump);
        }

        let dt = DVec3::new(
            jitter(&mut self.rng, self.noise.translation_m),
            jitter(&mut self.rng, self.noise.translation_m),
            jitter(&mut self.rng, self.noise.translation_m),
        );
        let dr = SO3::exp(DVec3::new(
            jitter(&mut self.rng, self.noise.rotation_rad),
            jitter(&mut self.rng, self.noise.rotation_rad),
            jitter(&mut self.rng, self.noise.rotation_rad),
        ));
        SE3::new(device.r * dr, device.t + dt)
    }
}

fn jitter(rng: &mut impl Rng, half_width: f64) -> f64 {
    if half_width > 0.0 {
        rng.random_range(-half_width..half_width)
    } else {
        0.0
    }
}

/// Scene pose of a wrist: a slow sway in front of the body.
fn wrist_path(side: Side, time: f64) -> SE3 {
    let sign = match side {
        Side::Left => -1.0,
        Side::Right => 1.0,
    };
    let rotation = SO3::exp(DVec3::new(
        0.4 * time.sin(),
        sign * (0.3 + 0.2 * (0.7 * time).cos()),
        0.1 * (1.3 * time).sin(),
    ));
    let position = DVec3::new(
        sign * (0.2 + 0.05 * time.sin()),
        1.0 + 0.04 * (0.9 * time).cos(),
        0.35 + 0.03 * (1.1 * time).sin(),
    );
    SE3::new(rotation, position)
}

/// Pose of a joint relative to its wrist: joints further along the hand bend more.
fn joint_local(index: u32, time: f64) -> SE3 {
    let k = index as f64;
    let bend = 0.05 * k * (1.0 + 0.5 * time.sin());
    SE3::new(
        SO3::from_axis_angle(DVec3::X, bend),
        DVec3::new(0.01 * (k % 4.0), 0.025 * (k / 4.0).floor() + 0.02, 0.01),
    )
}
