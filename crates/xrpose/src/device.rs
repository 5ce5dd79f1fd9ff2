use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use xrpose_calib::Side;
use xrpose_lie::Pose;

use crate::DeviceError;

/// The tracking technology a sample comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceFamily {
    /// Rigid trackers reporting poses in the lighthouse frame.
    Lighthouse,
    /// Glove joints reporting poses relative to the wrist.
    Glove,
}

/// A single pose report from one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSample {
    /// Tracker id for lighthouse devices, `{left|right}_{index}` for glove joints.
    ///
    /// Stable within a session only.
    pub device_id: String,
    /// Family of the device.
    pub family: DeviceFamily,
    /// Reported pose.
    pub pose: Pose,
    /// Index of the frame the sample was produced in.
    pub frame_index: u64,
}

impl DeviceSample {
    /// A lighthouse tracker sample.
    pub fn lighthouse(device_id: impl Into<String>, pose: Pose, frame_index: u64) -> Self {
        Self {
            device_id: device_id.into(),
            family: DeviceFamily::Lighthouse,
            pose,
            frame_index,
        }
    }

    /// A glove joint sample.
    pub fn glove(joint: JointId, pose: Pose, frame_index: u64) -> Self {
        Self {
            device_id: joint.to_string(),
            family: DeviceFamily::Glove,
            pose,
            frame_index,
        }
    }
}

/// Identifies one glove joint, written `left_3` or `right_12`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JointId {
    /// Hand the joint belongs to.
    pub side: Side,
    /// Joint index within the hand.
    pub index: u32,
}

impl JointId {
    /// Create a joint id.
    pub fn new(side: Side, index: u32) -> Self {
        Self { side, index }
    }
}

impl fmt::Display for JointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.side, self.index)
    }
}

impl FromStr for JointId {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DeviceError::InvalidJointId(s.to_string());
        let (side, index) = s.split_once('_').ok_or_else(invalid)?;
        let side = match side {
            "left" => Side::Left,
            "right" => Side::Right,
            _ => return Err(invalid()),
        };
        let index = index.parse().map_err(|_| invalid())?;
        Ok(Self { side, index })
    }
}

/// Scene-space wrist poses used as calibration references.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferencePoses {
    /// Left wrist, if tracked this frame.
    pub left: Option<Pose>,
    /// Right wrist, if tracked this frame.
    pub right: Option<Pose>,
}

impl ReferencePoses {
    /// Read both sides from a reference source.
    pub fn from_source(source: &impl ReferenceSource) -> Self {
        Self {
            left: source.reference_pose(Side::Left),
            right: source.reference_pose(Side::Right),
        }
    }

    /// The pose for one side.
    pub fn get(&self, side: Side) -> Option<Pose> {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }
}

/// A device family driver.
///
/// Each update is one driver refresh: the samples of every device the driver saw.
pub trait PoseSource {
    /// The next pending update, or `None` when nothing more is queued this frame.
    fn next_update(&mut self) -> Result<Option<Vec<DeviceSample>>, DeviceError>;
}

/// Provides scene-space reference poses for each hand.
pub trait ReferenceSource {
    /// The reference pose of one hand, if currently tracked.
    fn reference_pose(&self, side: Side) -> Option<Pose>;
}

impl ReferenceSource for ReferencePoses {
    fn reference_pose(&self, side: Side) -> Option<Pose> {
        self.get(side)
    }
}

/// Drain at most `max_polls` updates from a source, keeping the latest sample per
/// device.
///
/// Samples are returned sorted by device id. Any source error discards the whole
/// poll.
pub fn try_poll_source(
    source: &mut impl PoseSource,
    max_polls: usize,
) -> Result<Vec<DeviceSample>, DeviceError> {
    let mut latest: BTreeMap<String, DeviceSample> = BTreeMap::new();
    for _ in 0..max_polls {
        let Some(update) = source.next_update()? else {
            break;
        };
        for sample in update {
            latest.insert(sample.device_id.clone(), sample);
        }
    }
    Ok(latest.into_values().collect())
}

/// Like [`try_poll_source`], but a failing source yields zero samples and a warning.
pub fn poll_source(source: &mut impl PoseSource, max_polls: usize) -> Vec<DeviceSample> {
    try_poll_source(source, max_polls).unwrap_or_else(|err| {
        log::warn!("{err}, treating as zero samples this frame");
        Vec::new()
    })
}

/// An in-memory queue of updates, replayed in insertion order.
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    queue: VecDeque<Vec<DeviceSample>>,
}

impl ReplaySource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one update.
    pub fn push(&mut self, update: Vec<DeviceSample>) {
        self.queue.push_back(update);
    }

    /// Number of updates not yet polled.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

impl PoseSource for ReplaySource {
    fn next_update(&mut self) -> Result<Option<Vec<DeviceSample>>, DeviceError> {
        Ok(self.queue.pop_front())
    }
}
