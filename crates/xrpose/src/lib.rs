#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # xrpose
//!
//! [`DeviceIntegration`] is the entry point. Feed it one frame of device samples and
//! the wrist reference poses, then read the scene-space poses back:
//!
//! ```rust
//! use xrpose::{DeviceIntegration, IntegrationConfig, SyntheticRig};
//! use xrpose_lie::SE3;
//!
//! let mut rig = SyntheticRig::new(SE3::from_translation([0.0, 1.0, 0.0].into()), 0);
//! let mut integration = DeviceIntegration::new(IntegrationConfig::default()).unwrap();
//!
//! for k in 0..30 {
//!     let frame = rig.frame(k as f64 / 90.0);
//!     let samples: Vec<_> = frame.trackers.into_iter().chain(frame.gloves).collect();
//!     integration.update(&samples, &frame.references, k as f64 / 90.0);
//! }
//!
//! assert!(integration.calibration().is_some());
//! assert!(integration.scene_poses().per_joint.contains_key("left_25"));
//! ```

/// Time sources.
pub mod clock;

/// Device samples and the traits device drivers implement.
pub mod device;

/// Pairing, calibration and retargeting driven frame by frame.
pub mod integration;

/// Mapping of raw device poses into scene space.
pub mod pipeline;

/// Simulated devices.
pub mod synthetic;

mod error;
pub use error::{DeviceError, IntegrationError};

pub use clock::{Clock, ManualClock, SystemClock};
pub use device::{
    poll_source, try_poll_source, DeviceFamily, DeviceSample, JointId, PoseSource,
    ReferencePoses, ReferenceSource, ReplaySource,
};
pub use integration::{
    CalibrationResult, DeviceIntegration, DeviceStatus, FamilyStatus, IntegrationConfig,
    UpdateSchedule,
};
pub use pipeline::{PalmConfig, PassThrough, RetargetConfig, Retargeter, ScenePoses};
pub use synthetic::{GroundTruth, SyntheticFrame, SyntheticNoise, SyntheticRig};
