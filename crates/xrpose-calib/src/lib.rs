#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! The pieces are used in this order once per session:
//!
//! 1. [`pairing::PairingResolver`] decides which anonymous tracker is the left
//!    and which the right reference point, and collects candidate
//!    `scene_T_lighthouse` transforms.
//! 2. [`session::CalibrationSession`] accumulates candidates, rejects outliers and
//!    freezes a single transform using [`cluster::select_mode_cluster`] and
//!    [`average::average_transforms`].

/// Rigid transform averaging.
pub mod average;

/// Mode-cluster outlier rejection.
pub mod cluster;

/// Calibration tuning parameters.
pub mod config;

/// Left/right identity resolution for anonymous trackers.
pub mod pairing;

/// Time-bounded calibration sessions.
pub mod session;

mod error;
pub use error::CalibError;

pub use average::average_transforms;
pub use cluster::select_mode_cluster;
pub use config::{CalibrationConfig, ClusterThresholds, KnownPairing, RejectionThresholds};
pub use pairing::{
    Hypothesis, PairingCandidate, PairingDecision, PairingFrame, PairingResolver, Side,
};
pub use session::{CalibrationSample, CalibrationSession, CalibrationState, PushOutcome};
