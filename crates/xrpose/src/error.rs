use xrpose_calib::CalibError;
use xrpose_lie::LieError;

/// Errors reported by device sources.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    /// The source could not be polled this frame.
    #[error("Device source unavailable: {0}")]
    Unavailable(String),

    /// A glove sample id is not of the form `{left|right}_{index}`.
    #[error("Invalid joint id: {0}")]
    InvalidJointId(String),
}

/// Errors raised while setting up a [`crate::DeviceIntegration`].
#[derive(thiserror::Error, Debug)]
pub enum IntegrationError {
    /// The calibration config is invalid.
    #[error(transparent)]
    Calibration(#[from] CalibError),

    /// A correction pose is not a valid rigid transform.
    #[error("Invalid correction pose. {0}")]
    InvalidCorrection(#[from] LieError),

    /// `max_polls_per_tick` is zero.
    #[error("max_polls_per_tick must be at least 1")]
    ZeroPollBudget,

    /// Error reading a configuration file.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Error parsing a configuration file.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
