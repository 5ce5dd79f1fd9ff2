/// Errors raised when building rigid transforms from raw pose data.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum LieError {
    /// The quaternion is not close enough to unit norm to be a rotation.
    #[error("Invalid orientation: quaternion norm {norm} is not unit")]
    InvalidOrientation {
        /// Norm of the offending quaternion.
        norm: f64,
    },

    /// The pose contains NaN or infinite components.
    #[error("Pose contains non-finite values")]
    NonFinite,
}
