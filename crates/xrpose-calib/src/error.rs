/// Errors raised by the calibration routines.
#[derive(thiserror::Error, Debug)]
pub enum CalibError {
    /// Averaging or clustering was asked to work on zero transforms.
    #[error("Cannot compute on an empty set of transforms")]
    EmptyInput,

    /// A configuration value is out of range.
    #[error("Invalid calibration config: {0}")]
    InvalidConfig(String),

    /// Error reading a configuration file.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Error parsing a configuration file.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
