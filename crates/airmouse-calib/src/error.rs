use std::path::PathBuf;
use thiserror::Error;

/// Failures of the offline calibration fit.
#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("need at least {required} samples in distinct orientations, got {actual}")]
    InsufficientSamples { required: usize, actual: usize },
    #[error("sample {index} has {len} components, expected 3")]
    InvalidShape { index: usize, len: usize },
    #[error("normal equations became singular at iteration {iteration}")]
    SingularSystem { iteration: usize },
}

/// Failures reading persisted calibration.
#[derive(Debug, Error)]
pub enum CalibrationLoadError {
    #[error("cannot access calibration file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed calibration JSON in {path}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("calibration blob is {len} bytes, expected at least {expected}")]
    BlobTooShort { len: usize, expected: usize },
    #[error("calibration blob field {field} = {value} is outside the accepted range")]
    BlobOutOfRange { field: &'static str, value: f32 },
}
