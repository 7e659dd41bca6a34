//! Sensor calibration for the accelerometer/gyroscope pair.
//!
//! [`CalibrationParameters`] is the runtime model applied to every raw sample.
//! [`solver`] fits it offline from batches of raw readings and [`storage`]
//! persists it as JSON or as the packed driver blob.

pub mod error;
pub mod model;
pub mod solver;
pub mod storage;

pub use error::{CalibrationError, CalibrationLoadError};
pub use model::CalibrationParameters;
pub use solver::{fit_accel, fit_gyro_bias, AccelFit, FitReport, POOR_CONDITIONING, STANDARD_GRAVITY};
pub use storage::{update_json, CalibrationBlob};
