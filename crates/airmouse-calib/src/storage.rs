//! Persisted calibration formats.
//!
//! JSON layout, values rounded to 6 decimals:
//! ```text
//! { "accel": { "bias": [x, y, z], "matrix": [[..], [..], [..]] },
//!   "gyro":  { "bias": [x, y, z], "scale": [x, y, z] } }
//! ```
//! The driver blob is 32 bytes, little-endian f32, no header or padding:
//! gyro bias (3), gyro scale (3), alpha, mouse constant.

use crate::error::CalibrationLoadError;
use crate::model::CalibrationParameters;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Serialize, Deserialize)]
struct CalibrationFile {
    accel: AccelSection,
    gyro: GyroSection,
}

#[derive(Debug, Serialize, Deserialize)]
struct AccelSection {
    bias: [f64; 3],
    matrix: [[f64; 3]; 3],
}

#[derive(Debug, Serialize, Deserialize)]
struct GyroSection {
    bias: [f64; 3],
    scale: [f64; 3],
}

fn round6(v: f64) -> f64 {
    (v * 1e6).round() / 1e6
}

fn vec_to_array(v: &Vector3<f64>) -> [f64; 3] {
    [round6(v.x), round6(v.y), round6(v.z)]
}

impl From<&CalibrationParameters> for CalibrationFile {
    fn from(params: &CalibrationParameters) -> Self {
        let m = &params.accel_matrix;
        let row = |r: usize| [round6(m[(r, 0)]), round6(m[(r, 1)]), round6(m[(r, 2)])];
        Self {
            accel: AccelSection {
                bias: vec_to_array(&params.accel_bias),
                matrix: [row(0), row(1), row(2)],
            },
            gyro: GyroSection {
                bias: vec_to_array(&params.gyro_bias),
                scale: vec_to_array(&params.gyro_scale),
            },
        }
    }
}

impl From<CalibrationFile> for CalibrationParameters {
    fn from(file: CalibrationFile) -> Self {
        let [r0, r1, r2] = file.accel.matrix;
        Self {
            accel_bias: Vector3::from(file.accel.bias),
            accel_matrix: Matrix3::new(
                r0[0], r0[1], r0[2], r1[0], r1[1], r1[2], r2[0], r2[1], r2[2],
            ),
            gyro_bias: Vector3::from(file.gyro.bias),
            gyro_scale: Vector3::from(file.gyro.scale),
        }
    }
}

impl CalibrationParameters {
    /// Serialize to the persisted JSON form.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&CalibrationFile::from(self))
    }

    /// Parse the persisted JSON form.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let file: CalibrationFile = serde_json::from_str(json)?;
        Ok(file.into())
    }

    /// Load calibration JSON from disk.
    pub fn load_json(path: &Path) -> Result<Self, CalibrationLoadError> {
        let json = std::fs::read_to_string(path).map_err(|source| CalibrationLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let params = Self::from_json(&json).map_err(|source| CalibrationLoadError::Json {
            path: path.to_path_buf(),
            source,
        })?;

        let det = params.accel_determinant();
        if det.abs() < 1e-12 {
            warn!(?path, det, "Accelerometer matrix is near-singular");
        }
        info!(?path, "Loaded calibration");
        Ok(params)
    }

    /// Write calibration JSON to disk.
    pub fn save_json(&self, path: &Path) -> std::io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)?;
        info!(?path, "Saved calibration");
        Ok(())
    }
}

/// Load the calibration at `path` (identity when the file does not exist),
/// apply `update` and write the result back.
///
/// Lets the accelerometer and gyroscope halves be fitted in separate runs
/// without one overwriting the other.
pub fn update_json(
    path: &Path,
    update: impl FnOnce(&mut CalibrationParameters),
) -> Result<CalibrationParameters, CalibrationLoadError> {
    let mut params = if path.exists() {
        info!(?path, "Updating existing calibration");
        CalibrationParameters::load_json(path)?
    } else {
        CalibrationParameters::default()
    };

    update(&mut params);

    params
        .save_json(path)
        .map_err(|source| CalibrationLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(params)
}

/// Packed calibration consumed by the kernel driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationBlob {
    pub gyro_bias: [f32; 3],
    pub gyro_scale: [f32; 3],
    /// Gyro low-pass factor.
    pub alpha: f32,
    /// Pointer sensitivity constant.
    pub mouse_k: f32,
}

impl CalibrationBlob {
    pub const LEN: usize = 32;

    const MAX_GYRO_BIAS: f32 = 100.0;
    const MAX_GYRO_SCALE: f32 = 10.0;

    /// Build a blob from the gyro part of `params`.
    pub fn from_parameters(params: &CalibrationParameters, alpha: f32, mouse_k: f32) -> Self {
        let f = |v: &Vector3<f64>| [v.x as f32, v.y as f32, v.z as f32];
        Self {
            gyro_bias: f(&params.gyro_bias),
            gyro_scale: f(&params.gyro_scale),
            alpha,
            mouse_k,
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        let tail = [self.alpha, self.mouse_k];
        let values = self
            .gyro_bias
            .iter()
            .chain(self.gyro_scale.iter())
            .chain(tail.iter());
        for (chunk, value) in out.chunks_exact_mut(4).zip(values) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        out
    }

    /// Decode the first 32 bytes of `data`; trailing bytes are ignored.
    pub fn from_bytes(data: &[u8]) -> Result<Self, CalibrationLoadError> {
        if data.len() < Self::LEN {
            return Err(CalibrationLoadError::BlobTooShort {
                len: data.len(),
                expected: Self::LEN,
            });
        }

        let mut values = [0f32; 8];
        for (value, chunk) in values.iter_mut().zip(data[..Self::LEN].chunks_exact(4)) {
            *value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }

        Ok(Self {
            gyro_bias: [values[0], values[1], values[2]],
            gyro_scale: [values[3], values[4], values[5]],
            alpha: values[6],
            mouse_k: values[7],
        })
    }

    /// Apply the driver's acceptance limits.
    pub fn validate(&self) -> Result<(), CalibrationLoadError> {
        for &value in &self.gyro_bias {
            if value.is_nan() || value.abs() > Self::MAX_GYRO_BIAS {
                return Err(CalibrationLoadError::BlobOutOfRange {
                    field: "gyro_bias",
                    value,
                });
            }
        }
        for &value in &self.gyro_scale {
            if value.is_nan() || value.abs() > Self::MAX_GYRO_SCALE {
                return Err(CalibrationLoadError::BlobOutOfRange {
                    field: "gyro_scale",
                    value,
                });
            }
        }
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(CalibrationLoadError::BlobOutOfRange {
                field: "alpha",
                value: self.alpha,
            });
        }
        if !(0.0..=1.0).contains(&self.mouse_k) {
            return Err(CalibrationLoadError::BlobOutOfRange {
                field: "mouse_k",
                value: self.mouse_k,
            });
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.to_bytes())?;
        info!(?path, "Saved calibration blob");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, CalibrationLoadError> {
        let data = std::fs::read(path).map_err(|source| CalibrationLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let blob = Self::from_bytes(&data)?;
        blob.validate()?;
        Ok(blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn params() -> CalibrationParameters {
        CalibrationParameters {
            accel_bias: Vector3::new(0.1234567, -2.5, 3.0),
            accel_matrix: Matrix3::new(1.01, 0.002, 0.0, 0.002, 0.99, -0.0031234567, 0.0, 0.0, 1.0),
            gyro_bias: Vector3::new(-3.25, 1.5, 0.0000004),
            gyro_scale: Vector3::new(0.0174533, 1.0, 1.0),
        }
    }

    #[test]
    fn json_round_trip_within_tolerance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calibration.json");
        let original = params();

        original.save_json(&path).unwrap();
        let loaded = CalibrationParameters::load_json(&path).unwrap();

        assert_abs_diff_eq!(loaded.accel_bias, original.accel_bias, epsilon = 1e-6);
        assert_abs_diff_eq!(loaded.accel_matrix, original.accel_matrix, epsilon = 1e-6);
        assert_abs_diff_eq!(loaded.gyro_bias, original.gyro_bias, epsilon = 1e-6);
        assert_abs_diff_eq!(loaded.gyro_scale, original.gyro_scale, epsilon = 1e-6);
    }

    #[test]
    fn json_matrix_is_row_major() {
        let json = r#"{
            "accel": { "bias": [0, 0, 0], "matrix": [[1, 2, 3], [4, 5, 6], [7, 8, 10]] },
            "gyro": { "bias": [0, 0, 0], "scale": [1, 1, 1] }
        }"#;
        let params = CalibrationParameters::from_json(json).unwrap();
        assert_eq!(params.accel_matrix[(0, 1)], 2.0);
        assert_eq!(params.accel_matrix[(1, 0)], 4.0);
        assert_eq!(params.accel_matrix[(2, 2)], 10.0);
    }

    #[test]
    fn json_values_are_rounded() {
        let json = params().to_json().unwrap();
        assert!(json.contains("0.123457"));
        assert!(!json.contains("0.1234567"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = CalibrationParameters::load_json(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, CalibrationLoadError::Io { .. }));
    }

    #[test]
    fn missing_gyro_section_is_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{"accel": {"bias": [0,0,0], "matrix": [[1,0,0],[0,1,0],[0,0,1]]}}"#)
            .unwrap();
        let err = CalibrationParameters::load_json(&path).unwrap_err();
        assert!(matches!(err, CalibrationLoadError::Json { .. }));
    }

    #[test]
    fn update_creates_file_with_identity_remainder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calibration.json");

        update_json(&path, |p| p.gyro_bias = Vector3::new(0.5, -1.0, 2.0)).unwrap();

        let loaded = CalibrationParameters::load_json(&path).unwrap();
        assert_eq!(loaded.gyro_bias, Vector3::new(0.5, -1.0, 2.0));
        assert_eq!(loaded.gyro_scale, Vector3::new(1.0, 1.0, 1.0));
        assert_eq!(loaded.accel_bias, Vector3::zeros());
        assert_eq!(loaded.accel_matrix, Matrix3::identity());
    }

    #[test]
    fn update_keeps_the_other_half() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calibration.json");
        let fitted = params();

        update_json(&path, |p| {
            p.accel_bias = fitted.accel_bias;
            p.accel_matrix = fitted.accel_matrix;
        })
        .unwrap();
        let merged = update_json(&path, |p| p.gyro_bias = fitted.gyro_bias).unwrap();

        let loaded = CalibrationParameters::load_json(&path).unwrap();
        assert_abs_diff_eq!(loaded.accel_bias, fitted.accel_bias, epsilon = 1e-6);
        assert_abs_diff_eq!(loaded.accel_matrix, fitted.accel_matrix, epsilon = 1e-6);
        assert_abs_diff_eq!(loaded.gyro_bias, fitted.gyro_bias, epsilon = 1e-6);
        assert_eq!(loaded.gyro_scale, Vector3::new(1.0, 1.0, 1.0));
        assert_abs_diff_eq!(merged.accel_matrix, loaded.accel_matrix, epsilon = 1e-6);
    }

    #[test]
    fn update_refuses_to_overwrite_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calibration.json");
        std::fs::write(&path, "not json").unwrap();

        let err = update_json(&path, |p| p.gyro_bias = Vector3::x()).unwrap_err();
        assert!(matches!(err, CalibrationLoadError::Json { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "not json");
    }

    #[test]
    fn blob_layout_is_packed_little_endian() {
        let blob = CalibrationBlob {
            gyro_bias: [1.0, -2.0, 3.5],
            gyro_scale: [0.5, 0.25, 1.0],
            alpha: 0.2,
            mouse_k: 0.1,
        };
        let bytes = blob.to_bytes();
        assert_eq!(bytes.len(), 32);
        assert_eq!(&bytes[0..4], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[4..8], &(-2.0f32).to_le_bytes());
        assert_eq!(&bytes[12..16], &0.5f32.to_le_bytes());
        assert_eq!(&bytes[24..28], &0.2f32.to_le_bytes());
        assert_eq!(&bytes[28..32], &0.1f32.to_le_bytes());
        assert_eq!(CalibrationBlob::from_bytes(&bytes).unwrap(), blob);
    }

    #[test]
    fn blob_accepts_trailing_bytes_and_rejects_short() {
        let blob = CalibrationBlob::from_parameters(&params(), 0.2, 0.5);
        let mut bytes = blob.to_bytes().to_vec();
        bytes.extend_from_slice(&[0xff; 4]);
        assert_eq!(CalibrationBlob::from_bytes(&bytes).unwrap(), blob);

        assert!(matches!(
            CalibrationBlob::from_bytes(&bytes[..31]),
            Err(CalibrationLoadError::BlobTooShort { len: 31, .. })
        ));
    }

    #[test]
    fn blob_limits() {
        let good = CalibrationBlob::from_parameters(&params(), 0.2, 0.5);
        good.validate().unwrap();

        let mut bad = good;
        bad.gyro_bias[1] = 150.0;
        assert!(matches!(
            bad.validate(),
            Err(CalibrationLoadError::BlobOutOfRange { field: "gyro_bias", .. })
        ));

        let mut bad = good;
        bad.gyro_scale[2] = -11.0;
        assert!(bad.validate().is_err());

        let mut bad = good;
        bad.alpha = 1.5;
        assert!(bad.validate().is_err());

        let mut bad = good;
        bad.mouse_k = f32::NAN;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn blob_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calib.bin");
        let blob = CalibrationBlob::from_parameters(&params(), 0.2, 0.5);
        blob.save(&path).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 32);
        assert_eq!(CalibrationBlob::load(&path).unwrap(), blob);
    }
}
