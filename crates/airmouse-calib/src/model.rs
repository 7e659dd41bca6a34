use nalgebra::{Matrix3, Vector3};

/// Bias and scale corrections for one sensor unit.
///
/// Immutable once built; share it across threads behind an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationParameters {
    /// Accelerometer offset in raw units, subtracted before scaling.
    pub accel_bias: Vector3<f64>,
    /// Accelerometer scale/misalignment, mapping raw units to m/s^2.
    pub accel_matrix: Matrix3<f64>,
    /// Gyroscope offset in raw units.
    pub gyro_bias: Vector3<f64>,
    /// Per-axis gyroscope scale.
    pub gyro_scale: Vector3<f64>,
}

impl Default for CalibrationParameters {
    fn default() -> Self {
        Self {
            accel_bias: Vector3::zeros(),
            accel_matrix: Matrix3::identity(),
            gyro_bias: Vector3::zeros(),
            gyro_scale: Vector3::repeat(1.0),
        }
    }
}

impl CalibrationParameters {
    /// `M * (raw - b)`
    pub fn correct_accel(&self, raw: &Vector3<f64>) -> Vector3<f64> {
        self.accel_matrix * (raw - self.accel_bias)
    }

    /// `(raw - b) ⊙ s`
    pub fn correct_gyro(&self, raw: &Vector3<f64>) -> Vector3<f64> {
        (raw - self.gyro_bias).component_mul(&self.gyro_scale)
    }

    /// Determinant of the accelerometer matrix. Values near zero mean the
    /// correction collapses a direction and the fit should not be trusted.
    pub fn accel_determinant(&self) -> f64 {
        self.accel_matrix.determinant()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_params() -> CalibrationParameters {
        CalibrationParameters {
            accel_bias: Vector3::new(12.0, -7.5, 30.0),
            accel_matrix: Matrix3::new(0.0024, 0.0001, 0.0, -0.0001, 0.0023, 0.00002, 0.0, 0.0, 0.0025),
            gyro_bias: Vector3::new(3.0, -2.0, 1.0),
            gyro_scale: Vector3::new(0.07, 0.07, 0.06),
        }
    }

    #[test]
    fn bias_maps_to_origin() {
        let params = sample_params();
        let corrected = params.correct_accel(&params.accel_bias);
        assert_relative_eq!(corrected, Vector3::zeros());
    }

    #[test]
    fn accel_applies_matrix_after_bias() {
        let params = sample_params();
        let raw = Vector3::new(112.0, -7.5, 30.0);
        let corrected = params.correct_accel(&raw);
        assert_relative_eq!(corrected.x, 0.24, epsilon = 1e-12);
        assert_relative_eq!(corrected.y, -0.01, epsilon = 1e-12);
        assert_relative_eq!(corrected.z, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn gyro_is_elementwise() {
        let params = sample_params();
        let corrected = params.correct_gyro(&Vector3::new(13.0, 8.0, 11.0));
        assert_relative_eq!(corrected, Vector3::new(0.7, 0.7, 0.6), epsilon = 1e-12);
    }

    #[test]
    fn default_is_identity() {
        let params = CalibrationParameters::default();
        let raw = Vector3::new(1.0, -2.0, 9.5);
        assert_eq!(params.correct_accel(&raw), raw);
        assert_eq!(params.correct_gyro(&raw), raw);
        assert_relative_eq!(params.accel_determinant(), 1.0);
    }
}
