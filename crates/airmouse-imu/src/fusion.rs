use crate::types::EulerAngles;
use ahrs::{Ahrs, Madgwick};
use nalgebra::{UnitQuaternion, Vector3};
use thiserror::Error;

/// Accelerometer norms below this carry no usable gravity direction.
const MIN_ACCEL_NORM: f64 = 1e-6;

/// Why a sample could not update the orientation. The estimator state is
/// left untouched whenever one of these is returned.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum DegenerateSample {
    #[error("invalid sample interval {0} s")]
    InvalidInterval(f64),
    #[error("accelerometer norm is (near) zero")]
    ZeroAcceleration,
    #[error("non-finite sensor value")]
    NonFinite,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EstimatorState {
    Uninitialized,
    Tracking(UnitQuaternion<f64>),
}

/// Gradient-descent (Madgwick) orientation filter for an accel + gyro pair.
///
/// The first usable sample seeds roll and pitch from gravity with yaw fixed at
/// zero; every sample then runs one Madgwick step over its measured interval.
pub struct OrientationEstimator {
    beta: f64,
    state: EstimatorState,
}

impl OrientationEstimator {
    pub const DEFAULT_BETA: f64 = 0.1;

    pub fn new(beta: f64) -> Self {
        Self {
            beta,
            state: EstimatorState::Uninitialized,
        }
    }

    /// Fuse one corrected sample.
    ///
    /// `accel` in any unit (only its direction is used), `gyro` in rad/s,
    /// `dt` in seconds.
    pub fn update(
        &mut self,
        accel: &Vector3<f64>,
        gyro: &Vector3<f64>,
        dt: f64,
    ) -> Result<UnitQuaternion<f64>, DegenerateSample> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(DegenerateSample::InvalidInterval(dt));
        }
        if !accel.iter().chain(gyro.iter()).all(|v| v.is_finite()) {
            return Err(DegenerateSample::NonFinite);
        }
        if accel.norm() < MIN_ACCEL_NORM {
            return Err(DegenerateSample::ZeroAcceleration);
        }

        let current = match self.state {
            EstimatorState::Tracking(q) => q,
            EstimatorState::Uninitialized => {
                let q = initial_from_gravity(accel);
                let e = EulerAngles::from_quaternion(&q);
                tracing::info!(
                    roll = e.roll.to_degrees(),
                    pitch = e.pitch.to_degrees(),
                    "Orientation initialised from gravity"
                );
                q
            }
        };

        // The Madgwick step integrates over its sample period, so build it
        // for this interval around the current estimate.
        let mut filter = Madgwick::new_with_quat(dt, self.beta, current);
        let q = *filter
            .update_imu(gyro, accel)
            .map_err(|_| DegenerateSample::ZeroAcceleration)?;

        if !q.coords.iter().all(|c| c.is_finite()) {
            return Err(DegenerateSample::NonFinite);
        }

        self.state = EstimatorState::Tracking(q);
        Ok(q)
    }

    /// Back to `Uninitialized`; the next usable sample re-seeds from gravity.
    pub fn reset(&mut self) {
        self.state = EstimatorState::Uninitialized;
    }

    pub fn state(&self) -> EstimatorState {
        self.state
    }

    pub fn quaternion(&self) -> Option<UnitQuaternion<f64>> {
        match self.state {
            EstimatorState::Tracking(q) => Some(q),
            EstimatorState::Uninitialized => None,
        }
    }

    pub fn euler(&self) -> Option<EulerAngles> {
        self.quaternion().map(|q| EulerAngles::from_quaternion(&q))
    }

    pub fn is_tracking(&self) -> bool {
        matches!(self.state, EstimatorState::Tracking(_))
    }
}

impl Default for OrientationEstimator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BETA)
    }
}

/// Roll and pitch from the gravity direction, yaw = 0.
fn initial_from_gravity(accel: &Vector3<f64>) -> UnitQuaternion<f64> {
    let a = accel.normalize();
    let roll = a.y.atan2(a.z);
    let pitch = (-a.x).atan2((a.y * a.y + a.z * a.z).sqrt());
    UnitQuaternion::from_euler_angles(roll, pitch, 0.0)
}
