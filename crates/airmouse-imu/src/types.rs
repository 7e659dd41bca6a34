use glam::DQuat;
use nalgebra::{UnitQuaternion, Vector3};

/// One synchronized reading from the device layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Hardware sample counter, wraps at 65536.
    pub counter: u16,
    /// Raw accelerometer reading (sensor units).
    pub accel: Vector3<f64>,
    /// Raw gyroscope reading (sensor units).
    pub gyro: Vector3<f64>,
}

impl Sample {
    pub fn is_finite(&self) -> bool {
        self.accel.iter().chain(self.gyro.iter()).all(|v| v.is_finite())
    }
}

/// Fused orientation snapshot published to consumers such as a renderer.
#[derive(Debug, Clone, Copy)]
pub struct Orientation {
    /// Device orientation as a unit quaternion.
    pub quaternion: DQuat,
    /// False until the estimator has initialised from gravity.
    pub tracking: bool,
    /// Samples processed when this snapshot was taken.
    pub samples: u64,
}

impl Default for Orientation {
    fn default() -> Self {
        Self {
            quaternion: DQuat::IDENTITY,
            tracking: false,
            samples: 0,
        }
    }
}

impl Orientation {
    pub fn from_unit(q: &UnitQuaternion<f64>, samples: u64) -> Self {
        Self {
            quaternion: DQuat::from_xyzw(q.i, q.j, q.k, q.w),
            tracking: true,
            samples,
        }
    }

    pub fn euler(&self) -> EulerAngles {
        let q = self.quaternion;
        EulerAngles::from_wxyz(q.w, q.x, q.y, q.z)
    }
}

/// Roll/pitch/yaw in radians, aerospace (Z-Y-X) convention.
///
/// Only for reporting and pointer mapping; the estimator never stores these.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EulerAngles {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl EulerAngles {
    pub fn from_quaternion(q: &UnitQuaternion<f64>) -> Self {
        Self::from_wxyz(q.w, q.i, q.j, q.k)
    }

    fn from_wxyz(w: f64, x: f64, y: f64, z: f64) -> Self {
        let roll = (2.0 * (w * x + y * z)).atan2(1.0 - 2.0 * (x * x + y * y));
        // Clamp: rounding can push the sine just past +-1 at gimbal lock.
        let pitch = (2.0 * (w * y - z * x)).clamp(-1.0, 1.0).asin();
        let yaw = (2.0 * (w * z + x * y)).atan2(1.0 - 2.0 * (y * y + z * z));
        Self { roll, pitch, yaw }
    }
}
