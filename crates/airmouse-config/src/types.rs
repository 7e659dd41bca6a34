use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Calibration JSON produced by `airmouse-calibrate`.
    /// `None` means it must be supplied on the command line.
    pub calibration_path: Option<PathBuf>,
    /// Sensor fusion and clock configuration.
    pub imu: ImuConfig,
    /// Sensor-to-device axis remap.
    pub alignment: AlignmentConfig,
    /// Pointer mapping.
    pub mouse: MouseConfig,
}

impl AppConfig {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let imu = &self.imu;
        ensure!(
            imu.lpf_alpha > 0.0 && imu.lpf_alpha <= 1.0,
            "imu.lpf_alpha must be in (0, 1], got {}",
            imu.lpf_alpha
        );
        ensure!(
            imu.madgwick_beta.is_finite() && imu.madgwick_beta > 0.0,
            "imu.madgwick_beta must be positive, got {}",
            imu.madgwick_beta
        );
        ensure!(
            imu.ticks_per_unit.is_finite() && imu.ticks_per_unit > 0.0,
            "imu.ticks_per_unit must be positive, got {}",
            imu.ticks_per_unit
        );
        ensure!(
            imu.unit_seconds.is_finite() && imu.unit_seconds > 0.0,
            "imu.unit_seconds must be positive, got {}",
            imu.unit_seconds
        );

        let mouse = &self.mouse;
        ensure!(
            mouse.yaw_axis < 3 && mouse.pitch_axis < 3,
            "mouse axes must be 0, 1 or 2 (yaw_axis={}, pitch_axis={})",
            mouse.yaw_axis,
            mouse.pitch_axis
        );
        ensure!(
            mouse.sensitivity_x.is_finite() && mouse.sensitivity_y.is_finite(),
            "mouse sensitivities must be finite"
        );
        if let Some(threshold) = mouse.activation_threshold {
            ensure!(
                threshold.is_finite() && threshold >= 0.0,
                "mouse.activation_threshold must be non-negative, got {threshold}"
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImuConfig {
    /// Madgwick filter beta parameter (convergence speed). Higher = more responsive, less smooth.
    pub madgwick_beta: f64,
    /// Gyro low-pass smoothing factor in (0, 1]. 1.0 disables smoothing.
    pub lpf_alpha: f64,
    /// Sample counter ticks per clock unit.
    pub ticks_per_unit: f64,
    /// Length of one clock unit in seconds.
    pub unit_seconds: f64,
    /// Units the calibrated gyro is expressed in.
    pub gyro_units: GyroUnits,
    /// Whether the smoothed or raw gyro feeds the orientation filter.
    pub filter_order: FilterOrder,
}

impl Default for ImuConfig {
    fn default() -> Self {
        Self {
            madgwick_beta: 0.1,
            lpf_alpha: 0.2,
            ticks_per_unit: 256.0,
            unit_seconds: 0.02,
            gyro_units: GyroUnits::DegreesPerSecond,
            filter_order: FilterOrder::FuseUnfiltered,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GyroUnits {
    DegreesPerSecond,
    RadiansPerSecond,
}

impl GyroUnits {
    /// Factor converting a calibrated reading to rad/s.
    pub fn to_radians_factor(self) -> f64 {
        match self {
            GyroUnits::DegreesPerSecond => std::f64::consts::PI / 180.0,
            GyroUnits::RadiansPerSecond => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOrder {
    /// Low-pass only on the pointer branch; fusion sees the unsmoothed gyro.
    FuseUnfiltered,
    /// Fusion consumes the smoothed gyro as well.
    FuseFiltered,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    /// Row-major signed permutation matrix applied as `v' = R * v`.
    pub matrix: [[f64; 3]; 3],
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            // new X = -old Y, new Y = -old X, new Z = -old Z
            matrix: [[0.0, -1.0, 0.0], [-1.0, 0.0, 0.0], [0.0, 0.0, -1.0]],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MouseConfig {
    /// Which motion-to-pointer mapping to run.
    pub strategy: MotionStrategy,
    /// Horizontal pixels per rad/s.
    pub sensitivity_x: f64,
    /// Vertical pixels per rad/s.
    pub sensitivity_y: f64,
    /// Aligned gyro axis driving horizontal motion (rate strategy).
    pub yaw_axis: usize,
    /// Aligned gyro axis driving vertical motion (rate strategy).
    pub pitch_axis: usize,
    /// Keep the pointer still until a rate above this (rad/s) is seen.
    pub activation_threshold: Option<f64>,
}

impl Default for MouseConfig {
    fn default() -> Self {
        Self {
            strategy: MotionStrategy::Rate,
            sensitivity_x: 30.0,
            sensitivity_y: 30.0,
            yaw_axis: 2,
            pitch_axis: 1,
            activation_threshold: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionStrategy {
    /// Pointer follows the smoothed angular velocity directly.
    Rate,
    /// Pointer follows the change of pitch/yaw between fused orientations.
    AngleDelta,
}
