use crate::PointerDelta;
use airmouse_config::{MotionStrategy, MouseConfig};
use nalgebra::Vector3;
use std::f64::consts::{PI, TAU};

/// Per-sample motion fed to a [`MotionMapper`].
#[derive(Debug, Clone, Copy)]
pub struct MotionInput {
    /// Smoothed, aligned angular velocity (rad/s).
    pub angular_rate: Vector3<f64>,
    /// Pitch of the fused orientation (rad).
    pub pitch: f64,
    /// Yaw of the fused orientation (rad).
    pub yaw: f64,
    /// Seconds since the previous sample.
    pub dt: f64,
}

/// Turns device motion into relative pointer motion.
#[derive(Debug, Clone)]
pub enum MotionMapper {
    Rate(RateMapper),
    AngleDelta(AngleDeltaMapper),
}

impl MotionMapper {
    pub fn from_config(config: &MouseConfig) -> Self {
        match config.strategy {
            MotionStrategy::Rate => MotionMapper::Rate(RateMapper {
                sensitivity_x: config.sensitivity_x,
                sensitivity_y: config.sensitivity_y,
                yaw_axis: config.yaw_axis.min(2),
                pitch_axis: config.pitch_axis.min(2),
                activation_threshold: config.activation_threshold,
                active: config.activation_threshold.is_none(),
            }),
            MotionStrategy::AngleDelta => MotionMapper::AngleDelta(AngleDeltaMapper {
                sensitivity_x: config.sensitivity_x,
                sensitivity_y: config.sensitivity_y,
                previous: None,
            }),
        }
    }

    /// Returns `None` when this sample produces no motion at all.
    pub fn map(&mut self, input: &MotionInput) -> Option<PointerDelta> {
        match self {
            MotionMapper::Rate(m) => m.map(&input.angular_rate),
            MotionMapper::AngleDelta(m) => m.map(input.pitch, input.yaw, input.dt),
        }
    }

    /// Forget history (previous angles, activation).
    pub fn reset(&mut self) {
        match self {
            MotionMapper::Rate(m) => m.active = m.activation_threshold.is_none(),
            MotionMapper::AngleDelta(m) => m.previous = None,
        }
    }
}

/// Pointer velocity proportional to angular velocity.
#[derive(Debug, Clone)]
pub struct RateMapper {
    sensitivity_x: f64,
    sensitivity_y: f64,
    yaw_axis: usize,
    pitch_axis: usize,
    activation_threshold: Option<f64>,
    active: bool,
}

impl RateMapper {
    fn map(&mut self, rate: &Vector3<f64>) -> Option<PointerDelta> {
        let yaw_rate = rate[self.yaw_axis];
        let pitch_rate = rate[self.pitch_axis];

        if !self.active {
            let threshold = self.activation_threshold.unwrap_or(0.0);
            if yaw_rate.abs() > threshold || pitch_rate.abs() > threshold {
                tracing::debug!(yaw_rate, pitch_rate, "Pointer activated");
                self.active = true;
            } else {
                return None;
            }
        }

        Some(PointerDelta::new(
            (-yaw_rate * self.sensitivity_x) as i32,
            (-pitch_rate * self.sensitivity_y) as i32,
        ))
    }
}

/// Pointer velocity from the change of fused pitch/yaw between samples.
#[derive(Debug, Clone)]
pub struct AngleDeltaMapper {
    sensitivity_x: f64,
    sensitivity_y: f64,
    /// (pitch, yaw) of the previous call.
    previous: Option<(f64, f64)>,
}

impl AngleDeltaMapper {
    fn map(&mut self, pitch: f64, yaw: f64, dt: f64) -> Option<PointerDelta> {
        let (prev_pitch, prev_yaw) = self.previous.replace((pitch, yaw))?;

        if !(dt.is_finite() && dt > 0.0) {
            return None;
        }

        let yaw_rate = wrap_angle(yaw - prev_yaw) / dt;
        let pitch_rate = wrap_angle(pitch - prev_pitch) / dt;

        Some(PointerDelta::new(
            (yaw_rate * self.sensitivity_x) as i32,
            (pitch_rate * self.sensitivity_y) as i32,
        ))
    }
}

/// Wrap an angle difference into (-pi, pi].
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}
