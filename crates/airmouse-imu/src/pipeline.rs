use crate::align::{AlignmentError, FrameAligner};
use crate::clock::SampleClock;
use crate::filter::LowPassFilter;
use crate::fusion::OrientationEstimator;
use crate::types::{EulerAngles, Sample};
use airmouse_calib::CalibrationParameters;
use airmouse_config::{AppConfig, FilterOrder};
use airmouse_input::mouse::{MotionInput, MotionMapper};
use airmouse_input::PointerDelta;
use nalgebra::{UnitQuaternion, Vector3};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Samples that reached the orientation filter and updated it.
    pub processed: u64,
    /// Samples rejected as degenerate.
    pub dropped: u64,
}

/// Everything derived from one sample.
#[derive(Debug, Clone, Copy)]
pub struct PipelineOutput {
    /// Interval since the previous sample, `None` for the first.
    pub dt: Option<f64>,
    /// Calibrated, aligned acceleration.
    pub accel: Vector3<f64>,
    /// Calibrated, aligned angular velocity (rad/s).
    pub gyro: Vector3<f64>,
    /// Low-pass filtered `gyro`.
    pub smoothed_gyro: Vector3<f64>,
    /// Orientation after this sample, if it updated the estimator.
    pub orientation: Option<UnitQuaternion<f64>>,
    pub pointer: Option<PointerDelta>,
}

/// Per-sample processing chain: timing, calibration, alignment, smoothing,
/// fusion and pointer mapping. Owned by a single task.
pub struct Pipeline {
    calibration: Arc<CalibrationParameters>,
    clock: SampleClock,
    lpf: LowPassFilter,
    aligner: FrameAligner,
    estimator: OrientationEstimator,
    mapper: MotionMapper,
    gyro_to_radians: f64,
    filter_order: FilterOrder,
    stats: PipelineStats,
}

impl Pipeline {
    pub fn new(
        calibration: Arc<CalibrationParameters>,
        config: &AppConfig,
    ) -> Result<Self, AlignmentError> {
        let aligner = FrameAligner::new(config.alignment.matrix)?;
        tracing::debug!(
            beta = config.imu.madgwick_beta,
            lpf_alpha = config.imu.lpf_alpha,
            filter_order = ?config.imu.filter_order,
            strategy = ?config.mouse.strategy,
            "Building pipeline"
        );
        Ok(Self {
            calibration,
            clock: SampleClock::from_config(&config.imu),
            lpf: LowPassFilter::new(config.imu.lpf_alpha),
            aligner,
            estimator: OrientationEstimator::new(config.imu.madgwick_beta),
            mapper: MotionMapper::from_config(&config.mouse),
            gyro_to_radians: config.imu.gyro_units.to_radians_factor(),
            filter_order: config.imu.filter_order,
            stats: PipelineStats::default(),
        })
    }

    pub fn process(&mut self, sample: &Sample) -> PipelineOutput {
        let dt = self.clock.tick(sample.counter);

        if !sample.is_finite() {
            self.stats.dropped += 1;
            tracing::debug!(counter = sample.counter, "Dropping non-finite sample");
            return PipelineOutput {
                dt,
                accel: Vector3::zeros(),
                gyro: Vector3::zeros(),
                smoothed_gyro: self.lpf.value(),
                orientation: None,
                pointer: None,
            };
        }

        let accel = self
            .aligner
            .apply(&self.calibration.correct_accel(&sample.accel));
        let gyro = self
            .aligner
            .apply(&self.calibration.correct_gyro(&sample.gyro))
            * self.gyro_to_radians;
        let smoothed_gyro = self.lpf.filter(&gyro);

        let mut output = PipelineOutput {
            dt,
            accel,
            gyro,
            smoothed_gyro,
            orientation: None,
            pointer: None,
        };

        let Some(dt) = dt else {
            return output;
        };

        let fusion_gyro = match self.filter_order {
            FilterOrder::FuseUnfiltered => gyro,
            FilterOrder::FuseFiltered => smoothed_gyro,
        };
        let q = match self.estimator.update(&accel, &fusion_gyro, dt) {
            Ok(q) => q,
            Err(e) => {
                self.stats.dropped += 1;
                tracing::debug!(counter = sample.counter, %e, "Dropping sample");
                return output;
            }
        };
        self.stats.processed += 1;
        output.orientation = Some(q);

        let euler = EulerAngles::from_quaternion(&q);
        output.pointer = self.mapper.map(&MotionInput {
            angular_rate: smoothed_gyro,
            pitch: euler.pitch,
            yaw: euler.yaw,
            dt,
        });
        output
    }

    /// Forget timing, smoothing, orientation and pointer history.
    /// Calibration and configuration are kept.
    pub fn reset(&mut self) {
        self.clock.reset();
        self.lpf.reset();
        self.estimator.reset();
        self.mapper.reset();
        tracing::info!("Pipeline reset");
    }

    pub fn estimator(&self) -> &OrientationEstimator {
        &self.estimator
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }
}
