//! Offline calibration fits.
//!
//! The accelerometer fit finds bias `b` and matrix `M` minimising
//! `sum_i (|M (raw_i - b)| - g)^2` with a Levenberg-Marquardt loop over the
//! 12 parameters `[b_x, b_y, b_z, M00, M01, M02, M10, .., M22]`. The
//! residuals are accumulated straight into the 12x12 normal equations so the
//! sample count never sizes a Jacobian.
//!
//! `|M d|` is unchanged when `M` is replaced by `R M` for any rotation `R`, so
//! the fitted matrix is reported in its symmetric polar form `sqrt(M^T M)`.

use crate::error::CalibrationError;
use crate::model::CalibrationParameters;
use nalgebra::{Cholesky, Matrix3, SMatrix, SVector, Vector3};
use tracing::{debug, info, warn};

/// Standard gravity in m/s^2; the target norm of every corrected sample.
pub const STANDARD_GRAVITY: f64 = 9.80665;

/// Fewest samples the accelerometer fit accepts.
pub const MIN_ACCEL_SAMPLES: usize = 6;

/// Conditioning above which the sample cloud is reported as poorly spread.
pub const POOR_CONDITIONING: f64 = 100.0;

const MAX_ITERATIONS: usize = 200;
const STEP_TOLERANCE: f64 = 1e-12;
const GRADIENT_TOLERANCE: f64 = 1e-12;
const INITIAL_LAMBDA: f64 = 1e-3;
const LAMBDA_SCALE_UP: f64 = 10.0;
const LAMBDA_SCALE_DOWN: f64 = 0.1;
const MAX_LAMBDA: f64 = 1e12;

const N_PARAMS: usize = 12;
type Params = SVector<f64, N_PARAMS>;
type Normal = SMatrix<f64, N_PARAMS, N_PARAMS>;

/// Quality figures for an accelerometer fit. The solver never rejects a fit;
/// callers decide what is good enough.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitReport {
    pub iterations: usize,
    pub converged: bool,
    /// RMS of `|corrected| - g` over all samples, m/s^2.
    pub rms_residual: f64,
    pub max_abs_residual: f64,
    /// Largest over smallest singular value of the mean-centred samples.
    /// Infinite when the samples span fewer than three dimensions.
    pub conditioning: f64,
}

/// Result of [`fit_accel`].
#[derive(Debug, Clone)]
pub struct AccelFit {
    pub bias: Vector3<f64>,
    pub matrix: Matrix3<f64>,
    pub report: FitReport,
}

impl AccelFit {
    /// Overwrite the accelerometer part of `params` with this fit.
    pub fn apply_to(&self, params: &mut CalibrationParameters) {
        params.accel_bias = self.bias;
        params.accel_matrix = self.matrix;
    }
}

/// Fit accelerometer bias and scale/misalignment from static samples taken
/// in several distinct orientations.
///
/// Starts from `b = mean(samples)`, `M = I`. Degenerate sample sets (all in
/// one orientation) still return a fit; check [`FitReport::conditioning`].
pub fn fit_accel(samples: &[Vector3<f64>]) -> Result<AccelFit, CalibrationError> {
    if samples.len() < MIN_ACCEL_SAMPLES {
        return Err(CalibrationError::InsufficientSamples {
            required: MIN_ACCEL_SAMPLES,
            actual: samples.len(),
        });
    }

    let mean = samples.iter().sum::<Vector3<f64>>() / samples.len() as f64;
    let conditioning = sample_conditioning(samples, &mean);
    if conditioning > POOR_CONDITIONING {
        warn!(
            conditioning,
            "Accelerometer samples cover few orientations; fit may be a poor local minimum"
        );
    }

    let mut params = Params::zeros();
    params.fixed_rows_mut::<3>(0).copy_from(&mean);
    params[3] = 1.0;
    params[7] = 1.0;
    params[11] = 1.0;

    let (mut jtj, mut jtr, mut cost, mut active) = normal_equations(&params, samples);
    let mut lambda = INITIAL_LAMBDA;
    let mut converged = false;
    let mut iterations = 0;

    for iteration in 0..MAX_ITERATIONS {
        iterations = iteration + 1;

        if jtr.amax() <= GRADIENT_TOLERANCE * (1.0 + cost) {
            // A zero gradient with no usable rows is a stall, not a minimum.
            converged = active > 0;
            break;
        }

        let mut damped = jtj;
        for i in 0..N_PARAMS {
            damped[(i, i)] += lambda * jtj[(i, i)].max(1.0);
        }
        let cholesky =
            Cholesky::new(damped).ok_or(CalibrationError::SingularSystem { iteration })?;
        let step = cholesky.solve(&(-jtr));
        let candidate = params + step;

        let (next_jtj, next_jtr, next_cost, next_active) = normal_equations(&candidate, samples);
        if next_cost < cost {
            params = candidate;
            jtj = next_jtj;
            jtr = next_jtr;
            cost = next_cost;
            active = next_active;
            lambda *= LAMBDA_SCALE_DOWN;
            debug!(iteration, cost, lambda, "Accepted step");

            if step.norm() <= STEP_TOLERANCE * (params.norm() + STEP_TOLERANCE) {
                converged = true;
                break;
            }
        } else {
            lambda *= LAMBDA_SCALE_UP;
            if !lambda.is_finite() || lambda > MAX_LAMBDA {
                debug!(iteration, cost, "Damping diverged; stopping at current estimate");
                break;
            }
        }
    }

    let bias = Vector3::new(params[0], params[1], params[2]);
    let matrix = symmetric_polar(&matrix_of(&params));

    let residuals: Vec<f64> = samples
        .iter()
        .map(|raw| (matrix * (raw - bias)).norm() - STANDARD_GRAVITY)
        .collect();
    let rms_residual =
        (residuals.iter().map(|r| r * r).sum::<f64>() / residuals.len() as f64).sqrt();
    let max_abs_residual = residuals.iter().fold(0.0_f64, |acc, r| acc.max(r.abs()));

    let report = FitReport {
        iterations,
        converged,
        rms_residual,
        max_abs_residual,
        conditioning,
    };
    info!(
        samples = samples.len(),
        iterations, converged, rms_residual, max_abs_residual, "Accelerometer fit complete"
    );

    Ok(AccelFit {
        bias,
        matrix,
        report,
    })
}

/// Gyroscope bias as the per-axis mean of samples captured while the device
/// was stationary. Every sample must have exactly three components.
pub fn fit_gyro_bias<S: AsRef<[f64]>>(samples: &[S]) -> Result<Vector3<f64>, CalibrationError> {
    if samples.is_empty() {
        return Err(CalibrationError::InsufficientSamples {
            required: 1,
            actual: 0,
        });
    }

    let mut sum = Vector3::zeros();
    for (index, sample) in samples.iter().enumerate() {
        let sample = sample.as_ref();
        if sample.len() != 3 {
            return Err(CalibrationError::InvalidShape {
                index,
                len: sample.len(),
            });
        }
        sum += Vector3::from_column_slice(sample);
    }

    let bias = sum / samples.len() as f64;
    info!(
        samples = samples.len(),
        bias_x = bias.x,
        bias_y = bias.y,
        bias_z = bias.z,
        "Gyro bias computed"
    );
    Ok(bias)
}

fn matrix_of(params: &Params) -> Matrix3<f64> {
    Matrix3::from_row_slice(&params.as_slice()[3..])
}

/// Residual sum of squares plus `J^T J` and `J^T r` at `params`, and the
/// number of samples that contributed a Jacobian row.
fn normal_equations(params: &Params, samples: &[Vector3<f64>]) -> (Normal, Params, f64, usize) {
    let bias = Vector3::new(params[0], params[1], params[2]);
    let m = matrix_of(params);

    let mut jtj = Normal::zeros();
    let mut jtr = Params::zeros();
    let mut cost = 0.0;
    let mut active = 0;

    for raw in samples {
        let d = raw - bias;
        let c = m * d;
        let norm = c.norm();
        let r = norm - STANDARD_GRAVITY;
        cost += r * r;

        // Gradient of |c| is undefined at the origin.
        if norm <= f64::EPSILON {
            continue;
        }

        let mut row = Params::zeros();
        let d_bias = -(m.transpose() * c) / norm;
        row.fixed_rows_mut::<3>(0).copy_from(&d_bias);
        for j in 0..3 {
            for k in 0..3 {
                row[3 + 3 * j + k] = c[j] * d[k] / norm;
            }
        }

        jtj += row * row.transpose();
        jtr += row * r;
        active += 1;
    }

    (jtj, jtr, cost, active)
}

/// `V S V^T` from `M = U S V^T`; satisfies `|P d| == |M d|` for every `d`.
fn symmetric_polar(m: &Matrix3<f64>) -> Matrix3<f64> {
    let svd = m.svd(false, true);
    match svd.v_t {
        Some(v_t) => v_t.transpose() * Matrix3::from_diagonal(&svd.singular_values) * v_t,
        None => *m,
    }
}

fn sample_conditioning(samples: &[Vector3<f64>], mean: &Vector3<f64>) -> f64 {
    let scatter = samples
        .iter()
        .map(|s| {
            let d = s - mean;
            d * d.transpose()
        })
        .sum::<Matrix3<f64>>();

    let eigenvalues = scatter.symmetric_eigen().eigenvalues;
    let largest = eigenvalues.max();
    let smallest = eigenvalues.min();
    if smallest <= largest * f64::EPSILON || smallest <= 0.0 {
        return f64::INFINITY;
    }
    (largest / smallest).sqrt()
}
