use nalgebra::Vector3;

/// Single-pole exponential smoothing of a 3-vector stream.
///
/// `prev' = alpha * input + (1 - alpha) * prev`, starting from zero.
#[derive(Debug, Clone)]
pub struct LowPassFilter {
    alpha: f64,
    prev: Vector3<f64>,
}

impl LowPassFilter {
    pub const DEFAULT_ALPHA: f64 = 0.2;

    /// `alpha` must be in (0, 1].
    pub fn new(alpha: f64) -> Self {
        debug_assert!(alpha > 0.0 && alpha <= 1.0, "alpha out of range: {alpha}");
        Self {
            alpha,
            prev: Vector3::zeros(),
        }
    }

    pub fn filter(&mut self, input: &Vector3<f64>) -> Vector3<f64> {
        self.prev = input * self.alpha + self.prev * (1.0 - self.alpha);
        self.prev
    }

    pub fn value(&self) -> Vector3<f64> {
        self.prev
    }

    pub fn reset(&mut self) {
        self.prev = Vector3::zeros();
    }
}

impl Default for LowPassFilter {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ALPHA)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converges_geometrically() {
        let x = Vector3::new(1.0, -2.0, 0.5);
        let mut lpf = LowPassFilter::default();
        let mut last_error = x.norm();

        for n in 1..=30 {
            let out = lpf.filter(&x);
            let error = (x - out).norm();
            let expected = 0.8_f64.powi(n) * x.norm();
            assert!((error - expected).abs() < 1e-12, "n={n}");
            assert!(error < last_error);
            last_error = error;
        }
    }

    #[test]
    fn alpha_one_passes_through() {
        let mut lpf = LowPassFilter::new(1.0);
        let x = Vector3::new(3.0, 4.0, 5.0);
        assert_eq!(lpf.filter(&x), x);
    }

    #[test]
    fn reset_returns_to_zero() {
        let mut lpf = LowPassFilter::default();
        lpf.filter(&Vector3::new(1.0, 1.0, 1.0));
        lpf.reset();
        assert_eq!(lpf.value(), Vector3::zeros());
    }
}
