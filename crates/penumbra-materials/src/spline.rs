//! Cubic spline interpolation for smooth material property curves.
//!
//! Mass attenuation coefficients are tabulated at a handful of photon
//! energies and fall off roughly as a power law between absorption edges.
//! They are therefore interpolated with a natural cubic spline in log-log
//! space ([`LogLogSpline`]), which is exact for a pure power law.

use crate::provider::MaterialError;

/// A natural cubic spline interpolator for real-valued data.
///
/// Given $n$ data points $(x_i, y_i)$, constructs piecewise cubic polynomials
/// with continuous first and second derivatives and zero curvature at both
/// ends.
#[derive(Debug, Clone)]
pub struct CubicSpline {
    /// Sorted x values (knots).
    xs: Vec<f64>,
    /// Corresponding y values.
    ys: Vec<f64>,
    /// Second derivatives at each knot.
    y2s: Vec<f64>,
}

impl CubicSpline {
    /// Construct a natural cubic spline from data points.
    ///
    /// # Arguments
    /// * `xs` - Strictly increasing x values.
    /// * `ys` - Corresponding y values (same length as `xs`).
    ///
    /// # Errors
    /// [`MaterialError::DataError`] if the lengths differ, fewer than 2 points
    /// are given, or `xs` is not strictly increasing.
    pub fn new(xs: Vec<f64>, ys: Vec<f64>) -> Result<Self, MaterialError> {
        if xs.len() != ys.len() {
            return Err(MaterialError::DataError(format!(
                "{} knots but {} values",
                xs.len(),
                ys.len()
            )));
        }
        if xs.len() < 2 {
            return Err(MaterialError::DataError("Need at least 2 data points".into()));
        }
        if let Some(i) = (1..xs.len()).find(|&i| xs[i] <= xs[i - 1]) {
            return Err(MaterialError::DataError(format!(
                "Knots must be strictly increasing at index {}",
                i
            )));
        }

        let n = xs.len();
        let mut y2s = vec![0.0; n];
        let mut u = vec![0.0; n - 1];

        // Forward sweep (tridiagonal system for natural spline)
        for i in 1..n - 1 {
            let sig = (xs[i] - xs[i - 1]) / (xs[i + 1] - xs[i - 1]);
            let p = sig * y2s[i - 1] + 2.0;
            y2s[i] = (sig - 1.0) / p;
            u[i] = (ys[i + 1] - ys[i]) / (xs[i + 1] - xs[i])
                - (ys[i] - ys[i - 1]) / (xs[i] - xs[i - 1]);
            u[i] = (6.0 * u[i] / (xs[i + 1] - xs[i - 1]) - sig * u[i - 1]) / p;
        }

        // Back substitution
        for k in (0..n - 2).rev() {
            y2s[k + 1] = y2s[k + 1] * y2s[k + 2] + u[k + 1];
        }

        Ok(Self { xs, ys, y2s })
    }

    /// First and last knot.
    pub fn range(&self) -> (f64, f64) {
        (self.xs[0], self.xs[self.xs.len() - 1])
    }

    /// Evaluate the spline at `x`.
    ///
    /// Extrapolation beyond the data range uses the boundary polynomial.
    pub fn evaluate(&self, x: f64) -> f64 {
        let n = self.xs.len();
        let hi = self.xs.partition_point(|&k| k <= x).clamp(1, n - 1);
        let lo = hi - 1;

        let h = self.xs[hi] - self.xs[lo];
        let a = (self.xs[hi] - x) / h;
        let b = (x - self.xs[lo]) / h;

        a * self.ys[lo]
            + b * self.ys[hi]
            + ((a * a * a - a) * self.y2s[lo] + (b * b * b - b) * self.y2s[hi]) * h * h / 6.0
    }
}

/// Natural cubic spline through $(\ln x_i, \ln y_i)$.
#[derive(Debug, Clone)]
pub struct LogLogSpline {
    inner: CubicSpline,
}

impl LogLogSpline {
    /// Both `xs` and `ys` must be strictly positive.
    pub fn new(xs: &[f64], ys: &[f64]) -> Result<Self, MaterialError> {
        if xs.iter().chain(ys.iter()).any(|&v| v <= 0.0 || !v.is_finite()) {
            return Err(MaterialError::DataError(
                "Log-log interpolation needs strictly positive data".into(),
            ));
        }
        let lx = xs.iter().map(|v| v.ln()).collect();
        let ly = ys.iter().map(|v| v.ln()).collect();
        Ok(Self {
            inner: CubicSpline::new(lx, ly)?,
        })
    }

    pub fn range(&self) -> (f64, f64) {
        let (lo, hi) = self.inner.range();
        (lo.exp(), hi.exp())
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        self.inner.evaluate(x.ln()).exp()
    }
}
