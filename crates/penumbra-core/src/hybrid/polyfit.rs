//! Least-squares polynomial fits of footprint quantities against screen
//! position.
//!
//! Abscissas are mapped to $t \in [-1, 1]$ before building the Vandermonde
//! matrix, and the system is solved through an SVD so that a rank-deficient
//! fit is reported instead of silently producing huge coefficients.

use nalgebra::{DMatrix, DVector};

use crate::error::HybridError;

/// Condition number above which a fit is rejected.
pub const MAX_CONDITION_NUMBER: f64 = 1e12;

/// Maximum number of points used in a fit; larger inputs are strided.
pub const FIT_SAMPLE_LIMIT: usize = 20_000;

/// A polynomial in the normalised variable $t = (x - c)/h$.
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    coefficients: Vec<f64>,
    centre: f64,
    half_range: f64,
}

impl Polynomial {
    /// Fit `y(x)` with a polynomial of the given degree.
    ///
    /// # Errors
    /// [`HybridError::IllConditionedFit`] if there are too few points, the
    /// abscissas have no spread, or the Vandermonde matrix is near-singular.
    pub fn fit(x: &[f64], y: &[f64], degree: usize) -> Result<Self, HybridError> {
        let n_coeff = degree + 1;
        if x.len() != y.len() || x.len() < n_coeff {
            return Err(HybridError::IllConditionedFit(format!(
                "{} points for a degree-{} fit",
                x.len().min(y.len()),
                degree
            )));
        }

        let (min, max) = x
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let centre = 0.5 * (min + max);
        let half_range = 0.5 * (max - min);
        if !(half_range > f64::EPSILON * centre.abs().max(f64::MIN_POSITIVE)) {
            return Err(HybridError::IllConditionedFit("abscissas have no spread".into()));
        }

        let stride = x.len().div_ceil(FIT_SAMPLE_LIMIT);
        let picked: Vec<usize> = (0..x.len()).step_by(stride).collect();
        let a = DMatrix::from_fn(picked.len(), n_coeff, |r, c| {
            ((x[picked[r]] - centre) / half_range).powi(c as i32)
        });
        let b = DVector::from_iterator(picked.len(), picked.iter().map(|&i| y[i]));

        let svd = a.svd(true, true);
        let s_max = svd.singular_values.max();
        let s_min = svd.singular_values.min();
        if !(s_min > 0.0) || s_max / s_min > MAX_CONDITION_NUMBER {
            return Err(HybridError::IllConditionedFit(format!(
                "condition number {:.3e} for a degree-{} fit",
                s_max / s_min,
                degree
            )));
        }
        let solution = svd
            .solve(&b, s_max * f64::EPSILON)
            .map_err(|e| HybridError::IllConditionedFit(e.to_string()))?;

        Ok(Self {
            coefficients: solution.iter().copied().collect(),
            centre,
            half_range,
        })
    }

    pub fn degree(&self) -> usize {
        self.coefficients.len() - 1
    }

    /// Evaluate at `x` (Horner scheme).
    pub fn evaluate(&self, x: f64) -> f64 {
        let t = (x - self.centre) / self.half_range;
        self.coefficients.iter().rev().fold(0.0, |acc, &c| acc * t + c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use penumbra_surface::linspace;

    #[test]
    fn test_recovers_cubic() {
        let x = linspace(-2e-4, 3e-4, 200);
        let f = |v: f64| 3e-3 + 2.0 * v - 50.0 * v * v + 1e4 * v * v * v;
        let y: Vec<f64> = x.iter().map(|&v| f(v)).collect();
        let p = Polynomial::fit(&x, &y, 3).unwrap();
        for &v in &[-1.5e-4, 0.0, 2.2e-4] {
            assert_abs_diff_eq!(p.evaluate(v), f(v), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_degree_six_on_linear_data() {
        let x = linspace(-1e-3, 1e-3, 500);
        let y: Vec<f64> = x.iter().map(|v| v / 3e-3).collect();
        let p = Polynomial::fit(&x, &y, 6).unwrap();
        assert_eq!(p.degree(), 6);
        assert_abs_diff_eq!(p.evaluate(5e-4), 5e-4 / 3e-3, epsilon = 1e-9);
    }

    #[test]
    fn test_constant_abscissa_rejected() {
        let x = vec![1e-3; 50];
        let y = vec![0.0; 50];
        assert!(matches!(
            Polynomial::fit(&x, &y, 3),
            Err(HybridError::IllConditionedFit(_))
        ));
    }

    #[test]
    fn test_too_few_points_rejected() {
        assert!(Polynomial::fit(&[0.0, 1.0, 2.0], &[0.0, 1.0, 4.0], 3).is_err());
    }
}
