//! Sampled scalar fields in one and two dimensions.
//!
//! These are the workhorse containers for everything that lives on a grid in
//! the hybrid pipeline: screen intensity histograms, figure-error height
//! profiles, thickness-error maps, and diffraction kernels. Interpolation is
//! linear (1D) or bilinear (2D) and strictly range-checked: asking for a value
//! outside the sampled abscissas is an error, never a silent extrapolation.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by scalar-field construction and interpolation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FieldError {
    #[error("Coordinate {value:.6e} is outside the sampled range [{min:.6e}, {max:.6e}]")]
    OutOfRange { value: f64, min: f64, max: f64 },

    #[error("Abscissas must be strictly increasing (violated at index {index})")]
    NotMonotonic { index: usize },

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("At least {required} samples are required, got {found}")]
    TooFewSamples { required: usize, found: usize },

    #[error("Non-finite sample at index {index}")]
    NonFinite { index: usize },
}

/// Relative slack allowed at the ends of the sampled range, to absorb the
/// rounding of grids generated as `min + i * step`.
const RANGE_SLACK: f64 = 1e-9;

fn check_abscissas(abscissas: &[f64]) -> Result<(), FieldError> {
    if abscissas.len() < 2 {
        return Err(FieldError::TooFewSamples {
            required: 2,
            found: abscissas.len(),
        });
    }
    for (i, a) in abscissas.iter().enumerate() {
        if !a.is_finite() {
            return Err(FieldError::NonFinite { index: i });
        }
    }
    for i in 1..abscissas.len() {
        if abscissas[i] <= abscissas[i - 1] {
            return Err(FieldError::NotMonotonic { index: i });
        }
    }
    Ok(())
}

/// Evenly spaced grid of `n` points covering `[min, max]` inclusive.
pub fn linspace(min: f64, max: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![0.5 * (min + max)],
        _ => {
            let step = (max - min) / (n - 1) as f64;
            (0..n).map(|i| min + step * i as f64).collect()
        }
    }
}

/// Locate the interval `[i, i+1]` containing `x` and the fractional position
/// inside it. `x` must already be known to lie inside the range.
fn bracket(abscissas: &[f64], x: f64) -> (usize, f64) {
    let n = abscissas.len();
    let upper = abscissas.partition_point(|&a| a <= x).clamp(1, n - 1);
    let lo = upper - 1;
    let h = abscissas[upper] - abscissas[lo];
    let t = ((x - abscissas[lo]) / h).clamp(0.0, 1.0);
    (lo, t)
}

fn range_check(abscissas: &[f64], x: f64) -> Result<(), FieldError> {
    let min = abscissas[0];
    let max = abscissas[abscissas.len() - 1];
    let slack = RANGE_SLACK * (max - min);
    if !x.is_finite() || x < min - slack || x > max + slack {
        return Err(FieldError::OutOfRange { value: x, min, max });
    }
    Ok(())
}

/// A real-valued function sampled on a strictly increasing 1D grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarField1D {
    abscissas: Vec<f64>,
    values: Vec<f64>,
}

impl ScalarField1D {
    /// Construct from explicit abscissas and values.
    ///
    /// # Errors
    /// Fails if fewer than two samples are given, the lengths differ, or the
    /// abscissas are not strictly increasing.
    pub fn new(abscissas: Vec<f64>, values: Vec<f64>) -> Result<Self, FieldError> {
        if abscissas.len() != values.len() {
            return Err(FieldError::ShapeMismatch(format!(
                "{} abscissas but {} values",
                abscissas.len(),
                values.len()
            )));
        }
        check_abscissas(&abscissas)?;
        Ok(Self { abscissas, values })
    }

    /// Construct from values spread evenly over `[min, max]`.
    pub fn from_range(min: f64, max: f64, values: Vec<f64>) -> Result<Self, FieldError> {
        let abscissas = linspace(min, max, values.len());
        Self::new(abscissas, values)
    }

    pub fn abscissas(&self) -> &[f64] {
        &self.abscissas
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn min_abscissa(&self) -> f64 {
        self.abscissas[0]
    }

    pub fn max_abscissa(&self) -> f64 {
        self.abscissas[self.abscissas.len() - 1]
    }

    /// Span of the sampled abscissas.
    pub fn extent(&self) -> f64 {
        self.max_abscissa() - self.min_abscissa()
    }

    /// Linear interpolation at `x`.
    ///
    /// # Errors
    /// [`FieldError::OutOfRange`] if `x` lies outside the sampled abscissas.
    pub fn interpolate(&self, x: f64) -> Result<f64, FieldError> {
        range_check(&self.abscissas, x)?;
        let (i, t) = bracket(&self.abscissas, x);
        Ok(self.values[i] * (1.0 - t) + self.values[i + 1] * t)
    }

    /// Values on another grid. Points outside the sampled range are zero.
    pub fn resample_onto(&self, grid: &[f64]) -> Vec<f64> {
        let (min, max) = (self.min_abscissa(), self.max_abscissa());
        grid.iter()
            .map(|&x| {
                if !(min..=max).contains(&x) {
                    return 0.0;
                }
                let (i, t) = bracket(&self.abscissas, x);
                self.values[i] * (1.0 - t) + self.values[i + 1] * t
            })
            .collect()
    }

    /// Sum of all sample values.
    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Forward-difference slopes between consecutive samples.
    pub fn slopes(&self) -> Vec<f64> {
        self.abscissas
            .windows(2)
            .zip(self.values.windows(2))
            .map(|(a, v)| (v[1] - v[0]) / (a[1] - a[0]))
            .collect()
    }

    /// Root-mean-square slope of the sampled function.
    pub fn rms_slope(&self) -> f64 {
        let slopes = self.slopes();
        if slopes.is_empty() {
            return 0.0;
        }
        (slopes.iter().map(|s| s * s).sum::<f64>() / slopes.len() as f64).sqrt()
    }
}

/// A real-valued function sampled on a rectilinear 2D grid.
///
/// `values[[i, j]]` is the sample at `(x[i], y[j])`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarField2D {
    x: Vec<f64>,
    y: Vec<f64>,
    values: Array2<f64>,
}

impl ScalarField2D {
    pub fn new(x: Vec<f64>, y: Vec<f64>, values: Array2<f64>) -> Result<Self, FieldError> {
        check_abscissas(&x)?;
        check_abscissas(&y)?;
        if values.dim() != (x.len(), y.len()) {
            return Err(FieldError::ShapeMismatch(format!(
                "grid is {}x{} but values are {:?}",
                x.len(),
                y.len(),
                values.dim()
            )));
        }
        Ok(Self { x, y, values })
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn dim(&self) -> (usize, usize) {
        self.values.dim()
    }

    /// Bilinear interpolation at `(x, y)`.
    pub fn interpolate(&self, x: f64, y: f64) -> Result<f64, FieldError> {
        range_check(&self.x, x)?;
        range_check(&self.y, y)?;
        let (i, tx) = bracket(&self.x, x);
        let (j, ty) = bracket(&self.y, y);
        let v00 = self.values[[i, j]];
        let v10 = self.values[[i + 1, j]];
        let v01 = self.values[[i, j + 1]];
        let v11 = self.values[[i + 1, j + 1]];
        Ok(v00 * (1.0 - tx) * (1.0 - ty) + v10 * tx * (1.0 - ty) + v01 * (1.0 - tx) * ty + v11 * tx * ty)
    }

    /// Values on the rectilinear grid `x` by `y`, zero outside the sampled
    /// rectangle.
    pub fn resample_onto(&self, x: &[f64], y: &[f64]) -> Array2<f64> {
        let inside = |a: &[f64], v: f64| (a[0]..=a[a.len() - 1]).contains(&v);
        Array2::from_shape_fn((x.len(), y.len()), |(i, j)| {
            let (u, v) = (x[i], y[j]);
            if !inside(&self.x, u) || !inside(&self.y, v) {
                return 0.0;
            }
            let (p, tx) = bracket(&self.x, u);
            let (q, ty) = bracket(&self.y, v);
            self.values[[p, q]] * (1.0 - tx) * (1.0 - ty)
                + self.values[[p + 1, q]] * tx * (1.0 - ty)
                + self.values[[p, q + 1]] * (1.0 - tx) * ty
                + self.values[[p + 1, q + 1]] * tx * ty
        })
    }

    /// Profile along `x` at fixed `y`.
    pub fn slice_along_x(&self, y: f64) -> Result<ScalarField1D, FieldError> {
        let values = self
            .x
            .iter()
            .map(|&xi| self.interpolate(xi, y))
            .collect::<Result<Vec<_>, _>>()?;
        ScalarField1D::new(self.x.clone(), values)
    }

    /// Profile along `y` at fixed `x`.
    pub fn slice_along_y(&self, x: f64) -> Result<ScalarField1D, FieldError> {
        let values = self
            .y
            .iter()
            .map(|&yj| self.interpolate(x, yj))
            .collect::<Result<Vec<_>, _>>()?;
        ScalarField1D::new(self.y.clone(), values)
    }

    /// Sum over `y`, giving a profile along `x`.
    pub fn marginal_x(&self) -> Result<ScalarField1D, FieldError> {
        let values = self.values.rows().into_iter().map(|row| row.sum()).collect();
        ScalarField1D::new(self.x.clone(), values)
    }

    /// Sum over `x`, giving a profile along `y`.
    pub fn marginal_y(&self) -> Result<ScalarField1D, FieldError> {
        let values = self.values.columns().into_iter().map(|col| col.sum()).collect();
        ScalarField1D::new(self.y.clone(), values)
    }

    /// RMS of the slopes along `x` over the whole grid.
    pub fn rms_slope_x(&self) -> f64 {
        let (nx, ny) = self.dim();
        let mut acc = 0.0;
        let mut count = 0usize;
        for i in 0..nx - 1 {
            let dx = self.x[i + 1] - self.x[i];
            for j in 0..ny {
                let s = (self.values[[i + 1, j]] - self.values[[i, j]]) / dx;
                acc += s * s;
                count += 1;
            }
        }
        if count == 0 {
            0.0
        } else {
            (acc / count as f64).sqrt()
        }
    }

    /// RMS of the slopes along `y` over the whole grid.
    pub fn rms_slope_y(&self) -> f64 {
        let (nx, ny) = self.dim();
        let mut acc = 0.0;
        let mut count = 0usize;
        for j in 0..ny - 1 {
            let dy = self.y[j + 1] - self.y[j];
            for i in 0..nx {
                let s = (self.values[[i, j + 1]] - self.values[[i, j]]) / dy;
                acc += s * s;
                count += 1;
            }
        }
        if count == 0 {
            0.0
        } else {
            (acc / count as f64).sqrt()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_linear_interpolation_between_samples() {
        let f = ScalarField1D::new(vec![0.0, 1.0, 3.0], vec![0.0, 2.0, 6.0]).unwrap();
        assert_abs_diff_eq!(f.interpolate(0.5).unwrap(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(f.interpolate(2.0).unwrap(), 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(f.interpolate(3.0).unwrap(), 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_out_of_range_is_an_error() {
        let f = ScalarField1D::from_range(-1.0, 1.0, vec![1.0; 5]).unwrap();
        match f.interpolate(1.5) {
            Err(FieldError::OutOfRange { min, max, .. }) => {
                assert_eq!(min, -1.0);
                assert_eq!(max, 1.0);
            }
            other => panic!("expected OutOfRange, got {:?}", other),
        }
    }

    #[test]
    fn test_non_monotonic_abscissas_rejected() {
        let err = ScalarField1D::new(vec![0.0, 2.0, 1.0], vec![0.0; 3]).unwrap_err();
        assert_eq!(err, FieldError::NotMonotonic { index: 2 });
    }

    #[test]
    fn test_rms_slope_of_a_ramp() {
        let x = linspace(0.0, 1.0, 11);
        let h: Vec<f64> = x.iter().map(|v| 3e-6 * v).collect();
        let f = ScalarField1D::new(x, h).unwrap();
        assert_abs_diff_eq!(f.rms_slope(), 3e-6, epsilon = 1e-15);
    }

    #[test]
    fn test_bilinear_reproduces_plane() {
        let x = linspace(-1.0, 1.0, 5);
        let y = linspace(0.0, 2.0, 7);
        let values = Array2::from_shape_fn((5, 7), |(i, j)| 2.0 * x[i] - 0.5 * y[j] + 1.0);
        let f = ScalarField2D::new(x, y, values).unwrap();
        let v = f.interpolate(0.3, 1.1).unwrap();
        assert_abs_diff_eq!(v, 2.0 * 0.3 - 0.5 * 1.1 + 1.0, epsilon = 1e-12);
        assert!(f.interpolate(1.2, 0.5).is_err());
    }

    #[test]
    fn test_resample_onto_zero_fills_outside() {
        let f = ScalarField1D::new(vec![0.0, 1.0, 2.0], vec![1.0, 3.0, 2.0]).unwrap();
        let v = f.resample_onto(&[-0.5, 0.0, 0.5, 1.5, 2.0, 2.5]);
        assert_eq!(v, vec![0.0, 1.0, 2.0, 2.5, 2.0, 0.0]);

        let x = linspace(-1.0, 1.0, 5);
        let y = linspace(0.0, 2.0, 7);
        let values = Array2::from_shape_fn((5, 7), |(i, j)| 2.0 * x[i] - 0.5 * y[j] + 1.0);
        let g = ScalarField2D::new(x, y, values).unwrap();
        let grid = g.resample_onto(&[-2.0, 0.3], &[1.1, 3.0]);
        assert_eq!(grid.dim(), (2, 2));
        assert_eq!(grid[[0, 0]], 0.0);
        assert_eq!(grid[[1, 1]], 0.0);
        assert_abs_diff_eq!(grid[[1, 0]], g.interpolate(0.3, 1.1).unwrap(), epsilon = 1e-12);
    }

    #[test]
    fn test_slices_and_marginals() {
        let x = linspace(0.0, 1.0, 3);
        let y = linspace(0.0, 1.0, 4);
        let values = Array2::from_shape_fn((3, 4), |(i, j)| (i + j) as f64);
        let f = ScalarField2D::new(x, y, values).unwrap();

        let along_y = f.slice_along_y(0.0).unwrap();
        assert_eq!(along_y.values(), &[0.0, 1.0, 2.0, 3.0]);

        let marginal = f.marginal_x().unwrap();
        assert_eq!(marginal.values(), &[6.0, 10.0, 14.0]);
    }
}
