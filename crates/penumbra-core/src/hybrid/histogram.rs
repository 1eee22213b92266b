//! Intensity histograms of ray positions.
//!
//! Histograms are returned as scalar fields sampled at the bin centres, so
//! the wavefront builder can interpolate them like any other sampled
//! function. [`edge_extended`] and [`edge_extended_2d`] pad a histogram out
//! to the full `[min, max]` range of the binned positions by repeating the
//! outermost bins.

use ndarray::Array2;
use penumbra_surface::{FieldError, ScalarField1D, ScalarField2D};

/// Lower bound on the number of screen histogram bins.
pub const MIN_HISTOGRAM_BINS: usize = 10;

/// Bin count for a 1D screen histogram: `clamp(configured, 10, n_good / 20)`,
/// with the lower bound taking precedence.
pub fn bins_1d(configured: usize, n_good: usize) -> usize {
    configured.min(n_good / 20).max(MIN_HISTOGRAM_BINS)
}

/// Bin count per axis for a 2D screen histogram:
/// `clamp(configured, 10, sqrt(n_good / 10))`.
pub fn bins_2d(configured: usize, n_good: usize) -> usize {
    let limit = ((n_good / 10) as f64).sqrt().floor() as usize;
    configured.min(limit).max(MIN_HISTOGRAM_BINS)
}

fn bin_of(value: f64, min: f64, max: f64, n: usize) -> Option<usize> {
    if !(value >= min && value <= max) {
        return None;
    }
    let t = (value - min) / (max - min);
    Some(((t * n as f64).floor() as usize).min(n - 1))
}

fn centres(min: f64, max: f64, n: usize) -> Vec<f64> {
    let w = (max - min) / n as f64;
    (0..n).map(|i| min + (i as f64 + 0.5) * w).collect()
}

/// Weighted histogram of `(position, weight)` pairs over `[min, max]`.
/// Samples outside the range are ignored.
pub fn histogram_1d(
    samples: impl IntoIterator<Item = (f64, f64)>,
    min: f64,
    max: f64,
    n_bins: usize,
) -> Result<ScalarField1D, FieldError> {
    if n_bins < 2 {
        return Err(FieldError::TooFewSamples { required: 2, found: n_bins });
    }
    let mut values = vec![0.0; n_bins];
    for (x, w) in samples {
        if let Some(i) = bin_of(x, min, max, n_bins) {
            values[i] += w;
        }
    }
    ScalarField1D::new(centres(min, max, n_bins), values)
}

/// Weighted 2D histogram of `(x, z, weight)` triples.
pub fn histogram_2d(
    samples: impl IntoIterator<Item = (f64, f64, f64)>,
    x_range: (f64, f64),
    z_range: (f64, f64),
    bins: (usize, usize),
) -> Result<ScalarField2D, FieldError> {
    let (nx, nz) = bins;
    let mut values = Array2::<f64>::zeros((nx, nz));
    for (x, z, w) in samples {
        if let (Some(i), Some(j)) = (
            bin_of(x, x_range.0, x_range.1, nx),
            bin_of(z, z_range.0, z_range.1, nz),
        ) {
            values[[i, j]] += w;
        }
    }
    ScalarField2D::new(
        centres(x_range.0, x_range.1, nx),
        centres(z_range.0, z_range.1, nz),
        values,
    )
}

/// Pad a histogram with its edge values at `min` and `max`.
pub fn edge_extended(hist: &ScalarField1D, min: f64, max: f64) -> Result<ScalarField1D, FieldError> {
    let v = hist.values();
    let mut x = Vec::with_capacity(hist.len() + 2);
    let mut y = Vec::with_capacity(hist.len() + 2);
    x.push(min);
    y.push(v[0]);
    x.extend_from_slice(hist.abscissas());
    y.extend_from_slice(v);
    x.push(max);
    y.push(v[v.len() - 1]);
    ScalarField1D::new(x, y)
}

/// 2D counterpart of [`edge_extended`].
pub fn edge_extended_2d(
    hist: &ScalarField2D,
    x_range: (f64, f64),
    z_range: (f64, f64),
) -> Result<ScalarField2D, FieldError> {
    let (nx, nz) = hist.dim();
    let pad = |grid: &[f64], lo: f64, hi: f64| {
        let mut g = Vec::with_capacity(grid.len() + 2);
        g.push(lo);
        g.extend_from_slice(grid);
        g.push(hi);
        g
    };
    let src = hist.values();
    let values = Array2::from_shape_fn((nx + 2, nz + 2), |(i, j)| {
        let si = i.saturating_sub(1).min(nx - 1);
        let sj = j.saturating_sub(1).min(nz - 1);
        src[[si, sj]]
    });
    ScalarField2D::new(
        pad(hist.x(), x_range.0, x_range.1),
        pad(hist.y(), z_range.0, z_range.1),
        values,
    )
}

/// Fraction of the total weight falling in bins whose centre lies outside
/// `[centre - half, centre + half]`.
pub fn fraction_outside(hist: &ScalarField1D, centre: f64, half: f64) -> f64 {
    let total = hist.sum();
    if total <= 0.0 {
        return 0.0;
    }
    let outside: f64 = hist
        .abscissas()
        .iter()
        .zip(hist.values())
        .filter(|(x, _)| (**x - centre).abs() > half)
        .map(|(_, v)| *v)
        .sum();
    outside / total
}
