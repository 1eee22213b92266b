//! Inverse-CDF sampling of diffraction kernels.
//!
//! Draws are made in fixed-size chunks processed in parallel. Each chunk owns
//! a `StdRng` seeded from the base seed, a stream number and the chunk index,
//! so results are reproducible for a fixed seed regardless of the thread
//! count. The cancellation flag is checked once per chunk.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use penumbra_surface::{ScalarField1D, ScalarField2D};

use super::cancel::CancellationToken;
use crate::error::HybridError;

/// Draws per parallel chunk.
pub const SAMPLING_CHUNK: usize = 4096;

/// Cumulative distribution over the samples of a 1D kernel.
#[derive(Debug, Clone)]
pub struct CumulativeDistribution {
    abscissas: Vec<f64>,
    cumulative: Vec<f64>,
}

impl CumulativeDistribution {
    /// # Errors
    /// [`HybridError::DegenerateKernel`] if the kernel has a negative or
    /// non-finite sample, or sums to zero.
    pub fn new(kernel: &ScalarField1D) -> Result<Self, HybridError> {
        Self::from_parts(kernel.abscissas().to_vec(), kernel.values())
    }

    fn from_parts(abscissas: Vec<f64>, weights: &[f64]) -> Result<Self, HybridError> {
        if let Some((i, w)) = weights.iter().enumerate().find(|(_, w)| !(w.is_finite() && **w >= 0.0)) {
            return Err(HybridError::DegenerateKernel(format!("sample {} has weight {}", i, w)));
        }
        let cumulative: Vec<f64> = weights
            .iter()
            .scan(0.0, |acc, &w| {
                *acc += w;
                Some(*acc)
            })
            .collect();
        match cumulative.last() {
            Some(&total) if total > 0.0 => Ok(Self { abscissas, cumulative }),
            _ => Err(HybridError::DegenerateKernel("kernel carries no intensity".into())),
        }
    }

    pub fn total(&self) -> f64 {
        self.cumulative[self.cumulative.len() - 1]
    }

    /// Index of the first sample whose cumulative sum reaches `u * total`,
    /// for `u` in `[0, 1)`.
    pub fn sample_index(&self, u: f64) -> usize {
        let target = u * self.total();
        self.cumulative
            .partition_point(|&c| c <= target)
            .min(self.cumulative.len() - 1)
    }

    pub fn sample(&self, u: f64) -> f64 {
        self.abscissas[self.sample_index(u)]
    }
}

/// Joint distribution of a 2D kernel: the marginal along `x`, then the
/// conditional along `z` in the chosen `x` row.
#[derive(Debug, Clone)]
pub struct JointDistribution {
    z: Vec<f64>,
    marginal: CumulativeDistribution,
    conditionals: Vec<Option<Vec<f64>>>,
}

impl JointDistribution {
    pub fn new(kernel: &ScalarField2D) -> Result<Self, HybridError> {
        let values = kernel.values();
        let row_sums: Vec<f64> = values.rows().into_iter().map(|r| r.sum()).collect();
        let marginal = CumulativeDistribution::from_parts(kernel.x().to_vec(), &row_sums)?;
        let conditionals = values
            .rows()
            .into_iter()
            .zip(row_sums.iter())
            .map(|(row, &sum)| {
                (sum > 0.0).then(|| {
                    row.iter()
                        .scan(0.0, |acc, &w| {
                            *acc += w;
                            Some(*acc)
                        })
                        .collect()
                })
            })
            .collect();
        Ok(Self {
            z: kernel.y().to_vec(),
            marginal,
            conditionals,
        })
    }

    pub fn sample(&self, u: f64, v: f64) -> (f64, f64) {
        let i = self.marginal.sample_index(u);
        let x = self.marginal.abscissas[i];
        // rows drawn by the marginal always carry intensity
        let z = match &self.conditionals[i] {
            Some(cumulative) => {
                let target = v * cumulative[cumulative.len() - 1];
                let j = cumulative.partition_point(|&c| c <= target).min(cumulative.len() - 1);
                self.z[j]
            }
            None => 0.0,
        };
        (x, z)
    }
}

/// Parallel, reproducible ray sampler.
pub struct RaySampler<'a> {
    seed: u64,
    cancel: Option<&'a CancellationToken>,
}

impl<'a> RaySampler<'a> {
    pub fn new(seed: u64) -> Self {
        Self { seed, cancel: None }
    }

    pub fn with_cancellation(mut self, token: &'a CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.is_some_and(|c| c.is_cancelled())
    }

    fn chunk_rng(&self, stream: u64, chunk: usize) -> StdRng {
        StdRng::seed_from_u64(self.seed.wrapping_add(stream << 32).wrapping_add(chunk as u64))
    }

    /// `n` draws from `distribution` on random stream `stream`.
    ///
    /// Returns `None` if cancelled.
    pub fn draw(&self, distribution: &CumulativeDistribution, n: usize, stream: u64) -> Option<Vec<f64>> {
        let chunks = (0..n.div_ceil(SAMPLING_CHUNK))
            .into_par_iter()
            .map(|chunk| {
                if self.cancelled() {
                    return None;
                }
                let mut rng = self.chunk_rng(stream, chunk);
                let len = SAMPLING_CHUNK.min(n - chunk * SAMPLING_CHUNK);
                Some((0..len).map(|_| distribution.sample(rng.gen())).collect::<Vec<f64>>())
            })
            .collect::<Option<Vec<_>>>()?;
        Some(chunks.concat())
    }

    /// `n` correlated `(x, z)` draws from `distribution`.
    pub fn draw_joint(&self, distribution: &JointDistribution, n: usize, stream: u64) -> Option<Vec<(f64, f64)>> {
        let chunks = (0..n.div_ceil(SAMPLING_CHUNK))
            .into_par_iter()
            .map(|chunk| {
                if self.cancelled() {
                    return None;
                }
                let mut rng = self.chunk_rng(stream, chunk);
                let len = SAMPLING_CHUNK.min(n - chunk * SAMPLING_CHUNK);
                Some(
                    (0..len)
                        .map(|_| distribution.sample(rng.gen(), rng.gen()))
                        .collect::<Vec<(f64, f64)>>(),
                )
            })
            .collect::<Option<Vec<_>>>()?;
        Some(chunks.concat())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn triangle() -> ScalarField1D {
        ScalarField1D::new(vec![-1.0, 0.0, 1.0], vec![1.0, 2.0, 1.0]).unwrap()
    }

    #[test]
    fn test_sample_index_boundaries() {
        let cdf = CumulativeDistribution::new(&triangle()).unwrap();
        assert_eq!(cdf.total(), 4.0);
        assert_eq!(cdf.sample(0.0), -1.0);
        assert_eq!(cdf.sample(0.2), -1.0);
        assert_eq!(cdf.sample(0.25), 0.0);
        assert_eq!(cdf.sample(0.74), 0.0);
        assert_eq!(cdf.sample(0.75), 1.0);
        assert_eq!(cdf.sample(0.999), 1.0);
    }

    #[test]
    fn test_zero_kernel_is_degenerate() {
        let k = ScalarField1D::new(vec![0.0, 1.0], vec![0.0, 0.0]).unwrap();
        assert!(matches!(
            CumulativeDistribution::new(&k),
            Err(HybridError::DegenerateKernel(_))
        ));
    }

    #[test]
    fn test_draw_frequencies() {
        let cdf = CumulativeDistribution::new(&triangle()).unwrap();
        let draws = RaySampler::new(7).draw(&cdf, 40_000, 1).unwrap();
        assert_eq!(draws.len(), 40_000);
        let centre = draws.iter().filter(|&&v| v == 0.0).count() as f64 / 40_000.0;
        assert!((centre - 0.5).abs() < 0.02, "centre fraction {}", centre);
    }

    #[test]
    fn test_draws_are_reproducible() {
        let cdf = CumulativeDistribution::new(&triangle()).unwrap();
        let a = RaySampler::new(3).draw(&cdf, 10_000, 2).unwrap();
        let b = RaySampler::new(3).draw(&cdf, 10_000, 2).unwrap();
        let c = RaySampler::new(3).draw(&cdf, 10_000, 3).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_cancelled_draw_returns_none() {
        let cdf = CumulativeDistribution::new(&triangle()).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        assert!(RaySampler::new(1).with_cancellation(&token).draw(&cdf, 100, 1).is_none());
    }

    #[test]
    fn test_joint_draw_follows_rows() {
        // x = -1 carries only z = 5, x = 1 only z = -5
        let kernel = ScalarField2D::new(
            vec![-1.0, 1.0],
            vec![-5.0, 5.0],
            array![[0.0, 1.0], [3.0, 0.0]],
        )
        .unwrap();
        let joint = JointDistribution::new(&kernel).unwrap();
        let draws = RaySampler::new(11).draw_joint(&joint, 20_000, 5).unwrap();
        assert!(draws.iter().all(|&(x, z)| (x == -1.0 && z == 5.0) || (x == 1.0 && z == -5.0)));
        let left = draws.iter().filter(|d| d.0 == -1.0).count() as f64 / 20_000.0;
        assert!((left - 0.25).abs() < 0.02);
    }
}
