//! CPU compute backend: `rustfft` transforms, Rayon for shared-memory
//! parallelism.

use std::sync::{Arc, Mutex};

use ndarray::Array2;
use num_complex::Complex64;
use rayon::prelude::*;
use rustfft::{Fft, FftPlanner};

use crate::backend::{ComputeBackend, ComputeError, DeviceInfo, FftDirection};

/// CPU backend that parallelises work across threads via Rayon.
pub struct CpuBackend {
    num_threads: usize,
    /// Dedicated pool; the global Rayon pool when `None`.
    pool: Option<rayon::ThreadPool>,
    planner: Mutex<FftPlanner<f64>>,
}

impl CpuBackend {
    /// Create a new CPU backend on the global Rayon pool.
    pub fn new() -> Self {
        Self {
            num_threads: rayon::current_num_threads(),
            pool: None,
            planner: Mutex::new(FftPlanner::new()),
        }
    }

    /// Create a CPU backend whose transforms and fills run on a pool of
    /// `num_threads` threads. Falls back to the global pool if the pool
    /// cannot be built.
    pub fn with_threads(num_threads: usize) -> Self {
        match rayon::ThreadPoolBuilder::new().num_threads(num_threads).build() {
            Ok(pool) => Self {
                num_threads: pool.current_num_threads(),
                pool: Some(pool),
                planner: Mutex::new(FftPlanner::new()),
            },
            Err(e) => {
                log::warn!("Cannot build a {}-thread pool, using the global pool: {}", num_threads, e);
                Self::new()
            }
        }
    }

    fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    fn plan(&self, len: usize, direction: FftDirection) -> Result<Arc<dyn Fft<f64>>, ComputeError> {
        if len == 0 {
            return Err(ComputeError::InvalidLength(len));
        }
        let mut planner = self
            .planner
            .lock()
            .map_err(|_| ComputeError::DeviceError("FFT planner lock poisoned".into()))?;
        log::trace!("Planning {:?} FFT of length {}", direction, len);
        Ok(match direction {
            FftDirection::Forward => planner.plan_fft_forward(len),
            FftDirection::Inverse => planner.plan_fft_inverse(len),
        })
    }

    /// Transform every contiguous row of a row-major buffer.
    fn transform_rows(
        &self,
        buffer: &mut [Complex64],
        row_len: usize,
        direction: FftDirection,
    ) -> Result<(), ComputeError> {
        let fft = self.plan(row_len, direction)?;
        let scale = match direction {
            FftDirection::Forward => 1.0,
            FftDirection::Inverse => 1.0 / row_len as f64,
        };
        self.install(|| {
            buffer.par_chunks_mut(row_len).for_each(|row| {
                fft.process(row);
                if scale != 1.0 {
                    row.iter_mut().for_each(|v| *v *= scale);
                }
            })
        });
        Ok(())
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeBackend for CpuBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: format!("CPU ({} threads)", self.num_threads),
            compute_units: Some(self.num_threads),
        }
    }

    fn fft_1d(&self, data: &mut [Complex64], direction: FftDirection) -> Result<(), ComputeError> {
        let len = data.len();
        self.transform_rows(data, len, direction)
    }

    fn fft_2d(&self, data: &mut Array2<Complex64>, direction: FftDirection) -> Result<(), ComputeError> {
        let (rows, cols) = data.dim();
        if rows == 0 || cols == 0 {
            return Err(ComputeError::InvalidLength(rows * cols));
        }

        let mut work = data.as_standard_layout().into_owned();
        let slice = work
            .as_slice_mut()
            .ok_or_else(|| ComputeError::DeviceError("non-contiguous grid".into()))?;
        self.transform_rows(slice, cols, direction)?;

        let mut transposed = work.t().as_standard_layout().into_owned();
        let slice = transposed
            .as_slice_mut()
            .ok_or_else(|| ComputeError::DeviceError("non-contiguous grid".into()))?;
        self.transform_rows(slice, rows, direction)?;

        data.assign(&transposed.t());
        Ok(())
    }

    fn parallel_fill(
        &self,
        rows: usize,
        cols: usize,
        fill_fn: &(dyn Fn(usize, usize) -> Complex64 + Send + Sync),
    ) -> Result<Array2<Complex64>, ComputeError> {
        let data: Vec<Complex64> = self.install(|| {
            (0..rows * cols)
                .into_par_iter()
                .map(|idx| {
                    let i = idx / cols;
                    let j = idx % cols;
                    fill_fn(i, j)
                })
                .collect()
        });

        Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| ComputeError::DeviceError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_forward_inverse_is_identity() {
        let backend = CpuBackend::new();
        let original: Vec<Complex64> = (0..12)
            .map(|i| Complex64::new((i as f64).sin(), (0.3 * i as f64).cos()))
            .collect();
        let mut data = original.clone();
        backend.fft_1d(&mut data, FftDirection::Forward).unwrap();
        backend.fft_1d(&mut data, FftDirection::Inverse).unwrap();
        for (a, b) in data.iter().zip(original.iter()) {
            assert_abs_diff_eq!(a.re, b.re, epsilon = 1e-12);
            assert_abs_diff_eq!(a.im, b.im, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_single_tone_lands_in_one_bin() {
        let backend = CpuBackend::new();
        let n = 16;
        let mut data: Vec<Complex64> = (0..n)
            .map(|k| Complex64::from_polar(1.0, 2.0 * PI * 3.0 * k as f64 / n as f64))
            .collect();
        backend.fft_1d(&mut data, FftDirection::Forward).unwrap();
        assert_abs_diff_eq!(data[3].norm(), n as f64, epsilon = 1e-9);
        assert_abs_diff_eq!(data[5].norm(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_2d_matches_separable_1d() {
        let backend = CpuBackend::new();
        let (rows, cols) = (4, 6);
        let mut grid = Array2::from_shape_fn((rows, cols), |(i, j)| {
            Complex64::from_polar(1.0, 2.0 * PI * (i as f64 / rows as f64 + 2.0 * j as f64 / cols as f64))
        });
        backend.fft_2d(&mut grid, FftDirection::Forward).unwrap();
        assert_abs_diff_eq!(grid[[1, 2]].norm(), (rows * cols) as f64, epsilon = 1e-9);
        assert_abs_diff_eq!(grid[[0, 0]].norm(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_device_info_reports_threads() {
        let info = CpuBackend::with_threads(3).device_info();
        assert_eq!(info.compute_units, Some(3));
        assert!(info.name.contains("3 threads"));
    }

    #[test]
    fn test_fill_runs_on_dedicated_pool() {
        let backend = CpuBackend::with_threads(2);
        let grid = backend
            .parallel_fill(8, 8, &|_, _| Complex64::new(rayon::current_num_threads() as f64, 0.0))
            .unwrap();
        assert!(grid.iter().all(|v| v.re == 2.0));
    }

    #[test]
    fn test_parallel_fill_indexing() {
        let backend = CpuBackend::new();
        let grid = backend
            .parallel_fill(3, 4, &|i, j| Complex64::new(i as f64, j as f64))
            .unwrap();
        assert_eq!(grid[[2, 3]], Complex64::new(2.0, 3.0));
    }
}
