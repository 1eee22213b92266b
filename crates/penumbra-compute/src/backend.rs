//! Compute backend trait and device abstraction.
//!
//! The [`ComputeBackend`] trait abstracts over execution environments so the
//! propagation code in `penumbra-core` stays device-agnostic. The hot-path
//! operations are the discrete Fourier transforms of the sampled wavefront
//! and the element-wise fills of 2D phase screens.

use ndarray::Array2;
use num_complex::Complex64;
use thiserror::Error;

/// Errors originating from compute backends.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Backend not available: {0}")]
    Unavailable(String),

    #[error("Device error: {0}")]
    DeviceError(String),

    #[error("Invalid transform length: {0}")]
    InvalidLength(usize),
}

/// Describes the capabilities of a compute backend.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub compute_units: Option<usize>,
}

/// Sign convention of a discrete Fourier transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FftDirection {
    /// $X_k = \sum_n x_n e^{-2\pi i k n / N}$, unnormalised.
    Forward,
    /// $x_n = \frac{1}{N} \sum_k X_k e^{+2\pi i k n / N}$.
    Inverse,
}

/// Abstraction over compute backends.
///
/// A forward transform followed by an inverse transform is the identity; the
/// `1/N` factor is applied by the inverse.
pub trait ComputeBackend: Send + Sync {
    /// Return information about the device.
    fn device_info(&self) -> DeviceInfo;

    /// In-place 1D transform of `data`.
    fn fft_1d(&self, data: &mut [Complex64], direction: FftDirection) -> Result<(), ComputeError>;

    /// In-place 2D transform of `data`, rows then columns.
    ///
    /// The default implementation copies every lane through [`fft_1d`](Self::fft_1d).
    fn fft_2d(&self, data: &mut Array2<Complex64>, direction: FftDirection) -> Result<(), ComputeError> {
        let mut lane = Vec::new();
        for axis in [ndarray::Axis(1), ndarray::Axis(0)] {
            for mut view in data.lanes_mut(axis) {
                lane.clear();
                lane.extend(view.iter().copied());
                self.fft_1d(&mut lane, direction)?;
                for (dst, src) in view.iter_mut().zip(lane.iter()) {
                    *dst = *src;
                }
            }
        }
        Ok(())
    }

    /// Fill a `rows x cols` grid with `fill_fn(i, j)`, in parallel where the
    /// backend can.
    fn parallel_fill(
        &self,
        rows: usize,
        cols: usize,
        fill_fn: &(dyn Fn(usize, usize) -> Complex64 + Send + Sync),
    ) -> Result<Array2<Complex64>, ComputeError>;
}
