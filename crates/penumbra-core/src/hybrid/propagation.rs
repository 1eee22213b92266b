//! FFT Fresnel propagation and diffraction kernels.
//!
//! Propagation over a distance $z$ uses the transfer function of free space
//! in the Fresnel approximation,
//!
//! $$H(f_x) = \exp(-i \pi \lambda z f_x^2),$$
//!
//! applied between a forward and an inverse FFT of the sampled field.
//!
//! - **Far field**: the wavefront carries a lens of focal length $f_{ff}$ and
//!   is propagated by $f_{ff}$; the focal-plane intensity is re-expressed as a
//!   function of the diffraction angle $\theta = (x - c)/f_{ff}$.
//! - **Near field**: the wavefront carries the element focal length and is
//!   propagated to the image distance; the intensity is kept as a function of
//!   position relative to the screen centre, cropped to the image window.

use std::f64::consts::PI;

use ndarray::{s, Array2};
use num_complex::Complex64;
use serde::Serialize;

use penumbra_compute::{ComputeBackend, FftDirection};
use penumbra_surface::{FieldError, ScalarField1D, ScalarField2D};

use super::context::{AxisContext, CalculationContext, GridPlan, MIN_KERNEL_HALF_PITCHES};
use super::wavefront::{Wavefront1D, Wavefront2D, WavefrontBuilder};
use crate::error::HybridError;
use crate::types::Axis;

/// Diffraction regime of a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldRegime {
    /// Intensity vs. diffraction angle (rad).
    FarField,
    /// Intensity vs. position offset at the image plane (m).
    NearField,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KernelData {
    Axis { axis: Axis, intensity: ScalarField1D },
    /// Indexed `[x, z]`.
    Joint { intensity: ScalarField2D },
}

/// Propagated intensity from which ray perturbations are drawn.
#[derive(Debug, Clone, Serialize)]
pub struct DiffractionKernel {
    pub regime: FieldRegime,
    pub data: KernelData,
}

impl DiffractionKernel {
    /// Axis of a 1D kernel.
    pub fn axis(&self) -> Option<Axis> {
        match &self.data {
            KernelData::Axis { axis, .. } => Some(*axis),
            KernelData::Joint { .. } => None,
        }
    }

    /// Intensity along `axis`: the 1D kernel itself, or the marginal of a
    /// joint kernel.
    pub fn profile(&self, axis: Axis) -> Result<Option<ScalarField1D>, FieldError> {
        match &self.data {
            KernelData::Axis { axis: a, intensity } => Ok((*a == axis).then(|| intensity.clone())),
            KernelData::Joint { intensity } => match axis {
                Axis::X => intensity.marginal_x().map(Some),
                Axis::Z => intensity.marginal_y().map(Some),
            },
        }
    }
}

/// Spatial frequency of FFT bin `i` of `n` at sample pitch `pitch`.
pub fn spatial_frequency(i: usize, n: usize, pitch: f64) -> f64 {
    let span = n as f64 * pitch;
    if i < n / 2 {
        i as f64 / span
    } else {
        (i as f64 - n as f64) / span
    }
}

/// Index range `[lo, hi]` of the grid points within `half` of the centre.
fn crop_range(grid: &GridPlan, half: f64) -> Result<(usize, usize), HybridError> {
    let inside: Vec<usize> = (0..grid.n)
        .filter(|&i| (grid.coordinate(i) - grid.centre).abs() <= half)
        .collect();
    match (inside.first(), inside.last()) {
        (Some(&lo), Some(&hi)) if hi > lo => Ok((lo, hi)),
        _ => Err(HybridError::DegenerateKernel(format!(
            "image window of half-width {:.3e} m holds fewer than two samples",
            half
        ))),
    }
}

/// FFT propagator over a [`ComputeBackend`].
pub struct FresnelPropagator<'a> {
    backend: &'a dyn ComputeBackend,
}

impl<'a> FresnelPropagator<'a> {
    pub fn new(backend: &'a dyn ComputeBackend) -> Self {
        Self { backend }
    }

    /// Propagate `wavefront` in place over `distance`.
    pub fn propagate_1d(&self, wavefront: &mut Wavefront1D, distance: f64) -> Result<(), HybridError> {
        let n = wavefront.field.len();
        let pitch = wavefront.grid.pitch;
        let a = PI * wavefront.wavelength * distance;
        self.backend.fft_1d(&mut wavefront.field, FftDirection::Forward)?;
        for (i, e) in wavefront.field.iter_mut().enumerate() {
            let fx = spatial_frequency(i, n, pitch);
            *e *= Complex64::from_polar(1.0, -a * fx * fx);
        }
        self.backend.fft_1d(&mut wavefront.field, FftDirection::Inverse)?;
        Ok(())
    }

    /// Propagate a joint wavefront in place over `distance`.
    pub fn propagate_2d(&self, wavefront: &mut Wavefront2D, distance: f64) -> Result<(), HybridError> {
        let (nx, nz) = wavefront.field.dim();
        let (px, pz) = (wavefront.grid_x.pitch, wavefront.grid_z.pitch);
        let a = PI * wavefront.wavelength * distance;
        self.backend.fft_2d(&mut wavefront.field, FftDirection::Forward)?;
        for ((i, j), e) in wavefront.field.indexed_iter_mut() {
            let fx = spatial_frequency(i, nx, px);
            let fz = spatial_frequency(j, nz, pz);
            *e *= Complex64::from_polar(1.0, -a * (fx * fx + fz * fz));
        }
        self.backend.fft_2d(&mut wavefront.field, FftDirection::Inverse)?;
        Ok(())
    }

    /// Far-field kernel along one axis.
    pub fn far_field_1d(
        &self,
        builder: &WavefrontBuilder<'_>,
        ctx: &CalculationContext,
        axis: &AxisContext,
    ) -> Result<DiffractionKernel, HybridError> {
        let f = axis.far_field_focal_length;
        let grid = axis.far_field_grid(f, ctx.wavelength, &ctx.calibration, ctx.axis_cap());
        log::info!(
            "{:?} far field: {} FFT points, window {:.4e} m, focal length {:.4e} m",
            axis.axis,
            grid.n,
            grid.width(),
            f
        );
        let mut wavefront = builder.build_1d(axis, grid, f)?;
        self.propagate_1d(&mut wavefront, f)?;

        let angles = grid.coordinates().iter().map(|x| (x - grid.centre) / f).collect();
        Ok(DiffractionKernel {
            regime: FieldRegime::FarField,
            data: KernelData::Axis {
                axis: axis.axis,
                intensity: ScalarField1D::new(angles, wavefront.intensity())?,
            },
        })
    }

    /// Near-field kernel along one axis.
    pub fn near_field_1d(
        &self,
        builder: &WavefrontBuilder<'_>,
        ctx: &CalculationContext,
        axis: &AxisContext,
    ) -> Result<DiffractionKernel, HybridError> {
        let image_size = axis.near_field_image_size(ctx.wavelength, ctx.n_peaks, &ctx.calibration);
        let grid = axis.near_field_grid(ctx.wavelength, image_size, &ctx.calibration, ctx.axis_cap());
        log::info!(
            "{:?} near field: {} FFT points, image size {:.4e} m, distance {:.4e} m",
            axis.axis,
            grid.n,
            image_size,
            axis.distance
        );
        let mut wavefront = builder.build_1d(axis, grid, axis.focal_length)?;
        self.propagate_1d(&mut wavefront, axis.distance)?;

        let half = (0.5 * image_size).max(MIN_KERNEL_HALF_PITCHES * grid.pitch);
        let (lo, hi) = crop_range(&grid, half)?;
        let offsets = (lo..=hi).map(|i| grid.coordinate(i) - grid.centre).collect();
        let intensity = wavefront.field[lo..=hi].iter().map(|e| e.norm_sqr()).collect();
        Ok(DiffractionKernel {
            regime: FieldRegime::NearField,
            data: KernelData::Axis {
                axis: axis.axis,
                intensity: ScalarField1D::new(offsets, intensity)?,
            },
        })
    }

    /// Joint far-field kernel over both axes, with a common focal length.
    pub fn far_field_2d(
        &self,
        builder: &WavefrontBuilder<'_>,
        ctx: &CalculationContext,
        axes: [&AxisContext; 2],
    ) -> Result<DiffractionKernel, HybridError> {
        let f = ctx.joint_far_field_focal_length();
        let cap = ctx.axis_cap();
        let grids = axes.map(|a| a.far_field_grid(f, ctx.wavelength, &ctx.calibration, cap));
        log::info!(
            "2D far field: {}x{} FFT points, focal length {:.4e} m",
            grids[0].n,
            grids[1].n,
            f
        );
        let mut wavefront = builder.build_2d(axes, grids, [f, f])?;
        self.propagate_2d(&mut wavefront, f)?;

        let angles = grids.map(|g| g.coordinates().iter().map(|x| (x - g.centre) / f).collect::<Vec<_>>());
        let [ax, az] = angles;
        Ok(DiffractionKernel {
            regime: FieldRegime::FarField,
            data: KernelData::Joint {
                intensity: ScalarField2D::new(ax, az, wavefront.intensity())?,
            },
        })
    }

    /// Joint near-field kernel over both axes, with an anamorphic lens.
    pub fn near_field_2d(
        &self,
        builder: &WavefrontBuilder<'_>,
        ctx: &CalculationContext,
        axes: [&AxisContext; 2],
    ) -> Result<DiffractionKernel, HybridError> {
        let distance = axes[0].distance;
        let cap = ctx.axis_cap();
        let sizes = axes.map(|a| a.near_field_image_size(ctx.wavelength, ctx.n_peaks, &ctx.calibration));
        let grids = [
            axes[0].near_field_grid(ctx.wavelength, sizes[0], &ctx.calibration, cap),
            axes[1].near_field_grid(ctx.wavelength, sizes[1], &ctx.calibration, cap),
        ];
        log::info!(
            "2D near field: {}x{} FFT points, image {:.4e} x {:.4e} m",
            grids[0].n,
            grids[1].n,
            sizes[0],
            sizes[1]
        );
        let mut wavefront =
            builder.build_2d(axes, grids, [axes[0].focal_length, axes[1].focal_length])?;
        self.propagate_2d(&mut wavefront, distance)?;

        let (x_lo, x_hi) = crop_range(&grids[0], (0.5 * sizes[0]).max(MIN_KERNEL_HALF_PITCHES * grids[0].pitch))?;
        let (z_lo, z_hi) = crop_range(&grids[1], (0.5 * sizes[1]).max(MIN_KERNEL_HALF_PITCHES * grids[1].pitch))?;
        let offsets = |g: &GridPlan, lo: usize, hi: usize| -> Vec<f64> {
            (lo..=hi).map(|i| g.coordinate(i) - g.centre).collect()
        };
        let intensity: Array2<f64> = wavefront
            .field
            .slice(s![x_lo..=x_hi, z_lo..=z_hi])
            .mapv(|e| e.norm_sqr());
        Ok(DiffractionKernel {
            regime: FieldRegime::NearField,
            data: KernelData::Joint {
                intensity: ScalarField2D::new(
                    offsets(&grids[0], x_lo, x_hi),
                    offsets(&grids[1], z_lo, z_hi),
                    intensity,
                )?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use penumbra_compute::CpuBackend;

    fn slit_wavefront(n: usize, window: f64, slit: f64, focal_length: f64, wavelength: f64) -> Wavefront1D {
        let grid = GridPlan {
            centre: 0.0,
            pitch: window / n as f64,
            n,
        };
        let k = 2.0 * PI / wavelength;
        let field = grid
            .coordinates()
            .iter()
            .map(|&x| {
                if x.abs() <= 0.5 * slit {
                    Complex64::from_polar(1.0, -k * x * x / (2.0 * focal_length))
                } else {
                    Complex64::new(0.0, 0.0)
                }
            })
            .collect();
        Wavefront1D {
            axis: Axis::Z,
            grid,
            field,
            wavelength,
        }
    }

    #[test]
    fn test_spatial_frequency_layout() {
        assert_eq!(spatial_frequency(0, 8, 0.5), 0.0);
        assert_eq!(spatial_frequency(3, 8, 0.5), 0.75);
        assert_eq!(spatial_frequency(4, 8, 0.5), -1.0);
        assert_eq!(spatial_frequency(7, 8, 0.5), -0.25);
    }

    #[test]
    fn test_propagation_conserves_power() {
        let backend = CpuBackend::new();
        let mut wf = slit_wavefront(1024, 8e-5, 2e-5, 0.5, 1e-10);
        let before = wf.power();
        FresnelPropagator::new(&backend).propagate_1d(&mut wf, 0.3).unwrap();
        assert_relative_eq!(wf.power(), before, max_relative = 1e-9);
    }

    #[test]
    fn test_focal_plane_is_fraunhofer_pattern() {
        let backend = CpuBackend::new();
        let (slit, f, lambda) = (2e-5, 0.2, 1e-10);
        let mut wf = slit_wavefront(4096, 4.0 * slit, slit, f, lambda);
        FresnelPropagator::new(&backend).propagate_1d(&mut wf, f).unwrap();

        let intensity = wf.intensity();
        let peak = intensity.iter().cloned().fold(0.0, f64::max);
        let at = |x: f64| {
            let i = ((x - wf.grid.coordinate(0)) / wf.grid.pitch).round() as usize;
            intensity[i]
        };
        assert!(at(0.0) > 0.95 * peak);
        // first zero of sinc^2 at lambda f / slit
        assert!(at(lambda * f / slit) < 0.02 * peak);
        assert!(at(1.43 * lambda * f / slit) > 0.03 * peak);
    }

    #[test]
    fn test_crop_range_is_symmetric() {
        let grid = GridPlan {
            centre: 1.0,
            pitch: 0.1,
            n: 101,
        };
        let (lo, hi) = crop_range(&grid, 0.25).unwrap();
        assert_eq!((lo, hi), (48, 52));
        assert!(crop_range(&grid, 0.01).is_err());
    }
}
