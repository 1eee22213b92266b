//! Wavefront construction at the screen.
//!
//! The field at the element plane is taken as a plane wave whose amplitude is
//! the square root of the screen intensity histogram, multiplied by
//!
//! - an ideal thin lens $\exp(-i k (x - c)^2 / 2f)$ so that propagation
//!   converges to a finite plane,
//! - the error phase of the element: $-2k \sin\theta_i(x)\, h(u(x))$ for a
//!   mirror, $-k (\sin\theta_i + \sin\theta_r)\, h(u(x))$ for a grating and
//!   $-k \delta\, \Delta t(x)$ for a lens stack, whose amplitude is also
//!   attenuated by $\exp(-\mu \Delta t / 2)$.
//!
//! Displacements enter through the folded height fields of
//! `penumbra_surface::displacement`.

use std::f64::consts::PI;

use ndarray::Array2;
use num_complex::Complex64;
use rayon::prelude::*;

use penumbra_compute::ComputeBackend;
use penumbra_surface::{DisplacedProfile, DisplacedSurface, FieldError, FigureErrorProfile, ScalarField1D};

use super::context::{surface_axis, AxisContext, GridPlan};
use super::screen::ScreenData;
use super::strategy::{SurfaceMap, SurfaceModel};
use crate::element::OpticalElement;
use crate::error::HybridError;
use crate::types::Axis;

/// A sampled 1D field along one axis.
#[derive(Debug, Clone)]
pub struct Wavefront1D {
    pub axis: Axis,
    pub grid: GridPlan,
    pub field: Vec<Complex64>,
    pub wavelength: f64,
}

impl Wavefront1D {
    pub fn intensity(&self) -> Vec<f64> {
        self.field.iter().map(|e| e.norm_sqr()).collect()
    }

    /// Integrated intensity, $\sum |E|^2 \Delta x$.
    pub fn power(&self) -> f64 {
        self.field.iter().map(|e| e.norm_sqr()).sum::<f64>() * self.grid.pitch
    }
}

/// A sampled 2D field, indexed `[x, z]`.
#[derive(Debug, Clone)]
pub struct Wavefront2D {
    pub grid_x: GridPlan,
    pub grid_z: GridPlan,
    pub field: Array2<Complex64>,
    pub wavelength: f64,
}

impl Wavefront2D {
    pub fn intensity(&self) -> Array2<f64> {
        self.field.mapv(|e| e.norm_sqr())
    }
}

/// Reject NaN and negative intensities before taking square roots.
pub fn check_intensity<'v>(values: impl IntoIterator<Item = &'v f64>) -> Result<(), HybridError> {
    match values.into_iter().enumerate().find(|(_, v)| !(**v >= 0.0)) {
        Some((index, &value)) => Err(HybridError::InvalidIntensity { index, value }),
        None => Ok(()),
    }
}

fn uncovered(err: FieldError) -> HybridError {
    HybridError::InvalidConfig(format!("error profile does not cover the beam footprint ({})", err))
}

/// Error phase along one axis: returns `(phase, amplitude factor)`.
enum PhaseTerm1D<'a> {
    Reflective {
        map: &'a SurfaceMap,
        grating: bool,
        profile: DisplacedProfile,
    },
    Lens {
        delta: f64,
        mu: f64,
        thickness: ScalarField1D,
    },
}

impl PhaseTerm1D<'_> {
    fn evaluate(&self, x: f64, k: f64) -> Result<(f64, f64), HybridError> {
        match self {
            PhaseTerm1D::Reflective { map, grating, profile } => {
                let h = profile.height(map.coordinate.evaluate(x)).map_err(uncovered)?;
                Ok((-k * map.phase_factor(x, *grating) * h, 1.0))
            }
            PhaseTerm1D::Lens { delta, mu, thickness } => {
                let dt = thickness.interpolate(x).map_err(uncovered)?;
                Ok((-k * delta * dt, (-mu * dt / 2.0).exp()))
            }
        }
    }
}

enum PhaseTerm2D<'a> {
    Reflective {
        map_x: &'a SurfaceMap,
        map_z: &'a SurfaceMap,
        grating: bool,
        surface: DisplacedSurface<'a>,
    },
    Lens {
        delta: f64,
        mu: f64,
        thickness: &'a FigureErrorProfile,
    },
}

impl PhaseTerm2D<'_> {
    fn evaluate(&self, x: f64, z: f64, k: f64) -> Result<(f64, f64), HybridError> {
        match self {
            PhaseTerm2D::Reflective {
                map_x,
                map_z,
                grating,
                surface,
            } => {
                let h = surface
                    .height(map_x.coordinate.evaluate(x), map_z.coordinate.evaluate(z))
                    .map_err(uncovered)?;
                Ok((-k * map_z.phase_factor(z, *grating) * h, 1.0))
            }
            PhaseTerm2D::Lens { delta, mu, thickness } => {
                let dt = thickness.height(x, z).map_err(uncovered)?;
                Ok((-k * delta * dt, (-mu * dt / 2.0).exp()))
            }
        }
    }
}

fn missing_map(axis: Axis) -> HybridError {
    HybridError::InvalidConfig(format!("no footprint fit for {:?}", axis))
}

fn missing_delta() -> HybridError {
    HybridError::InvalidConfig("lens refractive-index decrement is unknown".into())
}

/// Builds sampled wavefronts from the screen data.
pub struct WavefrontBuilder<'a> {
    screen: &'a ScreenData,
    element: &'a OpticalElement,
    model: &'a SurfaceModel,
    error: Option<&'a FigureErrorProfile>,
    backend: &'a dyn ComputeBackend,
}

impl<'a> WavefrontBuilder<'a> {
    pub fn new(
        screen: &'a ScreenData,
        element: &'a OpticalElement,
        model: &'a SurfaceModel,
        error: Option<&'a FigureErrorProfile>,
        backend: &'a dyn ComputeBackend,
    ) -> Self {
        Self {
            screen,
            element,
            model,
            error,
            backend,
        }
    }

    pub fn wavelength(&self) -> f64 {
        self.screen.wavelength
    }

    fn phase_term_1d(&self, axis: Axis) -> Result<Option<PhaseTerm1D<'a>>, HybridError> {
        let model: &'a SurfaceModel = self.model;
        match model {
            SurfaceModel::Aperture => Ok(None),
            SurfaceModel::Reflective {
                grating,
                grazing_angle,
                maps,
                ..
            } => {
                let folding = self.element.displacement.folding(surface_axis(axis), *grazing_angle);
                let profile = self.error.map(|p| p.profile_along(surface_axis(axis))).transpose()?;
                let profile = DisplacedProfile::new(profile, folding);
                if profile.is_trivial() {
                    return Ok(None);
                }
                let map = maps[axis.index()].as_ref().ok_or_else(|| missing_map(axis))?;
                Ok(Some(PhaseTerm1D::Reflective {
                    map,
                    grating: *grating,
                    profile,
                }))
            }
            SurfaceModel::Lens { delta, attenuation, .. } => match self.error {
                None => Ok(None),
                Some(p) => Ok(Some(PhaseTerm1D::Lens {
                    delta: delta.ok_or_else(missing_delta)?,
                    mu: attenuation.unwrap_or(0.0),
                    thickness: p.profile_along(surface_axis(axis))?,
                })),
            },
        }
    }

    fn phase_term_2d(&self) -> Result<Option<PhaseTerm2D<'a>>, HybridError> {
        let model: &'a SurfaceModel = self.model;
        match model {
            SurfaceModel::Aperture => Ok(None),
            SurfaceModel::Reflective {
                grating,
                grazing_angle,
                maps,
                ..
            } => {
                let surface = DisplacedSurface::new(self.error, &self.element.displacement, *grazing_angle);
                if surface.is_trivial() {
                    return Ok(None);
                }
                Ok(Some(PhaseTerm2D::Reflective {
                    map_x: maps[0].as_ref().ok_or_else(|| missing_map(Axis::X))?,
                    map_z: maps[1].as_ref().ok_or_else(|| missing_map(Axis::Z))?,
                    grating: *grating,
                    surface,
                }))
            }
            SurfaceModel::Lens { delta, attenuation, .. } => match self.error {
                None => Ok(None),
                Some(thickness) => Ok(Some(PhaseTerm2D::Lens {
                    delta: delta.ok_or_else(missing_delta)?,
                    mu: attenuation.unwrap_or(0.0),
                    thickness,
                })),
            },
        }
    }

    /// Wavefront along `axis.axis` on `grid`, focused by a lens of focal
    /// length `focal_length` centred on the grid.
    ///
    /// # Errors
    /// - [`HybridError::InvalidIntensity`] for NaN or negative histogram bins.
    /// - [`HybridError::InvalidConfig`] if the error profile does not cover
    ///   the illuminated footprint.
    pub fn build_1d(&self, axis: &AxisContext, grid: GridPlan, focal_length: f64) -> Result<Wavefront1D, HybridError> {
        let intensity = self.screen.intensity_1d(axis.axis, axis.n_bins)?;
        check_intensity(intensity.values())?;
        let term = self.phase_term_1d(axis.axis)?;
        let k = 2.0 * PI / self.wavelength();
        let xs = grid.coordinates();
        let samples = intensity.resample_onto(&xs);

        let field = xs
            .par_iter()
            .zip(samples.par_iter())
            .map(|(&x, &sample)| -> Result<Complex64, HybridError> {
                let mut amplitude = sample.sqrt();
                if amplitude == 0.0 {
                    return Ok(Complex64::new(0.0, 0.0));
                }
                let mut phase = -k * (x - grid.centre).powi(2) / (2.0 * focal_length);
                if let Some(term) = &term {
                    let (dphi, factor) = term.evaluate(x, k)?;
                    phase += dphi;
                    amplitude *= factor;
                }
                Ok(Complex64::from_polar(amplitude, phase))
            })
            .collect::<Result<Vec<_>, HybridError>>()?;

        log::debug!(
            "{:?} wavefront: {} points, pitch {:.4e} m, focal length {:.4e} m",
            axis.axis,
            grid.n,
            grid.pitch,
            focal_length
        );
        Ok(Wavefront1D {
            axis: axis.axis,
            grid,
            field,
            wavelength: self.wavelength(),
        })
    }

    /// Joint wavefront over `(x, z)`, focused by an anamorphic lens with
    /// focal lengths `[f_x, f_z]`.
    pub fn build_2d(
        &self,
        axes: [&AxisContext; 2],
        grids: [GridPlan; 2],
        focal_lengths: [f64; 2],
    ) -> Result<Wavefront2D, HybridError> {
        let intensity = self.screen.intensity_2d((axes[0].n_bins, axes[1].n_bins))?;
        check_intensity(intensity.values().iter())?;
        let term = self.phase_term_2d()?;
        let k = 2.0 * PI / self.wavelength();

        let xs = grids[0].coordinates();
        let zs = grids[1].coordinates();
        let samples = intensity.resample_onto(&xs, &zs);

        // (amplitude, error phase) per sample
        let rows = xs
            .par_iter()
            .enumerate()
            .map(|(i, &x)| -> Result<Vec<(f64, f64)>, HybridError> {
                zs.iter()
                    .enumerate()
                    .map(|(j, &z)| -> Result<(f64, f64), HybridError> {
                        let amplitude = samples[[i, j]].sqrt();
                        if amplitude == 0.0 {
                            return Ok((0.0, 0.0));
                        }
                        match &term {
                            Some(term) => {
                                let (dphi, factor) = term.evaluate(x, z, k)?;
                                Ok((amplitude * factor, dphi))
                            }
                            None => Ok((amplitude, 0.0)),
                        }
                    })
                    .collect()
            })
            .collect::<Result<Vec<_>, HybridError>>()?;

        let (cx, cz) = (grids[0].centre, grids[1].centre);
        let field = self.backend.parallel_fill(xs.len(), zs.len(), &|i: usize, j: usize| {
            let (amplitude, dphi) = rows[i][j];
            let lens = -k
                * ((xs[i] - cx).powi(2) / (2.0 * focal_lengths[0]) + (zs[j] - cz).powi(2) / (2.0 * focal_lengths[1]));
            Complex64::from_polar(amplitude, lens + dphi)
        })?;

        log::debug!("2D wavefront: {}x{} points", grids[0].n, grids[1].n);
        Ok(Wavefront2D {
            grid_x: grids[0],
            grid_z: grids[1],
            field,
            wavelength: self.wavelength(),
        })
    }
}
