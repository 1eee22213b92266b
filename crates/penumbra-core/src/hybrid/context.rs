//! Invocation-scoped calculation context and grid sizing.
//!
//! All derived quantities of one hybrid run live in a [`CalculationContext`]
//! built once after the screen projection and passed by reference through
//! the rest of the pipeline.
//!
//! # Sizing rules
//!
//! With screen extent $L$, wavelength $\lambda$ and $n_p$ requested
//! diffraction peaks of relative width $w$:
//!
//! - far-field focal length $f_{ff} = L^2 / (2 n_p w \lambda)$, so that the
//!   requested peaks fill one screen width at the focal plane;
//! - FFT sample count $N = \min(c_N w L^2 / (\lambda |d|), N_{cap})$;
//! - near-field image size
//!   $S = \max(2 n_p w \lambda d / L,\ 2 L |d - |f|| / |f|,\ c_s \sigma_s d,\ c_d (|\delta\theta| d + |t|))$.

use serde::Serialize;

use penumbra_surface::{FigureErrorProfile, SurfaceAxis};

use super::screen::ScreenData;
use super::strategy::SurfaceModel;
use crate::config::{Calibration, DiffractionPlane, HybridConfig, LengthSpec, PropagationType, MIN_FFT_SAMPLES};
use crate::element::OpticalElement;
use crate::error::HybridError;
use crate::types::Axis;

/// Smallest number of propagation samples across the screen in the near
/// field.
pub const MIN_NEAR_FIELD_SAMPLES: usize = 128;

/// Smallest half-width of a cropped near-field kernel, in grid pitches.
pub const MIN_KERNEL_HALF_PITCHES: f64 = 8.0;

/// Surface axis sampled by a beam axis.
pub fn surface_axis(axis: Axis) -> SurfaceAxis {
    match axis {
        Axis::X => SurfaceAxis::Width,
        Axis::Z => SurfaceAxis::Length,
    }
}

/// Focal length of the lens that brings `n_peaks` diffraction peaks of an
/// aperture of width `extent` into one screen width.
pub fn far_field_focal_length(extent: f64, wavelength: f64, n_peaks: usize, peak_width_factor: f64) -> f64 {
    extent * extent / (n_peaks as f64 * 2.0 * peak_width_factor * wavelength)
}

/// Number of FFT samples needed to propagate a field of width `extent` over
/// `distance`, clamped to `[MIN_FFT_SAMPLES, cap]`.
pub fn fft_sample_count(extent: f64, wavelength: f64, distance: f64, calibration: &Calibration, cap: usize) -> usize {
    let n = calibration.fft_size_factor * extent * extent / wavelength / distance.abs() * calibration.peak_width_factor;
    if !n.is_finite() {
        return cap;
    }
    (n as usize).clamp(MIN_FFT_SAMPLES.min(cap), cap)
}

/// Window enlargement of the far-field wavefront.
///
/// The window must hold the angular spread added by the figure error, and
/// the angular deflection caused by a displacement, at the focal plane.
pub fn oversampling_scale(
    extent: f64,
    far_field_focal_length: f64,
    angular_spread: f64,
    deflection: f64,
    calibration: &Calibration,
) -> f64 {
    let spread = calibration.figure_error_oversampling * angular_spread * far_field_focal_length / extent;
    let shift = 1.0 + calibration.displacement_image_floor * deflection.abs() * far_field_focal_length / extent;
    1.0_f64.max(spread).max(shift)
}

/// Uniform sampling grid centred on `centre`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridPlan {
    pub centre: f64,
    pub pitch: f64,
    pub n: usize,
}

impl GridPlan {
    pub fn width(&self) -> f64 {
        self.pitch * self.n as f64
    }

    /// Coordinate of sample `i`.
    pub fn coordinate(&self, i: usize) -> f64 {
        self.centre + (i as f64 - 0.5 * (self.n as f64 - 1.0)) * self.pitch
    }

    pub fn coordinates(&self) -> Vec<f64> {
        (0..self.n).map(|i| self.coordinate(i)).collect()
    }
}

/// Derived quantities for one diffraction axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisContext {
    pub axis: Axis,
    pub screen_min: f64,
    pub screen_max: f64,
    /// Effective focal length of the wavefront lens (m).
    pub focal_length: f64,
    /// Propagation distance to the image plane (m).
    pub distance: f64,
    pub far_field_focal_length: f64,
    /// Slope entering the near-field image floor: the raw figure-error slope
    /// for reflective elements, `delta` times the thickness slope for lenses.
    pub rms_slope: f64,
    /// RMS angular spread added to the beam by the error profile.
    pub angular_spread: f64,
    /// Beam deflection caused by the element displacement.
    pub deflection: f64,
    /// Rigid beam translation caused by the element displacement.
    pub lateral_translation: f64,
    pub n_bins: usize,
}

impl AxisContext {
    pub fn extent(&self) -> f64 {
        self.screen_max - self.screen_min
    }

    pub fn centre(&self) -> f64 {
        0.5 * (self.screen_min + self.screen_max)
    }

    /// Side length of the near-field output window.
    pub fn near_field_image_size(&self, wavelength: f64, n_peaks: usize, calibration: &Calibration) -> f64 {
        let l = self.extent();
        let d = self.distance.abs();
        let f = self.focal_length.abs();
        let peaks = n_peaks as f64 * 2.0 * calibration.peak_width_factor * wavelength * d / l;
        let focus = 2.0 * l * (d - f).abs() / f;
        let slope = calibration.rms_slope_image_floor * self.rms_slope * d;
        let displacement =
            calibration.displacement_image_floor * (self.deflection.abs() * d + self.lateral_translation.abs());
        peaks.max(focus).max(slope).max(displacement)
    }

    /// Far-field propagation grid for a lens of focal length `focal_length`.
    pub fn far_field_grid(&self, focal_length: f64, wavelength: f64, calibration: &Calibration, cap: usize) -> GridPlan {
        let l = self.extent();
        let n = fft_sample_count(l, wavelength, focal_length, calibration, cap);
        let scale = oversampling_scale(l, focal_length, self.angular_spread, self.deflection, calibration);
        let wanted = n as f64 * scale;
        let n_ff = if wanted > cap as f64 {
            log::warn!(
                "{:?}: far-field grid of {:.0} points exceeds the cap of {}; sampling is coarsened",
                self.axis,
                wanted,
                cap
            );
            cap
        } else {
            wanted as usize
        };
        GridPlan {
            centre: self.centre(),
            pitch: scale * l / n_ff as f64,
            n: n_ff,
        }
    }

    /// Near-field propagation grid covering the screen, the image window and
    /// the geometric beam size at the image plane.
    pub fn near_field_grid(&self, wavelength: f64, image_size: f64, calibration: &Calibration, cap: usize) -> GridPlan {
        let l = self.extent();
        let n = fft_sample_count(l, wavelength, self.distance, calibration, cap).max(MIN_NEAR_FIELD_SAMPLES);
        let mut pitch = l / n as f64;
        let window = l.max(image_size).max(l * self.distance.abs() / self.focal_length.abs());
        let mut m = (window / pitch).ceil() as usize;
        if m > cap {
            log::warn!(
                "{:?}: near-field grid of {} points exceeds the cap of {}; sampling is coarsened",
                self.axis,
                m,
                cap
            );
            m = cap;
            pitch = window / m as f64;
        }
        GridPlan {
            centre: self.centre(),
            pitch,
            n: m,
        }
    }
}

/// All derived quantities of one invocation.
#[derive(Debug, Clone)]
pub struct CalculationContext {
    pub wavelength: f64,
    pub plane: DiffractionPlane,
    pub propagation: PropagationType,
    pub axes: Vec<AxisContext>,
    pub calibration: Calibration,
    pub n_peaks: usize,
    pub fft_cap: usize,
}

impl CalculationContext {
    /// Derive the context for the axes of `plane`.
    ///
    /// # Errors
    /// - [`HybridError::ZeroExtent`] if the screen has no extent on an axis.
    /// - [`HybridError::InvalidConfig`] if the propagation distance or focal
    ///   length resolves to zero.
    pub fn build(
        config: &HybridConfig,
        plane: DiffractionPlane,
        element: &OpticalElement,
        screen: &ScreenData,
        model: &SurfaceModel,
        error: Option<&FigureErrorProfile>,
    ) -> Result<Self, HybridError> {
        let wavelength = screen.wavelength;
        let calibration = config.calibration.clone();

        let distance = match config.propagation_distance {
            LengthSpec::Explicit(d) => d,
            LengthSpec::Auto => element.image_distance,
        };
        if distance == 0.0 || !distance.is_finite() {
            return Err(HybridError::InvalidConfig(format!(
                "{}: image distance is {}; set an explicit propagation distance",
                element.name, distance
            )));
        }

        let mut axes = Vec::with_capacity(plane.axes().len());
        for &axis in plane.axes() {
            let (screen_min, screen_max) = screen.extent(axis)?;
            let extent = screen_max - screen_min;

            let focal_length = match config.focal_length {
                LengthSpec::Explicit(f) => f,
                LengthSpec::Auto => match model {
                    SurfaceModel::Aperture => distance,
                    _ => element
                        .focal_length(axis)
                        .or_else(|| model.focal_length(axis))
                        .unwrap_or(element.image_distance),
                },
            };
            if focal_length == 0.0 || !focal_length.is_finite() {
                return Err(HybridError::InvalidConfig(format!(
                    "{:?}: focal length resolves to {}",
                    axis, focal_length
                )));
            }

            let raw_slope = error.map_or(0.0, |p| p.rms_slope(surface_axis(axis)));
            let gain = model.slope_gain();
            let rms_slope = match model {
                SurfaceModel::Lens { .. } => gain * raw_slope,
                _ => raw_slope,
            };

            let (deflection, lateral_translation) = match model {
                SurfaceModel::Reflective { grazing_angle, .. } => {
                    let folding = element.displacement.folding(surface_axis(axis), *grazing_angle);
                    (folding.deflection, folding.lateral_translation)
                }
                _ => (0.0, 0.0),
            };

            let ctx = AxisContext {
                axis,
                screen_min,
                screen_max,
                focal_length,
                distance,
                far_field_focal_length: far_field_focal_length(
                    extent,
                    wavelength,
                    config.n_diffraction_peaks,
                    calibration.peak_width_factor,
                ),
                rms_slope,
                angular_spread: gain * raw_slope,
                deflection,
                lateral_translation,
                n_bins: config.n_bins(axis),
            };
            log::info!(
                "{:?}: extent {:.4e} m, focal length {:.4e} m, distance {:.4e} m, far-field focal length {:.4e} m",
                axis,
                extent,
                focal_length,
                distance,
                ctx.far_field_focal_length
            );
            axes.push(ctx);
        }

        Ok(Self {
            wavelength,
            plane,
            propagation: config.propagation_type,
            axes,
            calibration,
            n_peaks: config.n_diffraction_peaks,
            fft_cap: config.fft_sample_cap,
        })
    }

    pub fn axis(&self, axis: Axis) -> Option<&AxisContext> {
        self.axes.iter().find(|a| a.axis == axis)
    }

    /// FFT cap per axis: the full cap in 1D, its square root per axis in 2D.
    pub fn axis_cap(&self) -> usize {
        match self.plane {
            DiffractionPlane::Both2D => ((self.fft_cap as f64).sqrt() as usize).max(MIN_FFT_SAMPLES),
            _ => self.fft_cap,
        }
    }

    /// Common far-field focal length of a joint 2D wavefront.
    pub fn joint_far_field_focal_length(&self) -> f64 {
        self.axes
            .iter()
            .map(|a| a.far_field_focal_length)
            .fold(f64::INFINITY, f64::min)
    }

    pub fn summary(&self) -> ContextSummary {
        let cap = self.axis_cap();
        let joint = self.plane == DiffractionPlane::Both2D;
        let axes = self
            .axes
            .iter()
            .map(|a| {
                let f_ff = if joint {
                    self.joint_far_field_focal_length()
                } else {
                    a.far_field_focal_length
                };
                let image_size = a.near_field_image_size(self.wavelength, self.n_peaks, &self.calibration);
                AxisSummary {
                    context: a.clone(),
                    far_field_grid: self
                        .propagation
                        .far_field()
                        .then(|| a.far_field_grid(f_ff, self.wavelength, &self.calibration, cap)),
                    near_field_grid: self
                        .propagation
                        .near_field()
                        .then(|| a.near_field_grid(self.wavelength, image_size, &self.calibration, cap)),
                    near_field_image_size: self.propagation.near_field().then_some(image_size),
                }
            })
            .collect();
        ContextSummary {
            wavelength: self.wavelength,
            diffraction_plane: self.plane,
            propagation_type: self.propagation,
            axes,
        }
    }
}

/// Serializable view of a [`CalculationContext`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextSummary {
    pub wavelength: f64,
    pub diffraction_plane: DiffractionPlane,
    pub propagation_type: PropagationType,
    pub axes: Vec<AxisSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisSummary {
    #[serde(flatten)]
    pub context: AxisContext,
    pub far_field_grid: Option<GridPlan>,
    pub near_field_grid: Option<GridPlan>,
    pub near_field_image_size: Option<f64>,
}
