//! Screen projection: the beam at the element plane, before diffraction.
//!
//! The incoming beam is traced through an ideal copy of the element (no
//! displacement, no figure error) and the resulting image beam is re-traced
//! back by the image distance onto the screen, the plane of the element.
//! The image beam is kept as the base for reconstruction; the screen beam
//! supplies the intensity histograms and per-ray divergences.

use penumbra_surface::{ScalarField1D, ScalarField2D};
use rayon::prelude::*;

use super::histogram::{bins_1d, bins_2d, edge_extended, edge_extended_2d, histogram_1d, histogram_2d};
use crate::element::OpticalElement;
use crate::error::HybridError;
use crate::tracer::{RayTracer, TraceOutput, TracerError};
use crate::types::{Axis, BeamError, FootprintPoint, Ray, RayEnsemble};

/// Everything known about the beam at the screen.
#[derive(Debug, Clone)]
pub struct ScreenData {
    /// Trace through the ideal element, at the image plane.
    pub image: TraceOutput,
    /// `image` re-traced onto the element plane.
    pub screen: RayEnsemble,
    /// Mean wavelength of the good rays (m).
    pub wavelength: f64,
    good: Vec<usize>,
}

impl ScreenData {
    /// Positions in the beams of the good rays.
    pub fn good_indices(&self) -> &[usize] {
        &self.good
    }

    pub fn n_good(&self) -> usize {
        self.good.len()
    }

    fn good_rays(&self) -> impl Iterator<Item = &Ray> {
        self.good.iter().map(move |&i| &self.screen.rays()[i])
    }

    /// Screen positions of the good rays along `axis`.
    pub fn positions(&self, axis: Axis) -> Vec<f64> {
        self.good_rays().map(|r| r.transverse(axis)).collect()
    }

    /// Intensities of the good rays.
    pub fn weights(&self) -> Vec<f64> {
        self.good_rays().map(Ray::intensity).collect()
    }

    /// Divergences of the good rays along `axis`.
    pub fn divergences(&self, axis: Axis) -> Vec<f64> {
        let rays = self.screen.rays();
        self.good.par_iter().map(|&i| rays[i].divergence(axis)).collect()
    }

    /// Footprint points of the good rays, for reflective elements.
    pub fn footprint(&self) -> Option<Vec<FootprintPoint>> {
        let fp = self.image.footprint.as_ref()?;
        Some(self.good.iter().map(|&i| fp.points[i]).collect())
    }

    /// `(min, max)` of the good-ray positions along `axis`.
    ///
    /// # Errors
    /// [`HybridError::ZeroExtent`] if all positions coincide.
    pub fn extent(&self, axis: Axis) -> Result<(f64, f64), HybridError> {
        let (min, max) = self
            .good_rays()
            .map(|r| r.transverse(axis))
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
        if !(max > min) {
            return Err(HybridError::ZeroExtent(axis));
        }
        Ok((min, max))
    }

    /// Edge-extended intensity histogram along `axis`.
    pub fn intensity_1d(&self, axis: Axis, configured_bins: usize) -> Result<ScalarField1D, HybridError> {
        let (min, max) = self.extent(axis)?;
        let n = bins_1d(configured_bins, self.n_good());
        let samples = self.good_rays().map(|r| (r.transverse(axis), r.intensity()));
        let hist = histogram_1d(samples, min, max, n)?;
        log::debug!("{:?} screen histogram: {} bins over [{:.4e}, {:.4e}] m", axis, n, min, max);
        Ok(edge_extended(&hist, min, max)?)
    }

    /// Edge-extended joint intensity histogram over `(x, z)`.
    pub fn intensity_2d(&self, configured_bins: (usize, usize)) -> Result<ScalarField2D, HybridError> {
        let x_range = self.extent(Axis::X)?;
        let z_range = self.extent(Axis::Z)?;
        let bins = (
            bins_2d(configured_bins.0, self.n_good()),
            bins_2d(configured_bins.1, self.n_good()),
        );
        let samples = self
            .good_rays()
            .map(|r| (r.transverse(Axis::X), r.transverse(Axis::Z), r.intensity()));
        let hist = histogram_2d(samples, x_range, z_range, bins)?;
        log::debug!("2D screen histogram: {}x{} bins", bins.0, bins.1);
        Ok(edge_extended_2d(&hist, x_range, z_range)?)
    }
}

/// Builds [`ScreenData`] through a [`RayTracer`].
pub struct ScreenProjector<'a> {
    tracer: &'a dyn RayTracer,
}

impl<'a> ScreenProjector<'a> {
    pub fn new(tracer: &'a dyn RayTracer) -> Self {
        Self { tracer }
    }

    /// Trace `incoming` through the ideal copy of `element` and project onto
    /// the screen. Every axis in `axes` must have a non-zero extent.
    pub fn project(
        &self,
        incoming: &RayEnsemble,
        element: &OpticalElement,
        axes: &[Axis],
    ) -> Result<ScreenData, HybridError> {
        let image = self.tracer.trace(incoming, &element.ideal())?;
        incoming.check_aligned(&image.beam)?;
        if let Some(fp) = &image.footprint {
            if fp.points.len() != image.beam.len() {
                return Err(TracerError::Failed(format!(
                    "footprint has {} points for {} rays",
                    fp.points.len(),
                    image.beam.len()
                ))
                .into());
            }
        }

        let screen = self.tracer.retrace(&image.beam, -element.image_distance)?;
        image.beam.check_aligned(&screen)?;

        let good: Vec<usize> = screen
            .rays()
            .iter()
            .enumerate()
            .filter(|(_, r)| r.good)
            .map(|(i, _)| i)
            .collect();
        if good.is_empty() {
            return Err(BeamError::NoGoodRays.into());
        }
        let wavelength = screen.mean_wavelength().ok_or(BeamError::NoGoodRays)?;

        let data = ScreenData {
            image,
            screen,
            wavelength,
            good,
        };
        for &axis in axes {
            let (min, max) = data.extent(axis)?;
            log::debug!("{:?} screen extent [{:.4e}, {:.4e}] m", axis, min, max);
        }
        log::info!(
            "Screen projected with {} ({} good rays, wavelength {:.4e} m)",
            self.tracer.name(),
            data.n_good(),
            wavelength
        );
        Ok(data)
    }
}
