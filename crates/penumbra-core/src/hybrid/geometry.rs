//! Geometry analysis: is the beam actually cut by the element?
//!
//! The incoming beam is traced through a copy of the element with its
//! aperture removed. The intensity that would fall outside the aperture is
//! measured on a fine histogram (footprint coordinates on reflective
//! elements, screen coordinates otherwise). Below the configured fraction an
//! axis counts as not cut and needs no diffraction correction.

use super::histogram::{fraction_outside, histogram_1d};
use crate::config::Calibration;
use crate::element::OpticalElement;
use crate::error::HybridError;
use crate::tracer::{RayTracer, TracerError};
use crate::types::{Axis, RayEnsemble};

/// Result of the cut analysis for the requested axes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CutAnalysis {
    /// Per axis `[x, z]`: fraction of intensity outside the aperture.
    pub fractions: [f64; 2],
    /// Per axis `[x, z]`: whether the beam is cut.
    pub cut: [bool; 2],
}

impl CutAnalysis {
    pub fn is_cut(&self, axis: Axis) -> bool {
        self.cut[axis.index()]
    }
}

pub struct GeometryAnalyzer<'a> {
    tracer: &'a dyn RayTracer,
    calibration: &'a Calibration,
}

impl<'a> GeometryAnalyzer<'a> {
    pub fn new(tracer: &'a dyn RayTracer, calibration: &'a Calibration) -> Self {
        Self { tracer, calibration }
    }

    pub fn analyze(
        &self,
        incoming: &RayEnsemble,
        element: &OpticalElement,
        axes: &[Axis],
    ) -> Result<CutAnalysis, HybridError> {
        let mut analysis = CutAnalysis::default();
        if axes.iter().all(|&a| element.aperture.half_width(a).is_none()) {
            return Ok(analysis);
        }

        let traced = self.tracer.trace(incoming, &element.unlimited())?;

        // [x, z] coordinate and weight per good ray
        let (coordinates, weights): (Vec<[f64; 2]>, Vec<f64>) = if element.kind.is_reflective() {
            let fp = traced.footprint.as_ref().ok_or_else(|| {
                TracerError::Failed(format!("{} returned no footprint for a reflective element", self.tracer.name()))
            })?;
            traced
                .beam
                .rays()
                .iter()
                .zip(fp.points.iter())
                .filter(|(r, _)| r.good)
                .map(|(r, p)| ([p.x_m, p.y_m], r.intensity()))
                .unzip()
        } else {
            let screen = self.tracer.retrace(&traced.beam, -element.image_distance)?;
            screen
                .good_rays()
                .map(|r| ([r.transverse(Axis::X), r.transverse(Axis::Z)], r.intensity()))
                .unzip()
        };

        for &axis in axes {
            let Some(half) = element.aperture.half_width(axis) else {
                continue;
            };
            let centre = element.aperture.centre(axis);
            let i = axis.index();
            let (min, max) = coordinates
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| (lo.min(c[i]), hi.max(c[i])));

            let fraction = if !(max > min) {
                // Degenerate spread: every ray shares one coordinate.
                if coordinates.is_empty() || (min - centre).abs() <= half {
                    0.0
                } else {
                    1.0
                }
            } else {
                let samples = coordinates.iter().zip(weights.iter()).map(|(c, &w)| (c[i], w));
                let hist = histogram_1d(samples, min, max, self.calibration.geometry_histogram_bins)?;
                fraction_outside(&hist, centre, half)
            };

            analysis.fractions[i] = fraction;
            analysis.cut[i] = fraction >= self.calibration.cut_fraction_threshold;
            log::debug!(
                "{:?}: {:.2}% of the intensity outside the aperture ({})",
                axis,
                100.0 * fraction,
                if analysis.cut[i] { "cut" } else { "not cut" }
            );
        }
        Ok(analysis)
    }
}
