//! Rebuilding the output beams from the sampled perturbations.
//!
//! The base of every output is the outgoing beam of the real trace. Rays
//! lost at the element are copied from it untouched. Good rays keep all
//! their metadata, and their position and direction along axes that are not
//! corrected; along the computed axes both are rebuilt from the screen ray.
//! Samples are indexed in the order of [`ScreenData::good_indices`].
//!
//! A ray that the ideal screen trace keeps but the real trace loses stays
//! lost; its sample is discarded.

use super::context::{AxisContext, CalculationContext};
use super::screen::ScreenData;
use crate::error::HybridError;
use crate::types::{Axis, RayEnsemble};

/// Per-axis samples `[x, z]`; `None` for axes that are not corrected.
pub type AxisSamples = [Option<Vec<f64>>; 2];

pub struct BeamReconstructor<'a> {
    screen: &'a ScreenData,
    context: &'a CalculationContext,
    outgoing: &'a RayEnsemble,
}

impl<'a> BeamReconstructor<'a> {
    /// `outgoing` must be aligned with the screen beam.
    pub fn new(screen: &'a ScreenData, context: &'a CalculationContext, outgoing: &'a RayEnsemble) -> Self {
        Self {
            screen,
            context,
            outgoing,
        }
    }

    fn check_lengths(&self, samples: &AxisSamples) -> Result<(), HybridError> {
        let n = self.screen.n_good();
        for s in samples.iter().flatten() {
            if s.len() != n {
                return Err(HybridError::InvalidConfig(format!(
                    "{} samples for {} good rays",
                    s.len(),
                    n
                )));
            }
        }
        Ok(())
    }

    fn rebuild(
        &self,
        samples: &AxisSamples,
        update: impl Fn(&AxisContext, f64, f64, f64) -> (f64, f64),
    ) -> Result<RayEnsemble, HybridError> {
        self.check_lengths(samples)?;
        self.screen.screen.check_aligned(self.outgoing)?;
        let mut beam = self.outgoing.clone();
        let screen_rays = self.screen.screen.rays();
        let rays = beam.rays_mut();

        for (k, &i) in self.screen.good_indices().iter().enumerate() {
            let at_screen = &screen_rays[i];
            let ray = &mut rays[i];
            if !ray.good {
                continue;
            }
            let mut divergences = [ray.divergence(Axis::X), ray.divergence(Axis::Z)];
            for axis in [Axis::X, Axis::Z] {
                let (Some(s), Some(ctx)) = (&samples[axis.index()], self.context.axis(axis)) else {
                    continue;
                };
                let (position, divergence) = update(
                    ctx,
                    at_screen.transverse(axis),
                    at_screen.divergence(axis),
                    s[k],
                );
                ray.position[axis.component()] = position + translation(ctx);
                divergences[axis.index()] = divergence;
            }
            ray.set_divergences(divergences[0], divergences[1]);
        }
        Ok(beam)
    }

    /// Far-field beam: the samples are tangents of diffraction angles added
    /// to the screen divergence; rays are drifted to the image plane.
    pub fn far_field(&self, samples: &AxisSamples) -> Result<RayEnsemble, HybridError> {
        self.rebuild(samples, |ctx, x, div, sample| {
            let new_div = sample.atan() + div;
            (x + ctx.distance * new_div.tan(), new_div)
        })
    }

    /// Near-field beam: the samples are position offsets in the focal plane.
    ///
    /// The reference is not the aperture-plane position but the geometric
    /// position at the effective focal length, `x + f tan(div)`, so the
    /// sample spreads each ray around its own focus. Divergences are kept.
    pub fn near_field(&self, samples: &AxisSamples) -> Result<RayEnsemble, HybridError> {
        self.rebuild(samples, |ctx, x, div, sample| {
            (x + ctx.focal_length * div.tan() + sample, div)
        })
    }
}

fn translation(ctx: &AxisContext) -> f64 {
    match ctx.axis {
        Axis::Z => ctx.lateral_translation,
        Axis::X => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HybridConfig;
    use crate::element::{Aperture, ElementKind, OpticalElement};
    use crate::hybrid::screen::ScreenProjector;
    use crate::hybrid::strategy::SurfaceModel;
    use crate::tracer::ideal::IdealTracer;
    use crate::tracer::RayTracer;
    use crate::tracer::source::{SourceShape, SyntheticSource};
    use approx::assert_abs_diff_eq;

    /// Slit beam: `(outgoing, screen, context)`.
    fn setup() -> (RayEnsemble, ScreenData, CalculationContext) {
        let beam = SyntheticSource {
            shape: SourceShape::Uniform,
            size: [1e-5, 1e-5],
            divergence: [1e-6, 1e-6],
            n_rays: 2_000,
            seed: Some(9),
            ..Default::default()
        }
        .generate()
        .unwrap();
        let mut slit = OpticalElement::new("slit", ElementKind::Aperture);
        slit.aperture = Aperture {
            half_widths: [None, Some(5e-6)],
            centre: [0.0, 0.0],
        };
        slit.image_distance = 2.0;
        let tracer = IdealTracer::new();
        let outgoing = tracer.trace(&beam, &slit).unwrap().beam;
        let screen = ScreenProjector::new(&tracer).project(&beam, &slit, &[Axis::Z]).unwrap();
        let ctx = CalculationContext::build(
            &HybridConfig::default(),
            crate::config::DiffractionPlane::Tangential,
            &slit,
            &screen,
            &SurfaceModel::Aperture,
            None,
        )
        .unwrap();
        (outgoing, screen, ctx)
    }

    #[test]
    fn test_zero_far_field_samples_reproduce_image() {
        let (outgoing, screen, ctx) = setup();
        let samples: AxisSamples = [None, Some(vec![0.0; screen.n_good()])];
        let out = BeamReconstructor::new(&screen, &ctx, &outgoing).far_field(&samples).unwrap();
        for (a, b) in out.rays().iter().zip(screen.image.beam.rays()) {
            assert_eq!(a.index, b.index);
            assert_eq!(a.good, b.good);
            assert_abs_diff_eq!(a.position[2], b.position[2], epsilon = 1e-15);
            assert_abs_diff_eq!(a.direction[2], b.direction[2], epsilon = 1e-15);
            assert_eq!(a.sigma_field, b.sigma_field);
        }
    }

    #[test]
    fn test_lost_rays_untouched() {
        let (outgoing, screen, ctx) = setup();
        let samples: AxisSamples = [None, Some(vec![1e-5; screen.n_good()])];
        let out = BeamReconstructor::new(&screen, &ctx, &outgoing).far_field(&samples).unwrap();
        assert_eq!(out.len(), outgoing.len());
        assert!(out.lost_count() > 0);
        for (a, b) in out.rays().iter().zip(screen.image.beam.rays()) {
            if !b.good {
                assert_eq!(a, b);
            } else {
                assert_abs_diff_eq!(a.position[0], b.position[0], epsilon = 1e-15);
            }
        }
    }

    #[test]
    fn test_near_field_offsets_position_only() {
        let (outgoing, screen, ctx) = setup();
        let samples: AxisSamples = [None, Some(vec![2e-6; screen.n_good()])];
        let out = BeamReconstructor::new(&screen, &ctx, &outgoing).near_field(&samples).unwrap();
        let f = ctx.axis(Axis::Z).unwrap().focal_length;
        for &i in screen.good_indices() {
            let s = &screen.screen.rays()[i];
            let expected = s.transverse(Axis::Z) + f * s.divergence(Axis::Z).tan() + 2e-6;
            assert_abs_diff_eq!(out.rays()[i].position[2], expected, epsilon = 1e-15);
            assert_abs_diff_eq!(
                out.rays()[i].divergence(Axis::Z),
                s.divergence(Axis::Z),
                epsilon = 1e-15
            );
        }
    }

    #[test]
    fn test_sample_count_mismatch_rejected() {
        let (outgoing, screen, ctx) = setup();
        let samples: AxisSamples = [None, Some(vec![0.0; 3])];
        assert!(BeamReconstructor::new(&screen, &ctx, &outgoing).far_field(&samples).is_err());
    }

    #[test]
    fn test_uncorrected_axis_and_losses_follow_outgoing_beam() {
        let (mut outgoing, screen, ctx) = setup();
        let first_good = screen.good_indices()[0];
        for ray in outgoing.rays_mut() {
            ray.position[0] += 1e-3;
            ray.set_divergences(2e-6, ray.divergence(Axis::Z));
        }
        outgoing.rays_mut()[first_good].good = false;

        let samples: AxisSamples = [None, Some(vec![1e-5; screen.n_good()])];
        let out = BeamReconstructor::new(&screen, &ctx, &outgoing).far_field(&samples).unwrap();

        assert_eq!(out.rays()[first_good], outgoing.rays()[first_good]);
        let d = ctx.axis(Axis::Z).unwrap().distance;
        for &i in &screen.good_indices()[1..] {
            let (a, src, s) = (&out.rays()[i], &outgoing.rays()[i], &screen.screen.rays()[i]);
            assert_abs_diff_eq!(a.position[0], src.position[0], epsilon = 1e-15);
            assert_abs_diff_eq!(a.divergence(Axis::X), 2e-6, epsilon = 1e-15);
            let div = 1e-5_f64.atan() + s.divergence(Axis::Z);
            assert_abs_diff_eq!(a.divergence(Axis::Z), div, epsilon = 1e-15);
            assert_abs_diff_eq!(a.position[2], s.transverse(Axis::Z) + d * div.tan(), epsilon = 1e-15);
        }
    }
}
