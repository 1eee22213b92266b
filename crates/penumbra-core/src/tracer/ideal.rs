//! Thin-lens reference tracer.
//!
//! Elements are modelled in the unfolded frame: the beam always travels
//! along `+y`, a reflective element acts as a thin lens at its pole with the
//! element's focal lengths, and the footprint is obtained by projecting the
//! tangential coordinate onto the surface ($y_m = z / \sin\theta$). Figure
//! errors are ignored; displacements of reflective elements deflect and
//! translate the reflected beam rigidly.

use penumbra_surface::SurfaceAxis;

use super::{RayTracer, TraceOutput, TracerError};
use crate::element::{ElementKind, OpticalElement};
use crate::types::{Axis, Footprint, FootprintPoint, Ray, RayEnsemble};

/// Reference [`RayTracer`] with ideal thin-lens optics.
#[derive(Debug, Clone, Default)]
pub struct IdealTracer;

impl IdealTracer {
    pub fn new() -> Self {
        Self
    }
}

fn drift(ray: &mut Ray, distance: f64) {
    let vy = ray.direction[1];
    ray.position[0] += ray.direction[0] / vy * distance;
    ray.position[2] += ray.direction[2] / vy * distance;
    ray.optical_path += distance / vy;
}

/// Thin-lens kick `tan(div) -> tan(div) - pos / f` on both axes.
fn focus(ray: &mut Ray, focal_lengths: [Option<f64>; 2]) {
    let kick = |axis: Axis| {
        let t = ray.divergence(axis).tan();
        match focal_lengths[axis.index()] {
            Some(f) => (t - ray.transverse(axis) / f).atan(),
            None => t.atan(),
        }
    };
    let (dx, dz) = (kick(Axis::X), kick(Axis::Z));
    ray.set_divergences(dx, dz);
}

impl RayTracer for IdealTracer {
    fn trace(&self, beam: &RayEnsemble, element: &OpticalElement) -> Result<TraceOutput, TracerError> {
        let reflective = element.kind.is_reflective();
        let theta = element.incidence_angle;
        if reflective && !(theta > 0.0 && theta < std::f64::consts::FRAC_PI_2) {
            return Err(TracerError::Unsupported {
                tracer: self.name().to_string(),
                reason: format!("grazing angle {} rad is not in (0, pi/2)", theta),
            });
        }

        let disp = element.displacement;
        let width = disp.folding(SurfaceAxis::Width, theta);
        let length = disp.folding(SurfaceAxis::Length, theta);

        let mut rays = beam.rays().to_vec();
        let mut footprint = Vec::with_capacity(if reflective { rays.len() } else { 0 });

        for ray in rays.iter_mut() {
            drift(ray, element.source_distance);

            match &element.kind {
                ElementKind::Aperture => {
                    if !element.aperture.contains(ray.position[0], ray.position[2]) {
                        ray.good = false;
                    }
                }
                ElementKind::Crl { .. } => {
                    if !element.aperture.contains(ray.position[0], ray.position[2]) {
                        ray.good = false;
                    }
                    focus(ray, element.focal_lengths);
                }
                ElementKind::Mirror | ElementKind::Grating => {
                    let x_m = ray.position[0] - width.shift;
                    let y_m = ray.position[2] / theta.sin() - length.shift;
                    if !element.aperture.contains(x_m, y_m) {
                        ray.good = false;
                    }
                    let incidence = theta - ray.divergence(Axis::Z);
                    focus(ray, element.focal_lengths);
                    let (dx, dz) = (ray.divergence(Axis::X), ray.divergence(Axis::Z));
                    ray.set_divergences(dx + width.deflection, dz + length.deflection);
                    ray.position[2] += length.lateral_translation;
                    footprint.push(FootprintPoint {
                        x_m,
                        y_m,
                        incidence_angle: incidence,
                        reflection_angle: element.reflection_angle + ray.divergence(Axis::Z),
                    });
                }
            }

            drift(ray, element.image_distance);
        }

        Ok(TraceOutput {
            beam: RayEnsemble::new(rays),
            footprint: reflective.then_some(Footprint { points: footprint }),
        })
    }

    fn retrace(&self, beam: &RayEnsemble, distance: f64) -> Result<RayEnsemble, TracerError> {
        let mut rays = beam.rays().to_vec();
        rays.iter_mut().for_each(|r| drift(r, distance));
        Ok(RayEnsemble::new(rays))
    }

    fn name(&self) -> &str {
        "ideal thin-lens tracer"
    }
}
