//! Synthetic input beams.
//!
//! Geometric sources for tests and command-line runs: Gaussian or uniform
//! rectangular distributions in position and divergence, monochromatic, with
//! a configurable split between σ and π polarisation.

use std::f64::consts::PI;

use penumbra_materials::HC_EV_M;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use super::TracerError;
use crate::types::{Ray, RayEnsemble};

/// Distribution shape of a synthetic source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceShape {
    /// `size` and `divergence` are RMS values.
    Gaussian,
    /// `size` and `divergence` are half-widths.
    Uniform,
}

fn default_shape() -> SourceShape {
    SourceShape::Gaussian
}

fn default_size() -> [f64; 2] {
    [1e-5, 1e-5]
}

fn default_divergence() -> [f64; 2] {
    [1e-6, 1e-6]
}

fn default_energy() -> f64 {
    10_000.0
}

fn default_rays() -> usize {
    50_000
}

fn default_polarisation() -> f64 {
    1.0
}

/// A monochromatic geometric source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticSource {
    #[serde(default = "default_shape")]
    pub shape: SourceShape,
    /// `[x, z]` size (m).
    #[serde(default = "default_size")]
    pub size: [f64; 2],
    /// `[x, z]` divergence (rad).
    #[serde(default = "default_divergence")]
    pub divergence: [f64; 2],
    /// Photon energy (eV).
    #[serde(default = "default_energy")]
    pub energy_ev: f64,
    #[serde(default = "default_rays")]
    pub n_rays: usize,
    /// Fraction of the intensity in the σ component.
    #[serde(default = "default_polarisation")]
    pub polarisation: f64,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self {
            shape: default_shape(),
            size: default_size(),
            divergence: default_divergence(),
            energy_ev: default_energy(),
            n_rays: default_rays(),
            polarisation: default_polarisation(),
            seed: None,
        }
    }
}

impl SyntheticSource {
    pub fn wavelength(&self) -> f64 {
        HC_EV_M / self.energy_ev
    }

    /// Generate the beam. Ray indices run from 1 to `n_rays`.
    pub fn generate(&self) -> Result<RayEnsemble, TracerError> {
        if self.n_rays == 0 {
            return Err(TracerError::InvalidSource("n_rays must be positive".into()));
        }
        if !(self.energy_ev.is_finite() && self.energy_ev > 0.0) {
            return Err(TracerError::InvalidSource(format!("invalid energy {} eV", self.energy_ev)));
        }
        if !(0.0..=1.0).contains(&self.polarisation) {
            return Err(TracerError::InvalidSource(format!(
                "polarisation fraction {} not in [0, 1]",
                self.polarisation
            )));
        }
        let mut widths = self.size.iter().chain(self.divergence.iter());
        if widths.any(|w| !(w.is_finite() && *w >= 0.0)) {
            return Err(TracerError::InvalidSource("sizes and divergences must be non-negative".into()));
        }

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let sample = |rng: &mut StdRng, width: f64| -> Result<f64, TracerError> {
            if width == 0.0 {
                return Ok(0.0);
            }
            Ok(match self.shape {
                SourceShape::Gaussian => Normal::new(0.0, width)
                    .map_err(|e| TracerError::InvalidSource(e.to_string()))?
                    .sample(rng),
                SourceShape::Uniform => rng.gen_range(-width..=width),
            })
        };

        let wavenumber = 2.0 * PI / self.wavelength();
        let e_sigma = self.polarisation.sqrt();
        let e_pi = (1.0 - self.polarisation).sqrt();

        let mut rays = Vec::with_capacity(self.n_rays);
        for i in 0..self.n_rays {
            let x = sample(&mut rng, self.size[0])?;
            let z = sample(&mut rng, self.size[1])?;
            let dx = sample(&mut rng, self.divergence[0])?;
            let dz = sample(&mut rng, self.divergence[1])?;
            let mut ray = Ray {
                position: [x, 0.0, z],
                direction: [0.0, 1.0, 0.0],
                sigma_field: [e_sigma, 0.0, 0.0],
                good: true,
                wavenumber,
                index: i as u64 + 1,
                optical_path: 0.0,
                sigma_phase: 0.0,
                pi_phase: 0.0,
                pi_field: [0.0, 0.0, e_pi],
            };
            ray.set_divergences(dx, dz);
            rays.push(ray);
        }
        log::debug!("Generated {} rays at {:.1} eV", rays.len(), self.energy_ev);
        Ok(RayEnsemble::new(rays))
    }
}
