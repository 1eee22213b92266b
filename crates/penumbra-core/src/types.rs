//! Core types shared across the Penumbra workspace.
//!
//! This module defines the ray data model exchanged with the ray tracer: a
//! single [`Ray`] with position, direction cosines and polarisation fields,
//! and the [`RayEnsemble`] that the hybrid correction consumes and returns.
//! All lengths are in metres, wavenumbers in 1/m and angles in radians.

use std::collections::HashSet;
use std::f64::consts::PI;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of numeric columns in the flat ray schema.
pub const RAY_COLUMNS: usize = 18;

/// Transverse axis of the beam. `X` is the sagittal direction, `Z` the
/// tangential one; `Y` is the optical axis and never diffracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Z,
}

impl Axis {
    /// Index into per-axis `[sagittal, tangential]` pairs.
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Z => 1,
        }
    }

    /// Index into a 3-vector.
    pub fn component(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Z => 2,
        }
    }
}

/// Errors raised by beam validation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BeamError {
    #[error("Ray index {0} appears more than once")]
    DuplicateIndex(u64),

    #[error("Ray {index} has a non-finite {field}")]
    NonFinite { index: u64, field: &'static str },

    #[error("Beams do not match: {0}")]
    Mismatch(String),

    #[error("Beam has no good rays")]
    NoGoodRays,
}

/// A single ray.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ray {
    /// Position (m).
    pub position: [f64; 3],
    /// Unit direction cosines.
    pub direction: [f64; 3],
    /// σ-polarisation field amplitude vector.
    pub sigma_field: [f64; 3],
    /// Whether the ray survived every element so far.
    pub good: bool,
    /// Wavenumber $k = 2\pi/\lambda$ (1/m).
    pub wavenumber: f64,
    /// Unique ray identifier.
    pub index: u64,
    /// Accumulated optical path (m).
    pub optical_path: f64,
    pub sigma_phase: f64,
    pub pi_phase: f64,
    /// π-polarisation field amplitude vector.
    pub pi_field: [f64; 3],
}

impl Ray {
    /// Intensity $|E_\sigma|^2 + |E_\pi|^2$.
    pub fn intensity(&self) -> f64 {
        self.sigma_field.iter().chain(self.pi_field.iter()).map(|e| e * e).sum()
    }

    /// Wavelength in metres.
    pub fn wavelength(&self) -> f64 {
        2.0 * PI / self.wavenumber
    }

    /// Transverse position along `axis`.
    pub fn transverse(&self, axis: Axis) -> f64 {
        self.position[axis.component()]
    }

    /// Divergence $\arctan(v_t / v_y)$ along `axis`.
    pub fn divergence(&self, axis: Axis) -> f64 {
        (self.direction[axis.component()] / self.direction[1]).atan()
    }

    /// Set the direction from the two transverse divergences, keeping unit
    /// length.
    pub fn set_divergences(&mut self, div_x: f64, div_z: f64) {
        let tx = div_x.tan();
        let tz = div_z.tan();
        let norm = (1.0 + tx * tx + tz * tz).sqrt();
        self.direction = [tx / norm, 1.0 / norm, tz / norm];
    }

    /// Flatten to the 18-column schema:
    /// x, y, z, vx, vy, vz, Eσx, Eσy, Eσz, flag, k, index, path, σ phase,
    /// π phase, Eπx, Eπy, Eπz.
    pub fn to_row(&self) -> [f64; RAY_COLUMNS] {
        [
            self.position[0],
            self.position[1],
            self.position[2],
            self.direction[0],
            self.direction[1],
            self.direction[2],
            self.sigma_field[0],
            self.sigma_field[1],
            self.sigma_field[2],
            if self.good { 1.0 } else { -1.0 },
            self.wavenumber,
            self.index as f64,
            self.optical_path,
            self.sigma_phase,
            self.pi_phase,
            self.pi_field[0],
            self.pi_field[1],
            self.pi_field[2],
        ]
    }

    /// Inverse of [`to_row`](Self::to_row). A flag of `1` marks a good ray.
    pub fn from_row(row: &[f64; RAY_COLUMNS]) -> Self {
        Self {
            position: [row[0], row[1], row[2]],
            direction: [row[3], row[4], row[5]],
            sigma_field: [row[6], row[7], row[8]],
            good: row[9] > 0.5,
            wavenumber: row[10],
            index: row[11].round().max(0.0) as u64,
            optical_path: row[12],
            sigma_phase: row[13],
            pi_phase: row[14],
            pi_field: [row[15], row[16], row[17]],
        }
    }
}

/// An ordered collection of rays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RayEnsemble {
    rays: Vec<Ray>,
}

impl RayEnsemble {
    pub fn new(rays: Vec<Ray>) -> Self {
        Self { rays }
    }

    pub fn rays(&self) -> &[Ray] {
        &self.rays
    }

    pub fn rays_mut(&mut self) -> &mut [Ray] {
        &mut self.rays
    }

    pub fn len(&self) -> usize {
        self.rays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rays.is_empty()
    }

    pub fn good_rays(&self) -> impl Iterator<Item = &Ray> {
        self.rays.iter().filter(|r| r.good)
    }

    pub fn good_count(&self) -> usize {
        self.good_rays().count()
    }

    pub fn lost_count(&self) -> usize {
        self.len() - self.good_count()
    }

    /// Total intensity of the good rays.
    pub fn total_intensity(&self) -> f64 {
        self.good_rays().map(Ray::intensity).sum()
    }

    /// Mean wavelength of the good rays.
    pub fn mean_wavelength(&self) -> Option<f64> {
        let n = self.good_count();
        if n == 0 {
            return None;
        }
        Some(self.good_rays().map(Ray::wavelength).sum::<f64>() / n as f64)
    }

    /// Check that indices are unique and every good ray is finite.
    pub fn validate(&self) -> Result<(), BeamError> {
        let mut seen = HashSet::with_capacity(self.rays.len());
        for ray in &self.rays {
            if !seen.insert(ray.index) {
                return Err(BeamError::DuplicateIndex(ray.index));
            }
            if !ray.good {
                continue;
            }
            if !ray.position.iter().all(|v| v.is_finite()) {
                return Err(BeamError::NonFinite { index: ray.index, field: "position" });
            }
            if !ray.direction.iter().all(|v| v.is_finite()) || ray.direction[1] <= 0.0 {
                return Err(BeamError::NonFinite { index: ray.index, field: "direction" });
            }
            if !(ray.wavenumber.is_finite() && ray.wavenumber > 0.0) {
                return Err(BeamError::NonFinite { index: ray.index, field: "wavenumber" });
            }
        }
        Ok(())
    }

    /// Check that `other` holds the same rays, in the same order.
    pub fn check_aligned(&self, other: &RayEnsemble) -> Result<(), BeamError> {
        if self.len() != other.len() {
            return Err(BeamError::Mismatch(format!(
                "{} rays vs {} rays",
                self.len(),
                other.len()
            )));
        }
        if let Some((a, b)) = self
            .rays
            .iter()
            .zip(other.rays.iter())
            .find(|(a, b)| a.index != b.index)
        {
            return Err(BeamError::Mismatch(format!(
                "ray index {} paired with {}",
                a.index, b.index
            )));
        }
        Ok(())
    }

    /// Sorted list of ray indices.
    pub fn indices(&self) -> Vec<u64> {
        let mut idx: Vec<u64> = self.rays.iter().map(|r| r.index).collect();
        idx.sort_unstable();
        idx
    }
}

/// Where one ray struck a reflective element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FootprintPoint {
    /// Coordinate across the surface (m).
    pub x_m: f64,
    /// Coordinate along the surface (m).
    pub y_m: f64,
    /// Local grazing angle of incidence (rad).
    pub incidence_angle: f64,
    /// Local grazing angle of reflection (rad).
    pub reflection_angle: f64,
}

/// Per-ray footprint on an element, in the same order as the traced beam.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Footprint {
    pub points: Vec<FootprintPoint>,
}
