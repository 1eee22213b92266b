//! Optical element descriptors.
//!
//! An [`OpticalElement`] carries what the hybrid correction needs to know
//! about the element the beam has just crossed: its kind, aperture, grazing
//! angles, distances, displacement and optional figure or thickness error.
//! Per-axis pairs are ordered `[sagittal, tangential]`; for reflective
//! elements that means `[width, length]` on the surface.

use std::path::PathBuf;
use std::sync::Arc;

use penumbra_surface::{load_figure_error, Displacement, FigureErrorFormat, FigureErrorProfile, ParseError};
use serde::{Deserialize, Serialize};

use crate::types::Axis;

/// Kind of optical element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementKind {
    /// A slit or rectangular aperture.
    Aperture,
    Mirror,
    Grating,
    /// A stack of `n_lenses` identical parabolic refractive lenses with apex
    /// radius `radius` (m).
    Crl {
        material: String,
        n_lenses: usize,
        radius: f64,
    },
}

impl ElementKind {
    pub fn is_reflective(&self) -> bool {
        matches!(self, ElementKind::Mirror | ElementKind::Grating)
    }
}

/// Rectangular aperture limits. `None` means unlimited along that axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Aperture {
    #[serde(default)]
    pub half_widths: [Option<f64>; 2],
    #[serde(default)]
    pub centre: [f64; 2],
}

impl Aperture {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn half_width(&self, axis: Axis) -> Option<f64> {
        self.half_widths[axis.index()]
    }

    pub fn centre(&self, axis: Axis) -> f64 {
        self.centre[axis.index()]
    }

    /// Whether `(a, b)` (sagittal, tangential) lies inside the limits.
    pub fn contains(&self, a: f64, b: f64) -> bool {
        let inside = |v: f64, i: usize| match self.half_widths[i] {
            Some(h) => (v - self.centre[i]).abs() <= h,
            None => true,
        };
        inside(a, 0) && inside(b, 1)
    }
}

/// Where figure-error data comes from.
#[derive(Debug, Clone)]
pub enum FigureErrorSource {
    File {
        path: PathBuf,
        format: FigureErrorFormat,
    },
    InMemory(Arc<FigureErrorProfile>),
}

impl FigureErrorSource {
    /// Load (or share) the height field.
    pub fn acquire(&self) -> Result<Arc<FigureErrorProfile>, ParseError> {
        match self {
            FigureErrorSource::File { path, format } => {
                log::info!("Loading figure error from {}", path.display());
                load_figure_error(path, *format).map(Arc::new)
            }
            FigureErrorSource::InMemory(profile) => Ok(Arc::clone(profile)),
        }
    }
}

/// Descriptor of the element the hybrid correction wraps.
#[derive(Debug, Clone)]
pub struct OpticalElement {
    pub name: String,
    pub kind: ElementKind,
    /// Aperture limits: footprint coordinates on reflective elements, beam
    /// coordinates at the element plane otherwise.
    pub aperture: Aperture,
    /// Grazing angle of incidence (rad).
    pub incidence_angle: f64,
    /// Grazing angle of reflection (rad).
    pub reflection_angle: f64,
    /// Distance from the previous image plane to the element (m).
    pub source_distance: f64,
    /// Distance from the element to its image plane (m).
    pub image_distance: f64,
    /// Focal lengths `[sagittal, tangential]`; `None` means non-focusing, or
    /// derived from material data for a lens stack.
    pub focal_lengths: [Option<f64>; 2],
    pub displacement: Displacement,
    pub figure_error: Option<FigureErrorSource>,
}

impl OpticalElement {
    /// An element with no aperture, angles, focusing or errors.
    pub fn new(name: impl Into<String>, kind: ElementKind) -> Self {
        Self {
            name: name.into(),
            kind,
            aperture: Aperture::unlimited(),
            incidence_angle: 0.0,
            reflection_angle: 0.0,
            source_distance: 0.0,
            image_distance: 0.0,
            focal_lengths: [None, None],
            displacement: Displacement::default(),
            figure_error: None,
        }
    }

    /// Copy with displacements zeroed and the figure error removed, as used
    /// for the screen trace.
    pub fn ideal(&self) -> Self {
        Self {
            displacement: Displacement::default(),
            figure_error: None,
            ..self.clone()
        }
    }

    /// Copy of [`ideal`](Self::ideal) with the aperture removed.
    pub fn unlimited(&self) -> Self {
        Self {
            aperture: Aperture::unlimited(),
            ..self.ideal()
        }
    }

    pub fn focal_length(&self, axis: Axis) -> Option<f64> {
        self.focal_lengths[axis.index()]
    }
}
