//! Figure-error and thickness-error height fields.
//!
//! A [`FigureErrorProfile`] is the deviation of an optical surface from its
//! design shape, expressed in mirror coordinates: `x_m` across the surface
//! (the sagittal *width*) and `y_m` along it (the tangential *length*). For
//! refractive lenses the same container holds the thickness error of the lens
//! stack, indexed by transverse position.

use serde::{Deserialize, Serialize};

use crate::field::{FieldError, ScalarField1D, ScalarField2D};

/// Coordinate direction on an optical surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurfaceAxis {
    /// Across the surface (`x_m`), coupled to the sagittal plane.
    Width,
    /// Along the surface (`y_m`), coupled to the tangential plane.
    Length,
}

/// A height-error field, either a single profile or a full surface map.
///
/// A 1D profile is interpreted along whichever axis it is requested for; when
/// used as a 2D surface it is taken to run along the length and is extruded
/// across the width.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FigureErrorProfile {
    Profile(ScalarField1D),
    Surface(ScalarField2D),
}

impl FigureErrorProfile {
    /// Height error at mirror coordinates `(x_m, y_m)`.
    pub fn height(&self, x_m: f64, y_m: f64) -> Result<f64, FieldError> {
        match self {
            FigureErrorProfile::Profile(p) => p.interpolate(y_m),
            FigureErrorProfile::Surface(s) => s.interpolate(x_m, y_m),
        }
    }

    /// 1D profile along `axis`, sliced through the centre of a surface map.
    pub fn profile_along(&self, axis: SurfaceAxis) -> Result<ScalarField1D, FieldError> {
        match self {
            FigureErrorProfile::Profile(p) => Ok(p.clone()),
            FigureErrorProfile::Surface(s) => match axis {
                SurfaceAxis::Width => s.slice_along_x(centre_of(s.y())),
                SurfaceAxis::Length => s.slice_along_y(centre_of(s.x())),
            },
        }
    }

    /// RMS slope of the height field along `axis`.
    pub fn rms_slope(&self, axis: SurfaceAxis) -> f64 {
        match (self, axis) {
            (FigureErrorProfile::Profile(p), _) => p.rms_slope(),
            (FigureErrorProfile::Surface(s), SurfaceAxis::Width) => s.rms_slope_x(),
            (FigureErrorProfile::Surface(s), SurfaceAxis::Length) => s.rms_slope_y(),
        }
    }

    /// Sampled extent `(min, max)` along `axis`.
    pub fn range(&self, axis: SurfaceAxis) -> (f64, f64) {
        match (self, axis) {
            (FigureErrorProfile::Profile(p), _) => (p.min_abscissa(), p.max_abscissa()),
            (FigureErrorProfile::Surface(s), SurfaceAxis::Width) => (s.x()[0], s.x()[s.x().len() - 1]),
            (FigureErrorProfile::Surface(s), SurfaceAxis::Length) => (s.y()[0], s.y()[s.y().len() - 1]),
        }
    }

    /// True when every sample is exactly zero.
    pub fn is_flat(&self) -> bool {
        match self {
            FigureErrorProfile::Profile(p) => p.values().iter().all(|&v| v == 0.0),
            FigureErrorProfile::Surface(s) => s.values().iter().all(|&v| v == 0.0),
        }
    }
}

/// Zero if the grid spans it, otherwise the grid midpoint.
fn centre_of(grid: &[f64]) -> f64 {
    let lo = grid[0];
    let hi = grid[grid.len() - 1];
    if lo <= 0.0 && hi >= 0.0 {
        0.0
    } else {
        0.5 * (lo + hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::linspace;
    use ndarray::Array2;

    #[test]
    fn test_profile_is_extruded_across_width() {
        let p = ScalarField1D::from_range(-0.1, 0.1, vec![0.0, 1e-9, 2e-9]).unwrap();
        let fe = FigureErrorProfile::Profile(p);
        assert_eq!(fe.height(5.0, 0.0).unwrap(), 1e-9);
        assert_eq!(fe.height(-5.0, 0.0).unwrap(), 1e-9);
    }

    #[test]
    fn test_surface_slice_goes_through_centre() {
        let x = linspace(-0.01, 0.01, 3);
        let y = linspace(-0.2, 0.2, 5);
        let values = Array2::from_shape_fn((3, 5), |(i, j)| (i * 10 + j) as f64);
        let fe = FigureErrorProfile::Surface(ScalarField2D::new(x, y, values).unwrap());

        let along_length = fe.profile_along(SurfaceAxis::Length).unwrap();
        assert_eq!(along_length.values(), &[10.0, 11.0, 12.0, 13.0, 14.0]);

        let along_width = fe.profile_along(SurfaceAxis::Width).unwrap();
        assert_eq!(along_width.values(), &[2.0, 12.0, 22.0]);
    }

    #[test]
    fn test_flat_detection() {
        let p = ScalarField1D::from_range(0.0, 1.0, vec![0.0; 8]).unwrap();
        assert!(FigureErrorProfile::Profile(p).is_flat());
    }
}
