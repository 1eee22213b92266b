//! Rigid-body displacements folded into height fields.
//!
//! The hybrid screen trace is done with every element rotation and offset
//! zeroed. The displacement is then put back analytically, as a change of the
//! surface height seen by the wavefront: a rotation becomes a tilt term
//! $u \sin(-\alpha)$ and an offset becomes a shift of the coordinate at which
//! the figure error is sampled (plus, for a normal offset, a rigid lateral
//! translation of the reflected beam).

use serde::{Deserialize, Serialize};

use crate::field::{FieldError, ScalarField1D};
use crate::profile::{FigureErrorProfile, SurfaceAxis};

/// Element displacement in the element frame: `x` across the surface, `y`
/// along it, `z` along the surface normal. Angles in radians, lengths in
/// metres.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Displacement {
    /// Rotations about x (pitch), y (roll) and z (yaw).
    #[serde(default)]
    pub rotation: [f64; 3],
    /// Offsets along x, y and z.
    #[serde(default)]
    pub offset: [f64; 3],
}

impl Displacement {
    pub fn pitch(&self) -> f64 {
        self.rotation[0]
    }

    pub fn roll(&self) -> f64 {
        self.rotation[1]
    }

    pub fn yaw(&self) -> f64 {
        self.rotation[2]
    }

    pub fn is_zero(&self) -> bool {
        self.rotation.iter().chain(self.offset.iter()).all(|&v| v == 0.0)
    }

    /// How this displacement enters a height profile running along `axis`, for
    /// a surface hit at `grazing_angle`.
    pub fn folding(&self, axis: SurfaceAxis, grazing_angle: f64) -> ProfileFolding {
        match axis {
            SurfaceAxis::Width => ProfileFolding {
                rotation: self.roll(),
                shift: -self.offset[0],
                lateral_translation: 0.0,
                deflection: 2.0 * self.roll().sin() * grazing_angle.sin(),
            },
            SurfaceAxis::Length => {
                let normal_shift = if grazing_angle > 0.0 {
                    self.offset[2] / grazing_angle.tan()
                } else {
                    0.0
                };
                ProfileFolding {
                    rotation: self.pitch(),
                    shift: -self.offset[1] - normal_shift,
                    lateral_translation: 2.0 * self.offset[2] * grazing_angle.cos(),
                    deflection: 2.0 * self.pitch().sin(),
                }
            }
        }
    }
}

/// The displacement terms relevant to one surface axis.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProfileFolding {
    /// Rotation entering the tilt term `u * sin(-rotation)`.
    pub rotation: f64,
    /// Shift of the coordinate at which the height field is sampled.
    pub shift: f64,
    /// Rigid translation of the reflected beam perpendicular to the axis.
    pub lateral_translation: f64,
    /// Angular deviation of the reflected beam caused by the rotation.
    pub deflection: f64,
}

impl ProfileFolding {
    pub fn is_zero(&self) -> bool {
        self.rotation == 0.0 && self.shift == 0.0 && self.lateral_translation == 0.0
    }
}

/// A 1D height profile with a displacement folded in.
#[derive(Debug, Clone)]
pub struct DisplacedProfile {
    profile: Option<ScalarField1D>,
    folding: ProfileFolding,
}

impl DisplacedProfile {
    pub fn new(profile: Option<ScalarField1D>, folding: ProfileFolding) -> Self {
        Self { profile, folding }
    }

    /// Effective height at surface coordinate `u`.
    pub fn height(&self, u: f64) -> Result<f64, FieldError> {
        let base = match &self.profile {
            Some(p) => p.interpolate(u + self.folding.shift)?,
            None => 0.0,
        };
        Ok(base + u * (-self.folding.rotation).sin())
    }

    /// True if the effective height is identically zero.
    pub fn is_trivial(&self) -> bool {
        self.profile.is_none() && self.folding.rotation == 0.0
    }

    pub fn folding(&self) -> &ProfileFolding {
        &self.folding
    }
}

/// A 2D height field with a displacement folded in on both axes.
#[derive(Debug, Clone)]
pub struct DisplacedSurface<'a> {
    profile: Option<&'a FigureErrorProfile>,
    width: ProfileFolding,
    length: ProfileFolding,
}

impl<'a> DisplacedSurface<'a> {
    pub fn new(
        profile: Option<&'a FigureErrorProfile>,
        displacement: &Displacement,
        grazing_angle: f64,
    ) -> Self {
        Self {
            profile,
            width: displacement.folding(SurfaceAxis::Width, grazing_angle),
            length: displacement.folding(SurfaceAxis::Length, grazing_angle),
        }
    }

    /// Effective height at mirror coordinates `(x_m, y_m)`.
    pub fn height(&self, x_m: f64, y_m: f64) -> Result<f64, FieldError> {
        let base = match self.profile {
            Some(p) => p.height(x_m + self.width.shift, y_m + self.length.shift)?,
            None => 0.0,
        };
        Ok(base + x_m * (-self.width.rotation).sin() + y_m * (-self.length.rotation).sin())
    }

    pub fn is_trivial(&self) -> bool {
        self.profile.is_none() && self.width.rotation == 0.0 && self.length.rotation == 0.0
    }
}
