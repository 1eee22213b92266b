//! Errors of the hybrid calculation.

use penumbra_compute::ComputeError;
use penumbra_materials::MaterialError;
use penumbra_surface::{FieldError, ParseError};
use thiserror::Error;

use crate::config::CalculationType;
use crate::tracer::TracerError;
use crate::types::{Axis, BeamError};

/// Coarse classification of a [`HybridError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The inputs cannot describe a valid calculation.
    Configuration,
    /// The calculation hit a numerical edge case.
    Numerical,
    /// A collaborator (tracer, material data, compute backend) failed.
    External,
}

/// Errors that can occur during a hybrid calculation.
#[derive(Debug, Error)]
pub enum HybridError {
    #[error("Calculation type {calculation:?} is not compatible with element '{element}': {reason}")]
    Incongruent {
        calculation: CalculationType,
        element: String,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unsupported displacement: {0}")]
    UnsupportedDisplacement(String),

    #[error("Figure error could not be loaded: {0}")]
    FigureError(#[from] ParseError),

    #[error("Beam has zero extent along {0:?} at the screen")]
    ZeroExtent(Axis),

    #[error("Aperture is unlimited along {0:?}, cannot size the diffraction")]
    InfiniteAperture(Axis),

    #[error("Invalid beam: {0}")]
    InvalidBeam(#[from] BeamError),

    #[error("Interpolation failed ({0}); try fewer histogram bins")]
    Interpolation(#[from] FieldError),

    #[error("Invalid intensity {value} at sample {index} before square root")]
    InvalidIntensity { index: usize, value: f64 },

    #[error("Ill-conditioned polynomial fit: {0}")]
    IllConditionedFit(String),

    #[error("Degenerate diffraction kernel: {0}")]
    DegenerateKernel(String),

    #[error("Ray tracer failed: {0}")]
    Tracer(#[from] TracerError),

    #[error("Material lookup failed: {0}")]
    Material(#[from] MaterialError),

    #[error("Compute backend failed: {0}")]
    Compute(#[from] ComputeError),
}

impl HybridError {
    pub fn class(&self) -> ErrorClass {
        match self {
            HybridError::Incongruent { .. }
            | HybridError::InvalidConfig(_)
            | HybridError::UnsupportedDisplacement(_)
            | HybridError::FigureError(_)
            | HybridError::ZeroExtent(_)
            | HybridError::InfiniteAperture(_)
            | HybridError::InvalidBeam(_) => ErrorClass::Configuration,
            HybridError::Interpolation(_)
            | HybridError::InvalidIntensity { .. }
            | HybridError::IllConditionedFit(_)
            | HybridError::DegenerateKernel(_) => ErrorClass::Numerical,
            HybridError::Tracer(_) | HybridError::Material(_) | HybridError::Compute(_) => {
                ErrorClass::External
            }
        }
    }
}
