//! Ray tracer capability.
//!
//! The hybrid correction treats the geometric ray tracer as a black box
//! behind the [`RayTracer`] trait: it can trace a beam through an element
//! (returning the beam at the element's image plane and, for reflective
//! elements, the footprint) and re-trace a beam by a signed distance along
//! the optical axis. [`ideal::IdealTracer`] is a thin-lens reference
//! implementation; [`source`] builds synthetic input beams.

pub mod ideal;
pub mod source;

use thiserror::Error;

use crate::element::OpticalElement;
use crate::types::{Footprint, RayEnsemble};

/// Errors reported by a ray tracer.
#[derive(Debug, Error)]
pub enum TracerError {
    #[error("Element not supported by {tracer}: {reason}")]
    Unsupported { tracer: String, reason: String },

    #[error("Trace failed: {0}")]
    Failed(String),

    #[error("Invalid source: {0}")]
    InvalidSource(String),
}

/// Result of tracing a beam through one element.
#[derive(Debug, Clone)]
pub struct TraceOutput {
    /// Beam at the element's image plane, same rays and order as the input.
    pub beam: RayEnsemble,
    /// Per-ray footprint, present for reflective elements.
    pub footprint: Option<Footprint>,
}

/// A geometric ray tracer.
pub trait RayTracer: Send + Sync {
    /// Trace `beam` through `element`, from its source plane to its image
    /// plane.
    fn trace(&self, beam: &RayEnsemble, element: &OpticalElement) -> Result<TraceOutput, TracerError>;

    /// Propagate `beam` in free space by `distance` (negative goes back).
    fn retrace(&self, beam: &RayEnsemble, distance: f64) -> Result<RayEnsemble, TracerError>;

    /// Human-readable name of the tracer.
    fn name(&self) -> &str;
}
