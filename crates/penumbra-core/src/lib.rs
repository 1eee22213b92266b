//! # Penumbra Core
//!
//! Hybrid ray-tracing diffraction correction for X-ray beamline optics.
//! Given a ray ensemble that has just interacted with an optical element,
//! the correction builds a wave-optics description of the element footprint,
//! propagates it with FFT Fresnel diffraction and resamples the rays so their
//! statistics follow the diffracted intensity.
//!
//! ## Architecture
//!
//! The geometric ray tracer is an external collaborator behind the
//! [`tracer::RayTracer`] trait. The calculation is driven by
//! [`hybrid::HybridCalculator`], which dispatches on the configured
//! calculation type through [`hybrid::strategy::CalculationStrategy`].
//!
//! ## Modules
//!
//! - [`types`]: Rays, ray ensembles and footprints.
//! - [`element`]: Optical element descriptors.
//! - [`config`]: Calculation configuration and calibration constants.
//! - [`error`]: Error type and its classification.
//! - [`tracer`]: Ray tracer capability, reference tracer, synthetic sources.
//! - [`hybrid`]: The diffraction correction pipeline.

pub mod config;
pub mod element;
pub mod error;
pub mod hybrid;
pub mod tracer;
pub mod types;

pub use config::{CalculationType, Calibration, DiffractionPlane, HybridConfig, LengthSpec, PropagationType};
pub use element::{Aperture, ElementKind, FigureErrorSource, OpticalElement};
pub use error::{ErrorClass, HybridError};
pub use hybrid::{CancellationToken, HybridBeams, HybridCalculator, HybridInput, HybridOutcome};
pub use tracer::{RayTracer, TraceOutput, TracerError};
pub use types::{Axis, BeamError, Footprint, FootprintPoint, Ray, RayEnsemble};
