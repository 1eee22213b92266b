//! # Penumbra Materials
//!
//! X-ray material constants for the Penumbra workspace. All data sources
//! implement the [`MaterialLookup`](provider::MaterialLookup) trait, which
//! answers attenuation and refractive-index queries by chemical formula and
//! photon energy.
//!
//! ## Available data sources
//!
//! | Source | Module | Materials |
//! |--------|--------|-----------|
//! | NIST tabulated | [`xray`] | Be, C, Al, Si |
//!
//! ## Interpolation
//!
//! Tabulated data is interpolated using natural cubic splines in log-log
//! space ([`spline::LogLogSpline`]).

pub mod provider;
pub mod spline;
pub mod xray;

pub use provider::{MaterialError, MaterialLookup};
pub use xray::{TabulatedMaterials, XrayMaterial};

/// $hc$ in eV·m, for converting photon energy to wavelength.
pub const HC_EV_M: f64 = 1.239_841_984e-6;
