//! Material lookup trait.
//!
//! The hybrid calculation only needs two numbers from a material database:
//! the linear attenuation coefficient $\mu$ and the complex refractive index
//! $n = 1 - \delta + i\beta$, both at a single photon energy.

use thiserror::Error;

/// Errors from material lookups.
#[derive(Debug, Error)]
pub enum MaterialError {
    #[error("Energy {energy_ev} eV is outside the data range [{min}, {max}] eV")]
    OutOfRange { energy_ev: f64, min: f64, max: f64 },

    #[error("Material not found: {0}")]
    NotFound(String),

    #[error("Data error: {0}")]
    DataError(String),
}

/// Energy-dependent X-ray optical constants, keyed by chemical formula.
pub trait MaterialLookup: Send + Sync {
    /// Human-readable name of this data source.
    fn name(&self) -> &str;

    /// Formulas this source can answer for.
    fn formulas(&self) -> Vec<String>;

    /// Photon energy range (eV) over which `formula` is tabulated.
    fn energy_range(&self, formula: &str) -> Result<(f64, f64), MaterialError>;

    /// Linear attenuation coefficient $\mu$ in 1/m.
    fn attenuation(&self, formula: &str, energy_ev: f64) -> Result<f64, MaterialError>;

    /// Refractive-index decrement and absorption index $(\delta, \beta)$.
    fn refractive_index_decrement(
        &self,
        formula: &str,
        energy_ev: f64,
    ) -> Result<(f64, f64), MaterialError>;
}
