//! Tabulated X-ray constants for common refractive-lens and substrate
//! materials.
//!
//! Mass attenuation coefficients $\mu/\rho$ (cm²/g) are taken from the NIST
//! XCOM/FFAST tables between 5 and 100 keV, where none of the listed elements
//! has an absorption edge. The refractive-index decrement follows from the
//! free-electron model far above the edges:
//!
//! $$\delta = \frac{r_e \lambda^2}{2\pi} \rho N_A \frac{Z}{A}$$
//!
//! and the absorption index from $\beta = \mu \lambda / 4\pi$.

use std::f64::consts::PI;

use crate::provider::{MaterialError, MaterialLookup};
use crate::spline::LogLogSpline;
use crate::HC_EV_M;

/// Classical electron radius (m).
const ELECTRON_RADIUS_M: f64 = 2.817_940_326_2e-15;

/// Avogadro's number (1/mol).
const AVOGADRO: f64 = 6.022_140_76e23;

/// Tabulation energies (eV).
const ENERGIES_EV: [f64; 12] = [
    5.0e3, 6.0e3, 8.0e3, 10.0e3, 15.0e3, 20.0e3, 30.0e3, 40.0e3, 50.0e3, 60.0e3, 80.0e3, 100.0e3,
];

/// (symbol, density g/cm³, Z/A mol/g, µ/ρ cm²/g at [`ENERGIES_EV`]).
const TABLE: [(&str, f64, f64, [f64; 12]); 4] = [
    (
        "Be",
        1.848,
        4.0 / 9.0122,
        [4.369, 2.527, 1.124, 0.6466, 0.307, 0.2251, 0.1792, 0.164, 0.1554, 0.1493, 0.1401, 0.1328],
    ),
    (
        "C",
        3.51,
        6.0 / 12.011,
        [19.12, 10.95, 4.576, 2.373, 0.8071, 0.442, 0.2562, 0.2076, 0.1871, 0.1753, 0.161, 0.1514],
    ),
    (
        "Al",
        2.699,
        13.0 / 26.982,
        [193.4, 115.3, 50.33, 26.23, 7.955, 3.441, 1.128, 0.5685, 0.3681, 0.2778, 0.2018, 0.1704],
    ),
    (
        "Si",
        2.33,
        14.0 / 28.086,
        [245.0, 147.0, 64.68, 33.89, 10.34, 4.464, 1.436, 0.7012, 0.4385, 0.3207, 0.2228, 0.1835],
    ),
];

/// One tabulated element.
#[derive(Debug, Clone)]
pub struct XrayMaterial {
    symbol: String,
    density_g_cm3: f64,
    z_over_a: f64,
    mass_attenuation: LogLogSpline,
}

impl XrayMaterial {
    /// Construct from tabulated mass attenuation coefficients.
    ///
    /// # Arguments
    /// * `symbol` - Chemical formula used as lookup key.
    /// * `density_g_cm3` - Mass density in g/cm³.
    /// * `z_over_a` - Electrons per unit atomic mass (mol/g).
    /// * `energies_ev` - Strictly increasing photon energies.
    /// * `mu_rho_cm2_g` - $\mu/\rho$ in cm²/g at each energy.
    pub fn new(
        symbol: impl Into<String>,
        density_g_cm3: f64,
        z_over_a: f64,
        energies_ev: &[f64],
        mu_rho_cm2_g: &[f64],
    ) -> Result<Self, MaterialError> {
        Ok(Self {
            symbol: symbol.into(),
            density_g_cm3,
            z_over_a,
            mass_attenuation: LogLogSpline::new(energies_ev, mu_rho_cm2_g)?,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn energy_range(&self) -> (f64, f64) {
        self.mass_attenuation.range()
    }

    fn check_energy(&self, energy_ev: f64) -> Result<(), MaterialError> {
        let (min, max) = self.energy_range();
        // Tolerate the round trip through ln/exp at the table ends.
        let slack = 1e-9 * max;
        if !(min - slack..=max + slack).contains(&energy_ev) {
            return Err(MaterialError::OutOfRange { energy_ev, min, max });
        }
        Ok(())
    }

    /// Linear attenuation coefficient in 1/m.
    pub fn attenuation(&self, energy_ev: f64) -> Result<f64, MaterialError> {
        self.check_energy(energy_ev)?;
        let mu_per_cm = self.mass_attenuation.evaluate(energy_ev) * self.density_g_cm3;
        Ok(mu_per_cm * 100.0)
    }

    /// $(\delta, \beta)$ at `energy_ev`.
    pub fn refractive_index_decrement(&self, energy_ev: f64) -> Result<(f64, f64), MaterialError> {
        let mu = self.attenuation(energy_ev)?;
        let wavelength = HC_EV_M / energy_ev;
        // electrons per m³
        let electron_density = self.density_g_cm3 * 1e6 * AVOGADRO * self.z_over_a;
        let delta = ELECTRON_RADIUS_M * wavelength * wavelength * electron_density / (2.0 * PI);
        let beta = mu * wavelength / (4.0 * PI);
        Ok((delta, beta))
    }
}

/// Registry of the built-in X-ray materials.
#[derive(Debug, Clone)]
pub struct TabulatedMaterials {
    materials: Vec<XrayMaterial>,
}

impl TabulatedMaterials {
    /// Be, C (diamond), Al and Si.
    pub fn standard() -> Result<Self, MaterialError> {
        let materials = TABLE
            .iter()
            .map(|(symbol, rho, z_a, mu)| XrayMaterial::new(*symbol, *rho, *z_a, &ENERGIES_EV, mu))
            .collect::<Result<Vec<_>, _>>()?;
        log::debug!("Loaded {} tabulated X-ray materials", materials.len());
        Ok(Self { materials })
    }

    /// Add or replace a material.
    pub fn insert(&mut self, material: XrayMaterial) {
        self.materials.retain(|m| m.symbol != material.symbol);
        self.materials.push(material);
    }

    pub fn get(&self, formula: &str) -> Result<&XrayMaterial, MaterialError> {
        let key = formula.trim();
        self.materials
            .iter()
            .find(|m| m.symbol == key)
            .ok_or_else(|| MaterialError::NotFound(formula.to_string()))
    }
}

impl MaterialLookup for TabulatedMaterials {
    fn name(&self) -> &str {
        "NIST tabulated (5-100 keV)"
    }

    fn formulas(&self) -> Vec<String> {
        self.materials.iter().map(|m| m.symbol.clone()).collect()
    }

    fn energy_range(&self, formula: &str) -> Result<(f64, f64), MaterialError> {
        Ok(self.get(formula)?.energy_range())
    }

    fn attenuation(&self, formula: &str, energy_ev: f64) -> Result<f64, MaterialError> {
        self.get(formula)?.attenuation(energy_ev)
    }

    fn refractive_index_decrement(
        &self,
        formula: &str,
        energy_ev: f64,
    ) -> Result<(f64, f64), MaterialError> {
        self.get(formula)?.refractive_index_decrement(energy_ev)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_beryllium_delta_at_10kev() {
        let db = TabulatedMaterials::standard().unwrap();
        let (delta, beta) = db.refractive_index_decrement("Be", 10_000.0).unwrap();
        assert_relative_eq!(delta, 3.41e-6, max_relative = 0.01);
        assert!(beta > 0.0 && beta < delta * 1e-2, "beta = {}", beta);
    }

    #[test]
    fn test_attenuation_reproduces_table() {
        let db = TabulatedMaterials::standard().unwrap();
        let mu = db.attenuation("Si", 20_000.0).unwrap();
        assert_relative_eq!(mu, 4.464 * 2.33 * 100.0, max_relative = 1e-9);
    }

    #[test]
    fn test_unknown_material_and_energy() {
        let db = TabulatedMaterials::standard().unwrap();
        assert!(matches!(db.attenuation("Au", 10_000.0), Err(MaterialError::NotFound(_))));
        assert!(matches!(
            db.attenuation("Be", 1_000.0),
            Err(MaterialError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_delta_scales_as_inverse_energy_squared() {
        let db = TabulatedMaterials::standard().unwrap();
        let (d1, _) = db.refractive_index_decrement("C", 10_000.0).unwrap();
        let (d2, _) = db.refractive_index_decrement("C", 20_000.0).unwrap();
        assert_relative_eq!(d1 / d2, 4.0, max_relative = 1e-12);
    }
}
