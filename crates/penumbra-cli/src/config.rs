//! TOML configuration deserialisation for hybrid jobs.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use penumbra_core::tracer::source::SyntheticSource;
use penumbra_core::{Aperture, ElementKind, FigureErrorSource, HybridConfig, OpticalElement};
use penumbra_surface::{Displacement, FigureErrorFormat};

/// Top-level job configuration.
#[derive(Debug, Deserialize)]
pub struct JobConfig {
    #[serde(default)]
    pub source: SyntheticSource,
    pub element: ElementConfig,
    #[serde(default)]
    pub hybrid: HybridConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl JobConfig {
    /// Checks that need the whole job, on top of [`HybridConfig::validate`].
    pub fn check(&self) -> anyhow::Result<()> {
        self.hybrid.validate()?;
        let calculation = self.hybrid.calculation_type;
        if calculation.uses_error_profile() && self.element.figure_error.is_none() {
            anyhow::bail!(
                "calculation type {:?} needs an element figure_error file",
                calculation
            );
        }
        Ok(())
    }
}

/// The element wrapped by the hybrid correction.
#[derive(Debug, Deserialize)]
pub struct ElementConfig {
    #[serde(default = "default_element_name")]
    pub name: String,
    #[serde(flatten)]
    pub kind: ElementKind,
    #[serde(default)]
    pub aperture: Aperture,
    /// Grazing angle of incidence (rad).
    #[serde(default)]
    pub incidence_angle: f64,
    /// Grazing angle of reflection (rad); defaults to the incidence angle.
    #[serde(default)]
    pub reflection_angle: Option<f64>,
    #[serde(default)]
    pub source_distance: f64,
    pub image_distance: f64,
    #[serde(default)]
    pub focal_lengths: [Option<f64>; 2],
    #[serde(default)]
    pub displacement: Displacement,
    #[serde(default)]
    pub figure_error: Option<FigureErrorConfig>,
}

fn default_element_name() -> String {
    "element".into()
}

/// Figure- or thickness-error file.
#[derive(Debug, Deserialize)]
pub struct FigureErrorConfig {
    /// Path, relative to the job file.
    pub file: PathBuf,
    #[serde(default = "default_format")]
    pub format: FigureErrorFormat,
}

fn default_format() -> FigureErrorFormat {
    FigureErrorFormat::Profile1D
}

impl ElementConfig {
    /// Build the element descriptor; relative error paths resolve against
    /// `base_dir`.
    pub fn to_element(&self, base_dir: &Path) -> OpticalElement {
        let mut element = OpticalElement::new(self.name.clone(), self.kind.clone());
        element.aperture = self.aperture;
        element.incidence_angle = self.incidence_angle;
        element.reflection_angle = self.reflection_angle.unwrap_or(self.incidence_angle);
        element.source_distance = self.source_distance;
        element.image_distance = self.image_distance;
        element.focal_lengths = self.focal_lengths;
        element.displacement = self.displacement;
        element.figure_error = self.figure_error.as_ref().map(|fe| FigureErrorSource::File {
            path: base_dir.join(&fe.file),
            format: fe.format,
        });
        element
    }
}

/// Output configuration.
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// Output directory (default: "./output").
    #[serde(default = "default_output_dir")]
    pub directory: String,
    /// Whether to save the output beams as CSV (default: true).
    #[serde(default = "default_true")]
    pub save_beams: bool,
    /// Whether to save the diffraction kernels as CSV (default: true).
    #[serde(default = "default_true")]
    pub save_kernels: bool,
    /// Whether to save the calculation summary as JSON (default: false).
    #[serde(default)]
    pub save_json: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            save_beams: true,
            save_kernels: true,
            save_json: false,
        }
    }
}

fn default_output_dir() -> String {
    "./output".into()
}
fn default_true() -> bool {
    true
}

/// Load and parse a TOML job configuration file.
pub fn load_config(path: &Path) -> anyhow::Result<JobConfig> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Cannot read job file {}", path.display()))?;
    let config: JobConfig =
        toml::from_str(&content).with_context(|| format!("Invalid job file {}", path.display()))?;
    config
        .check()
        .with_context(|| format!("Invalid job file {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use penumbra_core::{CalculationType, DiffractionPlane};

    #[test]
    fn test_minimal_job() {
        let job: JobConfig = toml::from_str(
            r#"
            [element]
            type = "aperture"
            image_distance = 10.0
            aperture = { half_widths = [0.0001, 0.00002] }
            "#,
        )
        .unwrap();
        assert_eq!(job.element.kind, ElementKind::Aperture);
        assert_eq!(job.hybrid.diffraction_plane, DiffractionPlane::Tangential);
        assert_eq!(job.output.directory, "./output");
        let el = job.element.to_element(Path::new("."));
        assert_eq!(el.aperture.half_widths, [Some(1e-4), Some(2e-5)]);
    }

    #[test]
    fn test_mirror_job_with_error_file() {
        let job: JobConfig = toml::from_str(
            r#"
            [source]
            shape = "gaussian"
            n_rays = 1000
            seed = 4

            [element]
            name = "m1"
            type = "mirror"
            incidence_angle = 0.003
            image_distance = 12.0
            aperture = { half_widths = [0.01, 0.15] }
            figure_error = { file = "m1.dat" }

            [hybrid]
            calculation_type = "mirror_or_grating_size_and_error_profile"
            diffraction_plane = "both_2d"
            random_seed = 11
            "#,
        )
        .unwrap();
        job.check().unwrap();
        let el = job.element.to_element(Path::new("/jobs"));
        assert_eq!(el.reflection_angle, 0.003);
        assert!(matches!(
            el.figure_error,
            Some(FigureErrorSource::File { ref path, format: FigureErrorFormat::Profile1D })
                if path == Path::new("/jobs/m1.dat")
        ));
        assert_eq!(
            job.hybrid.calculation_type,
            CalculationType::MirrorOrGratingSizeAndErrorProfile
        );
        assert_eq!(job.source.n_rays, 1000);
    }

    #[test]
    fn test_error_calculation_without_error_file_rejected() {
        let job: JobConfig = toml::from_str(
            r#"
            [element]
            type = "mirror"
            incidence_angle = 0.003
            image_distance = 12.0

            [hybrid]
            calculation_type = "mirror_or_grating_size_and_error_profile"
            "#,
        )
        .unwrap();
        let err = job.check().unwrap_err();
        assert!(err.to_string().contains("figure_error"));
    }

    #[test]
    fn test_crl_job() {
        let job: JobConfig = toml::from_str(
            r#"
            [element]
            type = "crl"
            material = "Be"
            n_lenses = 10
            radius = 0.0005
            image_distance = 20.0
            "#,
        )
        .unwrap();
        assert!(matches!(job.element.kind, ElementKind::Crl { n_lenses: 10, .. }));
    }
}
