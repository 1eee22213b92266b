//! Hybrid calculation configuration.
//!
//! Every field carries a serde default so job files can specify only what
//! differs from the defaults.

use serde::{Deserialize, Serialize};

use crate::error::HybridError;
use crate::types::Axis;

/// Which transverse planes receive the diffraction correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffractionPlane {
    Sagittal,
    Tangential,
    /// Both planes from one joint 2D wavefront.
    #[serde(rename = "both_2d")]
    Both2D,
    /// Both planes, computed independently in 1D.
    #[serde(rename = "both_1d")]
    Both1D,
}

impl DiffractionPlane {
    pub fn axes(&self) -> &'static [Axis] {
        match self {
            DiffractionPlane::Sagittal => &[Axis::X],
            DiffractionPlane::Tangential => &[Axis::Z],
            DiffractionPlane::Both2D | DiffractionPlane::Both1D => &[Axis::X, Axis::Z],
        }
    }

    pub fn includes(&self, axis: Axis) -> bool {
        self.axes().contains(&axis)
    }

    /// Single-axis plane for `axis`.
    pub fn single(axis: Axis) -> Self {
        match axis {
            Axis::X => DiffractionPlane::Sagittal,
            Axis::Z => DiffractionPlane::Tangential,
        }
    }
}

/// Which physical effect the wavefront describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationType {
    SimpleAperture,
    MirrorOrGratingSize,
    MirrorOrGratingSizeAndErrorProfile,
    CrlSize,
    CrlSizeAndErrorProfile,
}

impl CalculationType {
    pub fn uses_error_profile(&self) -> bool {
        matches!(
            self,
            CalculationType::MirrorOrGratingSizeAndErrorProfile | CalculationType::CrlSizeAndErrorProfile
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropagationType {
    FarField,
    NearField,
    Both,
}

impl PropagationType {
    pub fn far_field(&self) -> bool {
        matches!(self, PropagationType::FarField | PropagationType::Both)
    }

    pub fn near_field(&self) -> bool {
        matches!(self, PropagationType::NearField | PropagationType::Both)
    }
}

/// A length that is either derived from the element or given explicitly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthSpec {
    #[default]
    Auto,
    Explicit(f64),
}

/// Empirical constants of the method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    /// Fraction of intensity outside the aperture below which an axis
    /// counts as not cut.
    pub cut_fraction_threshold: f64,
    /// Bins of the histogram used by the geometry analysis.
    pub geometry_histogram_bins: usize,
    /// Window enlargement per unit of figure-error angular spread.
    pub figure_error_oversampling: f64,
    /// Near-field image size per unit of `rms_slope * distance`.
    pub rms_slope_image_floor: f64,
    /// Near-field image size per unit of displacement-induced shift.
    pub displacement_image_floor: f64,
    /// Proportionality factor of the FFT sample count.
    pub fft_size_factor: f64,
    /// Width of a diffraction peak relative to `lambda * distance / extent`.
    pub peak_width_factor: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            cut_fraction_threshold: 0.05,
            geometry_histogram_bins: 500,
            figure_error_oversampling: 5.0,
            rms_slope_image_floor: 16.0,
            displacement_image_floor: 8.0,
            fft_size_factor: 100.0,
            peak_width_factor: 0.88,
        }
    }
}

fn default_plane() -> DiffractionPlane {
    DiffractionPlane::Tangential
}

fn default_calculation() -> CalculationType {
    CalculationType::SimpleAperture
}

fn default_propagation() -> PropagationType {
    PropagationType::Both
}

fn default_bins() -> usize {
    200
}

fn default_peaks() -> usize {
    20
}

fn default_fft_cap() -> usize {
    1_000_000
}

fn default_true() -> bool {
    true
}

/// Parameters of one hybrid invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridConfig {
    #[serde(default = "default_plane")]
    pub diffraction_plane: DiffractionPlane,
    #[serde(default = "default_calculation")]
    pub calculation_type: CalculationType,
    #[serde(default = "default_propagation")]
    pub propagation_type: PropagationType,
    #[serde(default)]
    pub focal_length: LengthSpec,
    #[serde(default)]
    pub propagation_distance: LengthSpec,
    #[serde(default = "default_bins")]
    pub n_bins_x: usize,
    #[serde(default = "default_bins")]
    pub n_bins_z: usize,
    #[serde(default = "default_peaks")]
    pub n_diffraction_peaks: usize,
    #[serde(default = "default_fft_cap")]
    pub fft_sample_cap: usize,
    #[serde(default = "default_true")]
    pub geometry_analysis_enabled: bool,
    /// Seed for ray resampling; `None` draws one from the OS.
    #[serde(default)]
    pub random_seed: Option<u64>,
    #[serde(default)]
    pub calibration: Calibration,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            diffraction_plane: default_plane(),
            calculation_type: default_calculation(),
            propagation_type: default_propagation(),
            focal_length: LengthSpec::Auto,
            propagation_distance: LengthSpec::Auto,
            n_bins_x: default_bins(),
            n_bins_z: default_bins(),
            n_diffraction_peaks: default_peaks(),
            fft_sample_cap: default_fft_cap(),
            geometry_analysis_enabled: true,
            random_seed: None,
            calibration: Calibration::default(),
        }
    }
}

/// Smallest FFT cap accepted; below this a wavefront cannot resolve a
/// single diffraction peak.
pub const MIN_FFT_SAMPLES: usize = 64;

impl HybridConfig {
    pub fn n_bins(&self, axis: Axis) -> usize {
        match axis {
            Axis::X => self.n_bins_x,
            Axis::Z => self.n_bins_z,
        }
    }

    /// Reject values that cannot produce a meaningful calculation.
    pub fn validate(&self) -> Result<(), HybridError> {
        let fail = |msg: String| Err(HybridError::InvalidConfig(msg));
        if self.n_bins_x == 0 || self.n_bins_z == 0 {
            return fail("histogram bin counts must be positive".into());
        }
        if self.n_diffraction_peaks == 0 {
            return fail("n_diffraction_peaks must be positive".into());
        }
        if self.fft_sample_cap < MIN_FFT_SAMPLES {
            return fail(format!(
                "fft_sample_cap {} is below the minimum of {}",
                self.fft_sample_cap, MIN_FFT_SAMPLES
            ));
        }
        for (name, spec) in [
            ("focal_length", self.focal_length),
            ("propagation_distance", self.propagation_distance),
        ] {
            if let LengthSpec::Explicit(v) = spec {
                if !v.is_finite() || v == 0.0 {
                    return fail(format!("{} must be finite and non-zero, got {}", name, v));
                }
            }
        }
        let c = &self.calibration;
        if !(c.cut_fraction_threshold > 0.0 && c.cut_fraction_threshold < 1.0) {
            return fail("cut_fraction_threshold must lie in (0, 1)".into());
        }
        if c.geometry_histogram_bins < 2 {
            return fail("geometry_histogram_bins must be at least 2".into());
        }
        let positive = [
            ("figure_error_oversampling", c.figure_error_oversampling),
            ("rms_slope_image_floor", c.rms_slope_image_floor),
            ("displacement_image_floor", c.displacement_image_floor),
            ("fft_size_factor", c.fft_size_factor),
            ("peak_width_factor", c.peak_width_factor),
        ];
        if let Some((name, v)) = positive.iter().find(|(_, v)| !(v.is_finite() && *v > 0.0)) {
            return fail(format!("{} must be positive, got {}", name, v));
        }
        Ok(())
    }
}
