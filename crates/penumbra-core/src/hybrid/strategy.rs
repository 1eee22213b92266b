//! Calculation strategies.
//!
//! Each [`CalculationType`] is implemented by one [`CalculationStrategy`],
//! which knows which elements it applies to, what geometry it needs from the
//! screen trace and whether a figure or thickness error enters the
//! wavefront.

use std::f64::consts::FRAC_PI_2;
use std::sync::Arc;

use penumbra_materials::{MaterialLookup, HC_EV_M};
use penumbra_surface::FigureErrorProfile;

use super::polyfit::Polynomial;
use super::screen::ScreenData;
use crate::config::{CalculationType, DiffractionPlane};
use crate::element::{ElementKind, OpticalElement};
use crate::error::HybridError;
use crate::tracer::TracerError;
use crate::types::{Axis, FootprintPoint};

/// Degree of the incidence/reflection angle fits.
pub const ANGLE_FIT_DEGREE: usize = 3;
/// Degree of the surface coordinate fit.
pub const COORDINATE_FIT_DEGREE: usize = 6;

/// Screen-position mapping onto a reflective surface along one axis.
#[derive(Debug, Clone)]
pub struct SurfaceMap {
    /// Grazing incidence angle vs screen position.
    pub incidence: Polynomial,
    /// Grazing reflection angle vs screen position.
    pub reflection: Polynomial,
    /// Surface coordinate vs screen position.
    pub coordinate: Polynomial,
}

impl SurfaceMap {
    /// Height-to-phase factor: `2 sin(theta_i)` for a mirror,
    /// `sin(theta_i) + sin(theta_r)` for a grating.
    pub fn phase_factor(&self, position: f64, grating: bool) -> f64 {
        let si = self.incidence.evaluate(position).sin();
        if grating {
            si + self.reflection.evaluate(position).sin()
        } else {
            2.0 * si
        }
    }
}

/// What the element does to the wavefront beyond its aperture.
#[derive(Debug, Clone)]
pub enum SurfaceModel {
    /// A plain aperture; only the lens phase is applied.
    Aperture,
    Reflective {
        grating: bool,
        grazing_angle: f64,
        reflection_angle: f64,
        /// Per axis `[x, z]`, present for the computed axes.
        maps: [Option<SurfaceMap>; 2],
    },
    Lens {
        /// Refractive-index decrement at the beam energy, when known.
        delta: Option<f64>,
        /// Linear attenuation coefficient (1/m), when known.
        attenuation: Option<f64>,
        /// Element focal lengths, derived as `R / (2 N delta)` where not set.
        focal_lengths: [Option<f64>; 2],
    },
}

impl SurfaceModel {
    /// Angular deviation per unit height-error slope.
    pub fn slope_gain(&self) -> f64 {
        match self {
            SurfaceModel::Aperture => 0.0,
            SurfaceModel::Reflective {
                grating,
                grazing_angle,
                reflection_angle,
                ..
            } => {
                if *grating {
                    1.0 + reflection_angle.sin() / grazing_angle.sin()
                } else {
                    2.0
                }
            }
            SurfaceModel::Lens { delta, .. } => delta.unwrap_or(0.0),
        }
    }

    pub fn focal_length(&self, axis: Axis) -> Option<f64> {
        match self {
            SurfaceModel::Lens { focal_lengths, .. } => focal_lengths[axis.index()],
            _ => None,
        }
    }
}

/// One calculation type.
pub trait CalculationStrategy: Send + Sync {
    fn calculation_type(&self) -> CalculationType;

    /// Reject element/plane combinations this calculation cannot handle.
    fn check_congruence(&self, element: &OpticalElement, plane: DiffractionPlane) -> Result<(), HybridError>;

    /// Footprint points of the good screen rays, if this calculation needs
    /// them.
    fn footprint(&self, screen: &ScreenData) -> Result<Option<Vec<FootprintPoint>>, HybridError>;

    /// Element geometry relevant to the wavefront along `axes`. `footprint`
    /// is the output of [`footprint`](Self::footprint).
    fn geometrical_parameters(
        &self,
        element: &OpticalElement,
        screen: &ScreenData,
        footprint: Option<&[FootprintPoint]>,
        axes: &[Axis],
        materials: Option<&dyn MaterialLookup>,
    ) -> Result<SurfaceModel, HybridError>;

    /// Figure or thickness error entering the wavefront.
    fn error_profile(&self, element: &OpticalElement) -> Result<Option<Arc<FigureErrorProfile>>, HybridError>;
}

/// Strategy for `calculation`.
pub fn strategy_for(calculation: CalculationType) -> Box<dyn CalculationStrategy> {
    match calculation {
        CalculationType::SimpleAperture => Box::new(ApertureCalculation),
        CalculationType::MirrorOrGratingSize => Box::new(MirrorOrGratingCalculation),
        CalculationType::MirrorOrGratingSizeAndErrorProfile => Box::new(MirrorOrGratingWithErrorCalculation),
        CalculationType::CrlSize => Box::new(CrlCalculation),
        CalculationType::CrlSizeAndErrorProfile => Box::new(CrlWithErrorCalculation),
    }
}

fn incongruent(calculation: CalculationType, element: &OpticalElement, reason: impl Into<String>) -> HybridError {
    HybridError::Incongruent {
        calculation,
        element: element.name.clone(),
        reason: reason.into(),
    }
}

/// Displacement rules: yaw and offsets along the beam are never supported;
/// pitch and normal offset need the tangential plane; roll and transverse
/// offset need the sagittal plane; non-reflective elements take none.
pub fn check_displacement(element: &OpticalElement, plane: DiffractionPlane) -> Result<(), HybridError> {
    let d = &element.displacement;
    if d.is_zero() {
        return Ok(());
    }
    let fail = |msg: &str| Err(HybridError::UnsupportedDisplacement(format!("{}: {}", element.name, msg)));
    if !element.kind.is_reflective() {
        return fail("only mirrors and gratings can be displaced");
    }
    if d.yaw() != 0.0 {
        return fail("rotation about the surface normal is not supported");
    }
    if d.offset[1] != 0.0 {
        return fail("offset along the surface length is not supported");
    }
    if (d.pitch() != 0.0 || d.offset[2] != 0.0) && !plane.includes(Axis::Z) {
        return fail("pitch or normal offset requires the tangential plane");
    }
    if (d.roll() != 0.0 || d.offset[0] != 0.0) && !plane.includes(Axis::X) {
        return fail("roll or transverse offset requires the sagittal plane");
    }
    Ok(())
}

fn no_error_profile(element: &OpticalElement) -> Result<Option<Arc<FigureErrorProfile>>, HybridError> {
    if element.figure_error.is_some() {
        log::warn!("{}: figure error ignored by a size-only calculation", element.name);
    }
    Ok(None)
}

fn required_error_profile(
    calculation: CalculationType,
    element: &OpticalElement,
) -> Result<Option<Arc<FigureErrorProfile>>, HybridError> {
    let source = element
        .figure_error
        .as_ref()
        .ok_or_else(|| incongruent(calculation, element, "no figure-error source"))?;
    let profile = source.acquire()?;
    if profile.is_flat() {
        log::info!("{}: figure error is identically zero", element.name);
    }
    Ok(Some(profile))
}

// ── Simple aperture ─────────────────────────────────────────────────────

pub struct ApertureCalculation;

impl CalculationStrategy for ApertureCalculation {
    fn calculation_type(&self) -> CalculationType {
        CalculationType::SimpleAperture
    }

    fn check_congruence(&self, element: &OpticalElement, plane: DiffractionPlane) -> Result<(), HybridError> {
        if element.kind != ElementKind::Aperture {
            return Err(incongruent(self.calculation_type(), element, "element is not an aperture"));
        }
        check_displacement(element, plane)
    }

    fn footprint(&self, _screen: &ScreenData) -> Result<Option<Vec<FootprintPoint>>, HybridError> {
        Ok(None)
    }

    fn geometrical_parameters(
        &self,
        _element: &OpticalElement,
        _screen: &ScreenData,
        _footprint: Option<&[FootprintPoint]>,
        _axes: &[Axis],
        _materials: Option<&dyn MaterialLookup>,
    ) -> Result<SurfaceModel, HybridError> {
        Ok(SurfaceModel::Aperture)
    }

    fn error_profile(&self, element: &OpticalElement) -> Result<Option<Arc<FigureErrorProfile>>, HybridError> {
        no_error_profile(element)
    }
}

// ── Mirrors and gratings ────────────────────────────────────────────────

fn check_reflective(calculation: CalculationType, element: &OpticalElement, plane: DiffractionPlane) -> Result<(), HybridError> {
    if !element.kind.is_reflective() {
        return Err(incongruent(calculation, element, "element is not a mirror or grating"));
    }
    for (name, angle) in [("incidence", element.incidence_angle), ("reflection", element.reflection_angle)] {
        if !(angle > 0.0 && angle < FRAC_PI_2) {
            return Err(incongruent(
                calculation,
                element,
                format!("{} angle {} rad is not a grazing angle", name, angle),
            ));
        }
    }
    check_displacement(element, plane)
}

fn missing_footprint() -> HybridError {
    TracerError::Failed("tracer returned no footprint for a reflective element".into()).into()
}

fn reflective_footprint(screen: &ScreenData) -> Result<Option<Vec<FootprintPoint>>, HybridError> {
    screen.footprint().map(Some).ok_or_else(missing_footprint)
}

fn reflective_model(
    element: &OpticalElement,
    screen: &ScreenData,
    footprint: Option<&[FootprintPoint]>,
    axes: &[Axis],
) -> Result<SurfaceModel, HybridError> {
    let footprint = footprint.ok_or_else(missing_footprint)?;
    if footprint.len() != screen.n_good() {
        return Err(TracerError::Failed(format!(
            "{} footprint points for {} good rays",
            footprint.len(),
            screen.n_good()
        ))
        .into());
    }
    let mut maps: [Option<SurfaceMap>; 2] = [None, None];
    let incidence: Vec<f64> = footprint.iter().map(|p| p.incidence_angle).collect();
    let reflection: Vec<f64> = footprint.iter().map(|p| p.reflection_angle).collect();
    for &axis in axes {
        let positions = screen.positions(axis);
        let coordinate: Vec<f64> = footprint
            .iter()
            .map(|p| match axis {
                Axis::X => p.x_m,
                Axis::Z => p.y_m,
            })
            .collect();
        maps[axis.index()] = Some(SurfaceMap {
            incidence: Polynomial::fit(&positions, &incidence, ANGLE_FIT_DEGREE)?,
            reflection: Polynomial::fit(&positions, &reflection, ANGLE_FIT_DEGREE)?,
            coordinate: Polynomial::fit(&positions, &coordinate, COORDINATE_FIT_DEGREE)?,
        });
        log::debug!("{:?}: footprint fits computed from {} rays", axis, positions.len());
    }
    Ok(SurfaceModel::Reflective {
        grating: element.kind == ElementKind::Grating,
        grazing_angle: element.incidence_angle,
        reflection_angle: element.reflection_angle,
        maps,
    })
}

pub struct MirrorOrGratingCalculation;

impl CalculationStrategy for MirrorOrGratingCalculation {
    fn calculation_type(&self) -> CalculationType {
        CalculationType::MirrorOrGratingSize
    }

    fn check_congruence(&self, element: &OpticalElement, plane: DiffractionPlane) -> Result<(), HybridError> {
        check_reflective(self.calculation_type(), element, plane)
    }

    fn footprint(&self, screen: &ScreenData) -> Result<Option<Vec<FootprintPoint>>, HybridError> {
        reflective_footprint(screen)
    }

    fn geometrical_parameters(
        &self,
        element: &OpticalElement,
        screen: &ScreenData,
        footprint: Option<&[FootprintPoint]>,
        axes: &[Axis],
        _materials: Option<&dyn MaterialLookup>,
    ) -> Result<SurfaceModel, HybridError> {
        reflective_model(element, screen, footprint, axes)
    }

    fn error_profile(&self, element: &OpticalElement) -> Result<Option<Arc<FigureErrorProfile>>, HybridError> {
        no_error_profile(element)
    }
}

pub struct MirrorOrGratingWithErrorCalculation;

impl CalculationStrategy for MirrorOrGratingWithErrorCalculation {
    fn calculation_type(&self) -> CalculationType {
        CalculationType::MirrorOrGratingSizeAndErrorProfile
    }

    fn check_congruence(&self, element: &OpticalElement, plane: DiffractionPlane) -> Result<(), HybridError> {
        check_reflective(self.calculation_type(), element, plane)?;
        if element.figure_error.is_none() {
            return Err(incongruent(self.calculation_type(), element, "no figure-error source"));
        }
        Ok(())
    }

    fn footprint(&self, screen: &ScreenData) -> Result<Option<Vec<FootprintPoint>>, HybridError> {
        reflective_footprint(screen)
    }

    fn geometrical_parameters(
        &self,
        element: &OpticalElement,
        screen: &ScreenData,
        footprint: Option<&[FootprintPoint]>,
        axes: &[Axis],
        _materials: Option<&dyn MaterialLookup>,
    ) -> Result<SurfaceModel, HybridError> {
        reflective_model(element, screen, footprint, axes)
    }

    fn error_profile(&self, element: &OpticalElement) -> Result<Option<Arc<FigureErrorProfile>>, HybridError> {
        required_error_profile(self.calculation_type(), element)
    }
}

// ── Refractive lens stacks ──────────────────────────────────────────────

fn check_crl(calculation: CalculationType, element: &OpticalElement, plane: DiffractionPlane) -> Result<(), HybridError> {
    let ElementKind::Crl { n_lenses, radius, .. } = &element.kind else {
        return Err(incongruent(calculation, element, "element is not a lens stack"));
    };
    if *n_lenses == 0 || !(*radius > 0.0) {
        return Err(incongruent(
            calculation,
            element,
            format!("{} lenses of radius {} m", n_lenses, radius),
        ));
    }
    if let Some(&axis) = plane.axes().iter().find(|&&a| element.aperture.half_width(a).is_none()) {
        return Err(HybridError::InfiniteAperture(axis));
    }
    check_displacement(element, plane)
}

fn lens_model(
    element: &OpticalElement,
    screen: &ScreenData,
    materials: Option<&dyn MaterialLookup>,
    required: bool,
) -> Result<SurfaceModel, HybridError> {
    let ElementKind::Crl {
        material,
        n_lenses,
        radius,
    } = &element.kind
    else {
        return Err(HybridError::InvalidConfig(format!("{} is not a lens stack", element.name)));
    };

    let (delta, attenuation) = match materials {
        Some(db) => {
            let energy_ev = HC_EV_M / screen.wavelength;
            let (delta, _beta) = db.refractive_index_decrement(material, energy_ev)?;
            let mu = db.attenuation(material, energy_ev)?;
            log::info!(
                "{} at {:.1} eV: delta = {:.4e}, mu = {:.4e} 1/m ({})",
                material,
                energy_ev,
                delta,
                mu,
                db.name()
            );
            (Some(delta), Some(mu))
        }
        None if required => {
            return Err(HybridError::InvalidConfig(
                "a thickness-error calculation needs a material lookup".into(),
            ))
        }
        None => (None, None),
    };

    let derived = delta.map(|d| radius / (2.0 * *n_lenses as f64 * d));
    let focal_lengths = [
        element.focal_lengths[0].or(derived),
        element.focal_lengths[1].or(derived),
    ];
    Ok(SurfaceModel::Lens {
        delta,
        attenuation,
        focal_lengths,
    })
}

pub struct CrlCalculation;

impl CalculationStrategy for CrlCalculation {
    fn calculation_type(&self) -> CalculationType {
        CalculationType::CrlSize
    }

    fn check_congruence(&self, element: &OpticalElement, plane: DiffractionPlane) -> Result<(), HybridError> {
        check_crl(self.calculation_type(), element, plane)
    }

    fn footprint(&self, _screen: &ScreenData) -> Result<Option<Vec<FootprintPoint>>, HybridError> {
        Ok(None)
    }

    fn geometrical_parameters(
        &self,
        element: &OpticalElement,
        screen: &ScreenData,
        _footprint: Option<&[FootprintPoint]>,
        _axes: &[Axis],
        materials: Option<&dyn MaterialLookup>,
    ) -> Result<SurfaceModel, HybridError> {
        lens_model(element, screen, materials, false)
    }

    fn error_profile(&self, element: &OpticalElement) -> Result<Option<Arc<FigureErrorProfile>>, HybridError> {
        no_error_profile(element)
    }
}

pub struct CrlWithErrorCalculation;

impl CalculationStrategy for CrlWithErrorCalculation {
    fn calculation_type(&self) -> CalculationType {
        CalculationType::CrlSizeAndErrorProfile
    }

    fn check_congruence(&self, element: &OpticalElement, plane: DiffractionPlane) -> Result<(), HybridError> {
        check_crl(self.calculation_type(), element, plane)?;
        if element.figure_error.is_none() {
            return Err(incongruent(self.calculation_type(), element, "no thickness-error source"));
        }
        Ok(())
    }

    fn footprint(&self, _screen: &ScreenData) -> Result<Option<Vec<FootprintPoint>>, HybridError> {
        Ok(None)
    }

    fn geometrical_parameters(
        &self,
        element: &OpticalElement,
        screen: &ScreenData,
        _footprint: Option<&[FootprintPoint]>,
        _axes: &[Axis],
        materials: Option<&dyn MaterialLookup>,
    ) -> Result<SurfaceModel, HybridError> {
        lens_model(element, screen, materials, true)
    }

    fn error_profile(&self, element: &OpticalElement) -> Result<Option<Arc<FigureErrorProfile>>, HybridError> {
        required_error_profile(self.calculation_type(), element)
    }
}
