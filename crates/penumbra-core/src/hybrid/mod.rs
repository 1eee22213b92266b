//! The hybrid diffraction correction.
//!
//! [`HybridCalculator::run`] wraps one optical element. The stages run
//! strictly downstream:
//!
//! 1. [`geometry::GeometryAnalyzer`] decides whether the beam is cut by the
//!    element aperture at all.
//! 2. [`screen::ScreenProjector`] traces through the ideal element and
//!    projects the beam back onto the element plane.
//! 3. The [`strategy::CalculationStrategy`] of the configured calculation
//!    type extracts the element geometry and error profile.
//! 4. [`wavefront::WavefrontBuilder`] samples the field at the screen and
//!    [`propagation::FresnelPropagator`] turns it into far-field and/or
//!    near-field [`propagation::DiffractionKernel`]s.
//! 5. [`sampling::RaySampler`] draws one perturbation per good ray and
//!    [`reconstruct::BeamReconstructor`] rebuilds the output beams.
//!
//! Every derived quantity lives in a [`context::CalculationContext`] that is
//! created per invocation and dropped at the end of it.

pub mod cancel;
pub mod context;
pub mod geometry;
pub mod histogram;
pub mod polyfit;
pub mod propagation;
pub mod reconstruct;
pub mod sampling;
pub mod screen;
pub mod strategy;
pub mod wavefront;

use std::sync::Arc;

use penumbra_compute::{ComputeBackend, CpuBackend};
use penumbra_materials::MaterialLookup;

use crate::config::{DiffractionPlane, HybridConfig};
use crate::element::OpticalElement;
use crate::error::HybridError;
use crate::tracer::RayTracer;
use crate::types::{Axis, RayEnsemble};

pub use cancel::CancellationToken;
pub use context::{AxisContext, CalculationContext, ContextSummary};
pub use propagation::{DiffractionKernel, FieldRegime, KernelData};

use geometry::GeometryAnalyzer;
use propagation::FresnelPropagator;
use reconstruct::{AxisSamples, BeamReconstructor};
use sampling::{CumulativeDistribution, JointDistribution, RaySampler};
use screen::ScreenProjector;
use strategy::{check_displacement, strategy_for};
use wavefront::WavefrontBuilder;

/// The beams around the element being corrected.
#[derive(Debug, Clone, Copy)]
pub struct HybridInput<'a> {
    /// Beam entering the element, at its source plane.
    pub incoming: &'a RayEnsemble,
    /// Beam leaving the element as traced by the ray tracer.
    pub outgoing: &'a RayEnsemble,
    pub element: &'a OpticalElement,
}

/// Results of a completed calculation.
#[derive(Debug, Clone)]
pub struct HybridBeams {
    pub far_field: Option<RayEnsemble>,
    pub near_field: Option<RayEnsemble>,
    pub kernels: Vec<DiffractionKernel>,
    pub context: ContextSummary,
}

#[derive(Debug, Clone)]
pub enum HybridOutcome {
    Computed(HybridBeams),
    /// The beam is not cut on any requested axis; carries the outgoing beam
    /// unchanged.
    NotNecessary(RayEnsemble),
    /// Cancelled before completion; carries the outgoing beam unchanged.
    Cancelled(RayEnsemble),
}

impl HybridOutcome {
    pub fn beams(&self) -> Option<&HybridBeams> {
        match self {
            HybridOutcome::Computed(b) => Some(b),
            _ => None,
        }
    }
}

/// Random stream of a kernel: separate for each regime and axis.
fn stream_id(regime: FieldRegime, axis: Option<Axis>) -> u64 {
    let base = match regime {
        FieldRegime::FarField => 0,
        FieldRegime::NearField => 3,
    };
    base + match axis {
        Some(Axis::X) => 1,
        Some(Axis::Z) => 2,
        None => 3,
    }
}

/// Runs the hybrid correction for one element.
pub struct HybridCalculator {
    config: HybridConfig,
    tracer: Arc<dyn RayTracer>,
    materials: Option<Arc<dyn MaterialLookup>>,
    backend: Arc<dyn ComputeBackend>,
    cancel: Option<CancellationToken>,
}

impl HybridCalculator {
    pub fn new(config: HybridConfig, tracer: Arc<dyn RayTracer>) -> Self {
        Self {
            config,
            tracer,
            materials: None,
            backend: Arc::new(CpuBackend::new()),
            cancel: None,
        }
    }

    /// Material data for lens stacks.
    pub fn with_materials(mut self, materials: Arc<dyn MaterialLookup>) -> Self {
        self.materials = Some(materials);
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn ComputeBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn config(&self) -> &HybridConfig {
        &self.config
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.is_cancelled())
    }

    /// Run the correction.
    ///
    /// # Errors
    /// Any [`HybridError`]; see [`HybridError::class`]. A beam that needs no
    /// correction and a cancelled run are outcomes, not errors.
    pub fn run(&self, input: &HybridInput<'_>) -> Result<HybridOutcome, HybridError> {
        let element = input.element;
        self.config.validate()?;
        input.incoming.validate()?;
        input.outgoing.validate()?;
        input.incoming.check_aligned(input.outgoing)?;

        let strategy = strategy_for(self.config.calculation_type);
        let mut plane = self.config.diffraction_plane;
        strategy.check_congruence(element, plane)?;
        log::info!(
            "Hybrid {:?} on '{}' ({:?}, {:?}), {} rays",
            strategy.calculation_type(),
            element.name,
            plane,
            self.config.propagation_type,
            input.incoming.len()
        );
        log::debug!("Compute backend: {}", self.backend.device_info().name);

        let error = strategy.error_profile(element)?;
        if self.cancelled() {
            return Ok(HybridOutcome::Cancelled(input.outgoing.clone()));
        }

        if self.config.geometry_analysis_enabled {
            let cut = GeometryAnalyzer::new(self.tracer.as_ref(), &self.config.calibration).analyze(
                input.incoming,
                element,
                plane.axes(),
            )?;
            let cut_axes: Vec<Axis> = plane.axes().iter().copied().filter(|&a| cut.is_cut(a)).collect();
            match cut_axes.as_slice() {
                [] => {
                    log::info!("'{}' does not cut the beam; diffraction correction not necessary", element.name);
                    return Ok(HybridOutcome::NotNecessary(input.outgoing.clone()));
                }
                [axis] if plane.axes().len() == 2 => {
                    log::warn!(
                        "'{}' cuts the beam along {:?} only; computing that plane alone",
                        element.name,
                        axis
                    );
                    plane = DiffractionPlane::single(*axis);
                    check_displacement(element, plane)?;
                }
                _ => {}
            }
        }
        if self.cancelled() {
            return Ok(HybridOutcome::Cancelled(input.outgoing.clone()));
        }

        let screen = ScreenProjector::new(self.tracer.as_ref()).project(input.incoming, element, plane.axes())?;
        let footprint = strategy.footprint(&screen)?;
        let model = strategy.geometrical_parameters(
            element,
            &screen,
            footprint.as_deref(),
            plane.axes(),
            self.materials.as_deref(),
        )?;
        let ctx = CalculationContext::build(&self.config, plane, element, &screen, &model, error.as_deref())?;
        if self.cancelled() {
            return Ok(HybridOutcome::Cancelled(input.outgoing.clone()));
        }

        let builder = WavefrontBuilder::new(&screen, element, &model, error.as_deref(), self.backend.as_ref());
        let propagator = FresnelPropagator::new(self.backend.as_ref());
        let kernels = self.kernels(&propagator, &builder, &ctx)?;
        if self.cancelled() {
            return Ok(HybridOutcome::Cancelled(input.outgoing.clone()));
        }

        let seed = self.config.random_seed.unwrap_or_else(rand::random);
        log::debug!("Sampling {} rays with seed {}", screen.n_good(), seed);
        let sampler = match &self.cancel {
            Some(token) => RaySampler::new(seed).with_cancellation(token),
            None => RaySampler::new(seed),
        };
        let reconstructor = BeamReconstructor::new(&screen, &ctx, input.outgoing);

        let mut far_field = None;
        let mut near_field = None;
        if ctx.propagation.far_field() {
            let Some(samples) = draw(&sampler, &kernels, FieldRegime::FarField, screen.n_good())? else {
                return Ok(HybridOutcome::Cancelled(input.outgoing.clone()));
            };
            far_field = Some(reconstructor.far_field(&samples)?);
        }
        if ctx.propagation.near_field() {
            let Some(samples) = draw(&sampler, &kernels, FieldRegime::NearField, screen.n_good())? else {
                return Ok(HybridOutcome::Cancelled(input.outgoing.clone()));
            };
            near_field = Some(reconstructor.near_field(&samples)?);
        }

        log::info!("Hybrid calculation on '{}' complete", element.name);
        Ok(HybridOutcome::Computed(HybridBeams {
            far_field,
            near_field,
            kernels,
            context: ctx.summary(),
        }))
    }

    fn kernels(
        &self,
        propagator: &FresnelPropagator<'_>,
        builder: &WavefrontBuilder<'_>,
        ctx: &CalculationContext,
    ) -> Result<Vec<DiffractionKernel>, HybridError> {
        let axis_kernels = |axis: &AxisContext| -> Result<Vec<DiffractionKernel>, HybridError> {
            let mut out = Vec::with_capacity(2);
            if ctx.propagation.far_field() {
                out.push(propagator.far_field_1d(builder, ctx, axis)?);
            }
            if ctx.propagation.near_field() {
                out.push(propagator.near_field_1d(builder, ctx, axis)?);
            }
            Ok(out)
        };

        match (ctx.plane, ctx.axes.as_slice()) {
            (DiffractionPlane::Both2D, [x, z]) => {
                let mut out = Vec::with_capacity(2);
                if ctx.propagation.far_field() {
                    out.push(propagator.far_field_2d(builder, ctx, [x, z])?);
                }
                if ctx.propagation.near_field() {
                    out.push(propagator.near_field_2d(builder, ctx, [x, z])?);
                }
                Ok(out)
            }
            (DiffractionPlane::Both1D, [x, z]) => {
                let (kx, kz) = rayon::join(|| axis_kernels(x), || axis_kernels(z));
                let mut out = kx?;
                out.extend(kz?);
                Ok(out)
            }
            (_, axes) => {
                let mut out = Vec::new();
                for axis in axes {
                    out.extend(axis_kernels(axis)?);
                }
                Ok(out)
            }
        }
    }
}

/// Draw one perturbation per good ray from every kernel of `regime`.
/// `None` if cancelled.
fn draw(
    sampler: &RaySampler<'_>,
    kernels: &[DiffractionKernel],
    regime: FieldRegime,
    n: usize,
) -> Result<Option<AxisSamples>, HybridError> {
    let mut samples: AxisSamples = [None, None];
    for kernel in kernels.iter().filter(|k| k.regime == regime) {
        match &kernel.data {
            KernelData::Axis { axis, intensity } => {
                let cdf = CumulativeDistribution::new(intensity)?;
                let Some(draws) = sampler.draw(&cdf, n, stream_id(regime, Some(*axis))) else {
                    return Ok(None);
                };
                samples[axis.index()] = Some(draws);
            }
            KernelData::Joint { intensity } => {
                let joint = JointDistribution::new(intensity)?;
                let Some(draws) = sampler.draw_joint(&joint, n, stream_id(regime, None)) else {
                    return Ok(None);
                };
                let (x, z): (Vec<f64>, Vec<f64>) = draws.into_iter().unzip();
                samples = [Some(x), Some(z)];
            }
        }
    }
    Ok(Some(samples))
}
