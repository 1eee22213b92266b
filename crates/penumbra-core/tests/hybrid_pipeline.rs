//! End-to-end checks of the hybrid correction on slits, flat mirrors,
//! gratings and lens stacks, traced with the ideal thin-lens tracer.

use std::f64::consts::PI;
use std::sync::Arc;

use approx::{assert_abs_diff_eq, assert_relative_eq};
use penumbra_compute::CpuBackend;
use penumbra_core::hybrid::context::{far_field_focal_length, fft_sample_count};
use penumbra_core::hybrid::{DiffractionKernel, FieldRegime, KernelData};
use penumbra_core::tracer::ideal::IdealTracer;
use penumbra_core::tracer::source::{SourceShape, SyntheticSource};
use penumbra_core::{
    Aperture, Axis, CalculationType, Calibration, CancellationToken, DiffractionPlane, ElementKind, ErrorClass,
    FigureErrorSource, HybridCalculator, HybridConfig, HybridError, HybridInput, HybridOutcome, OpticalElement,
    PropagationType, RayEnsemble, RayTracer,
};
use penumbra_materials::{MaterialLookup, TabulatedMaterials, HC_EV_M};
use penumbra_surface::{linspace, FigureErrorProfile, ScalarField1D};

const SLIT_HALF_WIDTH: f64 = 5e-6;
const IMAGE_DISTANCE: f64 = 10.0;
const GRAZING_ANGLE: f64 = 3e-3;
const CRL_RADIUS: f64 = 50e-6;
const CRL_LENSES: usize = 10;

// ─── Helpers ────────────────────────────────────────────────────────────

fn source(n_rays: usize, size: [f64; 2], seed: u64) -> RayEnsemble {
    SyntheticSource {
        shape: SourceShape::Uniform,
        size,
        divergence: [1e-9, 1e-9],
        n_rays,
        seed: Some(seed),
        ..Default::default()
    }
    .generate()
    .unwrap()
}

fn slit(half_widths: [Option<f64>; 2]) -> OpticalElement {
    let mut slit = OpticalElement::new("slit", ElementKind::Aperture);
    slit.aperture = Aperture {
        half_widths,
        centre: [0.0, 0.0],
    };
    slit.image_distance = IMAGE_DISTANCE;
    slit
}

/// Flat reflector of length 4 cm at a 3 mrad grazing angle.
fn reflector(kind: ElementKind, reflection_angle: f64) -> OpticalElement {
    let mut m = OpticalElement::new("m1", kind);
    m.incidence_angle = GRAZING_ANGLE;
    m.reflection_angle = reflection_angle;
    m.image_distance = IMAGE_DISTANCE;
    m.aperture.half_widths = [None, Some(0.02)];
    m
}

fn beryllium_crl(half_height: f64) -> OpticalElement {
    let mut crl = OpticalElement::new(
        "crl",
        ElementKind::Crl {
            material: "Be".into(),
            n_lenses: CRL_LENSES,
            radius: CRL_RADIUS,
        },
    );
    crl.aperture.half_widths = [None, Some(half_height)];
    crl.image_distance = IMAGE_DISTANCE;
    crl
}

/// Attach an in-memory height (or thickness) error sampled at `grid`.
fn with_error(mut element: OpticalElement, grid: Vec<f64>, heights: impl Fn(f64) -> f64) -> OpticalElement {
    let values = grid.iter().map(|&u| heights(u)).collect();
    let profile = ScalarField1D::new(grid, values).unwrap();
    element.figure_error = Some(FigureErrorSource::InMemory(Arc::new(FigureErrorProfile::Profile(profile))));
    element
}

fn config(plane: DiffractionPlane, propagation: PropagationType, seed: u64) -> HybridConfig {
    HybridConfig {
        diffraction_plane: plane,
        propagation_type: propagation,
        random_seed: Some(seed),
        ..Default::default()
    }
}

fn config_for(
    calculation: CalculationType,
    plane: DiffractionPlane,
    propagation: PropagationType,
    seed: u64,
) -> HybridConfig {
    HybridConfig {
        calculation_type: calculation,
        ..config(plane, propagation, seed)
    }
}

fn calculator(config: HybridConfig) -> HybridCalculator {
    HybridCalculator::new(config, Arc::new(IdealTracer::new()))
}

fn run_calculator(
    calculator: &HybridCalculator,
    incoming: &RayEnsemble,
    element: &OpticalElement,
) -> (RayEnsemble, Result<HybridOutcome, HybridError>) {
    let outgoing = IdealTracer::new().trace(incoming, element).unwrap().beam;
    let outcome = calculator.run(&HybridInput {
        incoming,
        outgoing: &outgoing,
        element,
    });
    (outgoing, outcome)
}

fn run(config: HybridConfig, incoming: &RayEnsemble, element: &OpticalElement) -> (RayEnsemble, HybridOutcome) {
    let (outgoing, outcome) = run_calculator(&calculator(config), incoming, element);
    (outgoing, outcome.unwrap())
}

/// Diffraction angles of the good rays: shift from the geometric image
/// position divided by the propagation distance.
fn diffraction_angles_at(corrected: &RayEnsemble, geometric: &RayEnsemble, axis: Axis, distance: f64) -> Vec<f64> {
    corrected
        .rays()
        .iter()
        .zip(geometric.rays())
        .filter(|(c, _)| c.good)
        .map(|(c, g)| (c.transverse(axis) - g.transverse(axis)) / distance)
        .collect()
}

fn diffraction_angles(corrected: &RayEnsemble, geometric: &RayEnsemble, axis: Axis) -> Vec<f64> {
    diffraction_angles_at(corrected, geometric, axis, IMAGE_DISTANCE)
}

fn good_positions(beam: &RayEnsemble, axis: Axis) -> Vec<f64> {
    beam.good_rays().map(|r| r.transverse(axis)).collect()
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Standard deviation about the mean.
fn spread(values: &[f64]) -> f64 {
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

fn kernel(kernels: &[DiffractionKernel], regime: FieldRegime, joint: bool) -> &DiffractionKernel {
    kernels
        .iter()
        .find(|k| k.regime == regime && matches!(k.data, KernelData::Joint { .. }) == joint)
        .unwrap()
}

/// Fraction of a kernel profile's weight within `first_zero` of the centre.
fn kernel_central_fraction(profile: &ScalarField1D, first_zero: f64) -> f64 {
    let inside: f64 = profile
        .abscissas()
        .iter()
        .zip(profile.values())
        .filter(|(t, _)| t.abs() < first_zero)
        .map(|(_, v)| *v)
        .sum();
    inside / profile.sum()
}

/// Fraction of angles inside the central lobe of a slit of full width `a`.
fn central_lobe_fraction(angles: &[f64], wavelength: f64, a: f64) -> f64 {
    let first_zero = wavelength / a;
    angles.iter().filter(|t| t.abs() < first_zero).count() as f64 / angles.len() as f64
}

/// L2 distance between the normalised angle histogram and the Fraunhofer
/// pattern of a slit, over three lobes on each side.
fn sinc_squared_distance(angles: &[f64], wavelength: f64, a: f64) -> f64 {
    let n_bins = 30;
    let half = 3.0 * wavelength / a;
    let width = 2.0 * half / n_bins as f64;

    let mut counts = vec![0.0; n_bins];
    for &t in angles {
        if t.abs() < half {
            let b = (((t + half) / width) as usize).min(n_bins - 1);
            counts[b] += 1.0;
        }
    }
    let total: f64 = counts.iter().sum();

    let sinc2 = |t: f64| {
        let u = std::f64::consts::PI * a * t / wavelength;
        if u.abs() < 1e-12 {
            1.0
        } else {
            (u.sin() / u).powi(2)
        }
    };
    let expected: Vec<f64> = (0..n_bins)
        .map(|b| {
            let lo = -half + b as f64 * width;
            (0..200).map(|k| sinc2(lo + (k as f64 + 0.5) * width / 200.0)).sum::<f64>()
        })
        .collect();
    let norm: f64 = expected.iter().sum();

    counts
        .iter()
        .zip(expected.iter())
        .map(|(c, e)| (c / total - e / norm).powi(2))
        .sum::<f64>()
        .sqrt()
}

fn wavelength() -> f64 {
    SyntheticSource::default().wavelength()
}

// ─── Conservation ───────────────────────────────────────────────────────

#[test]
fn test_ray_count_and_indices_conserved() {
    let incoming = source(20_000, [2e-5, 2e-5], 1);
    let element = slit([None, Some(SLIT_HALF_WIDTH)]);
    let (outgoing, outcome) = run(
        config(DiffractionPlane::Tangential, PropagationType::Both, 5),
        &incoming,
        &element,
    );

    let beams = outcome.beams().expect("slit cuts the beam");
    for beam in [beams.far_field.as_ref().unwrap(), beams.near_field.as_ref().unwrap()] {
        assert_eq!(beam.len(), incoming.len());
        assert_eq!(beam.indices(), incoming.indices());
        beam.check_aligned(&outgoing).unwrap();
        for (c, g) in beam.rays().iter().zip(outgoing.rays()) {
            assert_eq!(c.good, g.good);
            if !g.good {
                assert_eq!(c, g);
            }
        }
    }
    assert_eq!(beams.kernels.len(), 2);
    assert_eq!(beams.context.axes.len(), 1);
}

#[test]
fn test_uncut_beam_is_returned_unchanged() {
    let incoming = source(5_000, [2e-5, 2e-5], 2);
    let element = slit([None, Some(1e-2)]);
    let (outgoing, outcome) = run(
        config(DiffractionPlane::Tangential, PropagationType::Both, 5),
        &incoming,
        &element,
    );
    match outcome {
        HybridOutcome::NotNecessary(beam) => assert_eq!(beam.rays(), outgoing.rays()),
        other => panic!("expected NotNecessary, got {:?}", other),
    }
}

#[test]
fn test_cancelled_run_returns_outgoing() {
    let incoming = source(5_000, [2e-5, 2e-5], 3);
    let element = slit([None, Some(SLIT_HALF_WIDTH)]);
    let tracer = Arc::new(IdealTracer::new());
    let outgoing = tracer.trace(&incoming, &element).unwrap().beam;

    let token = CancellationToken::new();
    token.cancel();
    let outcome = HybridCalculator::new(config(DiffractionPlane::Tangential, PropagationType::Both, 1), tracer)
        .with_cancellation(token)
        .run(&HybridInput {
            incoming: &incoming,
            outgoing: &outgoing,
            element: &element,
        })
        .unwrap();
    match outcome {
        HybridOutcome::Cancelled(beam) => assert_eq!(beam.rays(), outgoing.rays()),
        other => panic!("expected Cancelled, got {:?}", other),
    }
}

// ─── Diffraction physics ────────────────────────────────────────────────

#[test]
fn test_far_field_central_lobe() {
    let incoming = source(100_000, [2e-5, 2e-5], 4);
    let element = slit([None, Some(SLIT_HALF_WIDTH)]);
    let (outgoing, outcome) = run(
        config(DiffractionPlane::Tangential, PropagationType::FarField, 9),
        &incoming,
        &element,
    );
    let beams = outcome.beams().unwrap();
    assert!(beams.near_field.is_none());
    let angles = diffraction_angles(beams.far_field.as_ref().unwrap(), &outgoing, Axis::Z);
    let fraction = central_lobe_fraction(&angles, wavelength(), 2.0 * SLIT_HALF_WIDTH);
    // sinc^2 holds 90.3% of its power in the central lobe
    assert!((fraction - 0.903).abs() < 0.03, "central lobe fraction {}", fraction);
}

#[test]
fn test_far_field_converges_to_sinc_squared() {
    let element = slit([None, Some(SLIT_HALF_WIDTH)]);
    let a = 2.0 * SLIT_HALF_WIDTH;
    let distance = |n_rays: usize| {
        let incoming = source(n_rays, [1e-5, 1e-5], 6);
        let (outgoing, outcome) = run(
            config(DiffractionPlane::Tangential, PropagationType::FarField, 21),
            &incoming,
            &element,
        );
        let beams = outcome.beams().unwrap();
        let angles = diffraction_angles(beams.far_field.as_ref().unwrap(), &outgoing, Axis::Z);
        sinc_squared_distance(&angles, wavelength(), a)
    };

    let coarse = distance(2_000);
    let fine = distance(100_000);
    assert!(fine < coarse, "L2 distance {} with more rays vs {} with fewer", fine, coarse);
    assert!(fine < 0.02, "L2 distance {}", fine);
}

#[test]
fn test_near_and_far_field_agree_at_focus() {
    // For an aperture the near field is propagated with a lens of focal
    // length equal to the distance, i.e. it is the Fraunhofer pattern too.
    let incoming = source(60_000, [2e-5, 2e-5], 7);
    let element = slit([None, Some(SLIT_HALF_WIDTH)]);
    let (outgoing, outcome) = run(
        config(DiffractionPlane::Tangential, PropagationType::Both, 13),
        &incoming,
        &element,
    );
    let beams = outcome.beams().unwrap();
    let a = 2.0 * SLIT_HALF_WIDTH;
    let far = central_lobe_fraction(
        &diffraction_angles(beams.far_field.as_ref().unwrap(), &outgoing, Axis::Z),
        wavelength(),
        a,
    );
    let near = central_lobe_fraction(
        &diffraction_angles(beams.near_field.as_ref().unwrap(), &outgoing, Axis::Z),
        wavelength(),
        a,
    );
    assert!((far - near).abs() < 0.04, "far {} vs near {}", far, near);
}

#[test]
fn test_joint_marginal_matches_independent_axes() {
    let incoming = source(200_000, [2e-5, 2e-5], 8);
    let element = slit([Some(SLIT_HALF_WIDTH), Some(SLIT_HALF_WIDTH)]);
    let a = 2.0 * SLIT_HALF_WIDTH;

    let fractions = |plane: DiffractionPlane| {
        let (outgoing, outcome) = run(config(plane, PropagationType::FarField, 17), &incoming, &element);
        let beam = outcome.beams().unwrap().far_field.clone().unwrap();
        [Axis::X, Axis::Z].map(|axis| {
            central_lobe_fraction(&diffraction_angles(&beam, &outgoing, axis), wavelength(), a)
        })
    };
    let joint = fractions(DiffractionPlane::Both2D);
    let independent = fractions(DiffractionPlane::Both1D);
    for i in 0..2 {
        assert!(
            (joint[i] - independent[i]).abs() < 0.05,
            "axis {}: joint {} vs independent {}",
            i,
            joint[i],
            independent[i]
        );
    }
}

#[test]
fn test_joint_kernel_marginal_matches_sagittal_kernel() {
    let incoming = source(200_000, [1e-5, 1e-5], 18);
    let element = slit([Some(SLIT_HALF_WIDTH), Some(SLIT_HALF_WIDTH)]);
    let first_zero = wavelength() / (2.0 * SLIT_HALF_WIDTH);

    let (_, joint) = run(config(DiffractionPlane::Both2D, PropagationType::FarField, 19), &incoming, &element);
    let (_, separate) = run(config(DiffractionPlane::Both1D, PropagationType::FarField, 19), &incoming, &element);
    let joint = joint.beams().unwrap();
    let separate = separate.beams().unwrap();
    assert_eq!(joint.kernels.len(), 1);
    assert_eq!(separate.kernels.len(), 2);

    let marginal = kernel(&joint.kernels, FieldRegime::FarField, true)
        .profile(Axis::X)
        .unwrap()
        .unwrap();
    let sagittal = separate
        .kernels
        .iter()
        .find(|k| k.axis() == Some(Axis::X))
        .unwrap()
        .profile(Axis::X)
        .unwrap()
        .unwrap();

    let from_joint = kernel_central_fraction(&marginal, first_zero);
    let from_1d = kernel_central_fraction(&sagittal, first_zero);
    assert!(from_1d > 0.85, "1D central lobe fraction {}", from_1d);
    assert!(
        (from_joint - from_1d).abs() < 0.02,
        "joint marginal {} vs sagittal kernel {}",
        from_joint,
        from_1d
    );
}

#[test]
fn test_joint_near_field_agrees_with_far_field() {
    // The aperture lens focuses at the propagation distance, so both regimes
    // resolve the same Fraunhofer pattern.
    let half_width = 1e-5;
    let distance = 1.0;
    let incoming = source(200_000, [2e-5, 2e-5], 14);
    let mut element = slit([Some(half_width), Some(half_width)]);
    element.image_distance = distance;

    let (outgoing, outcome) = run(
        config(DiffractionPlane::Both2D, PropagationType::Both, 15),
        &incoming,
        &element,
    );
    let beams = outcome.beams().unwrap();
    assert_eq!(beams.kernels.len(), 2);
    kernel(&beams.kernels, FieldRegime::FarField, true);
    kernel(&beams.kernels, FieldRegime::NearField, true);

    let far = beams.far_field.as_ref().unwrap();
    let near = beams.near_field.as_ref().unwrap();
    assert_eq!(near.indices(), incoming.indices());
    assert_eq!(near.good_count(), outgoing.good_count());

    let a = 2.0 * half_width;
    for axis in [Axis::X, Axis::Z] {
        let far_fraction =
            central_lobe_fraction(&diffraction_angles_at(far, &outgoing, axis, distance), wavelength(), a);
        let near_fraction =
            central_lobe_fraction(&diffraction_angles_at(near, &outgoing, axis, distance), wavelength(), a);
        assert!(far_fraction > 0.8, "{:?}: far-field central lobe {}", axis, far_fraction);
        assert!(
            (far_fraction - near_fraction).abs() < 0.05,
            "{:?}: far {} vs near {}",
            axis,
            far_fraction,
            near_fraction
        );
    }
}

// ─── Reflective elements ────────────────────────────────────────────────

#[test]
fn test_flat_error_profile_changes_nothing() {
    let incoming = source(20_000, [1e-5, 1e-4], 10);
    let mirror = reflector(ElementKind::Mirror, GRAZING_ANGLE);

    let plain = {
        let c = config_for(
            CalculationType::MirrorOrGratingSize,
            DiffractionPlane::Tangential,
            PropagationType::FarField,
            33,
        );
        run(c, &incoming, &mirror).1
    };

    let flat = with_error(mirror.clone(), linspace(-0.05, 0.05, 101), |_| 0.0);
    let errored = {
        let c = config_for(
            CalculationType::MirrorOrGratingSizeAndErrorProfile,
            DiffractionPlane::Tangential,
            PropagationType::FarField,
            33,
        );
        run(c, &incoming, &flat).1
    };

    let a = plain.beams().unwrap().far_field.as_ref().unwrap();
    let b = errored.beams().unwrap().far_field.as_ref().unwrap();
    for (ra, rb) in a.rays().iter().zip(b.rays()) {
        assert_abs_diff_eq!(ra.position[2], rb.position[2], epsilon = 1e-15);
        assert_abs_diff_eq!(ra.direction[2], rb.direction[2], epsilon = 1e-15);
    }
}

#[test]
fn test_figure_error_broadens_both_regimes() {
    let incoming = source(20_000, [1e-5, 1e-4], 22);
    let mirror = reflector(ElementKind::Mirror, GRAZING_ANGLE);
    // 2 nm amplitude, 5 mm period
    let wavy = with_error(mirror.clone(), linspace(-0.05, 0.05, 1001), |u| {
        2e-9 * (2.0 * PI * u / 5e-3).sin()
    });

    let widths = |calculation: CalculationType, element: &OpticalElement| {
        let c = config_for(calculation, DiffractionPlane::Tangential, PropagationType::Both, 23);
        let (_, outcome) = run(c, &incoming, element);
        let beams = outcome.beams().unwrap();
        [&beams.far_field, &beams.near_field].map(|b| spread(&good_positions(b.as_ref().unwrap(), Axis::Z)))
    };
    let plain = widths(CalculationType::MirrorOrGratingSize, &mirror);
    let errored = widths(CalculationType::MirrorOrGratingSizeAndErrorProfile, &wavy);

    for (regime, (p, e)) in ["far field", "near field"].iter().zip(plain.iter().zip(errored.iter())) {
        assert!(e > &(1.2 * p), "{}: RMS {:.3e} with error vs {:.3e} without", regime, e, p);
    }
}

#[test]
fn test_pitch_deflects_by_twice_the_angle() {
    let pitch = 1e-6;
    let incoming = source(20_000, [1e-5, 1e-4], 24);
    let mirror = reflector(ElementKind::Mirror, GRAZING_ANGLE);
    let mut tilted = mirror.clone();
    tilted.displacement.rotation = [pitch, 0.0, 0.0];

    let centroids = |element: &OpticalElement| {
        let c = config_for(
            CalculationType::MirrorOrGratingSize,
            DiffractionPlane::Tangential,
            PropagationType::Both,
            25,
        );
        let (outgoing, outcome) = run(c, &incoming, element);
        let beams = outcome.beams().unwrap();
        [
            &outgoing,
            beams.far_field.as_ref().unwrap(),
            beams.near_field.as_ref().unwrap(),
        ]
        .map(|b| mean(&good_positions(b, Axis::Z)))
    };
    let level = centroids(&mirror);
    let shifted = centroids(&tilted);

    let expected = 2.0 * pitch * IMAGE_DISTANCE;
    assert_abs_diff_eq!(shifted[0] - level[0], expected, epsilon = 1e-8);
    for (regime, i) in [("far field", 1), ("near field", 2)] {
        let shift = shifted[i] - level[i];
        assert!(
            (shift - expected).abs() < 0.05 * expected,
            "{}: centroid moved {:.3e} m, expected {:.3e} m",
            regime,
            shift,
            expected
        );
    }
}

#[test]
fn test_grating_error_phase_uses_both_angles() {
    // A height ramp of slope s deflects by -(sin(theta_i) + sin(theta_r)) s / sin(theta_i)
    let slope = 1e-6;
    let incoming = source(20_000, [1e-5, 1e-4], 26);
    let ramp = |element: OpticalElement| with_error(element, linspace(-0.05, 0.05, 101), |u| slope * u);
    let mirror = ramp(reflector(ElementKind::Mirror, GRAZING_ANGLE));
    let grating = ramp(reflector(ElementKind::Grating, 2.0 * GRAZING_ANGLE));

    let mean_angle = |element: &OpticalElement| {
        let c = config_for(
            CalculationType::MirrorOrGratingSizeAndErrorProfile,
            DiffractionPlane::Tangential,
            PropagationType::FarField,
            27,
        );
        let calc = calculator(c).with_backend(Arc::new(CpuBackend::with_threads(2)));
        let (outgoing, outcome) = run_calculator(&calc, &incoming, element);
        let outcome = outcome.unwrap();
        let beam = outcome.beams().unwrap().far_field.as_ref().unwrap();
        mean(&diffraction_angles(beam, &outgoing, Axis::Z))
    };

    let mirror_gain = 2.0;
    let grating_gain = 1.0 + (2.0 * GRAZING_ANGLE).sin() / GRAZING_ANGLE.sin();
    assert_relative_eq!(mean_angle(&mirror), -mirror_gain * slope, max_relative = 0.1);
    assert_relative_eq!(mean_angle(&grating), -grating_gain * slope, max_relative = 0.1);
}

// ─── Lens stacks ────────────────────────────────────────────────────────

#[test]
fn test_crl_focal_length_from_material_data() {
    let incoming = source(20_000, [1e-4, 1e-4], 28);
    let crl = beryllium_crl(5e-5);
    let c = config_for(
        CalculationType::CrlSize,
        DiffractionPlane::Tangential,
        PropagationType::Both,
        29,
    );

    let materials = Arc::new(TabulatedMaterials::standard().unwrap());
    let calc = calculator(c.clone()).with_materials(materials.clone());
    let (outgoing, outcome) = run_calculator(&calc, &incoming, &crl);
    let outcome = outcome.unwrap();
    let beams = outcome.beams().unwrap();

    let energy_ev = HC_EV_M / beams.context.wavelength;
    let (delta, _) = materials.refractive_index_decrement("Be", energy_ev).unwrap();
    assert_relative_eq!(
        beams.context.axes[0].context.focal_length,
        CRL_RADIUS / (2.0 * CRL_LENSES as f64 * delta),
        max_relative = 1e-9
    );
    for beam in [beams.far_field.as_ref().unwrap(), beams.near_field.as_ref().unwrap()] {
        assert_eq!(beam.indices(), incoming.indices());
        assert_eq!(beam.good_count(), outgoing.good_count());
    }

    // Without material data the image distance is the focal length
    let (_, outcome) = run(c, &incoming, &crl);
    assert_eq!(outcome.beams().unwrap().context.axes[0].context.focal_length, IMAGE_DISTANCE);
}

#[test]
fn test_crl_thickness_ramp_tilts_the_beam() {
    // A thickness ramp of slope s is a prism deflecting by -delta * s
    let slope = 0.5;
    let incoming = source(20_000, [1e-4, 1e-4], 30);
    let crl = with_error(beryllium_crl(5e-5), linspace(-1e-3, 1e-3, 201), |x| slope * x);
    let c = config_for(
        CalculationType::CrlSizeAndErrorProfile,
        DiffractionPlane::Tangential,
        PropagationType::FarField,
        31,
    );

    let (_, outcome) = run_calculator(&calculator(c.clone()), &incoming, &crl);
    let err = outcome.unwrap_err();
    assert!(matches!(err, HybridError::InvalidConfig(_)), "{}", err);

    let materials = Arc::new(TabulatedMaterials::standard().unwrap());
    let calc = calculator(c).with_materials(materials.clone());
    let (outgoing, outcome) = run_calculator(&calc, &incoming, &crl);
    let outcome = outcome.unwrap();
    let beams = outcome.beams().unwrap();
    let (delta, _) = materials
        .refractive_index_decrement("Be", HC_EV_M / beams.context.wavelength)
        .unwrap();

    let angle = mean(&diffraction_angles(beams.far_field.as_ref().unwrap(), &outgoing, Axis::Z));
    assert_relative_eq!(angle, -delta * slope, max_relative = 0.1);
}

// ─── Configuration ──────────────────────────────────────────────────────

#[test]
fn test_fft_sample_count_reference_case() {
    let cal = Calibration::default();
    let f = far_field_focal_length(20e-6, 1e-10, 10, cal.peak_width_factor);
    assert_eq!(fft_sample_count(20e-6, 1e-10, f, &cal, 1_000_000), 1548);
}

#[test]
fn test_default_calibration() {
    let cal = Calibration::default();
    assert_eq!(cal.cut_fraction_threshold, 0.05);
    assert_eq!(cal.geometry_histogram_bins, 500);
    assert_eq!(cal.figure_error_oversampling, 5.0);
    assert_eq!(cal.rms_slope_image_floor, 16.0);
    assert_eq!(cal.displacement_image_floor, 8.0);
    assert_eq!(cal.fft_size_factor, 100.0);
    assert_eq!(cal.peak_width_factor, 0.88);
}

#[test]
fn test_mirror_calculation_on_slit_is_incongruent() {
    let incoming = source(1_000, [2e-5, 2e-5], 11);
    let element = slit([None, Some(SLIT_HALF_WIDTH)]);
    let tracer = Arc::new(IdealTracer::new());
    let outgoing = tracer.trace(&incoming, &element).unwrap().beam;
    let mut c = HybridConfig::default();
    c.calculation_type = CalculationType::MirrorOrGratingSize;
    let err = HybridCalculator::new(c, tracer)
        .run(&HybridInput {
            incoming: &incoming,
            outgoing: &outgoing,
            element: &element,
        })
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Configuration);
}
