//! Job runner: synthetic source, ideal tracer and hybrid correction.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use penumbra_compute::CpuBackend;
use penumbra_core::hybrid::{DiffractionKernel, FieldRegime, KernelData};
use penumbra_core::tracer::ideal::IdealTracer;
use penumbra_core::{
    Axis, ElementKind, HybridCalculator, HybridInput, HybridOutcome, OpticalElement, RayEnsemble, RayTracer,
};
use penumbra_surface::ScalarField1D;
use penumbra_materials::{MaterialLookup, TabulatedMaterials};

use crate::config::JobConfig;

/// Results from a job run.
pub struct JobOutput {
    pub element: OpticalElement,
    /// Beam traced through the element without diffraction.
    pub outgoing: RayEnsemble,
    pub outcome: HybridOutcome,
}

/// Run a full job from a parsed configuration. Relative paths in the job
/// resolve against `base_dir`. `threads` sizes a dedicated FFT pool.
pub fn run_job(job: &JobConfig, base_dir: &Path, threads: Option<usize>) -> Result<JobOutput> {
    let incoming = job.source.generate().context("Cannot generate the source beam")?;
    println!(
        "  Source: {} rays, {:.1} eV ({:.4e} m)",
        incoming.len(),
        job.source.energy_ev,
        job.source.wavelength()
    );

    let element = job.element.to_element(base_dir);
    let tracer = Arc::new(IdealTracer::new());
    let outgoing = tracer
        .trace(&incoming, &element)
        .with_context(|| format!("Cannot trace element '{}'", element.name))?
        .beam;
    println!(
        "  Element '{}': {} of {} rays transmitted",
        element.name,
        outgoing.good_count(),
        outgoing.len()
    );

    let mut calculator = HybridCalculator::new(job.hybrid.clone(), tracer);
    if let Some(n) = threads {
        calculator = calculator.with_backend(Arc::new(CpuBackend::with_threads(n)));
    }
    if matches!(element.kind, ElementKind::Crl { .. }) {
        let materials = TabulatedMaterials::standard().context("Cannot load material tables")?;
        calculator = calculator.with_materials(Arc::new(materials));
    }

    let outcome = calculator
        .run(&HybridInput {
            incoming: &incoming,
            outgoing: &outgoing,
            element: &element,
        })
        .map_err(|e| anyhow::anyhow!("Hybrid calculation failed ({:?} error): {}", e.class(), e))?;

    match &outcome {
        HybridOutcome::Computed(beams) => {
            for axis in &beams.context.axes {
                println!(
                    "  {:?}: extent {:.4e} m, focal length {:.4e} m, distance {:.4e} m",
                    axis.context.axis,
                    axis.context.extent(),
                    axis.context.focal_length,
                    axis.context.distance
                );
            }
            println!("  {} diffraction kernel(s) computed", beams.kernels.len());
        }
        HybridOutcome::NotNecessary(_) => {
            println!("  Beam is not cut by the element; no diffraction correction applied");
        }
        HybridOutcome::Cancelled(_) => println!("  Calculation cancelled"),
    }

    Ok(JobOutput {
        element,
        outgoing,
        outcome,
    })
}

fn create_file(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::File::create(path).with_context(|| format!("Cannot create {}", path.display()))
}

/// Write a beam to CSV, one ray per row in the 18-column layout.
pub fn write_beam_csv(beam: &RayEnsemble, path: &Path, label: &str, element: &OpticalElement) -> Result<()> {
    let mut file = create_file(path)?;

    writeln!(file, "# Penumbra hybrid diffraction: {} beam", label)?;
    writeln!(file, "# Version: {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(file, "# element '{}': {:?}", element.name, element.kind)?;
    writeln!(file, "# rays: {} ({} good)", beam.len(), beam.good_count())?;
    writeln!(file, "#")?;
    writeln!(
        file,
        "x,y,z,vx,vy,vz,es_x,es_y,es_z,flag,k,index,path,phase_s,phase_p,ep_x,ep_y,ep_z"
    )?;

    for ray in beam.rays() {
        let row = ray.to_row();
        let line: Vec<String> = row.iter().map(|v| format!("{:.10e}", v)).collect();
        writeln!(file, "{}", line.join(","))?;
    }

    println!("{} beam written to: {}", label, path.display());
    Ok(())
}

fn regime_name(regime: FieldRegime) -> &'static str {
    match regime {
        FieldRegime::FarField => "far_field",
        FieldRegime::NearField => "near_field",
    }
}

fn axis_name(axis: Axis) -> String {
    format!("{:?}", axis).to_lowercase()
}

fn kernel_file_name(kernel: &DiffractionKernel) -> String {
    let regime = regime_name(kernel.regime);
    match kernel.axis() {
        Some(axis) => format!("kernel_{}_{}.csv", regime, axis_name(axis)),
        None => format!("kernel_{}_2d.csv", regime),
    }
}

fn write_profile(file: &mut std::fs::File, profile: &ScalarField1D) -> Result<()> {
    writeln!(file, "coordinate,intensity")?;
    for (x, i) in profile.abscissas().iter().zip(profile.values()) {
        writeln!(file, "{:.10e},{:.6e}", x, i)?;
    }
    Ok(())
}

/// Write the per-axis marginals of a joint kernel next to it.
fn write_marginals_csv(kernel: &DiffractionKernel, dir: &Path) -> Result<()> {
    for axis in [Axis::X, Axis::Z] {
        let Some(marginal) = kernel.profile(axis)? else {
            continue;
        };
        let path = dir.join(format!(
            "kernel_{}_2d_marginal_{}.csv",
            regime_name(kernel.regime),
            axis_name(axis)
        ));
        let mut file = create_file(&path)?;
        writeln!(file, "# Penumbra hybrid diffraction: {:?} kernel, {:?} marginal", kernel.regime, axis)?;
        writeln!(file, "#")?;
        write_profile(&mut file, &marginal)?;
    }
    Ok(())
}

/// Write every diffraction kernel to its own CSV file in `dir`.
pub fn write_kernels_csv(kernels: &[DiffractionKernel], dir: &Path) -> Result<()> {
    for kernel in kernels {
        let path = dir.join(kernel_file_name(kernel));
        let mut file = create_file(&path)?;
        let unit = match kernel.regime {
            FieldRegime::FarField => "rad",
            FieldRegime::NearField => "m",
        };
        writeln!(file, "# Penumbra hybrid diffraction: {:?} kernel", kernel.regime)?;
        writeln!(file, "# abscissas in {}", unit)?;
        writeln!(file, "#")?;

        match &kernel.data {
            KernelData::Axis { intensity, .. } => write_profile(&mut file, intensity)?,
            KernelData::Joint { intensity } => {
                writeln!(file, "x,z,intensity")?;
                for ((i, j), v) in intensity.values().indexed_iter() {
                    writeln!(file, "{:.10e},{:.10e},{:.6e}", intensity.x()[i], intensity.y()[j], v)?;
                }
                write_marginals_csv(kernel, dir)?;
            }
        }
        println!("Kernel written to: {}", path.display());
    }
    Ok(())
}

/// Write the outcome and calculation context to a JSON file.
pub fn write_summary_json(output: &JobOutput, path: &Path) -> Result<()> {
    let summary = match &output.outcome {
        HybridOutcome::Computed(beams) => serde_json::json!({
            "element": output.element.name,
            "outcome": "computed",
            "context": beams.context,
            "far_field_good_rays": beams.far_field.as_ref().map(|b| b.good_count()),
            "near_field_good_rays": beams.near_field.as_ref().map(|b| b.good_count()),
        }),
        HybridOutcome::NotNecessary(_) => serde_json::json!({
            "element": output.element.name,
            "outcome": "not_necessary",
        }),
        HybridOutcome::Cancelled(_) => serde_json::json!({
            "element": output.element.name,
            "outcome": "cancelled",
        }),
    };
    let json = serde_json::to_string_pretty(&summary).context("JSON serialisation error")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, json)?;

    println!("Summary written to: {}", path.display());
    Ok(())
}

/// Print the built-in X-ray material tables.
pub fn list_materials() -> Result<()> {
    let materials = TabulatedMaterials::standard().context("Cannot load material tables")?;
    println!("Available materials ({}):", materials.name());
    println!();
    for formula in materials.formulas() {
        let (lo, hi) = materials.energy_range(&formula)?;
        let delta = materials
            .refractive_index_decrement(&formula, 10_000.0)
            .map(|(d, _)| format!("{:.3e}", d))
            .unwrap_or_else(|_| "n/a".into());
        println!("  {:<4} {:>8.0}-{:<8.0} eV   delta(10 keV) = {}", formula, lo, hi, delta);
    }
    Ok(())
}
