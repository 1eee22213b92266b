//! Penumbra command-line interface.
//!
//! Run hybrid diffraction jobs from TOML configuration files:
//! ```sh
//! penumbra-cli run job.toml
//! penumbra-cli validate job.toml
//! penumbra-cli materials
//! ```

mod config;
mod runner;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use penumbra_core::HybridOutcome;

#[derive(Parser)]
#[command(name = "penumbra-cli")]
#[command(about = "Penumbra: hybrid ray-tracing diffraction correction")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a hybrid job from a TOML configuration file.
    Run {
        /// Path to the job configuration file.
        config: PathBuf,
        /// Output directory (overrides config file setting).
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Worker threads for the FFTs (default: all cores).
        #[arg(short, long)]
        threads: Option<usize>,
    },
    /// Validate a configuration file without running the job.
    Validate {
        /// Path to the job configuration file.
        config: PathBuf,
    },
    /// Display the built-in X-ray material tables.
    Materials,
}

fn job_dir(config: &Path) -> PathBuf {
    config.parent().map(Path::to_path_buf).unwrap_or_default()
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, output, threads } => {
            println!("Penumbra Hybrid Diffraction");
            println!("===========================");
            let job = config::load_config(&config)?;
            println!("Configuration: {}", config.display());

            let result = runner::run_job(&job, &job_dir(&config), threads)?;
            let out_dir = output.unwrap_or_else(|| PathBuf::from(&job.output.directory));

            match &result.outcome {
                HybridOutcome::Computed(beams) => {
                    if job.output.save_beams {
                        if let Some(beam) = &beams.far_field {
                            runner::write_beam_csv(beam, &out_dir.join("far_field.csv"), "far-field", &result.element)?;
                        }
                        if let Some(beam) = &beams.near_field {
                            runner::write_beam_csv(
                                beam,
                                &out_dir.join("near_field.csv"),
                                "near-field",
                                &result.element,
                            )?;
                        }
                    }
                    if job.output.save_kernels {
                        runner::write_kernels_csv(&beams.kernels, &out_dir)?;
                    }
                }
                HybridOutcome::NotNecessary(beam) | HybridOutcome::Cancelled(beam) => {
                    if job.output.save_beams {
                        runner::write_beam_csv(beam, &out_dir.join("geometric.csv"), "geometric", &result.element)?;
                    }
                }
            }

            if job.output.save_json {
                runner::write_summary_json(&result, &out_dir.join("summary.json"))?;
            }

            println!(
                "Geometric beam: {} good rays, {} lost, total intensity {:.4e}",
                result.outgoing.good_count(),
                result.outgoing.lost_count(),
                result.outgoing.total_intensity()
            );
            println!("Job complete.");
            Ok(())
        }
        Commands::Validate { config } => {
            let job = config::load_config(&config)?;
            let element = job.element.to_element(&job_dir(&config));
            println!("Configuration is valid: {}", config.display());
            println!(
                "  Element '{}' ({:?}), {:?} on {:?}",
                element.name, element.kind, job.hybrid.calculation_type, job.hybrid.diffraction_plane
            );
            Ok(())
        }
        Commands::Materials => runner::list_materials(),
    }
}
