//! DDDM CLI

use anyhow::Result;
use clap::{Parser, Subcommand};
use dddm_core::RecoilPoint;
use dddm_inference::{EnsembleConfig, NestedConfig, ResultStore};
use std::path::PathBuf;

mod run;

use run::FitRunConfig;

#[derive(Parser)]
#[command(name = "dddm")]
#[command(about = "DDDM - direct-detection dark-matter recoil spectra and WIMP fits")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit WIMP parameters to a benchmark spectrum
    Fit {
        /// Sampler: nested (nestle, multinest) or ensemble (emcee)
        #[arg(long, default_value = "nested")]
        sampler: String,

        /// Benchmark WIMP mass (GeV)
        #[arg(long, default_value = "50")]
        mw: f64,

        /// Benchmark log10 cross-section (cm^2)
        #[arg(long, default_value = "-45", allow_negative_numbers = true)]
        cross_section: f64,

        /// Fit a Poisson draw of the benchmark instead of the Asimov spectrum
        #[arg(long)]
        poisson: bool,

        /// Live points (nested sampling)
        #[arg(long, default_value = "1024")]
        nlive: usize,

        /// Stopping tolerance on the remaining ln Z (nested sampling)
        #[arg(long, default_value = "0.1")]
        tol: f64,

        /// Walkers (ensemble MCMC)
        #[arg(long, default_value = "50")]
        walkers: usize,

        /// Steps per walker (ensemble MCMC)
        #[arg(long, default_value = "100")]
        steps: usize,

        /// Notes stored with the results
        #[arg(long, default_value = "default")]
        notes: String,

        /// Number of energy bins
        #[arg(long, default_value = "10")]
        bins: usize,

        /// Detector name (see `dddm detectors`)
        #[arg(long, default_value = "Xe")]
        target: String,

        /// Number of fitted parameters
        #[arg(long, default_value = "2")]
        nparams: usize,

        /// Named prior table
        #[arg(long, default_value = "Pato_2010")]
        priors_from: String,

        /// RNG seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Save run artifacts under this directory
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Run-directory suffix for parallel runs sharing --out-dir
        #[arg(long, requires = "out_dir")]
        run_hash: Option<String>,

        /// Output file for the summary (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Threads (0 = auto).
        #[arg(long, default_value = "0")]
        threads: usize,
    },

    /// Run a fit described by a YAML/JSON config file
    Run {
        /// Fit config (.yaml/.yml or .json)
        #[arg(long)]
        config: PathBuf,

        /// Output file for the summary (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the detected spectrum for one WIMP point
    Spectrum {
        /// Detector name
        #[arg(long, default_value = "Xe")]
        target: String,

        /// WIMP mass (GeV)
        #[arg(long, default_value = "50")]
        mw: f64,

        /// log10 cross-section (cm^2)
        #[arg(long, default_value = "-45", allow_negative_numbers = true)]
        cross_section: f64,

        /// Number of energy bins
        #[arg(long, default_value = "10")]
        bins: usize,

        /// Lower end of the energy range (keV)
        #[arg(long, default_value = "0")]
        e_min: f64,

        /// Upper end of the energy range (keV)
        #[arg(long, default_value = "100")]
        e_max: f64,

        /// Poisson-resample with this seed
        #[arg(long)]
        poisson_seed: Option<u64>,

        /// Output file (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the detector table
    Detectors {
        /// Output file (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the summary of a saved run
    Load {
        /// Run directory
        #[arg(long)]
        dir: PathBuf,

        /// Output file (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).with_writer(std::io::stderr).with_target(false).init();

    match cli.command {
        Commands::Fit {
            sampler,
            mw,
            cross_section,
            poisson,
            nlive,
            tol,
            walkers,
            steps,
            notes,
            bins,
            target,
            nparams,
            priors_from,
            seed,
            out_dir,
            run_hash,
            output,
            threads,
        } => {
            let cfg = FitRunConfig {
                detector: target,
                sampler,
                wimp_mass: mw,
                log_cross_section: cross_section,
                n_bins: bins,
                n_params: nparams,
                prior_set: priors_from,
                poisson,
                seed,
                notes,
                nested: NestedConfig { nlive, tol, ..NestedConfig::default() },
                ensemble: EnsembleConfig { n_walkers: walkers, n_steps: steps, ..EnsembleConfig::default() },
                out_dir,
                run_hash,
                threads,
                ..FitRunConfig::default()
            };
            cmd_fit(&cfg, output.as_ref())
        }
        Commands::Run { config, output } => cmd_run(&config, output.as_ref()),
        Commands::Spectrum { target, mw, cross_section, bins, e_min, e_max, poisson_seed, output } => {
            cmd_spectrum(&target, mw, cross_section, bins, e_min, e_max, poisson_seed, output.as_ref())
        }
        Commands::Detectors { output } => cmd_detectors(output.as_ref()),
        Commands::Load { dir, output } => cmd_load(&dir, output.as_ref()),
        Commands::Version => {
            println!("dddm {}", dddm_core::VERSION);
            Ok(())
        }
    }
}

fn cmd_fit(cfg: &FitRunConfig, output: Option<&PathBuf>) -> Result<()> {
    let outcome = run::run_fit(cfg)?;
    write_json(output, serde_json::to_value(&outcome)?)
}

fn cmd_run(config: &PathBuf, output: Option<&PathBuf>) -> Result<()> {
    tracing::info!(path = %config.display(), "loading fit config");
    let cfg = run::read_run_config(config)?;
    cmd_fit(&cfg, output)
}

#[allow(clippy::too_many_arguments)]
fn cmd_spectrum(
    target: &str,
    mw: f64,
    cross_section: f64,
    bins: usize,
    e_min: f64,
    e_max: f64,
    poisson_seed: Option<u64>,
    output: Option<&PathBuf>,
) -> Result<()> {
    let spectrum = run::forward_model(target, e_min, e_max, bins)?;
    let point = RecoilPoint::new(mw, 10f64.powf(cross_section));
    let result = match poisson_seed {
        Some(seed) => spectrum.simulate(&point, seed)?,
        None => spectrum.compute(&point)?,
    };
    tracing::info!(detector = target, total = result.total(), "spectrum computed");

    let output_json = serde_json::json!({
        "detector": target,
        "wimp_mass": mw,
        "log_cross_section": cross_section,
        "poisson_seed": poisson_seed,
        "bin_edges": result.binning.edges(),
        "bin_centers": result.centers(),
        "counts": result.counts,
        "total": result.total(),
    });
    write_json(output, output_json)
}

fn cmd_detectors(output: Option<&PathBuf>) -> Result<()> {
    let registry = dddm_detector::registry()?;
    let detectors: Vec<_> = registry.iter().collect();
    write_json(output, serde_json::json!({ "detectors": detectors }))
}

fn cmd_load(dir: &PathBuf, output: Option<&PathBuf>) -> Result<()> {
    let saved = ResultStore::load_run(dir)?;
    tracing::info!(dir = %dir.display(), samples = saved.samples.len(), "run loaded");
    write_json(
        output,
        serde_json::json!({
            "dir": saved.dir,
            "config": saved.config,
            "summary": saved.summary,
            "n_samples": saved.samples.len(),
        }),
    )
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
