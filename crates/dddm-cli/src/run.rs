//! `dddm fit` / `dddm run` orchestration.

use anyhow::Result;
use dddm_detector::{DetectorSpectrum, EnergyBinning, StandardHaloModel};
use dddm_inference::{
    Benchmark, EnsembleConfig, FitParameterSet, NestedConfig, PosteriorSummary, PriorSet, RecoilLikelihood,
    ResultStore, SamplerKind, build_sampler, config_record,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One fit: detector, benchmark, data, priors and sampler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitRunConfig {
    /// Registry name of the detector.
    #[serde(default = "default_detector")]
    pub detector: String,
    /// `nested` (aliases `nestle`, `multinest`) or `ensemble` (alias `emcee`).
    #[serde(default = "default_sampler")]
    pub sampler: String,
    /// Benchmark WIMP mass, GeV.
    #[serde(default = "default_wimp_mass")]
    pub wimp_mass: f64,
    /// Benchmark `log10(σ / cm²)`.
    #[serde(default = "default_log_cross_section")]
    pub log_cross_section: f64,
    /// Number of energy bins.
    #[serde(default = "default_n_bins")]
    pub n_bins: usize,
    /// Lower end of the energy range, keV.
    #[serde(default)]
    pub e_min: f64,
    /// Upper end of the energy range, keV.
    #[serde(default = "default_e_max")]
    pub e_max: f64,
    /// Number of fitted parameters (a prefix of the canonical list).
    #[serde(default = "default_n_params")]
    pub n_params: usize,
    /// Named prior table.
    #[serde(default = "default_prior_set")]
    pub prior_set: String,
    /// Explicit priors; replaces `prior_set` when given.
    #[serde(default)]
    pub priors: Option<PriorSet>,
    /// Fit a Poisson draw instead of the Asimov spectrum.
    #[serde(default)]
    pub poisson: bool,
    /// Seed for the Poisson draw and the sampler.
    #[serde(default)]
    pub seed: u64,
    /// Free-form notes stored with the results.
    #[serde(default = "default_notes")]
    pub notes: String,
    /// Nested sampling settings.
    #[serde(default)]
    pub nested: NestedConfig,
    /// Ensemble MCMC settings.
    #[serde(default)]
    pub ensemble: EnsembleConfig,
    /// Save results under this directory.
    #[serde(default)]
    pub out_dir: Option<PathBuf>,
    /// Run-directory suffix for parallel runs sharing `out_dir`.
    #[serde(default)]
    pub run_hash: Option<String>,
    /// Threads (0 = auto).
    #[serde(default)]
    pub threads: usize,
}

fn default_detector() -> String {
    "Xe".to_string()
}

fn default_sampler() -> String {
    "nested".to_string()
}

fn default_wimp_mass() -> f64 {
    50.0
}

fn default_log_cross_section() -> f64 {
    -45.0
}

fn default_n_bins() -> usize {
    10
}

fn default_e_max() -> f64 {
    100.0
}

fn default_n_params() -> usize {
    2
}

fn default_prior_set() -> String {
    "Pato_2010".to_string()
}

fn default_notes() -> String {
    "default".to_string()
}

impl Default for FitRunConfig {
    fn default() -> Self {
        Self {
            detector: default_detector(),
            sampler: default_sampler(),
            wimp_mass: default_wimp_mass(),
            log_cross_section: default_log_cross_section(),
            n_bins: default_n_bins(),
            e_min: 0.0,
            e_max: default_e_max(),
            n_params: default_n_params(),
            prior_set: default_prior_set(),
            priors: None,
            poisson: false,
            seed: 0,
            notes: default_notes(),
            nested: NestedConfig::default(),
            ensemble: EnsembleConfig::default(),
            out_dir: None,
            run_hash: None,
            threads: 0,
        }
    }
}

pub fn read_run_config(path: &Path) -> Result<FitRunConfig> {
    let bytes = std::fs::read(path)?;
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("").to_ascii_lowercase();
    let cfg: FitRunConfig = if ext == "json" {
        serde_json::from_slice(&bytes)?
    } else {
        // Default: YAML (serde_yaml_ng).
        serde_yaml_ng::from_slice(&bytes)?
    };
    Ok(cfg)
}

#[derive(Debug, Clone, Serialize)]
pub struct FitOutcome {
    pub summary: PosteriorSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_in: Option<PathBuf>,
}

pub fn forward_model(detector: &str, e_min: f64, e_max: f64, n_bins: usize) -> Result<DetectorSpectrum> {
    let det = dddm_detector::detector(detector)?.clone();
    let model = StandardHaloModel::for_material(det.material());
    let binning = EnergyBinning::new(e_min, e_max, n_bins)?;
    Ok(DetectorSpectrum::new(Arc::new(model), det, binning))
}

pub fn run_fit(cfg: &FitRunConfig) -> Result<FitOutcome> {
    if cfg.threads > 0 {
        // Best-effort; if a global pool already exists, keep going.
        let _ = rayon::ThreadPoolBuilder::new().num_threads(cfg.threads).build_global();
    }

    // Configuration errors surface here, before any likelihood evaluation.
    let kind: SamplerKind = cfg.sampler.parse()?;
    let fit = FitParameterSet::first(cfg.n_params)?;
    let benchmark = Benchmark::new(cfg.wimp_mass, cfg.log_cross_section)?;
    let priors = match &cfg.priors {
        Some(p) => p.clone(),
        None => PriorSet::from_name(&cfg.prior_set, &benchmark)?,
    };

    let spectrum = forward_model(&cfg.detector, cfg.e_min, cfg.e_max, cfg.n_bins)?;
    tracing::info!(
        detector = %cfg.detector,
        bins = cfg.n_bins,
        e_min = cfg.e_min,
        e_max = cfg.e_max,
        "forward model ready"
    );

    let likelihood = if cfg.poisson {
        RecoilLikelihood::from_benchmark_poisson(spectrum, fit.clone(), benchmark, cfg.seed)?
    } else {
        RecoilLikelihood::from_benchmark(spectrum, fit.clone(), benchmark)?
    };
    tracing::info!(
        observed = likelihood.observed().iter().sum::<f64>(),
        poisson = cfg.poisson,
        "benchmark data generated"
    );

    let nested = NestedConfig { seed: cfg.seed, ..cfg.nested.clone() };
    let ensemble = EnsembleConfig { seed: cfg.seed, ..cfg.ensemble.clone() };
    let mut sampler = build_sampler(kind, nested, ensemble, benchmark);
    sampler.configure(&priors, &fit)?;

    tracing::info!(sampler = %kind, params = ?fit.names(), "starting fit");
    let output = sampler.run(&likelihood)?.clone();
    let mut summary = sampler.summarize()?;
    tracing::info!(sampler = %kind, seconds = summary.fit_time_s, n_posterior = summary.n_posterior, "fit complete");

    let mut saved_in = None;
    if let Some(out_dir) = &cfg.out_dir {
        let store = ResultStore::new(out_dir);
        let dir = store.open_save_dir(&kind.to_string(), cfg.run_hash.as_deref())?;
        let saved = store.save(&dir, &config_record(cfg)?, &summary, &output)?;
        tracing::info!(dir = %dir.display(), "results saved");
        summary = saved.summary;
        saved_in = Some(dir);
    }

    Ok(FitOutcome { summary, saved_in })
}
