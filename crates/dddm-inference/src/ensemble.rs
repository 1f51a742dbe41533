//! Affine-invariant ensemble MCMC (Goodman & Weare stretch move).
//!
//! Walkers are split in two halves; each half is updated against the other,
//! so the proposals of one half are independent and their log-probabilities
//! are evaluated in parallel via Rayon.

use dddm_core::{Error, LogLikelihood, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::sampler::{EngineFailure, FitProblem, SamplerOutput, SamplingEngine, checked_log_likelihood};
use crate::summary::PosteriorSummary;

/// Ensemble MCMC settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    /// Number of walkers; even and at least twice the dimension.
    pub n_walkers: usize,
    /// Steps per walker.
    pub n_steps: usize,
    /// Leading fraction of steps discarded as burn-in.
    pub burn_in_fraction: f64,
    /// Keep every `thin`-th step after burn-in.
    pub thin: usize,
    /// Stretch scale `a`.
    pub stretch_scale: f64,
    /// Relative Gaussian jitter of the start positions around the benchmark.
    pub jitter: f64,
    /// RNG seed.
    pub seed: u64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self { n_walkers: 50, n_steps: 100, burn_in_fraction: 0.2, thin: 15, stretch_scale: 2.0, jitter: 0.005, seed: 0 }
    }
}

/// Output of an ensemble run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleOutput {
    /// Positions, `[step][walker][dim]`.
    pub chain: Vec<Vec<Vec<f64>>>,
    /// Log-probability (prior + likelihood), `[step][walker]`.
    pub log_prob: Vec<Vec<f64>>,
    /// Accepted fraction per walker.
    pub acceptance_fraction: Vec<f64>,
    /// Burn-in steps dropped by [`EnsembleOutput::flat_samples`].
    pub discard: usize,
    /// Thinning applied by [`EnsembleOutput::flat_samples`].
    pub thin: usize,
}

impl EnsembleOutput {
    /// Post-burn-in, thinned samples of all walkers.
    pub fn flat_samples(&self) -> Vec<Vec<f64>> {
        self.chain.iter().skip(self.discard).step_by(self.thin.max(1)).flatten().cloned().collect()
    }

    /// Mean acceptance fraction over walkers.
    pub fn mean_acceptance(&self) -> f64 {
        if self.acceptance_fraction.is_empty() {
            return 0.0;
        }
        self.acceptance_fraction.iter().sum::<f64>() / self.acceptance_fraction.len() as f64
    }
}

fn log_probability(problem: &FitProblem, likelihood: &dyn LogLikelihood, x: &[f64]) -> Result<f64> {
    let lp = problem.log_prior(x)?;
    if !lp.is_finite() {
        return Ok(f64::NEG_INFINITY);
    }
    Ok(lp + checked_log_likelihood(likelihood, x)?)
}

fn log_probability_batch(
    problem: &FitProblem,
    likelihood: &dyn LogLikelihood,
    points: &[Vec<f64>],
    step: usize,
) -> std::result::Result<Vec<f64>, EngineFailure> {
    points
        .par_iter()
        .map(|x| log_probability(problem, likelihood, x).map_err(|e| (x.clone(), e)))
        .collect::<std::result::Result<Vec<f64>, (Vec<f64>, Error)>>()
        .map_err(|(params, source)| EngineFailure { iteration: step, params, source })
}

/// Stretch-move ensemble engine.
#[derive(Debug, Clone, Default)]
pub struct EnsembleEngine {
    config: EnsembleConfig,
}

impl EnsembleEngine {
    /// Engine with `config`.
    pub fn new(config: EnsembleConfig) -> Self {
        Self { config }
    }

    /// Settings.
    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    fn run(&self, problem: &FitProblem, likelihood: &dyn LogLikelihood) -> std::result::Result<EnsembleOutput, EngineFailure> {
        let cfg = &self.config;
        let d = problem.ndim();
        let w = cfg.n_walkers;
        let half = w / 2;
        let a = cfg.stretch_scale;
        let mut rng = StdRng::seed_from_u64(cfg.seed);

        let mut pos: Vec<Vec<f64>> = (0..w)
            .map(|_| {
                problem
                    .start
                    .iter()
                    .zip(&problem.priors)
                    .map(|(&x0, prior)| {
                        let n: f64 = rng.sample(StandardNormal);
                        prior.clip(x0 + cfg.jitter * x0 * n)
                    })
                    .collect()
            })
            .collect();
        let mut lp = log_probability_batch(problem, likelihood, &pos, 0)?;
        if lp.iter().all(|l| !l.is_finite()) {
            return Err(EngineFailure {
                iteration: 0,
                params: problem.start.clone(),
                source: Error::Numerical("no walker starts with finite log-probability".to_string()),
            });
        }

        let mut accepted = vec![0usize; w];
        let mut chain = Vec::with_capacity(cfg.n_steps);
        let mut log_prob = Vec::with_capacity(cfg.n_steps);

        for step in 0..cfg.n_steps {
            for (active, other) in [(0..half, half..w), (half..w, 0..half)] {
                let proposals: Vec<(usize, Vec<f64>, f64)> = active
                    .map(|k| {
                        let j = rng.random_range(other.clone());
                        let z = ((a - 1.0) * rng.random::<f64>() + 1.0).powi(2) / a;
                        let y = pos[j].iter().zip(&pos[k]).map(|(xj, xk)| xj + z * (xk - xj)).collect();
                        (k, y, z)
                    })
                    .collect();
                let points: Vec<Vec<f64>> = proposals.iter().map(|(_, y, _)| y.clone()).collect();
                let lp_new = log_probability_batch(problem, likelihood, &points, step)?;

                for ((k, y, z), lp_y) in proposals.into_iter().zip(lp_new) {
                    let log_ratio = (d as f64 - 1.0) * z.ln() + lp_y - lp[k];
                    if log_ratio > rng.random::<f64>().ln() {
                        pos[k] = y;
                        lp[k] = lp_y;
                        accepted[k] += 1;
                    }
                }
            }
            chain.push(pos.clone());
            log_prob.push(lp.clone());
            if (step + 1) % 100 == 0 {
                log::debug!("ensemble: step {}/{}", step + 1, cfg.n_steps);
            }
        }

        let acceptance_fraction: Vec<f64> = accepted.iter().map(|&n| n as f64 / cfg.n_steps as f64).collect();
        let discard = (cfg.burn_in_fraction * cfg.n_steps as f64).floor() as usize;
        let out = EnsembleOutput { chain, log_prob, acceptance_fraction, discard, thin: cfg.thin };
        log::info!("ensemble: {} steps x {} walkers, acceptance {:.3}", cfg.n_steps, w, out.mean_acceptance());
        Ok(out)
    }
}

impl SamplingEngine for EnsembleEngine {
    fn name(&self) -> &'static str {
        "ensemble"
    }

    fn population(&self) -> String {
        format!("n_walkers={}", self.config.n_walkers)
    }

    fn validate(&self, problem: &FitProblem) -> Result<()> {
        let cfg = &self.config;
        if cfg.n_walkers % 2 != 0 || cfg.n_walkers < 2 * problem.ndim() || cfg.n_walkers < 2 {
            return Err(Error::Config(format!(
                "n_walkers={} must be even and at least twice the number of parameters ({})",
                cfg.n_walkers,
                problem.ndim()
            )));
        }
        if cfg.n_steps == 0 || cfg.thin == 0 {
            return Err(Error::Config(format!("n_steps and thin must be >= 1, got {} and {}", cfg.n_steps, cfg.thin)));
        }
        if !(0.0..1.0).contains(&cfg.burn_in_fraction) {
            return Err(Error::Config(format!("burn_in_fraction must be in [0, 1), got {}", cfg.burn_in_fraction)));
        }
        if !(cfg.stretch_scale.is_finite() && cfg.stretch_scale > 1.0) {
            return Err(Error::Config(format!("stretch_scale must be > 1, got {}", cfg.stretch_scale)));
        }
        if !(cfg.jitter.is_finite() && cfg.jitter >= 0.0) {
            return Err(Error::Config(format!("jitter must be >= 0, got {}", cfg.jitter)));
        }
        Ok(())
    }

    fn sample(
        &self,
        problem: &FitProblem,
        likelihood: &dyn LogLikelihood,
    ) -> std::result::Result<SamplerOutput, EngineFailure> {
        self.run(problem, likelihood).map(SamplerOutput::Ensemble)
    }

    fn summarize(&self, problem: &FitProblem, output: &SamplerOutput) -> Result<PosteriorSummary> {
        let SamplerOutput::Ensemble(out) = output else {
            return Err(Error::Validation("ensemble engine cannot summarize a nested run".to_string()));
        };
        let samples = out.flat_samples();
        let mut summary = PosteriorSummary::from_samples(self.name(), problem.fit.names(), &samples)?;
        summary.n_iter = Some(out.chain.len());
        summary.acceptance_fraction = Some(out.mean_acceptance());
        Ok(summary)
    }
}
