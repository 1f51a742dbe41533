//! Sampler adapter: run-state machine around a pluggable sampling engine.
//!
//! ```text
//! not_configured --configure--> configured --run--> running --> completed
//!                                                         \--> failed
//! ```
//!
//! A second `run()` on a completed sampler returns the cached output. A
//! failed sampler refuses to run again until [`Sampler::reset`] is called.

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use dddm_core::{Error, LogLikelihood, Result};
use serde::{Deserialize, Serialize};

use crate::ensemble::{EnsembleConfig, EnsembleEngine, EnsembleOutput};
use crate::nested::{NestedConfig, NestedEngine, NestedOutput};
use crate::parameters::{Benchmark, FitParameterSet};
use crate::prior::{self, PriorSet, PriorSpec};
use crate::summary::PosteriorSummary;

/// Everything an engine needs about the fit: parameters, their priors and
/// the starting point.
#[derive(Debug, Clone, PartialEq)]
pub struct FitProblem {
    /// Fitted parameters.
    pub fit: FitParameterSet,
    /// Prior per fitted parameter, in fit order.
    pub priors: Vec<PriorSpec>,
    /// Benchmark values of the fitted parameters.
    pub start: Vec<f64>,
}

impl FitProblem {
    /// Dimension.
    pub fn ndim(&self) -> usize {
        self.fit.len()
    }

    /// Unit cube → physical.
    pub fn transform(&self, cube: &[f64]) -> Result<Vec<f64>> {
        prior::prior_transform(&self.priors, cube)
    }

    /// Joint log-prior.
    pub fn log_prior(&self, x: &[f64]) -> Result<f64> {
        prior::log_prior(&self.priors, x)
    }
}

/// Evaluate `ln L`, rejecting NaN and infinities.
pub(crate) fn checked_log_likelihood(likelihood: &dyn LogLikelihood, params: &[f64]) -> Result<f64> {
    let value = likelihood.log_likelihood(params)?;
    if !value.is_finite() {
        return Err(Error::NonFiniteLikelihood { params: params.to_vec(), value });
    }
    Ok(value)
}

/// Where and why an engine stopped.
#[derive(Debug)]
pub struct EngineFailure {
    /// Iteration (nested) or step (MCMC).
    pub iteration: usize,
    /// Parameter vector being evaluated.
    pub params: Vec<f64>,
    /// Cause.
    pub source: Error,
}

/// Raw output of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SamplerOutput {
    /// Weighted samples and evidence.
    Nested(NestedOutput),
    /// Walker chains.
    Ensemble(EnsembleOutput),
}

/// Record of a failed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Iteration at failure.
    pub iteration: usize,
    /// Parameter vector at failure.
    pub params: Vec<f64>,
    /// Error message.
    pub message: String,
}

/// Lifecycle of a sampler.
#[derive(Debug, Clone, PartialEq)]
pub enum RunState {
    /// No priors / fit parameters yet.
    NotConfigured,
    /// Ready to run.
    Configured,
    /// Inside `run()`.
    Running,
    /// Finished; the output is kept for summaries.
    Completed {
        /// Engine output.
        output: SamplerOutput,
        /// Wall-clock duration, seconds.
        fit_time_s: f64,
    },
    /// Aborted.
    Failed(FailureRecord),
}

impl RunState {
    /// Short state name.
    pub fn name(&self) -> &'static str {
        match self {
            RunState::NotConfigured => "not_configured",
            RunState::Configured => "configured",
            RunState::Running => "running",
            RunState::Completed { .. } => "completed",
            RunState::Failed(_) => "failed",
        }
    }

    /// Output of a completed run.
    pub fn output(&self) -> Option<&SamplerOutput> {
        match self {
            RunState::Completed { output, .. } => Some(output),
            _ => None,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A sampling backend. Engines are stateless between runs.
pub trait SamplingEngine: Send + Sync {
    /// Backend name.
    fn name(&self) -> &'static str;

    /// Population description for error context (`nlive=...`, `n_walkers=...`).
    fn population(&self) -> String;

    /// Reject settings that cannot work for `problem`.
    fn validate(&self, problem: &FitProblem) -> Result<()>;

    /// Run to completion.
    fn sample(
        &self,
        problem: &FitProblem,
        likelihood: &dyn LogLikelihood,
    ) -> std::result::Result<SamplerOutput, EngineFailure>;

    /// Posterior statistics of an output produced by this engine.
    fn summarize(&self, problem: &FitProblem, output: &SamplerOutput) -> Result<PosteriorSummary>;
}

/// Uniform `{configure, run, summarize}` interface over sampling backends.
pub trait Sampler: Send {
    /// Backend name.
    fn name(&self) -> &str;

    /// Validate and store priors and fit parameters.
    fn configure(&mut self, priors: &PriorSet, fit: &FitParameterSet) -> Result<()>;

    /// Run (or return the cached output of a completed run).
    fn run(&mut self, likelihood: &dyn LogLikelihood) -> Result<&SamplerOutput>;

    /// Posterior summary of the completed run.
    fn summarize(&self) -> Result<PosteriorSummary>;

    /// Current state.
    fn state(&self) -> &RunState;

    /// Drop any run output; keeps the configuration.
    fn reset(&mut self);

    /// The configured problem, if any.
    fn problem(&self) -> Option<&FitProblem>;
}

/// State machine shared by all backends.
#[derive(Debug, Clone)]
pub struct SamplerAdapter<E> {
    engine: E,
    benchmark: Benchmark,
    problem: Option<FitProblem>,
    state: RunState,
}

/// Nested sampling adapter.
pub type NestedSampler = SamplerAdapter<NestedEngine>;
/// Ensemble MCMC adapter.
pub type EnsembleSampler = SamplerAdapter<EnsembleEngine>;

impl<E: SamplingEngine> SamplerAdapter<E> {
    /// Wrap an engine; the start point defaults to [`Benchmark::default`].
    pub fn new(engine: E) -> Self {
        Self { engine, benchmark: Benchmark::default(), problem: None, state: RunState::NotConfigured }
    }

    /// Use `benchmark` for starting values.
    pub fn with_benchmark(mut self, benchmark: Benchmark) -> Self {
        self.benchmark = benchmark;
        self
    }

    /// The engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    fn wrap(&self, n_params: usize, failure: EngineFailure) -> Error {
        Error::Sampler {
            sampler: self.engine.name().to_string(),
            n_params,
            population: self.engine.population(),
            iteration: failure.iteration,
            params: failure.params,
            source: Box::new(failure.source),
        }
    }
}

impl NestedSampler {
    /// Nested sampler with `config`.
    pub fn nested(config: NestedConfig) -> Self {
        Self::new(NestedEngine::new(config))
    }
}

impl EnsembleSampler {
    /// Ensemble sampler with `config`.
    pub fn ensemble(config: EnsembleConfig) -> Self {
        Self::new(EnsembleEngine::new(config))
    }
}

impl<E: SamplingEngine> Sampler for SamplerAdapter<E> {
    fn name(&self) -> &str {
        self.engine.name()
    }

    fn configure(&mut self, priors: &PriorSet, fit: &FitParameterSet) -> Result<()> {
        match self.state {
            RunState::NotConfigured | RunState::Configured => {}
            _ => {
                return Err(Error::Config(format!(
                    "cannot configure a {} sampler in state '{}'; call reset() first",
                    self.engine.name(),
                    self.state
                )));
            }
        }
        // Re-check the prefix rule on the raw list.
        let fit = FitParameterSet::new(fit.as_slice().to_vec())?;
        let problem = FitProblem { priors: priors.for_fit(&fit)?, start: self.benchmark.values(&fit), fit };
        self.engine.validate(&problem)?;
        log::debug!(
            "{}: configured for {:?} ({})",
            self.engine.name(),
            problem.fit.names(),
            self.engine.population()
        );
        self.problem = Some(problem);
        self.state = RunState::Configured;
        Ok(())
    }

    fn run(&mut self, likelihood: &dyn LogLikelihood) -> Result<&SamplerOutput> {
        match &self.state {
            RunState::Configured => {}
            RunState::Completed { .. } => {
                log::info!("{}: already completed, returning cached output", self.engine.name());
            }
            RunState::NotConfigured => {
                return Err(Error::Config(format!("{} sampler is not configured", self.engine.name())));
            }
            RunState::Running | RunState::Failed(_) => {
                return Err(Error::Config(format!(
                    "{} sampler is in state '{}'; call reset() before running again",
                    self.engine.name(),
                    self.state
                )));
            }
        }

        if !matches!(self.state, RunState::Completed { .. }) {
            let Some(problem) = self.problem.as_ref() else {
                return Err(Error::Config(format!("{} sampler is not configured", self.engine.name())));
            };
            if likelihood.n_parameters() != problem.ndim() {
                return Err(Error::Config(format!(
                    "likelihood has {} parameters {:?}, sampler is configured for {} {:?}",
                    likelihood.n_parameters(),
                    likelihood.parameter_names(),
                    problem.ndim(),
                    problem.fit.names()
                )));
            }

            self.state = RunState::Running;
            log::info!(
                "{}: starting run over {:?} ({})",
                self.engine.name(),
                problem.fit.names(),
                self.engine.population()
            );
            let t0 = Instant::now();
            let result = self.engine.sample(problem, likelihood);
            let fit_time_s = t0.elapsed().as_secs_f64();
            let n_params = problem.ndim();

            match result {
                Ok(output) => {
                    log::info!("{}: completed in {:.2}s", self.engine.name(), fit_time_s);
                    self.state = RunState::Completed { output, fit_time_s };
                }
                Err(failure) => {
                    let err = self.wrap(n_params, failure);
                    log::warn!("{}", err);
                    let (iteration, params) = match &err {
                        Error::Sampler { iteration, params, .. } => (*iteration, params.clone()),
                        _ => (0, Vec::new()),
                    };
                    self.state = RunState::Failed(FailureRecord { iteration, params, message: err.to_string() });
                    return Err(err);
                }
            }
        }

        self.state.output().ok_or_else(|| Error::Numerical("completed run has no output".to_string()))
    }

    fn summarize(&self) -> Result<PosteriorSummary> {
        let (RunState::Completed { output, fit_time_s }, Some(problem)) = (&self.state, self.problem.as_ref())
        else {
            return Err(Error::Config(format!(
                "no completed {} run to summarize (state '{}')",
                self.engine.name(),
                self.state
            )));
        };
        let mut summary = self.engine.summarize(problem, output)?;
        summary.fit_time_s = *fit_time_s;
        Ok(summary)
    }

    fn state(&self) -> &RunState {
        &self.state
    }

    fn reset(&mut self) {
        self.state = if self.problem.is_some() { RunState::Configured } else { RunState::NotConfigured };
    }

    fn problem(&self) -> Option<&FitProblem> {
        self.problem.as_ref()
    }
}

/// Available backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplerKind {
    /// Nested sampling.
    Nested,
    /// Affine-invariant ensemble MCMC.
    Ensemble,
}

impl FromStr for SamplerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "nested" | "nestle" | "multinest" => Ok(SamplerKind::Nested),
            "ensemble" | "emcee" => Ok(SamplerKind::Ensemble),
            other => Err(Error::Config(format!("unknown sampler '{}' (expected 'nested' or 'ensemble')", other))),
        }
    }
}

impl fmt::Display for SamplerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SamplerKind::Nested => "nested",
            SamplerKind::Ensemble => "ensemble",
        })
    }
}

/// Build a boxed sampler for `kind`.
pub fn build_sampler(
    kind: SamplerKind,
    nested: NestedConfig,
    ensemble: EnsembleConfig,
    benchmark: Benchmark,
) -> Box<dyn Sampler> {
    match kind {
        SamplerKind::Nested => Box::new(NestedSampler::nested(nested).with_benchmark(benchmark)),
        SamplerKind::Ensemble => Box::new(EnsembleSampler::ensemble(ensemble).with_benchmark(benchmark)),
    }
}
