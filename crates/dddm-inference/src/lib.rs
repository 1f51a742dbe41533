//! # dddm-inference
//!
//! Bayesian fits of WIMP parameters to detected recoil spectra.
//!
//! The binned Poisson likelihood compares observed counts with the detector
//! forward model from `dddm-detector`. Samplers only see the
//! [`dddm_core::LogLikelihood`] trait and a prior transform, so the forward
//! model and the backends stay independent.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Persisted run directories: config, summary, samples, weights/chain.
pub mod artifacts;
/// Affine-invariant ensemble MCMC.
pub mod ensemble;
/// Binned Poisson likelihood.
pub mod likelihood;
/// Nested sampling with a bounding ellipsoid.
pub mod nested;
/// Canonical parameters, fit sets and the benchmark point.
pub mod parameters;
/// Flat and truncated-Gaussian priors.
pub mod prior;
/// Sampler adapter and run-state machine.
pub mod sampler;
/// Posterior summary statistics.
pub mod summary;

pub use artifacts::{ConfigRecord, ConfigValue, ResultStore, SavedRun, config_record};
pub use ensemble::{EnsembleConfig, EnsembleEngine, EnsembleOutput};
pub use likelihood::{PREDICTED_FLOOR, RecoilLikelihood, poisson_log_likelihood, poisson_log_likelihood_kernel};
pub use nested::{NestedConfig, NestedEngine, NestedOutput};
pub use parameters::{Benchmark, FitParameterSet, Parameter};
pub use prior::{PriorSet, PriorSpec, log_prior, prior_transform};
pub use sampler::{
    EnsembleSampler, FitProblem, NestedSampler, RunState, Sampler, SamplerAdapter, SamplerKind, SamplerOutput,
    SamplingEngine, build_sampler,
};
pub use summary::PosteriorSummary;
