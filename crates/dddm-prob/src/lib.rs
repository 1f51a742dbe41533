//! Probability building blocks for DDDM.
//!
//! This crate hosts the probability math shared by the detector pipeline and
//! the inference layer:
//! - normal pdf/cdf/quantile, including the truncated-normal quantile used by
//!   Gaussian priors
//! - Poisson log-pmf for binned count likelihoods
//! - small numeric helpers (stable log-sum-exp primitives)

pub mod math;
pub mod normal;
pub mod poisson;
