//! Error types for DDDM

use std::path::PathBuf;

use thiserror::Error;

/// DDDM error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An input violated a documented contract (degenerate bins, length mismatch, ...).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Fatal configuration error (unknown prior type, non-prefix fit set, ...).
    ///
    /// Raised before any sampler invocation and never retried.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The log-likelihood evaluated to NaN or an infinity.
    #[error("non-finite log-likelihood ({value}) at parameters {params:?}")]
    NonFiniteLikelihood {
        /// Physical parameter vector that produced the value.
        params: Vec<f64>,
        /// The offending value.
        value: f64,
    },

    /// Other fatal numerical failure.
    #[error("Numerical error: {0}")]
    Numerical(String),

    /// A sampling run failed; carries the fit configuration it was running with.
    #[error(
        "{sampler} failed at iteration {iteration} (n_params={n_params}, {population}, last params={params:?}): {source}"
    )]
    Sampler {
        /// Sampler backend name.
        sampler: String,
        /// Number of fitted parameters.
        n_params: usize,
        /// Population description, e.g. `nlive=1024` or `n_walkers=50`.
        population: String,
        /// Iteration (nested) or step (MCMC) at which the run failed.
        iteration: usize,
        /// Last parameter vector handed to the likelihood.
        params: Vec<f64>,
        /// Underlying error.
        #[source]
        source: Box<Error>,
    },

    /// A persisted run directory or artifact does not exist.
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Not implemented
    #[error("Not implemented: {0}")]
    NotImplemented(String),
}

impl Error {
    /// `true` for errors raised by configuration checks.
    pub fn is_config(&self) -> bool {
        match self {
            Error::Config(_) => true,
            Error::Sampler { source, .. } => source.is_config(),
            _ => false,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
