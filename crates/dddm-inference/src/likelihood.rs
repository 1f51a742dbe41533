//! Binned Poisson likelihood of observed counts against the detector forward model.

use dddm_core::{Error, LogLikelihood, Result};
use dddm_detector::{DetectorSpectrum, toys};
use dddm_prob::poisson;

use crate::parameters::{Benchmark, FitParameterSet};

/// Predicted counts below this are replaced by it before taking the log.
pub const PREDICTED_FLOOR: f64 = 1e-300;

fn check_inputs(observed: &[f64], predicted: &[f64]) -> Result<()> {
    if observed.len() != predicted.len() {
        return Err(Error::Validation(format!(
            "observed has {} bins, predicted has {}",
            observed.len(),
            predicted.len()
        )));
    }
    if let Some(k) = observed.iter().find(|k| !k.is_finite() || **k < 0.0) {
        return Err(Error::Validation(format!("observed counts must be finite and >= 0, got {}", k)));
    }
    if let Some(mu) = predicted.iter().find(|mu| !mu.is_finite()) {
        return Err(Error::Numerical(format!("non-finite predicted count {}", mu)));
    }
    Ok(())
}

/// `Σ_i k_i ln μ_i − μ_i`, without the constant `ln k_i!` term.
///
/// `μ_i` is floored at [`PREDICTED_FLOOR`].
pub fn poisson_log_likelihood_kernel(observed: &[f64], predicted: &[f64]) -> Result<f64> {
    check_inputs(observed, predicted)?;
    Ok(observed.iter().zip(predicted).map(|(&k, &mu)| poisson::logpmf_kernel(k, mu.max(PREDICTED_FLOOR))).sum())
}

/// Full binned Poisson log-likelihood `Σ_i k_i ln μ_i − μ_i − ln k_i!`.
///
/// `μ_i` is floored at [`PREDICTED_FLOOR`], so a bin with `μ = 0` and `k > 0`
/// gives a very negative but finite value.
pub fn poisson_log_likelihood(observed: &[f64], predicted: &[f64]) -> Result<f64> {
    check_inputs(observed, predicted)?;
    Ok(observed
        .iter()
        .zip(predicted)
        .map(|(&k, &mu)| poisson::logpmf_kernel(k, mu.max(PREDICTED_FLOOR)) - poisson::ln_factorial(k))
        .sum())
}

/// Log-likelihood of fixed observed counts under the detector forward model.
///
/// The parameter vector is in fit order; unfitted parameters are held at the
/// benchmark.
#[derive(Debug, Clone)]
pub struct RecoilLikelihood {
    spectrum: DetectorSpectrum,
    observed: Vec<f64>,
    fit: FitParameterSet,
    benchmark: Benchmark,
}

impl RecoilLikelihood {
    /// Likelihood against explicit observed counts.
    pub fn new(
        spectrum: DetectorSpectrum,
        observed: Vec<f64>,
        fit: FitParameterSet,
        benchmark: Benchmark,
    ) -> Result<Self> {
        if observed.len() != spectrum.binning().n_bins {
            return Err(Error::Validation(format!(
                "observed has {} bins, binning has {}",
                observed.len(),
                spectrum.binning().n_bins
            )));
        }
        if fit.fits_halo() && spectrum.model().fiducial_halo().is_none() {
            return Err(Error::Config(format!(
                "unsupported parameter count {}: model '{}' has no halo parameters",
                fit.len(),
                spectrum.model().name()
            )));
        }
        Ok(Self { spectrum, observed, fit, benchmark })
    }

    /// Asimov data: the expected counts at the benchmark.
    pub fn from_benchmark(spectrum: DetectorSpectrum, fit: FitParameterSet, benchmark: Benchmark) -> Result<Self> {
        let observed = spectrum.compute(&benchmark.point(false))?.counts;
        Self::new(spectrum, observed, fit, benchmark)
    }

    /// One Poisson draw around the benchmark expectation.
    pub fn from_benchmark_poisson(
        spectrum: DetectorSpectrum,
        fit: FitParameterSet,
        benchmark: Benchmark,
        seed: u64,
    ) -> Result<Self> {
        let expected = spectrum.compute(&benchmark.point(false))?;
        let observed = toys::poisson_resample(&expected, seed)?.counts;
        Self::new(spectrum, observed, fit, benchmark)
    }

    /// Observed counts.
    pub fn observed(&self) -> &[f64] {
        &self.observed
    }

    /// Fitted parameters.
    pub fn fit_parameters(&self) -> &FitParameterSet {
        &self.fit
    }

    /// Benchmark holding the unfitted values.
    pub fn benchmark(&self) -> &Benchmark {
        &self.benchmark
    }

    /// Forward model.
    pub fn spectrum(&self) -> &DetectorSpectrum {
        &self.spectrum
    }

    /// Expected counts for a fitted parameter vector.
    pub fn predicted(&self, params: &[f64]) -> Result<Vec<f64>> {
        let point = self.benchmark.point_for(&self.fit, params)?;
        Ok(self.spectrum.compute(&point)?.counts)
    }
}

impl LogLikelihood for RecoilLikelihood {
    fn n_parameters(&self) -> usize {
        self.fit.len()
    }

    fn parameter_names(&self) -> Vec<String> {
        self.fit.names()
    }

    fn log_likelihood(&self, params: &[f64]) -> Result<f64> {
        let predicted = self.predicted(params)?;
        let value = poisson_log_likelihood(&self.observed, &predicted)?;
        if !value.is_finite() {
            return Err(Error::NonFiniteLikelihood { params: params.to_vec(), value });
        }
        Ok(value)
    }
}
