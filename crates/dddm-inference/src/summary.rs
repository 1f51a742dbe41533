//! Posterior summary statistics of a completed run.

use std::collections::BTreeMap;

use dddm_core::{Error, Result};
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Summary of a completed sampling run. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PosteriorSummary {
    /// Sampler backend name.
    pub sampler: String,
    /// Fitted parameter names.
    pub parameter_names: Vec<String>,
    /// Posterior mean.
    pub best_fit: Vec<f64>,
    /// Posterior standard deviations.
    pub std: Vec<f64>,
    /// Posterior covariance.
    pub covariance: Vec<Vec<f64>>,
    /// `ln Z` (nested sampling only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_evidence: Option<f64>,
    /// Numerical uncertainty of `ln Z`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_evidence_err: Option<f64>,
    /// Information `H` in nats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub information: Option<f64>,
    /// Number of (unweighted) posterior samples the statistics use.
    pub n_posterior: usize,
    /// Sampler iterations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_iter: Option<usize>,
    /// Likelihood calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_calls: Option<usize>,
    /// MCMC acceptance fraction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceptance_fraction: Option<f64>,
    /// Wall-clock duration of the run, seconds.
    pub fit_time_s: f64,
    /// `"<name>_fit_res" → "mean +/- std"`, plus de-logged values for `log_*` parameters.
    pub fit_results: BTreeMap<String, String>,
    /// SHA-256 of the saved config record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_sha256: Option<String>,
}

impl PosteriorSummary {
    /// Mean, covariance and fit-result strings from unweighted samples.
    pub fn from_samples(sampler: &str, parameter_names: Vec<String>, samples: &[Vec<f64>]) -> Result<Self> {
        let (mean, covariance) = mean_and_covariance(samples)?;
        if mean.len() != parameter_names.len() {
            return Err(Error::Validation(format!(
                "{} parameter names for {}-dim samples",
                parameter_names.len(),
                mean.len()
            )));
        }
        let std: Vec<f64> = (0..mean.len()).map(|i| covariance[i][i].max(0.0).sqrt()).collect();
        let fit_results = fit_result_strings(&parameter_names, &mean, &std);
        Ok(Self {
            sampler: sampler.to_string(),
            parameter_names,
            best_fit: mean,
            std,
            covariance,
            log_evidence: None,
            log_evidence_err: None,
            information: None,
            n_posterior: samples.len(),
            n_iter: None,
            n_calls: None,
            acceptance_fraction: None,
            fit_time_s: 0.0,
            fit_results,
            config_sha256: None,
        })
    }

    /// Index of a parameter by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.parameter_names.iter().position(|n| n == name)
    }
}

/// Sample mean and (n−1)-normalized covariance.
pub fn mean_and_covariance(samples: &[Vec<f64>]) -> Result<(Vec<f64>, Vec<Vec<f64>>)> {
    let Some(first) = samples.first() else {
        return Err(Error::Numerical("no posterior samples".to_string()));
    };
    let d = first.len();
    if samples.iter().any(|s| s.len() != d) {
        return Err(Error::Validation("posterior samples have inconsistent dimension".to_string()));
    }
    let n = samples.len() as f64;
    let mut mean = vec![0.0; d];
    for s in samples {
        for (m, x) in mean.iter_mut().zip(s) {
            *m += x;
        }
    }
    mean.iter_mut().for_each(|m| *m /= n);

    let mut cov = vec![vec![0.0; d]; d];
    for s in samples {
        for i in 0..d {
            let di = s[i] - mean[i];
            for j in 0..=i {
                cov[i][j] += di * (s[j] - mean[j]);
            }
        }
    }
    let denom = (n - 1.0).max(1.0);
    for i in 0..d {
        for j in 0..=i {
            cov[i][j] /= denom;
            cov[j][i] = cov[i][j];
        }
    }
    Ok((mean, cov))
}

/// Unweighted draws from weighted samples: sample `i` is kept with
/// probability `w_i / max(w)`.
pub fn rejection_resample(samples: &[Vec<f64>], weights: &[f64], seed: u64) -> Result<Vec<Vec<f64>>> {
    if samples.len() != weights.len() {
        return Err(Error::Validation(format!("{} samples but {} weights", samples.len(), weights.len())));
    }
    let w_max = weights.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !w_max.is_finite() || w_max <= 0.0 {
        return Err(Error::Numerical(format!("cannot resample with max weight {}", w_max)));
    }
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    Ok(samples
        .iter()
        .zip(weights)
        .filter(|&(_, &w)| rng.random::<f64>() < w / w_max)
        .map(|(s, _)| s.clone())
        .collect())
}

/// `"<name>_fit_res"` strings; `log_x` parameters also get `"x_fit_res"`
/// with `10^μ ± 10^μ · ln10 · σ`.
pub fn fit_result_strings(names: &[String], mean: &[f64], std: &[f64]) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for ((name, &m), &s) in names.iter().zip(mean).zip(std) {
        out.insert(format!("{}_fit_res", name), format!("{:.4} +/- {:.4}", m, s));
        if let Some(linear) = name.strip_prefix("log_") {
            let v = 10f64.powf(m);
            let e = v * std::f64::consts::LN_10 * s;
            out.insert(format!("{}_fit_res", linear), format!("{:.4e} +/- {:.4e}", v, e));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mean_and_covariance() {
        let s = vec![vec![1.0, 2.0], vec![3.0, 6.0], vec![5.0, 10.0]];
        let (m, c) = mean_and_covariance(&s).unwrap();
        assert_relative_eq!(m[0], 3.0);
        assert_relative_eq!(m[1], 6.0);
        assert_relative_eq!(c[0][0], 4.0);
        assert_relative_eq!(c[1][1], 16.0);
        assert_relative_eq!(c[0][1], 8.0);
        assert_eq!(c[0][1], c[1][0]);
        assert!(mean_and_covariance(&[]).is_err());
    }

    #[test]
    fn test_rejection_resample() {
        let s: Vec<Vec<f64>> = (0..1000).map(|i| vec![i as f64]).collect();
        let mut w = vec![0.0; 1000];
        w[10] = 1.0;
        w[20] = 1.0;
        let r = rejection_resample(&s, &w, 1).unwrap();
        assert_eq!(r, vec![vec![10.0], vec![20.0]]);

        let uniform = vec![0.5; 1000];
        let a = rejection_resample(&s, &uniform, 5).unwrap();
        assert_eq!(a.len(), 1000);
        assert!(rejection_resample(&s, &vec![0.0; 1000], 5).is_err());
        assert!(rejection_resample(&s, &[1.0], 5).is_err());
    }

    #[test]
    fn test_fit_result_strings() {
        let names = vec!["log_mass".to_string(), "v_0".to_string()];
        let r = fit_result_strings(&names, &[2.0, 230.0], &[0.1, 10.0]);
        assert_eq!(r["log_mass_fit_res"], "2.0000 +/- 0.1000");
        assert_eq!(r["v_0_fit_res"], "230.0000 +/- 10.0000");
        assert!(r["mass_fit_res"].starts_with("1.0000e2 +/- 2.3026e1"), "{}", r["mass_fit_res"]);
        assert_eq!(r.len(), 3);
    }

    #[test]
    fn test_from_samples() {
        let s = vec![vec![1.0], vec![3.0]];
        let summary = PosteriorSummary::from_samples("nested", vec!["log_mass".to_string()], &s).unwrap();
        assert_eq!(summary.best_fit, vec![2.0]);
        assert_relative_eq!(summary.std[0], 2f64.sqrt());
        assert_eq!(summary.n_posterior, 2);
        assert_eq!(summary.index_of("log_mass"), Some(0));
        assert!(PosteriorSummary::from_samples("nested", vec![], &s).is_err());
    }
}
