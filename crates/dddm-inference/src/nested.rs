//! Nested sampling with a single bounding ellipsoid.
//!
//! Live points are kept in the unit cube and mapped to physical values by
//! the prior transform. At every iteration the lowest-likelihood point is
//! retired with weight `ΔX · L` and replaced by a draw from the enlarged
//! ellipsoid around the live set, constrained to `L > L*`.

use dddm_core::{Error, LogLikelihood, Result};
use dddm_prob::math::{log1mexp, log_add_exp};
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::sampler::{EngineFailure, FitProblem, SamplerOutput, SamplingEngine, checked_log_likelihood};
use crate::summary::{PosteriorSummary, rejection_resample};

/// Nested sampling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NestedConfig {
    /// Number of live points.
    pub nlive: usize,
    /// Stop when the estimated remaining evidence `Δ ln Z` drops below this.
    pub tol: f64,
    /// Hard iteration cap.
    pub max_iter: Option<usize>,
    /// Volume enlargement of the bounding ellipsoid.
    pub enlarge: f64,
    /// Give up replacing one point after this many proposals.
    pub max_proposals: usize,
    /// RNG seed for proposals and posterior resampling.
    pub seed: u64,
}

impl Default for NestedConfig {
    fn default() -> Self {
        Self { nlive: 1024, tol: 0.1, max_iter: None, enlarge: 1.2, max_proposals: 100_000, seed: 0 }
    }
}

/// Output of a nested sampling run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedOutput {
    /// Dead points followed by the final live points, physical values.
    pub samples: Vec<Vec<f64>>,
    /// Normalized posterior weights.
    pub weights: Vec<f64>,
    /// `ln L` per sample.
    pub logl: Vec<f64>,
    /// `ln Z`.
    pub logz: f64,
    /// `sqrt(H / nlive)`.
    pub logzerr: f64,
    /// Information `H`, nats.
    pub information: f64,
    /// Iterations (dead points).
    pub niter: usize,
    /// Likelihood evaluations.
    pub ncall: usize,
}

/// Ellipsoid `{x : (x − c)ᵀ A⁻¹ (x − c) ≤ 1}` stored as `c` and `L = chol(A)`.
#[derive(Debug, Clone)]
struct Ellipsoid {
    center: DVector<f64>,
    axes: DMatrix<f64>,
}

impl Ellipsoid {
    /// Smallest scaled-covariance ellipsoid holding every point, with volume
    /// multiplied by `enlarge`. `None` when the points are degenerate.
    fn bound(points: &[Vec<f64>], enlarge: f64) -> Option<Self> {
        let d = points.first()?.len();
        let n = points.len();
        if d == 0 || n <= d {
            return None;
        }

        let mut center = DVector::<f64>::zeros(d);
        for p in points {
            center += DVector::from_column_slice(p);
        }
        center /= n as f64;

        let mut cov = DMatrix::<f64>::zeros(d, d);
        for p in points {
            let dx = DVector::from_column_slice(p) - &center;
            cov += &dx * dx.transpose();
        }
        cov /= (n - 1) as f64;

        let inv = cov.clone().try_inverse()?;
        let fmax = points
            .iter()
            .map(|p| {
                let dx = DVector::from_column_slice(p) - &center;
                dx.dot(&(&inv * &dx))
            })
            .fold(0.0, f64::max);
        if !(fmax.is_finite() && fmax > 0.0) {
            return None;
        }

        let shape = cov * (fmax * enlarge.powf(2.0 / d as f64));
        let chol = shape.cholesky()?;
        Some(Self { center, axes: chol.l() })
    }

    /// Uniform draw from the interior.
    fn sample<R: Rng>(&self, rng: &mut R) -> Vec<f64> {
        let d = self.center.len();
        let z = DVector::<f64>::from_iterator(d, (0..d).map(|_| rng.sample::<f64, _>(StandardNormal)));
        let norm = z.norm();
        let r = rng.random::<f64>().powf(1.0 / d as f64);
        let x = &self.center + &self.axes * (z * (r / norm));
        x.iter().copied().collect()
    }

    #[cfg(test)]
    fn contains(&self, p: &[f64]) -> bool {
        let dx = DVector::from_column_slice(p) - &self.center;
        let a = &self.axes * self.axes.transpose();
        match a.try_inverse() {
            Some(inv) => dx.dot(&(&inv * &dx)) <= 1.0 + 1e-9,
            None => false,
        }
    }
}

fn in_unit_cube(u: &[f64]) -> bool {
    u.iter().all(|&x| (0.0..=1.0).contains(&x))
}

/// Nested sampling engine.
#[derive(Debug, Clone, Default)]
pub struct NestedEngine {
    config: NestedConfig,
}

impl NestedEngine {
    /// Engine with `config`.
    pub fn new(config: NestedConfig) -> Self {
        Self { config }
    }

    /// Settings.
    pub fn config(&self) -> &NestedConfig {
        &self.config
    }

    fn run(&self, problem: &FitProblem, likelihood: &dyn LogLikelihood) -> std::result::Result<NestedOutput, EngineFailure> {
        let cfg = &self.config;
        let d = problem.ndim();
        let n = cfg.nlive;
        let nf = n as f64;
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let fail = |iteration: usize, params: Vec<f64>, source: Error| EngineFailure { iteration, params, source };

        let mut live_u: Vec<Vec<f64>> = (0..n).map(|_| (0..d).map(|_| rng.random::<f64>()).collect()).collect();
        let mut live_v = Vec::with_capacity(n);
        for u in &live_u {
            live_v.push(problem.transform(u).map_err(|e| fail(0, u.clone(), e))?);
        }
        let mut live_logl: Vec<f64> = live_v
            .par_iter()
            .map(|v| checked_log_likelihood(likelihood, v).map_err(|e| (v.clone(), e)))
            .collect::<std::result::Result<Vec<f64>, (Vec<f64>, Error)>>()
            .map_err(|(params, source)| fail(0, params, source))?;
        let mut ncall = n;

        let update_interval = ((0.6 * nf).round() as usize).max(1);
        let mut ellipsoid = Ellipsoid::bound(&live_u, cfg.enlarge);
        let mut since_update = 0usize;

        let mut samples = Vec::new();
        let mut logwts = Vec::new();
        let mut sample_logl = Vec::new();

        let mut logz = f64::NEG_INFINITY;
        let mut h = 0.0;
        let mut logvol = log1mexp(1.0 / nf);
        let mut it = 0usize;

        loop {
            if cfg.max_iter.is_some_and(|m| it >= m) {
                log::info!("nested: reached max_iter={} with ln Z = {:.3}", it, logz);
                break;
            }

            let (worst, logl_star) = live_logl
                .iter()
                .copied()
                .enumerate()
                .fold((0, f64::INFINITY), |acc, (i, l)| if l < acc.1 { (i, l) } else { acc });

            let logwt = logvol + logl_star;
            let logz_new = log_add_exp(logz, logwt);
            let prev = if logz.is_finite() { (logz - logz_new).exp() * (h + logz) } else { 0.0 };
            h = (logwt - logz_new).exp() * logl_star + prev - logz_new;
            logz = logz_new;

            samples.push(live_v[worst].clone());
            logwts.push(logwt);
            sample_logl.push(logl_star);

            if since_update >= update_interval {
                ellipsoid = Ellipsoid::bound(&live_u, cfg.enlarge);
                since_update = 0;
            }

            let mut proposals = 0usize;
            loop {
                if proposals >= cfg.max_proposals {
                    return Err(fail(
                        it,
                        live_v[worst].clone(),
                        Error::Numerical(format!(
                            "no point with ln L > {:.6} after {} proposals",
                            logl_star, cfg.max_proposals
                        )),
                    ));
                }
                proposals += 1;

                let u = match &ellipsoid {
                    Some(e) => e.sample(&mut rng),
                    None => (0..d).map(|_| rng.random::<f64>()).collect(),
                };
                if !in_unit_cube(&u) {
                    continue;
                }
                let v = problem.transform(&u).map_err(|e| fail(it, u.clone(), e))?;
                let logl = checked_log_likelihood(likelihood, &v).map_err(|e| fail(it, v.clone(), e))?;
                ncall += 1;
                since_update += 1;
                if logl > logl_star {
                    live_u[worst] = u;
                    live_v[worst] = v;
                    live_logl[worst] = logl;
                    break;
                }
            }

            logvol -= 1.0 / nf;
            it += 1;

            let max_logl = live_logl.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let dlogz = log_add_exp(0.0, max_logl + logvol - logz);
            if it % 1000 == 0 {
                log::debug!("nested: it={} ncall={} ln Z={:.3} dlogz={:.3}", it, ncall, logz, dlogz);
            }
            if dlogz < cfg.tol {
                break;
            }
        }

        let niter = it;
        let logvol = -(niter as f64) / nf - nf.ln();
        for (v, logl) in live_v.into_iter().zip(live_logl) {
            let logwt = logvol + logl;
            let logz_new = log_add_exp(logz, logwt);
            let prev = if logz.is_finite() { (logz - logz_new).exp() * (h + logz) } else { 0.0 };
            h = (logwt - logz_new).exp() * logl + prev - logz_new;
            logz = logz_new;
            samples.push(v);
            logwts.push(logwt);
            sample_logl.push(logl);
        }

        let logzerr = (h.max(0.0) / nf).sqrt();
        let weights = logwts.iter().map(|w| (w - logz).exp()).collect();
        log::info!(
            "nested: {} iterations, {} calls, ln Z = {:.3} +/- {:.3}, H = {:.3}",
            niter,
            ncall,
            logz,
            logzerr,
            h
        );

        Ok(NestedOutput { samples, weights, logl: sample_logl, logz, logzerr, information: h, niter, ncall })
    }
}

impl SamplingEngine for NestedEngine {
    fn name(&self) -> &'static str {
        "nested"
    }

    fn population(&self) -> String {
        format!("nlive={}", self.config.nlive)
    }

    fn validate(&self, problem: &FitProblem) -> Result<()> {
        let cfg = &self.config;
        if cfg.nlive <= problem.ndim() {
            return Err(Error::Config(format!(
                "nlive={} must exceed the number of fitted parameters ({})",
                cfg.nlive,
                problem.ndim()
            )));
        }
        if !(cfg.tol.is_finite() && cfg.tol > 0.0) {
            return Err(Error::Config(format!("tol must be > 0, got {}", cfg.tol)));
        }
        if !(cfg.enlarge.is_finite() && cfg.enlarge >= 1.0) {
            return Err(Error::Config(format!("enlarge must be >= 1, got {}", cfg.enlarge)));
        }
        if cfg.max_proposals == 0 {
            return Err(Error::Config("max_proposals must be >= 1".to_string()));
        }
        Ok(())
    }

    fn sample(
        &self,
        problem: &FitProblem,
        likelihood: &dyn LogLikelihood,
    ) -> std::result::Result<SamplerOutput, EngineFailure> {
        self.run(problem, likelihood).map(SamplerOutput::Nested)
    }

    fn summarize(&self, problem: &FitProblem, output: &SamplerOutput) -> Result<PosteriorSummary> {
        let SamplerOutput::Nested(out) = output else {
            return Err(Error::Validation("nested engine cannot summarize an ensemble run".to_string()));
        };
        let posterior = rejection_resample(&out.samples, &out.weights, self.config.seed)?;
        let mut summary = PosteriorSummary::from_samples(self.name(), problem.fit.names(), &posterior)?;
        summary.log_evidence = Some(out.logz);
        summary.log_evidence_err = Some(out.logzerr);
        summary.information = Some(out.information);
        summary.n_iter = Some(out.niter);
        summary.n_calls = Some(out.ncall);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::FitParameterSet;
    use crate::prior::PriorSpec;
    use approx::assert_relative_eq;

    struct Gaussian {
        mean: Vec<f64>,
        sigma: f64,
    }

    impl LogLikelihood for Gaussian {
        fn n_parameters(&self) -> usize {
            self.mean.len()
        }

        fn parameter_names(&self) -> Vec<String> {
            FitParameterSet::first(self.mean.len()).unwrap().names()
        }

        fn log_likelihood(&self, params: &[f64]) -> Result<f64> {
            Ok(params.iter().zip(&self.mean).map(|(x, m)| -0.5 * ((x - m) / self.sigma).powi(2)).sum())
        }
    }

    fn problem(ndim: usize, lo: f64, hi: f64) -> FitProblem {
        FitProblem {
            fit: FitParameterSet::first(ndim).unwrap(),
            priors: vec![PriorSpec::flat(lo, hi).unwrap(); ndim],
            start: vec![0.5 * (lo + hi); ndim],
        }
    }

    #[test]
    fn test_ellipsoid_bounds_points() {
        let mut rng = StdRng::seed_from_u64(9);
        let pts: Vec<Vec<f64>> = (0..200).map(|_| vec![rng.random::<f64>(), 0.3 * rng.random::<f64>()]).collect();
        let e = Ellipsoid::bound(&pts, 1.2).unwrap();
        assert!(pts.iter().all(|p| e.contains(p)));
        for _ in 0..100 {
            assert!(e.contains(&e.sample(&mut rng)));
        }
        assert!(Ellipsoid::bound(&pts[..2], 1.2).is_none());
    }

    #[test]
    fn test_gaussian_evidence_and_posterior() {
        let engine = NestedEngine::new(NestedConfig { nlive: 200, tol: 0.05, seed: 4, ..NestedConfig::default() });
        let p = problem(1, 0.0, 3.0);
        let like = Gaussian { mean: vec![1.7], sigma: 0.1 };
        engine.validate(&p).unwrap();
        let out = engine.sample(&p, &like).unwrap();

        let SamplerOutput::Nested(raw) = &out else { panic!("wrong output kind") };
        let analytic = (0.1 * (2.0 * std::f64::consts::PI).sqrt() / 3.0).ln();
        assert!((raw.logz - analytic).abs() < 0.5, "ln Z {} vs {}", raw.logz, analytic);
        assert_relative_eq!(raw.weights.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        assert_eq!(raw.samples.len(), raw.niter + 200);

        let summary = engine.summarize(&p, &out).unwrap();
        assert!((summary.best_fit[0] - 1.7).abs() < 0.05, "{:?}", summary.best_fit);
        assert!(summary.std[0] > 0.05 && summary.std[0] < 0.15, "{:?}", summary.std);
        assert_eq!(summary.log_evidence, Some(raw.logz));
    }

    #[test]
    fn test_deterministic_for_seed() {
        let engine = NestedEngine::new(NestedConfig { nlive: 60, tol: 0.5, seed: 11, ..NestedConfig::default() });
        let p = problem(2, -1.0, 1.0);
        let like = Gaussian { mean: vec![0.2, -0.3], sigma: 0.2 };
        let a = engine.sample(&p, &like).unwrap();
        let b = engine.sample(&p, &like).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_max_iter_caps_run() {
        let engine =
            NestedEngine::new(NestedConfig { nlive: 50, tol: 1e-6, max_iter: Some(30), ..NestedConfig::default() });
        let p = problem(1, 0.0, 3.0);
        let SamplerOutput::Nested(out) = engine.sample(&p, &Gaussian { mean: vec![1.0], sigma: 0.1 }).unwrap() else {
            panic!("wrong output kind")
        };
        assert_eq!(out.niter, 30);
    }

    #[test]
    fn test_validate() {
        let p = problem(2, 0.0, 1.0);
        let bad = NestedEngine::new(NestedConfig { nlive: 2, ..NestedConfig::default() });
        assert!(bad.validate(&p).unwrap_err().is_config());
        let bad = NestedEngine::new(NestedConfig { tol: 0.0, ..NestedConfig::default() });
        assert!(bad.validate(&p).unwrap_err().is_config());
    }
}
