//! Priors and the unit-cube → physical transform.
//!
//! Serialized with the field vocabulary used in run configs:
//!
//! ```yaml
//! log_mass: { prior_type: flat, range: [-1.5, 4.5] }
//! v_0: { prior_type: gauss, range: [80, 380], mean: 230, std: 30 }
//! ```

use std::collections::BTreeMap;

use dddm_core::{Error, Result};
use dddm_prob::normal;
use serde::{Deserialize, Serialize};

use crate::parameters::{Benchmark, FitParameterSet, Parameter};

/// Prior of one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPrior", into = "RawPrior")]
pub enum PriorSpec {
    /// Uniform on `[a, b]`.
    Flat {
        /// `(a, b)`.
        range: (f64, f64),
    },
    /// Normal `N(mean, std)` truncated to `[a, b]`.
    Gaussian {
        /// `(a, b)`.
        range: (f64, f64),
        /// Mean of the untruncated normal.
        mean: f64,
        /// Standard deviation of the untruncated normal.
        std: f64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawPrior {
    prior_type: String,
    range: [f64; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mean: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    std: Option<f64>,
}

impl TryFrom<RawPrior> for PriorSpec {
    type Error = Error;

    fn try_from(raw: RawPrior) -> Result<Self> {
        PriorSpec::parse(&raw.prior_type, raw.range, raw.mean, raw.std)
    }
}

impl From<PriorSpec> for RawPrior {
    fn from(p: PriorSpec) -> Self {
        match p {
            PriorSpec::Flat { range } => {
                RawPrior { prior_type: "flat".to_string(), range: [range.0, range.1], mean: None, std: None }
            }
            PriorSpec::Gaussian { range, mean, std } => RawPrior {
                prior_type: "gauss".to_string(),
                range: [range.0, range.1],
                mean: Some(mean),
                std: Some(std),
            },
        }
    }
}

fn check_range(a: f64, b: f64) -> Result<()> {
    if !a.is_finite() || !b.is_finite() || !(a < b) {
        return Err(Error::Config(format!("prior range must be finite with a < b, got [{}, {}]", a, b)));
    }
    Ok(())
}

impl PriorSpec {
    /// Uniform prior on `[a, b]`.
    pub fn flat(a: f64, b: f64) -> Result<Self> {
        check_range(a, b)?;
        Ok(PriorSpec::Flat { range: (a, b) })
    }

    /// `N(mean, std)` truncated to `[a, b]`.
    pub fn gaussian(a: f64, b: f64, mean: f64, std: f64) -> Result<Self> {
        check_range(a, b)?;
        if !mean.is_finite() || !std.is_finite() || std <= 0.0 {
            return Err(Error::Config(format!("gauss prior needs finite mean and std > 0, got {} / {}", mean, std)));
        }
        Ok(PriorSpec::Gaussian { range: (a, b), mean, std })
    }

    /// Build from the config vocabulary; an unknown `prior_type` is a config error.
    pub fn parse(prior_type: &str, range: [f64; 2], mean: Option<f64>, std: Option<f64>) -> Result<Self> {
        match prior_type {
            "flat" => Self::flat(range[0], range[1]),
            "gauss" => match (mean, std) {
                (Some(m), Some(s)) => Self::gaussian(range[0], range[1], m, s),
                _ => Err(Error::Config("gauss prior requires 'mean' and 'std'".to_string())),
            },
            other => Err(Error::Config(format!("unknown prior type '{}' (expected 'flat' or 'gauss')", other))),
        }
    }

    /// `"flat"` or `"gauss"`.
    pub fn prior_type(&self) -> &'static str {
        match self {
            PriorSpec::Flat { .. } => "flat",
            PriorSpec::Gaussian { .. } => "gauss",
        }
    }

    /// `(a, b)`.
    pub fn range(&self) -> (f64, f64) {
        match *self {
            PriorSpec::Flat { range } | PriorSpec::Gaussian { range, .. } => range,
        }
    }

    /// `true` if `x` lies in the support.
    pub fn contains(&self, x: f64) -> bool {
        let (a, b) = self.range();
        (a..=b).contains(&x)
    }

    /// Clamp into the support.
    pub fn clip(&self, x: f64) -> f64 {
        let (a, b) = self.range();
        x.clamp(a, b)
    }

    /// Map `u ∈ [0, 1]` to a physical value.
    ///
    /// Flat: exact linear map with `0 → a`, `1 → b`. Gaussian: truncated-normal
    /// quantile, always inside `[a, b]`.
    pub fn transform(&self, u: f64) -> Result<f64> {
        if !(0.0..=1.0).contains(&u) {
            return Err(Error::Validation(format!("unit-cube value must be in [0, 1], got {}", u)));
        }
        match *self {
            PriorSpec::Flat { range: (a, b) } => Ok(a * (1.0 - u) + b * u),
            PriorSpec::Gaussian { range: (a, b), mean, std } => normal::truncated_quantile(u, mean, std, a, b),
        }
    }

    /// Normalized log-density; `-inf` outside the support.
    pub fn log_density(&self, x: f64) -> Result<f64> {
        if !self.contains(x) {
            return Ok(f64::NEG_INFINITY);
        }
        match *self {
            PriorSpec::Flat { range: (a, b) } => Ok(-(b - a).ln()),
            PriorSpec::Gaussian { range: (a, b), mean, std } => normal::truncated_logpdf(x, mean, std, a, b),
        }
    }
}

/// Priors keyed by parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriorSet {
    priors: BTreeMap<Parameter, PriorSpec>,
}

impl PriorSet {
    /// Names accepted by [`PriorSet::from_name`].
    pub const NAMES: [&'static str; 1] = ["Pato_2010"];

    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace one prior.
    pub fn with(mut self, p: Parameter, spec: PriorSpec) -> Self {
        self.priors.insert(p, spec);
        self
    }

    /// A named prior table around `benchmark`.
    ///
    /// `Pato_2010`: `log_mass` flat on `[⌊log m⌋ − 2.5, ⌊log m⌋ + 3.5]`,
    /// `log_cross_section` flat on `[⌊log σ⌋ − 7, ⌊log σ⌋ + 5]` (truncated
    /// toward zero), and Gaussian halo priors (arXiv:1012.3458).
    pub fn from_name(name: &str, benchmark: &Benchmark) -> Result<Self> {
        match name {
            "Pato_2010" => {
                let m = benchmark.log_mass.trunc();
                let s = benchmark.log_cross_section.trunc();
                Ok(Self::new()
                    .with(Parameter::LogMass, PriorSpec::flat(m - 2.5, m + 3.5)?)
                    .with(Parameter::LogCrossSection, PriorSpec::flat(s - 7.0, s + 5.0)?)
                    .with(Parameter::V0, PriorSpec::gaussian(80.0, 380.0, 230.0, 30.0)?)
                    .with(Parameter::VEsc, PriorSpec::gaussian(379.0, 709.0, 544.0, 33.0)?)
                    .with(Parameter::Density, PriorSpec::gaussian(0.001, 0.9, 0.4, 0.1)?))
            }
            other => Err(Error::Config(format!("unknown prior set '{}', choose one of {:?}", other, Self::NAMES))),
        }
    }

    /// Prior of one parameter.
    pub fn get(&self, p: Parameter) -> Result<&PriorSpec> {
        self.priors.get(&p).ok_or_else(|| Error::Config(format!("no prior for parameter '{}'", p)))
    }

    /// Priors of a fit set, in fit order.
    pub fn for_fit(&self, fit: &FitParameterSet) -> Result<Vec<PriorSpec>> {
        fit.iter().map(|p| self.get(p).copied()).collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.priors.len()
    }

    /// `true` if empty.
    pub fn is_empty(&self) -> bool {
        self.priors.is_empty()
    }
}

/// Apply per-coordinate prior transforms to a unit-cube point.
pub fn prior_transform(priors: &[PriorSpec], cube: &[f64]) -> Result<Vec<f64>> {
    if priors.len() != cube.len() {
        return Err(Error::Validation(format!("{} priors for a {}-dim point", priors.len(), cube.len())));
    }
    priors.iter().zip(cube).map(|(p, &u)| p.transform(u)).collect()
}

/// Joint log-prior; `-inf` outside the support.
pub fn log_prior(priors: &[PriorSpec], x: &[f64]) -> Result<f64> {
    if priors.len() != x.len() {
        return Err(Error::Validation(format!("{} priors for a {}-dim point", priors.len(), x.len())));
    }
    let mut lp = 0.0;
    for (p, &v) in priors.iter().zip(x) {
        lp += p.log_density(v)?;
        if lp == f64::NEG_INFINITY {
            break;
        }
    }
    Ok(lp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_flat_transform_is_linear() {
        let p = PriorSpec::flat(-52.0, -40.0).unwrap();
        assert_eq!(p.transform(0.0).unwrap(), -52.0);
        assert_eq!(p.transform(1.0).unwrap(), -40.0);
        assert_eq!(p.transform(0.5).unwrap(), -46.0);
        assert!(p.transform(1.5).is_err());
    }

    #[test]
    fn test_gaussian_transform_median() {
        // Symmetric truncation keeps the median at the mean.
        let p = PriorSpec::gaussian(130.0, 330.0, 230.0, 30.0).unwrap();
        assert_relative_eq!(p.transform(0.5).unwrap(), 230.0, epsilon = 1e-9);
        assert_relative_eq!(p.transform(0.0).unwrap(), 130.0, max_relative = 1e-6);
        assert_relative_eq!(p.transform(1.0).unwrap(), 330.0, max_relative = 1e-6);
    }

    #[test]
    fn test_unknown_prior_type_is_config_error() {
        let err = PriorSpec::parse("cauchy", [0.0, 1.0], None, None).unwrap_err();
        assert!(err.is_config());
        assert!(PriorSpec::parse("gauss", [0.0, 1.0], Some(0.5), None).unwrap_err().is_config());
        assert!(PriorSpec::flat(1.0, 1.0).unwrap_err().is_config());

        let r: std::result::Result<PriorSpec, _> =
            serde_json::from_str(r#"{"prior_type": "cauchy", "range": [0, 1]}"#);
        assert!(r.unwrap_err().to_string().contains("unknown prior type"));
    }

    #[test]
    fn test_serde_vocabulary() {
        let p: PriorSpec =
            serde_json::from_str(r#"{"prior_type": "gauss", "range": [80, 380], "mean": 230, "std": 30}"#).unwrap();
        assert_eq!(p, PriorSpec::gaussian(80.0, 380.0, 230.0, 30.0).unwrap());
        let v = serde_json::to_value(PriorSpec::flat(0.0, 2.0).unwrap()).unwrap();
        assert_eq!(v["prior_type"], "flat");
        assert!(v.get("mean").is_none());
    }

    #[test]
    fn test_log_density() {
        let p = PriorSpec::flat(0.0, 4.0).unwrap();
        assert_relative_eq!(p.log_density(1.0).unwrap(), -(4f64.ln()));
        assert_eq!(p.log_density(5.0).unwrap(), f64::NEG_INFINITY);
        let g = PriorSpec::gaussian(0.0, 10.0, 5.0, 1.0).unwrap();
        assert!(g.log_density(5.0).unwrap() > g.log_density(7.0).unwrap());
        assert_eq!(log_prior(&[p, g], &[1.0, 11.0]).unwrap(), f64::NEG_INFINITY);
    }

    #[test]
    fn test_pato_2010() {
        let set = PriorSet::from_name("Pato_2010", &Benchmark::default()).unwrap();
        assert_eq!(set.len(), 5);
        assert_eq!(set.get(Parameter::LogMass).unwrap().range(), (-1.5, 4.5));
        assert_eq!(set.get(Parameter::LogCrossSection).unwrap().range(), (-52.0, -40.0));
        assert_eq!(set.get(Parameter::VEsc).unwrap().prior_type(), "gauss");
        assert!(PriorSet::from_name("Evans_2019", &Benchmark::default()).unwrap_err().is_config());

        let fit = FitParameterSet::first(3).unwrap();
        assert_eq!(set.for_fit(&fit).unwrap().len(), 3);
        assert!(PriorSet::new().for_fit(&fit).unwrap_err().is_config());
    }

    proptest! {
        #[test]
        fn prop_gaussian_transform_in_range(
            u in 0.0f64..=1.0,
            mean in -10.0f64..10.0,
            std in 0.01f64..20.0,
            a in -20.0f64..0.0,
            width in 0.1f64..30.0,
        ) {
            let p = PriorSpec::gaussian(a, a + width, mean, std).unwrap();
            let x = p.transform(u).unwrap();
            prop_assert!(x >= a && x <= a + width, "x={} not in [{}, {}]", x, a, a + width);
        }
    }
}
