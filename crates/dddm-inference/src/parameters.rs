//! Fit parameters: the canonical ordering, prefix-consistent fit sets and the
//! benchmark point.

use std::fmt;
use std::str::FromStr;

use dddm_core::{Error, HaloParameters, RecoilPoint, Result};
use serde::{Deserialize, Serialize};

/// One parameter of the WIMP + halo model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Parameter {
    /// `log10(m_χ / GeV)`.
    #[serde(rename = "log_mass")]
    LogMass,
    /// `log10(σ / cm²)`.
    #[serde(rename = "log_cross_section")]
    LogCrossSection,
    /// Halo most-probable velocity, km/s.
    #[serde(rename = "v_0")]
    V0,
    /// Halo escape velocity, km/s.
    #[serde(rename = "v_esc")]
    VEsc,
    /// Local density, GeV/cm³.
    #[serde(rename = "density")]
    Density,
}

impl Parameter {
    /// Canonical ordering. A fit set must be a prefix of it.
    pub const CANONICAL: [Parameter; 5] =
        [Parameter::LogMass, Parameter::LogCrossSection, Parameter::V0, Parameter::VEsc, Parameter::Density];

    /// Name as used in configs and saved results.
    pub fn as_str(self) -> &'static str {
        match self {
            Parameter::LogMass => "log_mass",
            Parameter::LogCrossSection => "log_cross_section",
            Parameter::V0 => "v_0",
            Parameter::VEsc => "v_esc",
            Parameter::Density => "density",
        }
    }

    /// `true` for parameters sampled in log10.
    pub fn is_log(self) -> bool {
        matches!(self, Parameter::LogMass | Parameter::LogCrossSection)
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Parameter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Parameter::CANONICAL.iter().copied().find(|p| p.as_str() == s).ok_or_else(|| {
            Error::Config(format!(
                "unknown parameter '{}', expected one of {:?}",
                s,
                Parameter::CANONICAL.map(Parameter::as_str)
            ))
        })
    }
}

/// Ordered set of fitted parameters; always a non-empty prefix of
/// [`Parameter::CANONICAL`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FitParameterSet {
    params: Vec<Parameter>,
}

impl FitParameterSet {
    /// The first `n` canonical parameters.
    pub fn first(n: usize) -> Result<Self> {
        if n == 0 || n > Parameter::CANONICAL.len() {
            return Err(Error::Config(format!(
                "unsupported parameter count {} (1..={})",
                n,
                Parameter::CANONICAL.len()
            )));
        }
        Ok(Self { params: Parameter::CANONICAL[..n].to_vec() })
    }

    /// Validate an explicit list against the canonical prefix rule.
    pub fn new(params: Vec<Parameter>) -> Result<Self> {
        if params.is_empty() {
            return Err(Error::Config("no fit parameters given".to_string()));
        }
        let is_prefix =
            params.len() <= Parameter::CANONICAL.len() && params.iter().zip(Parameter::CANONICAL.iter()).all(|(a, b)| a == b);
        if !is_prefix {
            return Err(Error::Config(format!(
                "fit parameters {:?} are not a prefix of the canonical ordering {:?}",
                params.iter().map(|p| p.as_str()).collect::<Vec<_>>(),
                Parameter::CANONICAL.map(Parameter::as_str)
            )));
        }
        Ok(Self { params })
    }

    /// Parse names and validate the prefix rule.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let params = names.iter().map(|n| n.as_ref().parse()).collect::<Result<Vec<Parameter>>>()?;
        Self::new(params)
    }

    /// Number of fitted parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Always `false`; kept for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Parameters in fit order.
    pub fn as_slice(&self) -> &[Parameter] {
        &self.params
    }

    /// Iterator over the parameters.
    pub fn iter(&self) -> impl Iterator<Item = Parameter> + '_ {
        self.params.iter().copied()
    }

    /// Parameter names in fit order.
    pub fn names(&self) -> Vec<String> {
        self.params.iter().map(|p| p.as_str().to_string()).collect()
    }

    /// `true` if any halo parameter is fitted.
    pub fn fits_halo(&self) -> bool {
        self.params.len() > 2
    }
}

impl<'de> Deserialize<'de> for FitParameterSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let params = Vec::<Parameter>::deserialize(deserializer)?;
        FitParameterSet::new(params).map_err(serde::de::Error::custom)
    }
}

/// True values used to simulate data and to start chains.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Benchmark {
    /// `log10(m_χ / GeV)`.
    pub log_mass: f64,
    /// `log10(σ / cm²)`.
    pub log_cross_section: f64,
    /// Halo.
    #[serde(default)]
    pub halo: HaloParameters,
}

impl Default for Benchmark {
    fn default() -> Self {
        Self { log_mass: 50f64.log10(), log_cross_section: -45.0, halo: HaloParameters::FIDUCIAL }
    }
}

impl Benchmark {
    /// Benchmark from a WIMP mass (GeV) and `log10` cross-section, fiducial halo.
    pub fn new(wimp_mass: f64, log_cross_section: f64) -> Result<Self> {
        if !wimp_mass.is_finite() || wimp_mass <= 0.0 {
            return Err(Error::Validation(format!("wimp mass must be > 0, got {}", wimp_mass)));
        }
        if !log_cross_section.is_finite() {
            return Err(Error::Validation(format!("log cross-section must be finite, got {}", log_cross_section)));
        }
        Ok(Self { log_mass: wimp_mass.log10(), log_cross_section, halo: HaloParameters::FIDUCIAL })
    }

    /// WIMP mass, GeV.
    pub fn wimp_mass(&self) -> f64 {
        10f64.powf(self.log_mass)
    }

    /// Value of one parameter.
    pub fn value(&self, p: Parameter) -> f64 {
        match p {
            Parameter::LogMass => self.log_mass,
            Parameter::LogCrossSection => self.log_cross_section,
            Parameter::V0 => self.halo.v_0,
            Parameter::VEsc => self.halo.v_esc,
            Parameter::Density => self.halo.density,
        }
    }

    /// Values of the fitted parameters, in fit order.
    pub fn values(&self, fit: &FitParameterSet) -> Vec<f64> {
        fit.iter().map(|p| self.value(p)).collect()
    }

    /// Recoil point at the benchmark.
    ///
    /// The halo is only pinned when `with_halo` is set; otherwise the model
    /// uses its own fiducial halo.
    pub fn point(&self, with_halo: bool) -> RecoilPoint {
        let point = RecoilPoint::new(self.wimp_mass(), 10f64.powf(self.log_cross_section));
        if with_halo { point.with_halo(self.halo) } else { point }
    }

    /// Recoil point for a fitted vector; unfitted parameters keep their benchmark value.
    pub fn point_for(&self, fit: &FitParameterSet, params: &[f64]) -> Result<RecoilPoint> {
        if params.len() != fit.len() {
            return Err(Error::Validation(format!(
                "expected {} parameters ({:?}), got {}",
                fit.len(),
                fit.names(),
                params.len()
            )));
        }
        let mut b = *self;
        for (p, &x) in fit.iter().zip(params) {
            match p {
                Parameter::LogMass => b.log_mass = x,
                Parameter::LogCrossSection => b.log_cross_section = x,
                Parameter::V0 => b.halo.v_0 = x,
                Parameter::VEsc => b.halo.v_esc = x,
                Parameter::Density => b.halo.density = x,
            }
        }
        Ok(b.point(fit.fits_halo()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_prefix_rule() {
        assert!(FitParameterSet::from_names(&["log_mass"]).is_ok());
        assert!(FitParameterSet::from_names(&["log_mass", "log_cross_section", "v_0"]).is_ok());

        let err = FitParameterSet::from_names(&["log_cross_section"]).unwrap_err();
        assert!(err.is_config(), "{err}");
        let err = FitParameterSet::from_names(&["log_mass", "v_0"]).unwrap_err();
        assert!(err.is_config());
        let err = FitParameterSet::from_names::<&str>(&[]).unwrap_err();
        assert!(err.is_config());
        let err = FitParameterSet::from_names(&["log_mass", "mass"]).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_first() {
        assert_eq!(FitParameterSet::first(2).unwrap().names(), vec!["log_mass", "log_cross_section"]);
        assert_eq!(FitParameterSet::first(5).unwrap().len(), 5);
        assert!(FitParameterSet::first(0).unwrap_err().is_config());
        assert!(FitParameterSet::first(6).unwrap_err().is_config());
    }

    #[test]
    fn test_deserialize_checks_prefix() {
        let ok: FitParameterSet = serde_json::from_str(r#"["log_mass", "log_cross_section"]"#).unwrap();
        assert_eq!(ok.len(), 2);
        assert!(serde_json::from_str::<FitParameterSet>(r#"["v_0"]"#).is_err());
    }

    #[test]
    fn test_benchmark_point() {
        let b = Benchmark::default();
        assert_relative_eq!(b.wimp_mass(), 50.0, max_relative = 1e-12);

        let fit = FitParameterSet::first(2).unwrap();
        let p = b.point_for(&fit, &[2.0, -44.0]).unwrap();
        assert_relative_eq!(p.wimp_mass, 100.0, max_relative = 1e-12);
        assert_relative_eq!(p.cross_section, 1e-44, max_relative = 1e-12);
        assert!(p.halo.is_none());

        let fit = FitParameterSet::first(3).unwrap();
        let p = b.point_for(&fit, &[2.0, -44.0, 250.0]).unwrap();
        let halo = p.halo.unwrap();
        assert_eq!(halo.v_0, 250.0);
        assert_eq!(halo.v_esc, 544.0);

        assert!(b.point_for(&fit, &[1.0]).is_err());
    }
}
