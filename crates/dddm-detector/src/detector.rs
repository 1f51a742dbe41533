//! Detector profiles: exposure, efficiencies, threshold, resolution, background.

use std::fmt;

use dddm_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::binning::linspace;

/// Target material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Material {
    /// Xenon.
    Xe,
    /// Germanium.
    Ge,
    /// Argon.
    Ar,
    /// Silicon.
    Si,
}

impl Material {
    /// Standard atomic weight (mass number used for the target nucleus).
    pub fn mass_number(self) -> f64 {
        match self {
            Material::Xe => 131.293,
            Material::Ge => 72.630,
            Material::Ar => 39.948,
            Material::Si => 28.085,
        }
    }

    /// Atomic number.
    pub fn atomic_number(self) -> u32 {
        match self {
            Material::Xe => 54,
            Material::Ge => 32,
            Material::Ar => 18,
            Material::Si => 14,
        }
    }
}

impl fmt::Display for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Material::Xe => "Xe",
            Material::Ge => "Ge",
            Material::Ar => "Ar",
            Material::Si => "Si",
        };
        f.write_str(s)
    }
}

/// Energy resolution `σ(E)` (keV in, keV out).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    /// `c · √E`.
    SqrtScaled {
        /// Coefficient `c`.
        coefficient: f64,
    },
    /// `√(constant² + slope² · E)`.
    Quadrature {
        /// Energy-independent term.
        constant: f64,
        /// Coefficient of the √E term.
        slope: f64,
    },
    /// CDMS-lite parameterisation `√(σ_e² + b·E + (a·E)²)`.
    CdmsLite {
        /// Baseline resolution.
        sigma_e: f64,
        /// Dimensionless linear term.
        a: f64,
        /// Fano-like term.
        b: f64,
    },
    /// Energy-independent `σ`.
    Constant {
        /// The resolution.
        sigma: f64,
    },
}

impl Resolution {
    /// `σ(E)`.
    #[inline]
    pub fn sigma(&self, energy: f64) -> f64 {
        match *self {
            Resolution::SqrtScaled { coefficient } => coefficient * energy.sqrt(),
            Resolution::Quadrature { constant, slope } => {
                (constant * constant + slope * slope * energy).sqrt()
            }
            Resolution::CdmsLite { sigma_e, a, b } => {
                (sigma_e * sigma_e + b * energy + (a * energy) * (a * energy)).sqrt()
            }
            Resolution::Constant { sigma } => sigma,
        }
    }

    /// `σ` at every energy; fails on NaN or negative values.
    pub fn sigmas(&self, energies: &[f64]) -> Result<Vec<f64>> {
        energies
            .iter()
            .map(|&e| {
                let s = self.sigma(e);
                if !s.is_finite() || s < 0.0 {
                    return Err(Error::Validation(format!(
                        "resolution {:?} gave sigma={} at E={} keV",
                        self, s, e
                    )));
                }
                Ok(s)
            })
            .collect()
    }
}

/// Background rate in events / (keV · tonne · year) at total exposure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Background {
    /// Flat over the whole range.
    Flat {
        /// Rate.
        rate: f64,
    },
    /// Flat, only valid while `e_max < max_energy`.
    FlatBelow {
        /// Rate.
        rate: f64,
        /// Upper end of the validated energy range (keV).
        max_energy: f64,
    },
    /// CDMS step function (per kg·day·keV), converted to tonne·year.
    CdmsStep,
}

impl Background {
    /// Per-bin background for `n_bins` bins over `[e_min, e_max]`.
    pub fn evaluate(&self, e_min: f64, e_max: f64, n_bins: usize) -> Result<Vec<f64>> {
        match *self {
            Background::Flat { rate } => Ok(vec![rate; n_bins]),
            Background::FlatBelow { rate, max_energy } => {
                if !(e_max < max_energy) {
                    return Err(Error::Config(format!(
                        "flat background is only defined below {} keV, requested e_max={}",
                        max_energy, e_max
                    )));
                }
                Ok(vec![rate; n_bins])
            }
            Background::CdmsStep => {
                // Sampled on inclusive linspace points, not bin centers.
                let to_tonne_year = 1.0e-3 / 365.25;
                Ok(linspace(e_min, e_max, n_bins)
                    .into_iter()
                    .map(|e| cdms_step(e) * to_tonne_year)
                    .collect())
            }
        }
    }
}

fn cdms_step(energy: f64) -> f64 {
    if energy < 3.0 {
        0.9
    } else if energy < 5.0 {
        0.1
    } else {
        0.01
    }
}

/// Immutable description of one detector.
///
/// The effective exposure `exposure · cut_efficiency · nr_efficiency` is
/// computed once at construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectorConfig {
    name: String,
    material: Material,
    interaction: String,
    exposure: f64,
    cut_efficiency: f64,
    nr_efficiency: f64,
    energy_threshold: f64,
    resolution: Resolution,
    #[serde(skip_serializing_if = "Option::is_none")]
    background: Option<Background>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<String>,
    effective_exposure: f64,
}

impl DetectorConfig {
    /// Validate and build a detector without background.
    ///
    /// `exposure` in tonne·year, `energy_threshold` in keV, both efficiencies in `[0, 1]`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        material: Material,
        interaction: impl Into<String>,
        exposure: f64,
        cut_efficiency: f64,
        nr_efficiency: f64,
        energy_threshold: f64,
        resolution: Resolution,
    ) -> Result<Self> {
        let name = name.into();
        if !exposure.is_finite() || exposure <= 0.0 {
            return Err(Error::Validation(format!("{}: exposure must be > 0, got {}", name, exposure)));
        }
        for (label, eff) in [("cut_efficiency", cut_efficiency), ("nr_efficiency", nr_efficiency)] {
            if !(0.0..=1.0).contains(&eff) {
                return Err(Error::Validation(format!("{}: {} must be in [0, 1], got {}", name, label, eff)));
            }
        }
        if !energy_threshold.is_finite() || energy_threshold < 0.0 {
            return Err(Error::Validation(format!(
                "{}: energy_threshold must be >= 0, got {}",
                name, energy_threshold
            )));
        }
        let effective_exposure = exposure * cut_efficiency * nr_efficiency;
        Ok(Self {
            name,
            material,
            interaction: interaction.into(),
            exposure,
            cut_efficiency,
            nr_efficiency,
            energy_threshold,
            resolution,
            background: None,
            location: None,
            effective_exposure,
        })
    }

    /// Attach a background function.
    pub fn with_background(mut self, background: Background) -> Self {
        self.background = Some(background);
        self
    }

    /// Attach a laboratory location tag.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Copy under a new name and interaction tag.
    pub fn renamed(&self, name: impl Into<String>, interaction: impl Into<String>) -> Self {
        Self { name: name.into(), interaction: interaction.into(), ..self.clone() }
    }

    /// Detector name (registry key).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Target material.
    pub fn material(&self) -> Material {
        self.material
    }

    /// Interaction type tag (e.g. `SI`, `migdal_bg`).
    pub fn interaction(&self) -> &str {
        &self.interaction
    }

    /// Total exposure, tonne·year.
    pub fn exposure(&self) -> f64 {
        self.exposure
    }

    /// Cut efficiency.
    pub fn cut_efficiency(&self) -> f64 {
        self.cut_efficiency
    }

    /// Nuclear-recoil acceptance.
    pub fn nr_efficiency(&self) -> f64 {
        self.nr_efficiency
    }

    /// `exposure · cut_efficiency · nr_efficiency`.
    pub fn effective_exposure(&self) -> f64 {
        self.effective_exposure
    }

    /// Energy threshold, keV.
    pub fn energy_threshold(&self) -> f64 {
        self.energy_threshold
    }

    /// Resolution function.
    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    /// Background function, if the detector adds one.
    pub fn background(&self) -> Option<&Background> {
        self.background.as_ref()
    }

    /// Location tag.
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn xe() -> DetectorConfig {
        DetectorConfig::new(
            "Xe",
            Material::Xe,
            "SI",
            5.0,
            0.8,
            0.5,
            10.0,
            Resolution::SqrtScaled { coefficient: 0.6 },
        )
        .unwrap()
    }

    #[test]
    fn test_effective_exposure() {
        let d = xe();
        assert_relative_eq!(d.effective_exposure(), 2.0, epsilon = 1e-12);
        assert!(d.effective_exposure() <= d.exposure());
        assert!(d.background().is_none());
    }

    #[test]
    fn test_invalid_detector() {
        let r = Resolution::Constant { sigma: 1.0 };
        assert!(DetectorConfig::new("x", Material::Xe, "SI", 0.0, 0.5, 0.5, 1.0, r).is_err());
        assert!(DetectorConfig::new("x", Material::Xe, "SI", 1.0, 1.5, 0.5, 1.0, r).is_err());
        assert!(DetectorConfig::new("x", Material::Xe, "SI", 1.0, 0.5, -0.1, 1.0, r).is_err());
        assert!(DetectorConfig::new("x", Material::Xe, "SI", 1.0, 0.5, 0.5, -1.0, r).is_err());
    }

    #[test]
    fn test_resolutions() {
        assert_relative_eq!(Resolution::SqrtScaled { coefficient: 0.6 }.sigma(4.0), 1.2);
        let ge = Resolution::Quadrature { constant: 0.3, slope: 0.06 };
        assert_relative_eq!(ge.sigma(0.0), 0.3, epsilon = 1e-15);
        assert_relative_eq!(ge.sigma(100.0), (0.09f64 + 0.36).sqrt(), epsilon = 1e-15);
        assert_eq!(Resolution::Constant { sigma: 0.01 }.sigma(123.0), 0.01);
        assert!(Resolution::SqrtScaled { coefficient: 0.6 }.sigmas(&[-1.0]).is_err());
    }

    #[test]
    fn test_backgrounds() {
        let flat = Background::Flat { rate: 8.0 };
        assert_eq!(flat.evaluate(0.0, 5.0, 3).unwrap(), vec![8.0; 3]);

        let hv = Background::FlatBelow { rate: 27e3, max_energy: 20.0 };
        assert_eq!(hv.evaluate(0.0, 5.0, 2).unwrap(), vec![27e3; 2]);
        assert!(hv.evaluate(0.0, 20.0, 2).unwrap_err().is_config());

        let cdms = Background::CdmsStep.evaluate(0.0, 10.0, 3).unwrap();
        let k = 1.0e-3 / 365.25;
        assert_relative_eq!(cdms[0], 0.9 * k);
        assert_relative_eq!(cdms[1], 0.01 * k); // linspace point 5.0
        assert_relative_eq!(cdms[2], 0.01 * k);
    }

    #[test]
    fn test_serialize_detector() {
        let d = xe().with_background(Background::Flat { rate: 1.0 }).with_location("LNGS");
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["material"], "Xe");
        assert_eq!(v["resolution"]["kind"], "sqrt_scaled");
        assert_eq!(v["background"]["kind"], "flat");
        assert_eq!(v["location"], "LNGS");
    }
}
