//! Theoretical recoil spectra implementing [`SpectrumModel`].
//!
//! - [`FlatSpectrum`]: constant differential rate, independent of the WIMP point.
//! - [`StandardHaloModel`]: Lewin–Smith exponential approximation of the
//!   spin-independent rate in a Maxwellian halo with a finite escape velocity.
//!   No nuclear form factor is applied.

use dddm_core::{Error, HaloParameters, Result, SpectrumModel};
use statrs::function::erf::erf;

use crate::detector::Material;

const AMU_GEV: f64 = 0.931_494_102;
const PROTON_MASS_GEV: f64 = 0.938_272_088;
const SPEED_OF_LIGHT_KM_S: f64 = 299_792.458;
const AVOGADRO: f64 = 6.022_140_76e23;
const SECONDS_PER_YEAR: f64 = 3.155_76e7;
const KG_PER_TONNE: f64 = 1.0e3;
const CM_PER_KM: f64 = 1.0e5;
const TWO_OVER_SQRT_PI: f64 = std::f64::consts::FRAC_2_SQRT_PI;

fn check_point(wimp_mass: f64, cross_section: f64) -> Result<()> {
    if !wimp_mass.is_finite() || wimp_mass <= 0.0 {
        return Err(Error::Validation(format!("wimp_mass must be finite and > 0, got {}", wimp_mass)));
    }
    if !cross_section.is_finite() || cross_section < 0.0 {
        return Err(Error::Validation(format!(
            "cross_section must be finite and >= 0, got {}",
            cross_section
        )));
    }
    Ok(())
}

/// Constant differential rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlatSpectrum {
    /// Rate, events / (keV · tonne · year).
    pub rate: f64,
}

impl FlatSpectrum {
    /// New flat spectrum.
    pub fn new(rate: f64) -> Self {
        Self { rate }
    }
}

impl SpectrumModel for FlatSpectrum {
    fn rate(&self, bin_centers: &[f64], wimp_mass: f64, cross_section: f64) -> Result<Vec<f64>> {
        check_point(wimp_mass, cross_section)?;
        Ok(vec![self.rate; bin_centers.len()])
    }

    fn name(&self) -> &str {
        "flat"
    }
}

/// Spin-independent WIMP–nucleus rate in the standard halo.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardHaloModel {
    mass_number: f64,
    halo: HaloParameters,
}

impl StandardHaloModel {
    /// Model for a target of mass number `mass_number`.
    pub fn new(mass_number: f64) -> Result<Self> {
        if !mass_number.is_finite() || mass_number < 1.0 {
            return Err(Error::Validation(format!("mass_number must be >= 1, got {}", mass_number)));
        }
        Ok(Self { mass_number, halo: HaloParameters::FIDUCIAL })
    }

    /// Model for a detector material.
    pub fn for_material(material: Material) -> Self {
        Self { mass_number: material.mass_number(), halo: HaloParameters::FIDUCIAL }
    }

    /// Replace the fiducial halo.
    pub fn with_fiducial_halo(mut self, halo: HaloParameters) -> Self {
        self.halo = halo;
        self
    }

    /// Target mass number.
    pub fn mass_number(&self) -> f64 {
        self.mass_number
    }

    /// `dR/dE` at one energy (keV), events / (keV · tonne · year).
    fn differential_rate(&self, energies: &[f64], wimp_mass: f64, sigma_p: f64, halo: &HaloParameters) -> Vec<f64> {
        let a = self.mass_number;
        let m_n = a * AMU_GEV;
        let mu_n = wimp_mass * m_n / (wimp_mass + m_n);
        let mu_p = wimp_mass * PROTON_MASS_GEV / (wimp_mass + PROTON_MASS_GEV);
        let sigma_0 = sigma_p * a * a * (mu_n / mu_p).powi(2);
        let r = 4.0 * wimp_mass * m_n / (wimp_mass + m_n).powi(2);

        let beta_0 = halo.v_0 / SPEED_OF_LIGHT_KM_S;
        let e_0 = 0.5 * wimp_mass * 1.0e6 * beta_0 * beta_0;
        let e_0_r = e_0 * r;

        let targets_per_kg = AVOGADRO * 1.0e3 / a;
        let number_density = halo.density / wimp_mass;
        let r_0 = TWO_OVER_SQRT_PI * targets_per_kg * number_density * sigma_0 * halo.v_0 * CM_PER_KM;
        let r_0 = r_0 * KG_PER_TONNE * SECONDS_PER_YEAR;

        let z = halo.v_esc / halo.v_0;
        let escape_floor = (-z * z).exp();
        let k_ratio = 1.0 / (erf(z) - TWO_OVER_SQRT_PI * z * escape_floor);
        let norm = k_ratio * r_0 / e_0_r;

        energies.iter().map(|&e| (norm * ((-e / e_0_r).exp() - escape_floor)).max(0.0)).collect()
    }
}

impl SpectrumModel for StandardHaloModel {
    fn rate(&self, bin_centers: &[f64], wimp_mass: f64, cross_section: f64) -> Result<Vec<f64>> {
        self.rate_with_halo(bin_centers, wimp_mass, cross_section, &self.halo)
    }

    fn rate_with_halo(
        &self,
        bin_centers: &[f64],
        wimp_mass: f64,
        cross_section: f64,
        halo: &HaloParameters,
    ) -> Result<Vec<f64>> {
        check_point(wimp_mass, cross_section)?;
        halo.validate()?;
        if halo.v_esc <= halo.v_0 {
            return Err(Error::Validation(format!(
                "v_esc ({}) must exceed v_0 ({})",
                halo.v_esc, halo.v_0
            )));
        }
        Ok(self.differential_rate(bin_centers, wimp_mass, cross_section, halo))
    }

    fn fiducial_halo(&self) -> Option<HaloParameters> {
        Some(self.halo)
    }

    fn name(&self) -> &str {
        "shm"
    }
}
