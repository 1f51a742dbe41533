//! Common data types for DDDM

use serde::{Deserialize, Serialize};

/// Astrophysical parameters of the dark-matter halo.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HaloParameters {
    /// Most probable (circular) velocity, km/s.
    pub v_0: f64,
    /// Galactic escape velocity, km/s.
    pub v_esc: f64,
    /// Local dark-matter density, GeV/cm³.
    pub density: f64,
}

impl HaloParameters {
    /// Standard-halo values used as the fiducial truth.
    pub const FIDUCIAL: HaloParameters = HaloParameters { v_0: 230.0, v_esc: 544.0, density: 0.4 };

    /// Reject unphysical values before they reach a rate model.
    pub fn validate(&self) -> crate::Result<()> {
        let ok = |x: f64| x.is_finite() && x > 0.0;
        if !ok(self.v_0) || !ok(self.v_esc) || !ok(self.density) {
            return Err(crate::Error::Validation(format!(
                "halo parameters must be finite and > 0, got {:?}",
                self
            )));
        }
        Ok(())
    }
}

impl Default for HaloParameters {
    fn default() -> Self {
        Self::FIDUCIAL
    }
}

/// A point in WIMP parameter space at which a recoil spectrum is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecoilPoint {
    /// WIMP mass, GeV/c².
    pub wimp_mass: f64,
    /// WIMP-nucleon cross-section, cm².
    pub cross_section: f64,
    /// Halo override; `None` means the model's fiducial halo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halo: Option<HaloParameters>,
}

impl RecoilPoint {
    /// Point with the model's fiducial halo.
    pub fn new(wimp_mass: f64, cross_section: f64) -> Self {
        Self { wimp_mass, cross_section, halo: None }
    }

    /// Point with an explicit halo.
    pub fn with_halo(mut self, halo: HaloParameters) -> Self {
        self.halo = Some(halo);
        self
    }
}
