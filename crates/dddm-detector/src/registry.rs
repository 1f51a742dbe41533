//! Read-only table of known detectors.
//!
//! The table is built once by [`DetectorRegistry::standard`] and never mutated
//! afterwards; [`detector`] looks entries up in the process-wide instance.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use dddm_core::{Error, Result};

use crate::detector::{Background, DetectorConfig, Material, Resolution};

const XE_RES: Resolution = Resolution::SqrtScaled { coefficient: 0.6 };
const AR_RES: Resolution = Resolution::SqrtScaled { coefficient: 0.7 };
const GE_RES: Resolution = Resolution::Quadrature { constant: 0.3, slope: 0.06 };
// arXiv:1808.09098, table II (eV converted to keV).
const CDMS_LITE_RES: Resolution = Resolution::CdmsLite { sigma_e: 10.0e-3, a: 5.0e-3, b: 0.85e-3 };
// arXiv:1610.00006: 10 eV.
const SUPER_CDMS_RES: Resolution = Resolution::Constant { sigma: 10.0e-3 };

// Flat XENON1T-like ER background, 10x below arXiv:1904.11290.
const XENON1T_BG: Background = Background::Flat { rate: 80.0 / 10.0 };
const DARKSIDE_BG: Background = Background::Flat { rate: 1e4 * 80.0 / 10.0 };
// SuperCDMS (arXiv:1610.00006, Fig. 4 / Table V): counts/kg/keV/yr -> per tonne.
const IZIP_GE_BG: Background = Background::FlatBelow { rate: 22.0 * 1.0e3, max_energy: 20.0 };
const HV_GE_BG: Background = Background::FlatBelow { rate: 27.0 * 1.0e3, max_energy: 20.0 };

/// Immutable name → detector table.
#[derive(Debug, Clone)]
pub struct DetectorRegistry {
    entries: BTreeMap<String, DetectorConfig>,
}

impl DetectorRegistry {
    /// Build the standard table.
    ///
    /// Every background-capable entry whose interaction type is not already a
    /// background type also gets a `<name>_bg` copy with background enabled.
    pub fn standard() -> Result<Self> {
        let base: Vec<(DetectorConfig, Option<Background>)> = vec![
            (DetectorConfig::new("Xe", Material::Xe, "SI", 5.0, 0.8, 0.5, 10.0, XE_RES)?, None),
            (DetectorConfig::new("Ge", Material::Ge, "SI", 3.0, 0.8, 0.9, 10.0, GE_RES)?, None),
            (DetectorConfig::new("Ar", Material::Ar, "SI", 10.0, 0.8, 0.8, 30.0, AR_RES)?, None),
            (
                // 5 tonne x 5 yr, threshold from arXiv:1907.12771.
                DetectorConfig::new("Xe_migd", Material::Xe, "migdal", 25.0, 0.8, 0.5, 1.4, XE_RES)?
                    .with_location("XENON"),
                Some(XENON1T_BG),
            ),
            (
                // 100 kg yr; threshold similar to CDMSlite.
                DetectorConfig::new("Ge_migd", Material::Ge, "migdal", 0.1, 0.8, 0.9, 0.07, CDMS_LITE_RES)?
                    .with_location("SUF"),
                Some(Background::CdmsStep),
            ),
            (
                DetectorConfig::new("Ar_migd", Material::Ar, "migdal", 50.0, 0.8, 0.8, 3.0, AR_RES)?
                    .with_location("XENON"),
                Some(DARKSIDE_BG),
            ),
            (
                DetectorConfig::new("Xe_migd_bg", Material::Xe, "migdal_bg", 25.0, 0.8, 1.0, 1.0, XE_RES)?
                    .with_location("XENON"),
                Some(XENON1T_BG),
            ),
            (
                DetectorConfig::new(
                    "Ge_migd_iZIP_Ge_bg",
                    Material::Ge,
                    "migdal_bg",
                    56.0e-3,
                    0.75,
                    0.5,
                    0.35,
                    SUPER_CDMS_RES,
                )?
                .with_location("SNOLAB"),
                Some(IZIP_GE_BG),
            ),
            (
                DetectorConfig::new(
                    "Ge_migd_HV_bg",
                    Material::Ge,
                    "migdal_bg",
                    44.0e-3,
                    0.85,
                    0.5,
                    0.1,
                    SUPER_CDMS_RES,
                )?
                .with_location("SNOLAB"),
                Some(HV_GE_BG),
            ),
        ];

        let explicit: Vec<String> = base.iter().map(|(d, _)| d.name().to_string()).collect();
        let mut entries = BTreeMap::new();
        for (det, bg) in base {
            let has_bg_type = det.interaction().contains("bg");
            if let Some(bg) = bg {
                let bg_name = format!("{}_bg", det.name());
                if !has_bg_type && !explicit.contains(&bg_name) {
                    let bg_type = format!("{}_bg", det.interaction());
                    let variant = det.renamed(bg_name.clone(), bg_type).with_background(bg);
                    entries.insert(bg_name, variant);
                }
            }
            let det = match bg {
                Some(bg) if has_bg_type => det.with_background(bg),
                _ => det,
            };
            entries.insert(det.name().to_string(), det);
        }
        Ok(Self { entries })
    }

    /// Look a detector up by name.
    pub fn get(&self, name: &str) -> Result<&DetectorConfig> {
        self.entries.get(name).ok_or_else(|| {
            Error::Config(format!(
                "unknown detector '{}', choose one of {:?}",
                name,
                self.names().collect::<Vec<_>>()
            ))
        })
    }

    /// Detector names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// All entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = &DetectorConfig> {
        self.entries.values()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

static REGISTRY: OnceLock<Result<DetectorRegistry>> = OnceLock::new();

/// The process-wide standard registry.
pub fn registry() -> Result<&'static DetectorRegistry> {
    match REGISTRY.get_or_init(DetectorRegistry::standard) {
        Ok(r) => Ok(r),
        Err(e) => Err(Error::Config(format!("detector table is invalid: {}", e))),
    }
}

/// Look up a detector in the process-wide registry.
pub fn detector(name: &str) -> Result<&'static DetectorConfig> {
    registry()?.get(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_standard_entries() {
        let r = DetectorRegistry::standard().unwrap();
        let names: Vec<&str> = r.names().collect();
        for expected in [
            "Ar",
            "Ar_migd",
            "Ar_migd_bg",
            "Ge",
            "Ge_migd",
            "Ge_migd_HV_bg",
            "Ge_migd_bg",
            "Ge_migd_iZIP_Ge_bg",
            "Xe",
            "Xe_migd",
            "Xe_migd_bg",
        ] {
            assert!(names.contains(&expected), "missing {expected}: {names:?}");
        }
        assert_eq!(r.len(), 11);
    }

    #[test]
    fn test_background_only_for_bg_types() {
        let r = DetectorRegistry::standard().unwrap();
        for d in r.iter() {
            assert_eq!(
                d.background().is_some(),
                d.interaction().contains("bg"),
                "{} ({})",
                d.name(),
                d.interaction()
            );
            assert!(d.effective_exposure() <= d.exposure());
        }
    }

    #[test]
    fn test_bg_variant_is_copy() {
        let r = DetectorRegistry::standard().unwrap();
        let base = r.get("Ge_migd").unwrap();
        let bg = r.get("Ge_migd_bg").unwrap();
        assert_eq!(bg.interaction(), "migdal_bg");
        assert_eq!(bg.exposure(), base.exposure());
        assert_eq!(bg.energy_threshold(), base.energy_threshold());
        assert_eq!(bg.background(), Some(&Background::CdmsStep));
    }

    #[test]
    fn test_xe_values() {
        let xe = detector("Xe").unwrap();
        assert_relative_eq!(xe.effective_exposure(), 5.0 * 0.8 * 0.5);
        assert_eq!(xe.energy_threshold(), 10.0);
        assert_eq!(xe.material(), Material::Xe);
    }

    #[test]
    fn test_unknown_detector_is_config_error() {
        let err = detector("Pb").unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("Xe"));
    }

    #[test]
    fn test_registry_is_shared() {
        let a = registry().unwrap() as *const DetectorRegistry;
        let b = registry().unwrap() as *const DetectorRegistry;
        assert_eq!(a, b);
    }
}
