//! Lindhard nuclear-recoil quenching factors (arXiv:1608.05381).

use crate::detector::Material;

/// Lindhard `k` for the materials it is tabulated for.
pub fn lindhard_k(material: Material) -> Option<f64> {
    match material {
        Material::Xe => Some(0.1735),
        Material::Ge => Some(0.162),
        Material::Si => Some(0.161),
        Material::Ar => None,
    }
}

/// Quenching factor `k·g / (1 + k·g)` at nuclear-recoil energy `e_nr` (keV).
///
/// `ε = 11.5 E Z^(-7/3)`, `g = 3ε^0.15 + 0.7ε^0.6 + ε`.
pub fn lindhard_factor(e_nr: f64, k: f64, atomic_number: u32) -> f64 {
    let eps = 11.5 * e_nr * (atomic_number as f64).powf(-7.0 / 3.0);
    let g = 3.0 * eps.powf(0.15) + 0.7 * eps.powf(0.6) + eps;
    k * g / (1.0 + k * g)
}

/// Quenching factor for a material, if tabulated.
pub fn quenching_factor(material: Material, e_nr: f64) -> Option<f64> {
    lindhard_k(material).map(|k| lindhard_factor(e_nr, k, material.atomic_number()))
}
