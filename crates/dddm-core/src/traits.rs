//! Core traits for DDDM
//!
//! The forward model and the samplers meet at two seams: a recoil-rate
//! model ([`SpectrumModel`]) consumed by the detector pipeline, and a
//! log-likelihood ([`LogLikelihood`]) consumed by the sampling backends.
//! Neither side depends on the concrete implementation of the other.

use crate::types::{HaloParameters, RecoilPoint};
use crate::{Error, Result};

/// Theoretical differential recoil rate.
///
/// Implementations must return one value per requested energy, in
/// events / (keV · tonne · year), and must be callable repeatedly with
/// different bin granularities.
pub trait SpectrumModel: Send + Sync {
    /// Rate at `bin_centers` (keV) for the model's fiducial halo.
    fn rate(&self, bin_centers: &[f64], wimp_mass: f64, cross_section: f64) -> Result<Vec<f64>>;

    /// Rate at `bin_centers` (keV) for an explicit halo.
    ///
    /// Models that have no halo dependence keep the default, which refuses.
    fn rate_with_halo(
        &self,
        _bin_centers: &[f64],
        _wimp_mass: f64,
        _cross_section: f64,
        _halo: &HaloParameters,
    ) -> Result<Vec<f64>> {
        Err(Error::NotImplemented(format!("{} has no halo parameters", self.name())))
    }

    /// Halo the model assumes when none is given; `None` if halo-independent.
    fn fiducial_halo(&self) -> Option<HaloParameters> {
        None
    }

    /// Evaluate at a [`RecoilPoint`], dispatching on the halo override.
    fn rate_at(&self, bin_centers: &[f64], point: &RecoilPoint) -> Result<Vec<f64>> {
        match &point.halo {
            Some(halo) => self.rate_with_halo(bin_centers, point.wimp_mass, point.cross_section, halo),
            None => self.rate(bin_centers, point.wimp_mass, point.cross_section),
        }
    }

    /// Model name (e.g. "flat", "shm").
    fn name(&self) -> &str;
}

/// Log-likelihood over a physical parameter vector.
///
/// Evaluations must be pure: samplers may call this concurrently from
/// several threads and in any order.
pub trait LogLikelihood: Send + Sync {
    /// Number of parameters.
    fn n_parameters(&self) -> usize;

    /// Parameter names, in order.
    fn parameter_names(&self) -> Vec<String>;

    /// `ln L(params)`.
    fn log_likelihood(&self, params: &[f64]) -> Result<f64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DummyModel;

    impl SpectrumModel for DummyModel {
        fn rate(&self, bin_centers: &[f64], _wimp_mass: f64, _cross_section: f64) -> Result<Vec<f64>> {
            Ok(vec![1.0; bin_centers.len()])
        }

        fn name(&self) -> &str {
            "dummy"
        }
    }

    #[test]
    fn test_dummy_model_refuses_halo() {
        let m = DummyModel;
        let p = RecoilPoint::new(50.0, 1e-45);
        assert_eq!(m.rate_at(&[1.0, 2.0], &p).unwrap(), vec![1.0, 1.0]);

        let p = p.with_halo(HaloParameters::FIDUCIAL);
        assert!(matches!(m.rate_at(&[1.0], &p), Err(Error::NotImplemented(_))));
        assert!(m.fiducial_halo().is_none());
    }
}
