//! Poisson toy spectra.
//!
//! A toy is one Poisson draw per bin around the expected counts; it stands in
//! for an observed dataset and is never used as the model prediction.

use dddm_core::{Error, Result};
use rand::SeedableRng;
use rand_distr::{Distribution, Poisson};

use crate::convolution::SpectrumResult;

/// One Poisson-fluctuated count vector around `expected`.
///
/// Non-positive or non-finite means draw 0. The same `seed` always yields
/// the same counts.
pub fn poisson_counts(expected: &[f64], seed: u64) -> Result<Vec<f64>> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    expected
        .iter()
        .map(|&lam| {
            if !lam.is_finite() || lam <= 0.0 {
                return Ok(0.0);
            }
            let pois = Poisson::new(lam)
                .map_err(|e| Error::Numerical(format!("cannot sample Poisson({}): {}", lam, e)))?;
            Ok(pois.sample(&mut rng))
        })
        .collect()
}

/// Poisson draw of a whole spectrum, on the same binning.
pub fn poisson_resample(spectrum: &SpectrumResult, seed: u64) -> Result<SpectrumResult> {
    let counts = poisson_counts(&spectrum.counts, seed)?;
    SpectrumResult::new(spectrum.binning.clone(), counts)
}

/// `n_toys` independent draws; toy `i` uses seed `seed + i`.
pub fn poisson_toys(spectrum: &SpectrumResult, n_toys: usize, seed: u64) -> Result<Vec<SpectrumResult>> {
    (0..n_toys).map(|i| poisson_resample(spectrum, seed.wrapping_add(i as u64))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binning::EnergyBinning;

    fn spectrum() -> SpectrumResult {
        let b = EnergyBinning::new(0.0, 50.0, 5).unwrap();
        SpectrumResult::new(b, vec![0.0, 3.5, 40.0, 1e3, 0.2]).unwrap()
    }

    #[test]
    fn test_reproducible_for_seed() {
        let s = spectrum();
        let a = poisson_resample(&s, 42).unwrap();
        let b = poisson_resample(&s, 42).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.binning, s.binning);
    }

    #[test]
    fn test_counts_are_integers_and_zero_mean_is_zero() {
        let c = poisson_counts(&[0.0, -1.0, f64::NAN, 12.0], 7).unwrap();
        assert_eq!(&c[..3], &[0.0, 0.0, 0.0]);
        assert_eq!(c[3].fract(), 0.0);
    }

    #[test]
    fn test_toys_use_distinct_seeds() {
        let s = spectrum();
        let toys = poisson_toys(&s, 4, 100).unwrap();
        assert_eq!(toys.len(), 4);
        assert_eq!(toys[1], poisson_resample(&s, 101).unwrap());
        assert!(toys.iter().any(|t| t.counts != toys[0].counts));
    }
}
