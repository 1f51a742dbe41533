//! Linear energy binning.

use dddm_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// `N` equal-width energy bins spanning `[e_min, e_max]` (keV).
///
/// Edges are strictly increasing, centers are the midpoints of the edge
/// pairs and the widths sum to `e_max - e_min`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyBinning {
    /// Lower edge of the first bin.
    pub e_min: f64,
    /// Upper edge of the last bin.
    pub e_max: f64,
    /// Number of bins.
    pub n_bins: usize,
}

impl EnergyBinning {
    /// Validate and build a binning.
    pub fn new(e_min: f64, e_max: f64, n_bins: usize) -> Result<Self> {
        if !e_min.is_finite() || !e_max.is_finite() {
            return Err(Error::Validation(format!(
                "energy range must be finite, got [{}, {}]",
                e_min, e_max
            )));
        }
        if !(e_min < e_max) {
            return Err(Error::Validation(format!(
                "energy range must satisfy e_min < e_max, got [{}, {}]",
                e_min, e_max
            )));
        }
        if n_bins == 0 {
            return Err(Error::Validation("n_bins must be >= 1".to_string()));
        }
        Ok(Self { e_min, e_max, n_bins })
    }

    /// Width of every bin.
    #[inline]
    pub fn bin_width(&self) -> f64 {
        (self.e_max - self.e_min) / self.n_bins as f64
    }

    /// Bin edges (length `n_bins + 1`). The last edge is exactly `e_max`.
    pub fn edges(&self) -> Vec<f64> {
        let w = self.bin_width();
        let mut edges: Vec<f64> = (0..=self.n_bins).map(|i| self.e_min + i as f64 * w).collect();
        edges[self.n_bins] = self.e_max;
        edges
    }

    /// `(left, right)` edge pair of every bin.
    pub fn edge_pairs(&self) -> Vec<(f64, f64)> {
        let edges = self.edges();
        edges.windows(2).map(|w| (w[0], w[1])).collect()
    }

    /// Bin centers (length `n_bins`).
    pub fn centers(&self) -> Vec<f64> {
        self.edge_pairs().iter().map(|&(l, r)| 0.5 * (l + r)).collect()
    }

    /// Per-bin widths (length `n_bins`).
    pub fn widths(&self) -> Vec<f64> {
        self.edge_pairs().iter().map(|&(l, r)| r - l).collect()
    }

    /// The same range split into `factor` times as many bins.
    pub fn oversampled(&self, factor: usize) -> Result<Self> {
        if factor == 0 {
            return Err(Error::Validation("oversampling factor must be >= 1".to_string()));
        }
        Self::new(self.e_min, self.e_max, self.n_bins * factor)
    }
}

/// `n` evenly spaced points from `start` to `stop`, both inclusive.
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            let mut out: Vec<f64> = (0..n).map(|i| start + i as f64 * step).collect();
            out[n - 1] = stop;
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_simple_binning() {
        let b = EnergyBinning::new(0.0, 100.0, 10).unwrap();
        assert_eq!(b.edges().len(), 11);
        assert_eq!(b.centers()[0], 5.0);
        assert_eq!(b.centers()[9], 95.0);
        assert_eq!(b.edge_pairs()[3], (30.0, 40.0));
        assert_relative_eq!(b.bin_width(), 10.0);
    }

    #[test]
    fn test_invalid_binning() {
        assert!(EnergyBinning::new(10.0, 10.0, 5).is_err());
        assert!(EnergyBinning::new(10.0, 5.0, 5).is_err());
        assert!(EnergyBinning::new(0.0, 10.0, 0).is_err());
        assert!(EnergyBinning::new(f64::NAN, 10.0, 3).is_err());
    }

    #[test]
    fn test_oversampled_aligns() {
        let b = EnergyBinning::new(0.0, 50.0, 5).unwrap();
        let fine = b.oversampled(10).unwrap();
        assert_eq!(fine.n_bins, 50);
        let coarse_edges = b.edges();
        let fine_edges = fine.edges();
        for (i, e) in coarse_edges.iter().enumerate() {
            assert_relative_eq!(fine_edges[i * 10], *e, epsilon = 1e-12);
        }
        assert!(b.oversampled(0).is_err());
    }

    #[test]
    fn test_linspace() {
        assert_eq!(linspace(0.0, 1.0, 0), Vec::<f64>::new());
        assert_eq!(linspace(2.0, 3.0, 1), vec![2.0]);
        assert_eq!(linspace(0.0, 1.0, 5), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    proptest! {
        #[test]
        fn prop_binning_invariants(
            e_min in -50.0f64..50.0,
            span in 1e-3f64..500.0,
            n in 1usize..400,
        ) {
            let e_max = e_min + span;
            let b = EnergyBinning::new(e_min, e_max, n).unwrap();
            let centers = b.centers();
            prop_assert_eq!(centers.len(), n);
            for w in centers.windows(2) {
                prop_assert!(w[1] > w[0]);
            }
            let edges = b.edges();
            for w in edges.windows(2) {
                prop_assert!(w[1] > w[0]);
            }
            let total: f64 = b.widths().iter().sum();
            prop_assert!((total - span).abs() <= 1e-9 * span.max(1.0));
        }
    }
}
