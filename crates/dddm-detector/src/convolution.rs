//! Detector response: theoretical rate → expected counts per output bin.
//!
//! The pipeline runs on a grid [`REBIN_FACTOR`] times finer than the
//! requested binning:
//!
//! 1. theoretical rate at the fine bin centers
//! 2. background (if the detector has one), rescaled to the effective-exposure basis
//! 3. per-bin resolution `σ(E)`
//! 4. Gaussian smearing (`O(n²)`, σ varies per bin so no FFT)
//! 5. threshold cut with fractional straddling bin
//! 6. rebin to the requested binning
//! 7. scale by the effective exposure
//!
//! Every function here is pure; a [`DetectorSpectrum`] can be shared across
//! threads and evaluated concurrently.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dddm_core::{Error, RecoilPoint, Result, SpectrumModel};
use dddm_prob::normal::INV_SQRT_2PI;
use serde::{Deserialize, Serialize};

use crate::binning::EnergyBinning;
use crate::detector::DetectorConfig;
use crate::toys;

/// Oversampling factor of the internal working grid.
pub const REBIN_FACTOR: usize = 10;

static UNDER_RESOLVED_WARNED: AtomicBool = AtomicBool::new(false);

/// Expected counts per bin, paired 1:1 with a binning.
///
/// No entry is negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumResult {
    /// Output binning.
    pub binning: EnergyBinning,
    /// Counts per bin.
    pub counts: Vec<f64>,
}

impl SpectrumResult {
    /// Pair `counts` with `binning`, clamping negative entries to zero.
    pub fn new(binning: EnergyBinning, counts: Vec<f64>) -> Result<Self> {
        if counts.len() != binning.n_bins {
            return Err(Error::Validation(format!(
                "counts length {} does not match n_bins {}",
                counts.len(),
                binning.n_bins
            )));
        }
        if let Some((i, c)) = counts.iter().enumerate().find(|(_, c)| !c.is_finite()) {
            return Err(Error::Numerical(format!("non-finite expected count {} in bin {}", c, i)));
        }
        let counts = counts.into_iter().map(|c| if c > 0.0 { c } else { 0.0 }).collect();
        Ok(Self { binning, counts })
    }

    /// Bin centers of the output binning.
    pub fn centers(&self) -> Vec<f64> {
        self.binning.centers()
    }

    /// Sum over all bins.
    pub fn total(&self) -> f64 {
        self.counts.iter().sum()
    }

    /// Number of bins.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// `true` if there are no bins.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Gaussian smearing of a rate density sampled at `centers`.
///
/// `out[i] = Σ_j w · rate[j] · N(centers[i]; centers[j], sigmas[j])`.
///
/// If any `σ` is below `bin_width` the kernel is under-resolved and `rate` is
/// returned unsmeared. The first occurrence in a process is logged at `warn`,
/// later ones at `debug`.
pub fn smear(rate: &[f64], centers: &[f64], sigmas: &[f64], bin_width: f64) -> Result<Vec<f64>> {
    let n = rate.len();
    if centers.len() != n || sigmas.len() != n {
        return Err(Error::Validation(format!(
            "smear: length mismatch (rate={}, centers={}, sigmas={})",
            n,
            centers.len(),
            sigmas.len()
        )));
    }
    if !bin_width.is_finite() || bin_width <= 0.0 {
        return Err(Error::Validation(format!("smear: bin_width must be > 0, got {}", bin_width)));
    }
    if sigmas.iter().any(|&s| s < bin_width) {
        let mean_sigma = sigmas.iter().sum::<f64>() / n.max(1) as f64;
        let level = if UNDER_RESOLVED_WARNED.swap(true, Ordering::Relaxed) {
            log::Level::Debug
        } else {
            log::Level::Warn
        };
        log::log!(
            level,
            "resolution below bin width (mean sigma={:.4} keV, bin width={:.4} keV); returning unsmeared rate",
            mean_sigma,
            bin_width
        );
        return Ok(rate.to_vec());
    }

    // Per-source amplitude and exponent scale.
    let amp: Vec<f64> =
        rate.iter().zip(sigmas).map(|(&r, &s)| bin_width * r * INV_SQRT_2PI / s).collect();
    let inv_two_var: Vec<f64> = sigmas.iter().map(|&s| 0.5 / (s * s)).collect();

    let mut out = vec![0.0; n];
    for (i, out_i) in out.iter_mut().enumerate() {
        let x = centers[i];
        let mut acc = 0.0;
        for j in 0..n {
            if amp[j] == 0.0 {
                continue;
            }
            let d = x - centers[j];
            acc += amp[j] * (-d * d * inv_two_var[j]).exp();
        }
        *out_i = acc;
    }
    Ok(out)
}

/// Fraction of the bin `(left, right)` that lies above `threshold`.
///
/// `1` if `left ≥ threshold`, `0` if `right ≤ threshold`, otherwise
/// `(right − threshold) / (right − left)`. Degenerate or NaN edges are an error.
pub fn acceptance_fraction(left: f64, right: f64, threshold: f64) -> Result<f64> {
    if !(left < right) {
        return Err(Error::Validation(format!("degenerate bin ({}, {})", left, right)));
    }
    if left >= threshold {
        Ok(1.0)
    } else if right <= threshold {
        Ok(0.0)
    } else if left <= threshold && threshold <= right {
        Ok((right - threshold) / (right - left))
    } else {
        Err(Error::Validation(format!(
            "threshold {} cannot be placed against bin ({}, {})",
            threshold, left, right
        )))
    }
}

/// Rate density on a fine grid whose bins may be partially cut.
///
/// A bin straddling the threshold keeps its density and has its lower edge
/// moved up to the threshold, so its content `rate · (right − left)` is the
/// original content times [`acceptance_fraction`]. Applying the same cut again
/// changes nothing. Rebinning still assigns bins by their original centers.
#[derive(Debug, Clone, PartialEq)]
pub struct FineSpectrum {
    centers: Vec<f64>,
    edges: Vec<(f64, f64)>,
    rate: Vec<f64>,
}

impl FineSpectrum {
    /// Rate density on `binning`.
    pub fn new(binning: &EnergyBinning, rate: Vec<f64>) -> Result<Self> {
        if rate.len() != binning.n_bins {
            return Err(Error::Validation(format!(
                "rate length {} does not match n_bins {}",
                rate.len(),
                binning.n_bins
            )));
        }
        let edges = binning.edge_pairs();
        let centers = edges.iter().map(|&(l, r)| 0.5 * (l + r)).collect();
        Ok(Self { centers, edges, rate })
    }

    /// Rate density per bin.
    pub fn rate(&self) -> &[f64] {
        &self.rate
    }

    /// Current `(left, right)` edges; the straddling bin may be narrowed.
    pub fn edges(&self) -> &[(f64, f64)] {
        &self.edges
    }

    /// Centers of the original, uncut bins.
    pub fn centers(&self) -> &[f64] {
        &self.centers
    }

    /// `rate · width` per bin.
    pub fn contents(&self) -> Vec<f64> {
        self.rate.iter().zip(&self.edges).map(|(&r, &(lo, hi))| r * (hi - lo)).collect()
    }

    /// Apply an energy threshold (keV).
    ///
    /// Bins are visited in increasing energy; the scan stops at the first bin
    /// entirely above threshold.
    pub fn apply_threshold(&mut self, threshold: f64) -> Result<()> {
        let mut prev_right = f64::NEG_INFINITY;
        for (edge, rate) in self.edges.iter_mut().zip(self.rate.iter_mut()) {
            let (left, right) = *edge;
            if left < prev_right {
                return Err(Error::Validation(format!(
                    "bins are not ordered: ({}, {}) after right edge {}",
                    left, right, prev_right
                )));
            }
            prev_right = right;

            let fraction = acceptance_fraction(left, right, threshold)?;
            if fraction == 1.0 {
                break;
            }
            if fraction == 0.0 {
                *rate = 0.0;
            } else {
                edge.0 = threshold;
            }
        }
        Ok(())
    }

    /// Integrate onto `output`: every fine bin whose center lies strictly
    /// inside an output bin adds `rate · width` to it.
    pub fn rebin(&self, output: &EnergyBinning) -> Vec<f64> {
        let out_edges = output.edge_pairs();
        let mut out = vec![0.0; out_edges.len()];
        let mut j = 0;
        for (k, &(lo, hi)) in out_edges.iter().enumerate() {
            while j < self.centers.len() && self.centers[j] <= lo {
                j += 1;
            }
            let mut acc = 0.0;
            let mut jj = j;
            while jj < self.centers.len() && self.centers[jj] < hi {
                let (l, r) = self.edges[jj];
                acc += self.rate[jj] * (r - l);
                jj += 1;
            }
            out[k] = acc;
            j = jj;
        }
        out
    }
}

/// Expected counts seen by `detector` for `model` at `point`, on `binning`.
pub fn compute_detected_spectrum(
    model: &dyn SpectrumModel,
    point: &RecoilPoint,
    binning: &EnergyBinning,
    detector: &DetectorConfig,
) -> Result<SpectrumResult> {
    let fine = binning.oversampled(REBIN_FACTOR)?;
    let centers = fine.centers();

    let mut rate = model.rate_at(&centers, point)?;
    if rate.len() != centers.len() {
        return Err(Error::Validation(format!(
            "{} returned {} rates for {} bins",
            model.name(),
            rate.len(),
            centers.len()
        )));
    }
    if let Some((i, r)) = rate.iter().enumerate().find(|(_, r)| !r.is_finite()) {
        return Err(Error::Numerical(format!(
            "{} produced rate {} at E={} keV ({:?})",
            model.name(),
            r,
            centers[i],
            point
        )));
    }

    let effective_exposure = detector.effective_exposure();
    if effective_exposure <= 0.0 {
        log::debug!("{}: zero effective exposure, spectrum is empty", detector.name());
        return SpectrumResult::new(binning.clone(), vec![0.0; binning.n_bins]);
    }

    if let Some(background) = detector.background() {
        // Background is quoted at total exposure.
        let scale = detector.exposure() / effective_exposure;
        let bg = background.evaluate(fine.e_min, fine.e_max, fine.n_bins)?;
        for (r, b) in rate.iter_mut().zip(&bg) {
            *r += b * scale;
        }
    }

    let sigmas = detector.resolution().sigmas(&centers)?;
    let smeared = smear(&rate, &centers, &sigmas, fine.bin_width())?;

    let mut spectrum = FineSpectrum::new(&fine, smeared)?;
    spectrum.apply_threshold(detector.energy_threshold())?;

    let counts = spectrum.rebin(binning).into_iter().map(|c| c * effective_exposure).collect();
    SpectrumResult::new(binning.clone(), counts)
}

/// A spectrum model observed through one detector on one output binning.
#[derive(Clone)]
pub struct DetectorSpectrum {
    model: Arc<dyn SpectrumModel>,
    detector: DetectorConfig,
    binning: EnergyBinning,
}

impl std::fmt::Debug for DetectorSpectrum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorSpectrum")
            .field("model", &self.model.name())
            .field("detector", &self.detector.name())
            .field("binning", &self.binning)
            .finish()
    }
}

impl DetectorSpectrum {
    /// Bind a model, a detector and an output binning.
    pub fn new(model: Arc<dyn SpectrumModel>, detector: DetectorConfig, binning: EnergyBinning) -> Self {
        Self { model, detector, binning }
    }

    /// Expected counts at `point`.
    pub fn compute(&self, point: &RecoilPoint) -> Result<SpectrumResult> {
        compute_detected_spectrum(self.model.as_ref(), point, &self.binning, &self.detector)
    }

    /// One Poisson draw around the expected counts at `point`.
    pub fn simulate(&self, point: &RecoilPoint, seed: u64) -> Result<SpectrumResult> {
        toys::poisson_resample(&self.compute(point)?, seed)
    }

    /// The spectrum model.
    pub fn model(&self) -> &dyn SpectrumModel {
        self.model.as_ref()
    }

    /// The detector.
    pub fn detector(&self) -> &DetectorConfig {
        &self.detector
    }

    /// The output binning.
    pub fn binning(&self) -> &EnergyBinning {
        &self.binning
    }
}
