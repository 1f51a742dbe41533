//! # dddm-detector
//!
//! Detector response for direct-detection recoil spectra.
//!
//! - [`binning`]: linear energy bins
//! - [`detector`] and [`registry`]: per-detector exposure, efficiencies,
//!   threshold, resolution and background, and the read-only detector table
//! - [`spectrum`]: theoretical recoil-rate models
//! - [`convolution`]: background, smearing, threshold and rebinning
//! - [`toys`]: Poisson-fluctuated spectra
//! - [`quenching`]: Lindhard quenching factors

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod binning;
pub mod convolution;
pub mod detector;
pub mod quenching;
pub mod registry;
pub mod spectrum;
pub mod toys;

pub use binning::EnergyBinning;
pub use convolution::{
    DetectorSpectrum, FineSpectrum, REBIN_FACTOR, SpectrumResult, compute_detected_spectrum,
};
pub use detector::{Background, DetectorConfig, Material, Resolution};
pub use registry::{DetectorRegistry, detector, registry};
pub use spectrum::{FlatSpectrum, StandardHaloModel};
