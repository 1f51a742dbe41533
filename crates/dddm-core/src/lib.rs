//! # dddm-core
//!
//! Core types and traits for direct-detection dark-matter fits.
//!
//! This crate holds what every other layer agrees on:
//! - the [`Error`] type and [`Result`] alias
//! - shared value types ([`RecoilPoint`], [`HaloParameters`])
//! - the [`SpectrumModel`] and [`LogLikelihood`] seams

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Error type.
pub mod error;
/// Seams between the forward model and the samplers.
pub mod traits;
/// Shared value types.
pub mod types;

pub use error::{Error, Result};
pub use traits::{LogLikelihood, SpectrumModel};
pub use types::{HaloParameters, RecoilPoint};

/// Crate version, shared by every workspace member.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
