//! Poisson distribution utilities.

use dddm_core::{Error, Result};
use statrs::function::gamma::ln_gamma;

/// `ln(k!)` for a (possibly non-integer) count.
#[inline]
pub fn ln_factorial(k: f64) -> f64 {
    ln_gamma(k + 1.0)
}

/// Log-PMF of `Poisson(lambda)` at count `k`, without the `ln(k!)` term.
///
/// `k·ln(λ) − λ`. The dropped term does not depend on `lambda`, so this is
/// the kernel to use when only likelihood differences matter.
#[inline]
pub fn logpmf_kernel(k: f64, lambda: f64) -> f64 {
    if k == 0.0 { -lambda } else { k * lambda.ln() - lambda }
}

/// Log-PMF of `Poisson(lambda)` at count `k`.
///
/// `k` may be a non-integer (Asimov data); `ln(k!)` is then `ln Γ(k+1)`.
pub fn logpmf(k: f64, lambda: f64) -> Result<f64> {
    if !k.is_finite() || k < 0.0 {
        return Err(Error::Validation(format!("k must be finite and >= 0, got {}", k)));
    }
    if !lambda.is_finite() || lambda < 0.0 {
        return Err(Error::Validation(format!("lambda must be finite and >= 0, got {}", lambda)));
    }
    if lambda == 0.0 {
        return Ok(if k == 0.0 { 0.0 } else { f64::NEG_INFINITY });
    }
    Ok(logpmf_kernel(k, lambda) - ln_factorial(k))
}
