//! Normal distribution utilities.

use dddm_core::{Error, Result};
use statrs::function::erf::{erfc, erfc_inv};

/// Natural log of `sqrt(2π)`.
///
/// `ln(sqrt(2π)) = 0.5*ln(2π)` (precomputed to keep this crate const-friendly).
pub const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_7;

/// `1 / sqrt(2π)`.
pub const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;

fn check_sigma(sigma: f64) -> Result<()> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(Error::Validation(format!("sigma must be finite and > 0, got {}", sigma)));
    }
    Ok(())
}

/// Log-PDF of a Normal distribution `N(mu, sigma)` at `x`.
///
/// `log p(x) = -0.5 * ((x-mu)/sigma)^2 - ln(sigma) - ln(sqrt(2π))`
pub fn logpdf(x: f64, mu: f64, sigma: f64) -> Result<f64> {
    check_sigma(sigma)?;
    let z = (x - mu) / sigma;
    Ok(-0.5 * z * z - sigma.ln() - LN_SQRT_2PI)
}

/// PDF of `N(mu, sigma)` at `x`.
pub fn pdf(x: f64, mu: f64, sigma: f64) -> Result<f64> {
    check_sigma(sigma)?;
    let z = (x - mu) / sigma;
    Ok(INV_SQRT_2PI / sigma * (-0.5 * z * z).exp())
}

/// Standard normal CDF `Φ(z)`.
#[inline]
pub fn std_cdf(z: f64) -> f64 {
    0.5 * erfc(-z / std::f64::consts::SQRT_2)
}

/// Standard normal quantile `Φ⁻¹(p)`; `±inf` at the endpoints.
#[inline]
pub fn std_quantile(p: f64) -> f64 {
    -std::f64::consts::SQRT_2 * erfc_inv(2.0 * p)
}

/// CDF of `N(mu, sigma)` at `x`.
pub fn cdf(x: f64, mu: f64, sigma: f64) -> Result<f64> {
    check_sigma(sigma)?;
    Ok(std_cdf((x - mu) / sigma))
}

/// Quantile of `N(mu, sigma)` truncated to `[lo, hi]`.
///
/// Maps `u ∈ [0, 1]` linearly onto `[Φ(a'), Φ(b')]` (with `a' = (lo-mu)/sigma`,
/// `b' = (hi-mu)/sigma`) and inverts the untruncated CDF. Feeding uniform `u`
/// yields truncated-normal draws. The result is clamped into `[lo, hi]`.
pub fn truncated_quantile(u: f64, mu: f64, sigma: f64, lo: f64, hi: f64) -> Result<f64> {
    check_sigma(sigma)?;
    if !(lo < hi) {
        return Err(Error::Validation(format!("truncation range must satisfy lo < hi, got [{}, {}]", lo, hi)));
    }
    if !(0.0..=1.0).contains(&u) {
        return Err(Error::Validation(format!("u must be in [0, 1], got {}", u)));
    }
    let a = (lo - mu) / sigma;
    let b = (hi - mu) / sigma;

    // Work in the lower tail, where Φ keeps its relative precision.
    let z = if a > 0.0 {
        let (pa, pb) = (std_cdf(-b), std_cdf(-a));
        -std_quantile(pa + (1.0 - u) * (pb - pa))
    } else {
        let (pa, pb) = (std_cdf(a), std_cdf(b));
        std_quantile(pa + u * (pb - pa))
    };
    Ok((mu + sigma * z).clamp(lo, hi))
}

/// Log-density of `N(mu, sigma)` truncated to `[lo, hi]`; `-inf` outside.
pub fn truncated_logpdf(x: f64, mu: f64, sigma: f64, lo: f64, hi: f64) -> Result<f64> {
    if !(lo..=hi).contains(&x) {
        return Ok(f64::NEG_INFINITY);
    }
    let a = (lo - mu) / sigma;
    let b = (hi - mu) / sigma;
    let mass = if a > 0.0 { std_cdf(-a) - std_cdf(-b) } else { std_cdf(b) - std_cdf(a) };
    if mass <= 0.0 {
        return Err(Error::Numerical(format!(
            "truncated normal N({}, {}) has no mass on [{}, {}]",
            mu, sigma, lo, hi
        )));
    }
    Ok(logpdf(x, mu, sigma)? - mass.ln())
}
