//! Small numerically-stable math utilities used across probability code.

/// Stable `ln(exp(a) + exp(b))`.
///
/// Either argument may be `-inf` (an empty contribution).
#[inline]
pub fn log_add_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let m = a.max(b);
    m + (-(a - b).abs()).exp().ln_1p()
}

/// Stable `ln(1 - exp(-x))` for `x > 0`.
#[inline]
pub fn log1mexp(x: f64) -> f64 {
    // Maechler (2012): switch at ln 2.
    if x <= std::f64::consts::LN_2 { (-(-x).exp_m1()).ln() } else { (-(-x).exp()).ln_1p() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_log_add_exp_matches_naive() {
        let pairs: [(f64, f64); 4] = [(0.0, 0.0), (-3.0, 2.0), (10.0, -10.0), (-700.0, -701.0)];
        for (a, b) in pairs {
            let naive = (a.exp() + b.exp()).ln();
            assert_relative_eq!(log_add_exp(a, b), naive, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_log_add_exp_neg_inf() {
        assert_eq!(log_add_exp(f64::NEG_INFINITY, 1.5), 1.5);
        assert_eq!(log_add_exp(1.5, f64::NEG_INFINITY), 1.5);
        assert_eq!(log_add_exp(f64::NEG_INFINITY, f64::NEG_INFINITY), f64::NEG_INFINITY);
    }

    #[test]
    fn test_log1mexp_matches_naive() {
        for &x in &[1e-3, 0.5, 1.0, 5.0, 30.0] {
            let naive = (1.0 - (-x as f64).exp()).ln();
            assert_relative_eq!(log1mexp(x), naive, max_relative = 1e-9);
        }
    }
}
