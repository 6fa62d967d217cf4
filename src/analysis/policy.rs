// src/analysis/policy.rs
// Named defaults applied where a computation would otherwise divide by zero or yield NaN

/// Fraction of the current amount used as a comparison baseline when the prior window is empty
pub const FALLBACK_BASELINE_RATIO: f64 = 0.9;

/// Divide, resolving a zero denominator or a non-finite quotient to 0.0
pub fn safe_divide_or_zero(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    finite_or_zero(numerator / denominator)
}

/// Replace NaN and infinities with 0.0
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Synthetic comparison baseline for an edge with no prior-window volume.
///
/// This is a smoothing heuristic: it avoids both a division by zero and a
/// misleading 100% jump, so the resulting percentage is not a measured figure.
pub fn fallback_baseline(amount: f64) -> f64 {
    amount * FALLBACK_BASELINE_RATIO
}

/// The prior-window sum when positive, otherwise the fallback baseline
pub fn baseline_or_fallback(prior_sum: f64, current_amount: f64) -> f64 {
    if prior_sum > 0.0 {
        prior_sum
    } else {
        fallback_baseline(current_amount)
    }
}

/// Round half away from zero to the given number of decimals
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_denominator_is_zero() {
        assert_eq!(safe_divide_or_zero(5.0, 0.0), 0.0);
        assert_eq!(safe_divide_or_zero(-5.0, 0.0), 0.0);
        assert_eq!(safe_divide_or_zero(6.0, 3.0), 2.0);
    }

    #[test]
    fn non_finite_quotient_is_zero() {
        assert_eq!(safe_divide_or_zero(f64::NAN, 2.0), 0.0);
        assert_eq!(safe_divide_or_zero(f64::MAX, 1e-300), 0.0);
    }

    #[test]
    fn fallback_baseline_is_ninety_percent() {
        assert_eq!(fallback_baseline(100.0), 90.0);
        assert_eq!(baseline_or_fallback(0.0, 100.0), 90.0);
        assert_eq!(baseline_or_fallback(40.0, 100.0), 40.0);
    }

    #[test]
    fn rounding() {
        assert_eq!(round_to(1.23456, 4), 1.2346);
        assert_eq!(round_to(-0.125, 2), -0.13);
    }
}
