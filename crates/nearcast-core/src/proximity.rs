//! Signal-strength based proximity estimate
//!
//! Follows the empirical beacon distance curve. Results are relative
//! proximity scores, not physical units.

/// Returned when no valid signal reading is available
pub const UNKNOWN_ACCURACY: f64 = -1.0;

/// Estimate proximity accuracy from a measured signal and the reference
/// (calibrated one-metre) power.
///
/// A `measured_signal` of exactly zero means "no reading" and yields
/// [`UNKNOWN_ACCURACY`]. A zero `reference_power` is not guarded and
/// produces a non-finite ratio.
pub fn accuracy(reference_power: i32, measured_signal: f64) -> f64 {
    if measured_signal == 0.0 {
        return UNKNOWN_ACCURACY;
    }

    let ratio = measured_signal / f64::from(reference_power);
    if ratio < 1.0 {
        ratio.powi(10)
    } else {
        0.89976 * ratio.powf(7.7095) + 0.111
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    #[test]
    fn test_zero_signal_is_unknown() {
        for reference in [-100, -59, -1, 0, 1, 42] {
            assert_eq!(accuracy(reference, 0.0), UNKNOWN_ACCURACY);
        }
    }

    #[test]
    fn test_ratio_below_one() {
        // ratio 0.5 -> 0.5^10
        assert!((accuracy(-60, -30.0) - 0.0009765625).abs() < EPSILON);
    }

    #[test]
    fn test_branch_discontinuity_at_ratio_one() {
        // The first branch would give 1.0 here; the curve branch takes over.
        let at_one = accuracy(-59, -59.0);
        assert!((at_one - 1.01076).abs() < EPSILON);

        let just_below = accuracy(-100, -99.999_999);
        assert!((just_below - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_ratio_above_one() {
        let expected = 0.89976 * 2f64.powf(7.7095) + 0.111;
        assert!((accuracy(-40, -80.0) - expected).abs() < EPSILON);
    }

    #[test]
    fn test_weaker_signal_scores_further() {
        let near = accuracy(-59, -50.0);
        let far = accuracy(-59, -80.0);
        assert!(near < far);
    }
}
