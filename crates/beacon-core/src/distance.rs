//! Distance estimation from signal strength.
//!
//! The estimate is based on the ratio of the received signal strength over the
//! calibrated transmitter power (the RSSI a receiver sees at one metre).

/// Estimate the distance to a beacon in metres.
///
/// A zero `calibrated_power` yields NaN or infinity; use [`checked_distance`]
/// when the calibration may be missing.
#[must_use]
pub fn estimate_distance(calibrated_power: f64, rssi: f64) -> f64 {
    let ratio = rssi / calibrated_power;

    if ratio < 1.0 {
        return ratio.powi(10);
    }

    0.19 * ratio.powi(8)
}

/// Estimate the distance, or `None` when there is no usable calibration.
#[must_use]
pub fn checked_distance(calibrated_power: Option<i16>, rssi: i16) -> Option<f64> {
    match calibrated_power {
        Some(power) if power != 0 => Some(estimate_distance(f64::from(power), f64::from(rssi))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_below_one_uses_tenth_power() {
        let d = estimate_distance(-59.0, -50.0);
        let ratio: f64 = -50.0 / -59.0;
        assert!((d - ratio.powi(10)).abs() < 1e-12);
        assert!(d < 1.0);
    }

    #[test]
    fn test_ratio_at_or_above_one_uses_scaled_eighth_power() {
        assert!((estimate_distance(-59.0, -59.0) - 0.19).abs() < 1e-12);

        let d = estimate_distance(-59.0, -65.0);
        assert!((d - 0.4123).abs() < 1e-3, "got {d}");
    }

    #[test]
    fn test_zero_calibration_is_not_finite() {
        assert!(!estimate_distance(0.0, -65.0).is_finite());
    }

    #[test]
    fn test_checked_distance_guards_missing_calibration() {
        assert_eq!(checked_distance(None, -65), None);
        assert_eq!(checked_distance(Some(0), -65), None);
        let d = checked_distance(Some(-59), -65).unwrap();
        assert!((d - estimate_distance(-59.0, -65.0)).abs() < f64::EPSILON);
    }
}
