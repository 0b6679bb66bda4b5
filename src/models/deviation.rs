//! Absolute deviation between observed and predicted fares

/// `|observed_fare - prediction|`; symmetric in its arguments and never negative
pub fn evaluate_deviation(observed_fare: f64, prediction: f64) -> f64 {
    (observed_fare - prediction).abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deviation() {
        assert_eq!(evaluate_deviation(8.0, 7.0), 1.0);
        assert_eq!(evaluate_deviation(1.0, 1.0), 0.0);
        assert_eq!(evaluate_deviation(3.0, 5.5), 2.5);
    }

    #[test]
    fn test_symmetric_and_non_negative() {
        let values = [0.0, -0.0, 1.0, 7.25, -3.5, 0.1, 1e-300, 1e300];
        for &a in &values {
            for &b in &values {
                let d = evaluate_deviation(a, b);
                assert_eq!(d, evaluate_deviation(b, a));
                assert!(d >= 0.0);
            }
        }
    }
}
