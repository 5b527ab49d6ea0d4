//! Small numeric helpers shared by outcome inference and the optimizer.

/// Sign of `x` as `-1.0`, `0.0` or `1.0` (`0.0` for NaN).
pub fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Compare two credit tallies: `-1` when the first side has more, `1` when the second does.
pub fn prefer(first: f64, second: f64) -> f64 {
    sign(second - first)
}

/// Shannon entropy (bits) of the distribution obtained by normalizing `weights`.
///
/// Zero-mass input has zero entropy.
pub fn entropy_bits(weights: &[f64]) -> f64 {
    let total: f64 = weights.iter().filter(|w| **w > 0.0).sum();
    if total <= 0.0 || !total.is_finite() {
        return 0.0;
    }
    weights
        .iter()
        .filter(|w| **w > 0.0)
        .map(|w| {
            let p = w / total;
            -p * p.log2()
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_handles_nan_as_tie() {
        assert_eq!(sign(f64::NAN), 0.0);
        assert_eq!(sign(-0.3), -1.0);
        assert_eq!(sign(2.0), 1.0);
    }

    #[test]
    fn prefer_negative_means_first_side() {
        assert_eq!(prefer(2.0, 1.0), -1.0);
        assert_eq!(prefer(1.0, 2.0), 1.0);
        assert_eq!(prefer(1.0, 1.0), 0.0);
    }

    #[test]
    fn entropy_of_even_split_is_one_bit() {
        assert!((entropy_bits(&[0.3, 0.3]) - 1.0).abs() < 1e-12);
        assert_eq!(entropy_bits(&[1.0, 0.0]), 0.0);
        assert_eq!(entropy_bits(&[0.0, 0.0]), 0.0);
        assert!((entropy_bits(&[1.0, 1.0, 1.0, 1.0]) - 2.0).abs() < 1e-12);
    }
}
