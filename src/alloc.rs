//! Allocation helpers (rank weights, normalization).
//!
//! Deterministic utilities for turning a ranking into a probability distribution over its
//! documents in a stable way.

/// Default decay exponent of the rank-based document distribution.
pub const DEFAULT_TAU: f64 = 3.0;

/// Unnormalized rank weights `1 / (r + 1)^tau` for ranks `0..n`.
///
/// A non-finite or non-positive `tau` falls back to [`DEFAULT_TAU`].
pub fn rank_weights(n: usize, tau: f64) -> Vec<f64> {
    let tau = if tau.is_finite() && tau > 0.0 {
        tau
    } else {
        DEFAULT_TAU
    };
    (0..n).map(|r| 1.0 / ((r + 1) as f64).powf(tau)).collect()
}

/// Normalize non-negative weights into a distribution.
///
/// Returns an empty vector for empty input and a uniform distribution when the weights carry
/// no mass (or are not finite).
pub fn normalize(weights: &[f64]) -> Vec<f64> {
    if weights.is_empty() {
        return Vec::new();
    }
    let total: f64 = weights.iter().map(|w| w.max(0.0)).sum();
    if total <= 0.0 || !total.is_finite() {
        let n = weights.len() as f64;
        return vec![1.0 / n; weights.len()];
    }
    weights.iter().map(|w| w.max(0.0) / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rank_weights_decay_with_rank() {
        let w = rank_weights(4, 3.0);
        assert_eq!(w[0], 1.0);
        assert!((w[1] - 0.125).abs() < 1e-12);
        assert!(w.windows(2).all(|p| p[0] > p[1]));
    }

    #[test]
    fn invalid_tau_uses_default() {
        assert_eq!(rank_weights(3, f64::NAN), rank_weights(3, DEFAULT_TAU));
        assert_eq!(rank_weights(3, -1.0), rank_weights(3, DEFAULT_TAU));
    }

    #[test]
    fn degenerate_weights_become_uniform() {
        assert_eq!(normalize(&[0.0, 0.0]), vec![0.5, 0.5]);
        assert!(normalize(&[]).is_empty());
    }

    proptest! {
        #[test]
        fn normalize_is_a_distribution(
            ws in proptest::collection::vec(0.0f64..1.0e6, 1..30),
        ) {
            let p = normalize(&ws);
            prop_assert_eq!(p.len(), ws.len());
            let sum: f64 = p.iter().sum();
            prop_assert!((sum - 1.0).abs() < 1e-9, "sum={}", sum);
            for &v in &p {
                prop_assert!((0.0..=1.0).contains(&v));
            }
        }
    }
}
