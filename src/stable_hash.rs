//! Deterministic hashing helpers for reproducible per-impression randomness.
//!
//! This module intentionally does **not** provide cryptographic guarantees; it exists so a
//! single comparison can be replayed exactly from `(seed, query id, impression number)`.

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Deterministic (non-crypto) stable hash.
///
/// Implementation:
/// - FNV-1a over bytes (cheap, stable across platforms)
/// - SplitMix64 finalizer (improves bit diffusion / uniformity)
#[must_use]
pub fn stable_hash64(seed: u64, s: &str) -> u64 {
    let mut h: u64 = 14695981039346656037u64;
    for b in s.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(1099511628211u64);
    }
    splitmix64(seed ^ h)
}

/// Seeded RNG for one impression of `query_id`.
///
/// Distinct impressions of the same query get independent streams; the same triple always
/// yields the same stream.
#[must_use]
pub fn impression_rng(seed: u64, query_id: &str, impression: u64) -> StdRng {
    let h = stable_hash64(seed, query_id);
    StdRng::seed_from_u64(splitmix64(h ^ impression.rotate_left(32)))
}

#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn same_triple_same_stream() {
        let mut a = impression_rng(7, "q1", 3);
        let mut b = impression_rng(7, "q1", 3);
        let xs: Vec<u64> = (0..4).map(|_| a.random()).collect();
        let ys: Vec<u64> = (0..4).map(|_| b.random()).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn impressions_get_distinct_streams() {
        let mut a = impression_rng(7, "q1", 0);
        let mut b = impression_rng(7, "q1", 1);
        let x: u64 = a.random();
        let y: u64 = b.random();
        assert_ne!(x, y);
        assert_ne!(stable_hash64(0, "q1"), stable_hash64(0, "q2"));
    }
}
