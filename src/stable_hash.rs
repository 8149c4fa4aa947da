//! Deterministic seed derivation.
//!
//! Every run in a generation owns its random sources. Seeds are derived from one
//! base seed and a label so that environment and policy streams never collide and
//! the same run index sees the same world in every generation.
//!
//! This module intentionally does **not** provide cryptographic guarantees.

/// Deterministic (non-crypto) stable hash of `s` under `seed`.
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

/// Seed for stream `label` of run `run` under `base`.
///
/// ```rust
/// use iai_bandit::derive_seed;
///
/// assert_eq!(derive_seed(7, "env", 0), derive_seed(7, "env", 0));
/// assert_ne!(derive_seed(7, "env", 0), derive_seed(7, "policy", 0));
/// ```
#[must_use]
pub fn derive_seed(base: u64, label: &str, run: u64) -> u64 {
    stable_hash64(splitmix64(base).wrapping_add(run), label)
}

#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
