//! Hash functions used by the stock type descriptors.
//!
//! All functions produce 32-bit hashes. String hashing is seeded by a
//! process-wide value so that bucket placement is not fixed across runs.

use std::sync::atomic::{AtomicU32, Ordering};

/// Seed used when nothing has called [`set_hash_seed`].
pub const DEFAULT_HASH_SEED: u32 = 5381;

static HASH_SEED: AtomicU32 = AtomicU32::new(DEFAULT_HASH_SEED);

/// Sets the process-wide seed for [`gen_hash`] and [`gen_case_hash`].
///
/// Tables hash through the seed on every operation, so change it only
/// while no table holds string keys.
pub fn set_hash_seed(seed: u32) {
    HASH_SEED.store(seed, Ordering::Relaxed);
}

/// Returns the current process-wide string hash seed.
pub fn hash_seed() -> u32 {
    HASH_SEED.load(Ordering::Relaxed)
}

/// Thomas Wang's 32-bit integer mix.
#[inline]
pub fn int_hash(mut key: u32) -> u32 {
    key = key.wrapping_add(!(key << 15));
    key ^= key >> 10;
    key = key.wrapping_add(key << 3);
    key ^= key >> 6;
    key = key.wrapping_add(!(key << 11));
    key ^= key >> 16;
    key
}

#[inline]
pub fn identity_hash(key: u32) -> u32 {
    key
}

/// Bernstein hash (`hash * 33 + byte`) starting from `seed`.
#[inline]
pub fn gen_hash_with_seed(seed: u32, buf: &[u8]) -> u32 {
    buf.iter().fold(seed, |hash, &b| {
        (hash << 5).wrapping_add(hash).wrapping_add(u32::from(b))
    })
}

/// ASCII case-insensitive variant of [`gen_hash_with_seed`].
#[inline]
pub fn gen_case_hash_with_seed(seed: u32, buf: &[u8]) -> u32 {
    buf.iter().fold(seed, |hash, &b| {
        (hash << 5)
            .wrapping_add(hash)
            .wrapping_add(u32::from(b.to_ascii_lowercase()))
    })
}

/// Bernstein hash seeded with the process-wide seed.
pub fn gen_hash(buf: &[u8]) -> u32 {
    gen_hash_with_seed(hash_seed(), buf)
}

pub fn gen_case_hash(buf: &[u8]) -> u32 {
    gen_case_hash_with_seed(hash_seed(), buf)
}

/// Folds a 64-bit `Hasher` result into 32 bits without discarding the high half.
#[inline]
pub fn fold64(h: u64) -> u32 {
    (h ^ (h >> 32)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bernstein_matches_reference_values() {
        assert_eq!(gen_hash_with_seed(5381, b""), 5381);
        assert_eq!(gen_hash_with_seed(5381, b"a"), 5381 * 33 + 97);
        let ab = (5381u32 * 33 + 97).wrapping_mul(33).wrapping_add(98);
        assert_eq!(gen_hash_with_seed(5381, b"ab"), ab);
    }

    #[test]
    fn seed_changes_output() {
        assert_ne!(
            gen_hash_with_seed(1, b"hello"),
            gen_hash_with_seed(2, b"hello")
        );
    }

    #[test]
    fn case_hash_ignores_ascii_case() {
        assert_eq!(
            gen_case_hash_with_seed(7, b"HeLLo"),
            gen_case_hash_with_seed(7, b"hello")
        );
        assert_ne!(
            gen_hash_with_seed(7, b"HeLLo"),
            gen_hash_with_seed(7, b"hello")
        );
    }

    #[test]
    fn int_hash_spreads_consecutive_keys() {
        let low_bits: std::collections::BTreeSet<u32> =
            (0..64u32).map(|k| int_hash(k) & 63).collect();
        // Consecutive integers should land on many distinct 64-slot buckets.
        assert!(low_bits.len() > 32, "only {} distinct slots", low_bits.len());
        assert_eq!(identity_hash(42), 42);
    }

    #[test]
    fn fold64_mixes_high_half() {
        assert_eq!(fold64(0), 0);
        assert_ne!(fold64(1 << 40), 0);
    }
}
