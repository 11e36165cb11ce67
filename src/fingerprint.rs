//! # Key Fingerprinting
//!
//! Maps a composed key to the 64-bit value used for shard routing.
//!
//! The default is 64-bit FNV-1a: an accumulator starts at the offset basis and
//! each byte is XORed in, then multiplied by the FNV prime. It is
//! deterministic within and across processes, allocation-free, and not
//! cryptographically secure. Collisions are harmless: two keys sharing a
//! fingerprint land on the same shard, where the registry still compares keys
//! exactly.

use rustc_hash::FxHasher;
use std::hash::Hasher;

/// FNV-1a 64-bit offset basis
pub const FNV_OFFSET_BASIS: u64 = 14_695_981_039_346_656_037;

/// FNV-1a 64-bit prime
pub const FNV_PRIME: u64 = 1_099_511_628_211;

/// Strategy mapping key bytes to a fingerprint.
///
/// Implementations must return the same value for the same input for the
/// lifetime of the process. Any `Fn(&[u8]) -> u64` closure qualifies.
pub trait Fingerprinter: Send + Sync {
    fn fingerprint(&self, key: &[u8]) -> u64;
}

impl<F> Fingerprinter for F
where
    F: Fn(&[u8]) -> u64 + Send + Sync,
{
    #[inline]
    fn fingerprint(&self, key: &[u8]) -> u64 {
        self(key)
    }
}

/// 64-bit FNV-1a, the default fingerprint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fnv1a;

impl Fnv1a {
    /// Hash a byte slice
    #[inline]
    pub const fn hash_bytes(bytes: &[u8]) -> u64 {
        let mut hash = FNV_OFFSET_BASIS;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u64;
            hash = hash.wrapping_mul(FNV_PRIME);
            i += 1;
        }
        hash
    }

    /// Hash a string (common case)
    #[inline]
    pub const fn hash_str(s: &str) -> u64 {
        Self::hash_bytes(s.as_bytes())
    }
}

impl Fingerprinter for Fnv1a {
    #[inline]
    fn fingerprint(&self, key: &[u8]) -> u64 {
        Self::hash_bytes(key)
    }
}

/// FxHash-based fingerprint.
///
/// Word-at-a-time, so faster than FNV-1a on long keys, at the cost of weaker
/// low-bit mixing for short ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FxFingerprint;

impl Fingerprinter for FxFingerprint {
    #[inline]
    fn fingerprint(&self, key: &[u8]) -> u64 {
        let mut hasher = FxHasher::default();
        hasher.write(key);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fnv1a_known_values() {
        assert_eq!(Fnv1a::hash_str(""), FNV_OFFSET_BASIS);
        assert_eq!(Fnv1a::hash_str("a"), 0xaf63_dc4c_8601_ec8c);
        assert_eq!(Fnv1a::hash_str("test"), 18_007_334_074_686_647_077);
    }

    #[test]
    fn test_fnv1a_deterministic() {
        let h1 = Fnv1a::hash_str("test");
        let h2 = Fnv1a::hash_str("test");
        let h3 = Fnv1a::hash_str("hello");

        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
        assert_eq!(Fnv1a.fingerprint(b"test"), h1);
    }

    #[test]
    fn test_fnv1a_is_const() {
        const HASH: u64 = Fnv1a::hash_str("user:42");
        assert_eq!(HASH, Fnv1a::hash_bytes(b"user:42"));
    }

    #[test]
    fn test_short_strings_do_not_all_collide() {
        let inputs = ["a", "b", "c", "ab", "ba", "user:1", "user:2", "user:10"];
        let mut hashes: Vec<u64> = inputs.iter().map(|s| Fnv1a::hash_str(s)).collect();
        hashes.sort_unstable();
        hashes.dedup();
        assert_eq!(hashes.len(), inputs.len());
    }

    #[test]
    fn test_fx_fingerprint_deterministic() {
        let fx = FxFingerprint;
        assert_eq!(fx.fingerprint(b"key"), fx.fingerprint(b"key"));
        assert_ne!(fx.fingerprint(b"key-1"), fx.fingerprint(b"key-2"));
    }

    #[test]
    fn test_closure_fingerprinter() {
        let by_len = |key: &[u8]| key.len() as u64;
        assert_eq!(by_len.fingerprint(b"four"), 4);
    }
}
