//! # Hashing Utilities
//!
//! BLAKE3 is the only hash Caliber needs: it derives program-owned
//! addresses from seeds. Derivation is domain-separated and length-prefixed
//! so that `["AB", "C"]` and `["A", "BC"]` never collide.

use crate::config::DERIVATION_DOMAIN;

/// BLAKE3 digest of `data`.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Hash an ordered list of seeds into 32 bytes.
///
/// Each seed is prefixed with its length as a little-endian `u32`; the
/// whole thing is keyed by [`DERIVATION_DOMAIN`].
pub fn hash_seeds(seeds: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(DERIVATION_DOMAIN);
    for seed in seeds {
        hasher.update(&(seed.len() as u32).to_le_bytes());
        hasher.update(seed);
    }
    *hasher.finalize().as_bytes()
}
