//! # Cryptographic Primitives
//!
//! Everything security-related in Caliber is a thin, typed wrapper around
//! audited crates:
//!
//! - **Ed25519** (`ed25519-dalek`) for caller signatures.
//! - **BLAKE3** (`blake3`) for deriving program-owned addresses.
//!
//! We don't roll our own. If you're tempted to optimize these functions,
//! please reconsider.

pub mod hash;
pub mod keys;
pub mod signatures;

pub use hash::{blake3_hash, hash_seeds};
pub use keys::{CaliberKeypair, CaliberPublicKey, CaliberSignature, KeyError};
pub use signatures::{sign, verify, verify_raw, SignatureError};
