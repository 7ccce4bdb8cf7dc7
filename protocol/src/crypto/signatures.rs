//! # Digital Signatures
//!
//! Ed25519 signing and verification for calls submitted to the vault.
//!
//! Verification is strict (`verify_strict`): we reject the small-order and
//! non-canonical edge cases that lenient verifiers accept. Nothing in Caliber
//! needs compatibility with sloppy signers.

use ed25519_dalek::{Signature as DalekSignature, VerifyingKey};
use thiserror::Error;

use super::keys::{CaliberKeypair, CaliberPublicKey, CaliberSignature};

/// Errors during signature operations.
///
/// Intentionally vague. We don't tell attackers why verification failed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature verification failed")]
    VerificationFailed,

    #[error("invalid public key")]
    InvalidPublicKey,
}

pub fn sign(keypair: &CaliberKeypair, message: &[u8]) -> CaliberSignature {
    keypair.sign(message)
}

pub fn verify(public_key: &CaliberPublicKey, message: &[u8], signature: &CaliberSignature) -> bool {
    public_key.verify(message, signature)
}

/// Verify a signature from raw wire bytes.
///
/// The "I got these bytes off the network" variant: parses the key, then
/// checks the signature, and reports which of the two was wrong only as far
/// as "bad key" vs "bad signature".
pub fn verify_raw(
    public_key_bytes: &[u8; 32],
    message: &[u8],
    signature_bytes: &[u8; 64],
) -> Result<(), SignatureError> {
    let verifying_key =
        VerifyingKey::from_bytes(public_key_bytes).map_err(|_| SignatureError::InvalidPublicKey)?;

    let signature = DalekSignature::from_bytes(signature_bytes);

    verifying_key
        .verify_strict(message, &signature)
        .map_err(|_| SignatureError::VerificationFailed)
}
