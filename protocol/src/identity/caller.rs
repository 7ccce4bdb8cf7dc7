//! # Caller Verification
//!
//! The escrow core never sees a signature. It is handed an [`Address`] and
//! trusts that someone already proved the caller controls it. This module is
//! that someone: a [`SignedCall`] bundles the signer's public key, a nonce,
//! the exact payload bytes, and an Ed25519 signature over nonce and payload.
//! [`SignedCall::verify`] is the only way to turn one into a caller address.
//!
//! The nonce is signed so it cannot be swapped out. Whoever accepts calls
//! must remember the last nonce per signer and refuse anything not above it
//! (see [`crate::storage::CaliberDB::advance_nonce`]); that is what stops a
//! captured call from being replayed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Address;
use crate::crypto::{verify_raw, CaliberKeypair, CaliberPublicKey, CaliberSignature, SignatureError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CallerError {
    #[error("caller public key is not a valid Ed25519 point")]
    InvalidPublicKey,

    #[error("signature must be 64 bytes")]
    MalformedSignature,

    #[error("caller signature does not verify")]
    BadSignature,

    /// Nonces start at 1.
    #[error("invalid nonce: must be > 0")]
    ZeroNonce,
}

/// A payload signed by the caller who submits it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedCall {
    pub signer: CaliberPublicKey,
    /// Strictly increasing per signer.
    pub nonce: u64,
    pub payload: Vec<u8>,
    pub signature: CaliberSignature,
}

impl SignedCall {
    pub fn sign(keypair: &CaliberKeypair, nonce: u64, payload: Vec<u8>) -> Self {
        let signature = keypair.sign(&signing_bytes(nonce, &payload));
        Self {
            signer: keypair.public_key(),
            nonce,
            payload,
            signature,
        }
    }

    /// Returns the authenticated caller address.
    pub fn verify(&self) -> Result<Address, CallerError> {
        if self.nonce == 0 {
            return Err(CallerError::ZeroNonce);
        }
        let sig_bytes: [u8; 64] = self
            .signature
            .as_bytes()
            .try_into()
            .map_err(|_| CallerError::MalformedSignature)?;

        verify_raw(
            self.signer.as_bytes(),
            &signing_bytes(self.nonce, &self.payload),
            &sig_bytes,
        ).map_err(|e| match e {
            SignatureError::InvalidPublicKey => CallerError::InvalidPublicKey,
            SignatureError::VerificationFailed => CallerError::BadSignature,
        })?;

        Ok(self.signer.address())
    }
}

/// The signed message: `nonce (8B BE) ‖ payload`.
fn signing_bytes(nonce: u64, payload: &[u8]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(8 + payload.len());
    msg.extend_from_slice(&nonce.to_be_bytes());
    msg.extend_from_slice(payload);
    msg
}
