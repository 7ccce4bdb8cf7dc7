//! # Identity Module
//!
//! Who is calling, and who holds what.
//!
//! 1. **Address** — the 32-byte holder identity used everywhere on the
//!    ledger, keypair-owned or derived from seeds.
//! 2. **Caller** — signed-call verification. Turns a signed payload into an
//!    authenticated caller [`Address`].
//!
//! Key material itself lives in [`crate::crypto::keys`] and is re-exported
//! here so identity code can import from one place.

pub mod address;
pub mod caller;

pub use crate::crypto::keys::{CaliberKeypair, CaliberPublicKey, CaliberSignature};
pub use address::{Address, AddressError};
pub use caller::{CallerError, SignedCall};
