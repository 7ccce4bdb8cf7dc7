// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Caliber Protocol — Core Library
//!
//! Everything the escrow vault stands on that isn't escrow logic itself:
//! who is calling, what time it is, what an asset is, how balances move,
//! and where records live on disk.
//!
//! ## Architecture
//!
//! - **config** — Protocol constants, limits and the transfer window.
//! - **crypto** — Ed25519 keys and signatures, BLAKE3 seed hashing.
//! - **identity** — 32-byte addresses, derived addresses, signed calls.
//! - **clock** — Injectable time source. Escrow code never calls the OS.
//! - **asset** — Native vs. fungible assets and the balance ledger.
//! - **storage** — sled-backed persistence with CAS-guarded writes.
//!
//! ## Design Philosophy
//!
//! 1. The escrow core gets an already-authenticated caller and a clock
//!    reading. Nothing in here is allowed to guess either.
//! 2. Funds move all-or-nothing, or not at all.
//! 3. If it touches money, it has tests. Plural.

pub mod asset;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod identity;
pub mod storage;

pub use asset::{Asset, AssetLedger, AssetTransfer, TransferError};
pub use clock::{Clock, ManualClock, SystemClock};
pub use identity::{Address, CaliberKeypair, CaliberPublicKey, CaliberSignature, SignedCall};
pub use storage::{CaliberDB, DbError};
