//! # Assets
//!
//! What the vault holds and how it moves.
//!
//! - [`kind`] — the [`Asset`] enum: native coin or a fungible token by mint.
//! - [`ledger`] — per-holder balances and the [`AssetTransfer`] seam the
//!   escrow core settles through.

pub mod kind;
pub mod ledger;

pub use kind::Asset;
pub use ledger::{balance_key, AssetLedger, AssetTransfer, TransferError};
