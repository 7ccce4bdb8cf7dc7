//! # Caliber Escrow Contracts
//!
//! The custodial escrow vault. An admin appoints up to five operators;
//! depositors lock funds with a list of receivers they pre-approve;
//! operators pay those receivers during a fixed window after the deposit;
//! once the window closes the depositor takes back whatever is left.
//!
//! - **vault** — the singleton registry: admin and operator set.
//! - **deposit** — deposit records, their composite key, allow-list rules.
//! - **policy** — the window, amount and membership checks. Pure functions.
//! - **store** — the persistence contract the service needs.
//! - **escrow** — the service that runs the six operations atomically.
//! - **instruction** — the operations as signable data, plus receipts.
//!
//! ## Design Principles
//!
//! 1. Every running total uses `checked_add`/`checked_sub`. Overflow is an
//!    error value, never a panic and never a wrap.
//! 2. Time-dependent state is derived from the clock on every call and
//!    never cached in a record.
//! 3. A rejected operation leaves no trace, in storage or in balances.
//! 4. The policy never branches on asset kind; it hands the asset to the
//!    ledger and lets it move.

pub mod deposit;
pub mod error;
pub mod escrow;
pub mod instruction;
pub mod policy;
pub mod store;
pub mod vault;

pub use deposit::{Deposit, DepositKey};
pub use error::EscrowError;
pub use escrow::Escrow;
pub use instruction::{Instruction, Outcome, Receipt};
pub use policy::DepositPhase;
pub use store::EscrowStore;
pub use vault::Vault;
