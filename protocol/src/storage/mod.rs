//! # Storage Module
//!
//! Persistent storage for the escrow vault.
//!
//! ```text
//! db.rs — sled persistence: typed get/put, create-if-absent, compare-and-swap
//! ```
//!
//! ## Design Decisions
//!
//! 1. **sled trees per record kind.** Vault, deposits, balances and metadata
//!    each get their own keyspace.
//! 2. **Bincode on disk.** Compact and deterministic, which matters because
//!    compare-and-swap compares encoded bytes. JSON is for the API.
//! 3. **No read-modify-write without CAS.** Callers that update records hold
//!    the expected old value and swap, or they don't write.

pub mod db;

pub use db::{CaliberDB, DbError, DbResult, Table};
