//! # CaliberDB — Persistent Storage Engine
//!
//! The persistence layer for the escrow vault, built on sled's embedded
//! key-value store. All on-disk data flows through this module.
//!
//! ## Tree Layout
//!
//! | Tree       | Key                              | Value               |
//! |------------|----------------------------------|---------------------|
//! | `vault`    | `b"vault"` (singleton)           | `bincode(Vault)`    |
//! | `deposits` | `owner (32B) ‖ salt (8B BE)`     | `bincode(Deposit)`  |
//! | `balances` | `holder ‖ asset tag ‖ [mint]`    | `amount (8B BE)`    |
//! | `nonces`   | `signer (32B)`                   | `last nonce (8B BE)`|
//! | `metadata` | key (UTF-8)                      | value (bytes)       |
//!
//! Salts are stored big-endian so that sled's lexicographic order matches
//! numeric order, which makes "all deposits of this owner" a prefix scan.
//!
//! ## Atomicity
//!
//! Record creation goes through [`CaliberDB::insert_if_absent`] and record
//! updates through [`CaliberDB::compare_and_swap`]. Both are single sled
//! CAS operations, so two writers racing on the same key can never both
//! win. Multi-key balance moves use sled transactions on the `balances`
//! tree (see [`crate::asset::ledger`]). Signer nonces only move forward,
//! through [`CaliberDB::advance_nonce`].

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Db, Tree};
use std::path::Path;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// The named trees of a [`CaliberDB`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Vault,
    Deposits,
    Balances,
    Nonces,
    Metadata,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Vault => "vault",
            Table::Deposits => "deposits",
            Table::Balances => "balances",
            Table::Nonces => "nonces",
            Table::Metadata => "metadata",
        }
    }
}

// ---------------------------------------------------------------------------
// CaliberDB
// ---------------------------------------------------------------------------

/// Persistent storage for vault, deposit and balance records.
///
/// sled is thread-safe and `Tree` handles are cheap clones, so a
/// `CaliberDB` can be cloned freely or shared through an `Arc`.
#[derive(Debug, Clone)]
pub struct CaliberDB {
    db: Db,
    vault: Tree,
    deposits: Tree,
    balances: Tree,
    nonces: Tree,
    metadata: Tree,
}

fn encode<T: Serialize>(value: &T) -> DbResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| DbError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> DbResult<T> {
    bincode::deserialize(bytes).map_err(|e| DbError::Serialization(e.to_string()))
}

fn read_nonce(bytes: &[u8]) -> DbResult<u64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| DbError::Serialization(format!("corrupt nonce entry ({} bytes)", bytes.len())))?;
    Ok(u64::from_be_bytes(arr))
}

impl CaliberDB {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// A database that lives in memory and vanishes on drop. For tests.
    pub fn open_temporary() -> DbResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        Ok(Self {
            vault: db.open_tree(Table::Vault.name())?,
            deposits: db.open_tree(Table::Deposits.name())?,
            balances: db.open_tree(Table::Balances.name())?,
            nonces: db.open_tree(Table::Nonces.name())?,
            metadata: db.open_tree(Table::Metadata.name())?,
            db,
        })
    }

    /// Raw access to a tree, for callers that need sled transactions.
    pub fn tree(&self, table: Table) -> &Tree {
        match table {
            Table::Vault => &self.vault,
            Table::Deposits => &self.deposits,
            Table::Balances => &self.balances,
            Table::Nonces => &self.nonces,
            Table::Metadata => &self.metadata,
        }
    }

    // -- Typed record operations -------------------------------------------

    pub fn get<T: DeserializeOwned>(&self, table: Table, key: &[u8]) -> DbResult<Option<T>> {
        match self.tree(table).get(key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Unconditional write. Prefer the CAS variants for records that have
    /// invariants attached.
    pub fn put<T: Serialize>(&self, table: Table, key: &[u8], value: &T) -> DbResult<()> {
        self.tree(table).insert(key, encode(value)?)?;
        Ok(())
    }

    /// Create-if-absent. Returns `false` (and writes nothing) when the key
    /// already holds a value.
    pub fn insert_if_absent<T: Serialize>(
        &self,
        table: Table,
        key: &[u8],
        value: &T,
    ) -> DbResult<bool> {
        let bytes = encode(value)?;
        let swapped = self
            .tree(table)
            .compare_and_swap(key, None as Option<&[u8]>, Some(bytes))?;
        Ok(swapped.is_ok())
    }

    /// Replace `expected` with `new`. Returns `false` (and writes nothing)
    /// if the stored value is not byte-identical to `expected`.
    pub fn compare_and_swap<T: Serialize>(
        &self,
        table: Table,
        key: &[u8],
        expected: &T,
        new: &T,
    ) -> DbResult<bool> {
        let old_bytes = encode(expected)?;
        let new_bytes = encode(new)?;
        let swapped = self
            .tree(table)
            .compare_and_swap(key, Some(old_bytes), Some(new_bytes))?;
        Ok(swapped.is_ok())
    }

    /// All records whose key starts with `prefix`, in key order.
    pub fn scan_prefix<T: DeserializeOwned>(
        &self,
        table: Table,
        prefix: &[u8],
    ) -> DbResult<Vec<(Vec<u8>, T)>> {
        let mut out = Vec::new();
        for item in self.tree(table).scan_prefix(prefix) {
            let (key, value) = item?;
            out.push((key.to_vec(), decode(&value)?));
        }
        Ok(out)
    }

    pub fn len(&self, table: Table) -> usize {
        self.tree(table).len()
    }

    pub fn is_empty(&self, table: Table) -> bool {
        self.tree(table).is_empty()
    }

    // -- Signer nonces -----------------------------------------------------

    /// Last nonce accepted from `signer`, if any.
    pub fn last_nonce(&self, signer: &[u8]) -> DbResult<Option<u64>> {
        self.nonces.get(signer)?.map(|v| read_nonce(&v)).transpose()
    }

    /// Records `nonce` for `signer` if it is strictly greater than the last
    /// one recorded. Returns `false` (and writes nothing) for a stale or
    /// repeated nonce.
    pub fn advance_nonce(&self, signer: &[u8], nonce: u64) -> DbResult<bool> {
        loop {
            let current = self.nonces.get(signer)?;
            if let Some(bytes) = &current {
                if read_nonce(bytes)? >= nonce {
                    return Ok(false);
                }
            }
            let swapped = self.nonces.compare_and_swap(
                signer,
                current,
                Some(nonce.to_be_bytes().to_vec()),
            )?;
            if swapped.is_ok() {
                return Ok(true);
            }
        }
    }

    // -- Metadata operations -----------------------------------------------

    pub fn get_meta(&self, key: &str) -> DbResult<Option<Vec<u8>>> {
        Ok(self.metadata.get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    pub fn set_meta(&self, key: &str, value: &[u8]) -> DbResult<()> {
        self.metadata.insert(key.as_bytes(), value)?;
        Ok(())
    }

    /// Block until all pending writes are durable.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
