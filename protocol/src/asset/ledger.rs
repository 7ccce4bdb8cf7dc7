//! # Asset Ledger
//!
//! Balances of every holder in every asset, persisted in the `balances`
//! tree of [`CaliberDB`]. The escrow core moves funds exclusively through
//! the [`AssetTransfer`] trait, so a different settlement backend can be
//! slotted in without touching escrow logic.
//!
//! ## Key Layout
//!
//! ```text
//! native:   holder (32B) ‖ 0x00               → amount (u64 BE)
//! fungible: holder (32B) ‖ 0x01 ‖ mint (32B)  → amount (u64 BE)
//! ```
//!
//! Holder comes first so one holder's balances are a single prefix scan.
//! Missing keys read as a zero balance.
//!
//! ## Atomicity
//!
//! A transfer debits and credits inside one sled transaction. Either both
//! legs land or neither does; a failed transfer leaves every balance
//! untouched.

use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
};
use sled::Tree;
use thiserror::Error;
use tracing::debug;

use super::Asset;
use crate::identity::Address;
use crate::storage::{CaliberDB, Table};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// The source holder cannot cover the transfer.
    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: u64, requested: u64 },

    /// Crediting would push the destination past `u64::MAX`.
    #[error("balance overflow")]
    Overflow,

    #[error("ledger storage error: {0}")]
    Storage(String),
}

// ---------------------------------------------------------------------------
// Transfer Seam
// ---------------------------------------------------------------------------

/// Moves value between holders. Implementations must be all-or-nothing.
pub trait AssetTransfer: Send + Sync {
    fn transfer(
        &self,
        asset: &Asset,
        from: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<(), TransferError>;

    fn balance_of(&self, asset: &Asset, holder: &Address) -> Result<u64, TransferError>;
}

impl<T: AssetTransfer + ?Sized> AssetTransfer for std::sync::Arc<T> {
    fn transfer(
        &self,
        asset: &Asset,
        from: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<(), TransferError> {
        (**self).transfer(asset, from, to, amount)
    }

    fn balance_of(&self, asset: &Asset, holder: &Address) -> Result<u64, TransferError> {
        (**self).balance_of(asset, holder)
    }
}

// ---------------------------------------------------------------------------
// AssetLedger
// ---------------------------------------------------------------------------

/// sled-backed balance ledger.
#[derive(Debug, Clone)]
pub struct AssetLedger {
    tree: Tree,
}

/// Storage key for `holder`'s balance of `asset`.
pub fn balance_key(asset: &Asset, holder: &Address) -> Vec<u8> {
    let mut key = holder.as_bytes().to_vec();
    key.extend_from_slice(&asset.key_prefix());
    key
}

/// Inverse of the asset half of [`balance_key`].
fn asset_from_suffix(suffix: &[u8]) -> Option<Asset> {
    match suffix {
        [0] => Some(Asset::Native),
        [1, mint @ ..] => {
            let mint: [u8; 32] = mint.try_into().ok()?;
            Some(Asset::Fungible(Address::from_bytes(mint)))
        }
        _ => None,
    }
}

fn read_amount(bytes: Option<&[u8]>) -> Result<u64, TransferError> {
    match bytes {
        None => Ok(0),
        Some(b) => {
            let arr: [u8; 8] = b
                .try_into()
                .map_err(|_| TransferError::Storage(format!("corrupt balance entry ({} bytes)", b.len())))?;
            Ok(u64::from_be_bytes(arr))
        }
    }
}

fn abort<T>(err: TransferError) -> ConflictableTransactionResult<T, TransferError> {
    Err(ConflictableTransactionError::Abort(err))
}

fn map_tx_error(err: TransactionError<TransferError>) -> TransferError {
    match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => TransferError::Storage(e.to_string()),
    }
}

impl AssetLedger {
    pub fn new(db: &CaliberDB) -> Self {
        Self {
            tree: db.tree(Table::Balances).clone(),
        }
    }

    /// Create `amount` of `asset` out of thin air and credit it to `to`.
    ///
    /// This is the devnet faucet and the test harness's funding primitive.
    /// Returns the new balance.
    pub fn mint(&self, asset: &Asset, to: &Address, amount: u64) -> Result<u64, TransferError> {
        let key = balance_key(asset, to);
        let new_balance = self
            .tree
            .transaction(|tx| -> ConflictableTransactionResult<u64, TransferError> {
                let current = match read_amount(tx.get(&key)?.as_deref()) {
                    Ok(v) => v,
                    Err(e) => return abort(e),
                };
                let Some(updated) = current.checked_add(amount) else {
                    return abort(TransferError::Overflow);
                };
                tx.insert(key.as_slice(), updated.to_be_bytes().to_vec())?;
                Ok(updated)
            })
            .map_err(map_tx_error)?;

        debug!(%asset, holder = %to, amount, new_balance, "minted");
        Ok(new_balance)
    }

    /// Every non-zero balance of `holder`, across all assets.
    pub fn holdings(&self, holder: &Address) -> Result<Vec<(Asset, u64)>, TransferError> {
        let mut out = Vec::new();
        for item in self.tree.scan_prefix(holder.as_bytes()) {
            let (key, value) = item.map_err(|e| TransferError::Storage(e.to_string()))?;
            let Some(asset) = asset_from_suffix(&key[32..]) else {
                return Err(TransferError::Storage(format!(
                    "corrupt balance key ({} bytes)",
                    key.len()
                )));
            };
            let amount = read_amount(Some(&value))?;
            if amount > 0 {
                out.push((asset, amount));
            }
        }
        Ok(out)
    }
}

impl AssetTransfer for AssetLedger {
    fn transfer(
        &self,
        asset: &Asset,
        from: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<(), TransferError> {
        let from_key = balance_key(asset, from);
        let to_key = balance_key(asset, to);

        self.tree
            .transaction(|tx| -> ConflictableTransactionResult<(), TransferError> {
                let available = match read_amount(tx.get(&from_key)?.as_deref()) {
                    Ok(v) => v,
                    Err(e) => return abort(e),
                };
                if available < amount {
                    return abort(TransferError::InsufficientBalance {
                        available,
                        requested: amount,
                    });
                }
                // Self-transfer: coverage checked above, nothing moves.
                if from_key == to_key {
                    return Ok(());
                }

                let current = match read_amount(tx.get(&to_key)?.as_deref()) {
                    Ok(v) => v,
                    Err(e) => return abort(e),
                };
                let Some(credited) = current.checked_add(amount) else {
                    return abort(TransferError::Overflow);
                };

                tx.insert(from_key.as_slice(), (available - amount).to_be_bytes().to_vec())?;
                tx.insert(to_key.as_slice(), credited.to_be_bytes().to_vec())?;
                Ok(())
            })
            .map_err(map_tx_error)?;

        debug!(%asset, %from, %to, amount, "transferred");
        Ok(())
    }

    fn balance_of(&self, asset: &Asset, holder: &Address) -> Result<u64, TransferError> {
        let value = self
            .tree
            .get(balance_key(asset, holder))
            .map_err(|e| TransferError::Storage(e.to_string()))?;
        read_amount(value.as_deref())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 32])
    }

    fn ledger() -> AssetLedger {
        AssetLedger::new(&CaliberDB::open_temporary().unwrap())
    }

    #[test]
    fn unknown_holder_has_zero_balance() {
        let l = ledger();
        assert_eq!(l.balance_of(&Asset::Native, &addr(1)).unwrap(), 0);
    }

    #[test]
    fn mint_credits_and_accumulates() {
        let l = ledger();
        assert_eq!(l.mint(&Asset::Native, &addr(1), 100).unwrap(), 100);
        assert_eq!(l.mint(&Asset::Native, &addr(1), 50).unwrap(), 150);
        assert_eq!(l.balance_of(&Asset::Native, &addr(1)).unwrap(), 150);
    }

    #[test]
    fn mint_overflow_is_rejected() {
        let l = ledger();
        l.mint(&Asset::Native, &addr(1), u64::MAX).unwrap();
        assert_eq!(l.mint(&Asset::Native, &addr(1), 1), Err(TransferError::Overflow));
        assert_eq!(l.balance_of(&Asset::Native, &addr(1)).unwrap(), u64::MAX);
    }

    #[test]
    fn transfer_moves_funds() {
        let l = ledger();
        l.mint(&Asset::Native, &addr(1), 1_000).unwrap();
        l.transfer(&Asset::Native, &addr(1), &addr(2), 400).unwrap();
        assert_eq!(l.balance_of(&Asset::Native, &addr(1)).unwrap(), 600);
        assert_eq!(l.balance_of(&Asset::Native, &addr(2)).unwrap(), 400);
    }

    #[test]
    fn insufficient_transfer_changes_nothing() {
        let l = ledger();
        l.mint(&Asset::Native, &addr(1), 10).unwrap();
        let err = l.transfer(&Asset::Native, &addr(1), &addr(2), 11).unwrap_err();
        assert_eq!(
            err,
            TransferError::InsufficientBalance {
                available: 10,
                requested: 11
            }
        );
        assert_eq!(l.balance_of(&Asset::Native, &addr(1)).unwrap(), 10);
        assert_eq!(l.balance_of(&Asset::Native, &addr(2)).unwrap(), 0);
    }

    #[test]
    fn credit_overflow_leaves_source_untouched() {
        let l = ledger();
        l.mint(&Asset::Native, &addr(1), 5).unwrap();
        l.mint(&Asset::Native, &addr(2), u64::MAX).unwrap();
        assert_eq!(
            l.transfer(&Asset::Native, &addr(1), &addr(2), 5),
            Err(TransferError::Overflow)
        );
        assert_eq!(l.balance_of(&Asset::Native, &addr(1)).unwrap(), 5);
    }

    #[test]
    fn self_transfer_is_a_checked_noop() {
        let l = ledger();
        l.mint(&Asset::Native, &addr(1), 5).unwrap();
        l.transfer(&Asset::Native, &addr(1), &addr(1), 5).unwrap();
        assert_eq!(l.balance_of(&Asset::Native, &addr(1)).unwrap(), 5);
        assert!(l.transfer(&Asset::Native, &addr(1), &addr(1), 6).is_err());
    }

    #[test]
    fn assets_are_isolated() {
        let l = ledger();
        let usd = Asset::Fungible(addr(9));
        let eur = Asset::Fungible(addr(8));
        l.mint(&usd, &addr(1), 100).unwrap();

        assert_eq!(l.balance_of(&Asset::Native, &addr(1)).unwrap(), 0);
        assert_eq!(l.balance_of(&eur, &addr(1)).unwrap(), 0);
        assert!(l.transfer(&eur, &addr(1), &addr(2), 1).is_err());
        l.transfer(&usd, &addr(1), &addr(2), 100).unwrap();
        assert_eq!(l.balance_of(&usd, &addr(2)).unwrap(), 100);
    }

    #[test]
    fn holdings_lists_nonzero_balances() {
        let l = ledger();
        let usd = Asset::Fungible(addr(9));
        l.mint(&Asset::Native, &addr(1), 7).unwrap();
        l.mint(&usd, &addr(1), 3).unwrap();
        l.mint(&usd, &addr(2), 3).unwrap();
        l.transfer(&usd, &addr(2), &addr(3), 3).unwrap();

        let mut h = l.holdings(&addr(1)).unwrap();
        h.sort_by_key(|(a, _)| a.tag());
        assert_eq!(h, vec![(Asset::Native, 7), (usd, 3)]);
        assert!(l.holdings(&addr(2)).unwrap().is_empty());
    }

    #[test]
    fn balance_keys_group_by_holder() {
        let usd = Asset::Fungible(addr(9));
        let native = balance_key(&Asset::Native, &addr(1));
        let token = balance_key(&usd, &addr(1));
        assert!(native.starts_with(addr(1).as_bytes()));
        assert!(token.starts_with(addr(1).as_bytes()));
        assert_eq!(asset_from_suffix(&token[32..]), Some(usd));
        assert_eq!(asset_from_suffix(&native[32..]), Some(Asset::Native));
        assert_eq!(asset_from_suffix(&[7]), None);
    }

    #[test]
    fn holdings_ignore_holders_sharing_a_mint() {
        let l = ledger();
        // addr(9) is both a holder and a mint.
        let token = Asset::Fungible(addr(9));
        l.mint(&token, &addr(1), 4).unwrap();
        l.mint(&Asset::Native, &addr(9), 6).unwrap();

        assert_eq!(l.holdings(&addr(9)).unwrap(), vec![(Asset::Native, 6)]);
        assert_eq!(l.holdings(&addr(1)).unwrap(), vec![(token, 4)]);
    }

    #[test]
    fn concurrent_transfers_conserve_supply() {
        let l = Arc::new(ledger());
        l.mint(&Asset::Native, &addr(1), 1_000).unwrap();

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let l = Arc::clone(&l);
                thread::spawn(move || {
                    for _ in 0..20 {
                        // Some of these fail once the source runs dry.
                        let _ = l.transfer(&Asset::Native, &addr(1), &addr(10 + i), 7);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("transfer thread should not panic");
        }

        let total: u64 = std::iter::once(1)
            .chain(10..20)
            .map(|b| l.balance_of(&Asset::Native, &addr(b)).unwrap())
            .sum();
        assert_eq!(total, 1_000);
    }
}
