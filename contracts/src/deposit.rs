//! # Deposit Ledger Records
//!
//! A deposit is escrowed value owned by one depositor, keyed by
//! `(owner, salt)`. The salt is whatever the depositor picks (a timestamp
//! works) so one owner can hold many deposits at once.
//!
//! Two running totals track where the money went:
//!
//! - `transferred_amount` — disbursed by operators during the window.
//! - `withdraw_amount` — reclaimed by the owner after the window. Set once.
//!
//! `transferred_amount + withdraw_amount <= amount` holds for every record
//! this crate writes.

use serde::{Deserialize, Serialize};
use std::fmt;

use caliber_protocol::asset::Asset;
use caliber_protocol::config::{MAX_ALLOWED_LIST, USER_DEPOSIT_SEED};
use caliber_protocol::identity::Address;

use crate::error::EscrowError;

// ---------------------------------------------------------------------------
// DepositKey
// ---------------------------------------------------------------------------

/// Length of a deposit's storage key: owner (32) followed by salt (8, BE).
pub const DEPOSIT_KEY_LEN: usize = 40;

/// Composite identity of a deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DepositKey {
    pub owner: Address,
    pub salt: u64,
}

impl DepositKey {
    pub fn new(owner: Address, salt: u64) -> Self {
        Self { owner, salt }
    }

    /// `owner ‖ salt_be`. Big-endian so an owner's deposits sort by salt.
    pub fn storage_key(&self) -> [u8; DEPOSIT_KEY_LEN] {
        let mut key = [0u8; DEPOSIT_KEY_LEN];
        key[..32].copy_from_slice(self.owner.as_bytes());
        key[32..].copy_from_slice(&self.salt.to_be_bytes());
        key
    }

    pub fn from_storage_key(key: &[u8]) -> Option<Self> {
        if key.len() != DEPOSIT_KEY_LEN {
            return None;
        }
        let mut owner = [0u8; 32];
        owner.copy_from_slice(&key[..32]);
        let mut salt = [0u8; 8];
        salt.copy_from_slice(&key[32..]);
        Some(Self::new(Address::from_bytes(owner), u64::from_be_bytes(salt)))
    }

    /// Deterministic account address of this deposit, derived from
    /// `USER_DEPOSIT ‖ owner ‖ salt_le`. Clients use it as a stable handle.
    pub fn address(&self) -> Address {
        Address::derive(&[USER_DEPOSIT_SEED, self.owner.as_bytes(), &self.salt.to_le_bytes()])
    }
}

impl fmt::Display for DepositKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.salt)
    }
}

// ---------------------------------------------------------------------------
// Deposit
// ---------------------------------------------------------------------------

/// An escrowed deposit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub owner: Address,
    pub salt: u64,
    /// Total escrowed, in the asset's smallest unit.
    pub amount: u64,
    pub asset: Asset,
    /// Receivers operators may pay. Distinct, at most [`MAX_ALLOWED_LIST`].
    pub allowed_list: Vec<Address>,
    /// Unix seconds at creation.
    pub deposited_at: u64,
    pub transferred_amount: u64,
    pub withdraw_amount: u64,
}

impl Deposit {
    pub fn key(&self) -> DepositKey {
        DepositKey::new(self.owner, self.salt)
    }

    pub fn is_allowed(&self, receiver: &Address) -> bool {
        self.allowed_list.contains(receiver)
    }

    /// What the owner could still reclaim: `amount − transferred − withdrawn`.
    pub fn remaining(&self) -> Result<u64, EscrowError> {
        self.amount
            .checked_sub(self.transferred_amount)
            .and_then(|r| r.checked_sub(self.withdraw_amount))
            .ok_or(EscrowError::ArithmeticOverflow)
    }
}

/// Checks the allow-list bounds: at most [`MAX_ALLOWED_LIST`] entries, all
/// distinct.
pub fn validate_allowed_list(list: &[Address]) -> Result<(), EscrowError> {
    if list.len() > MAX_ALLOWED_LIST {
        return Err(EscrowError::ExceedAllowedListLimit);
    }
    for (i, receiver) in list.iter().enumerate() {
        if list[..i].contains(receiver) {
            return Err(EscrowError::DuplicateAllowedReceiver);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 32])
    }

    fn sample(amount: u64) -> Deposit {
        Deposit {
            owner: addr(1),
            salt: 7,
            amount,
            asset: Asset::Native,
            allowed_list: vec![addr(2), addr(3)],
            deposited_at: 1_000,
            transferred_amount: 0,
            withdraw_amount: 0,
        }
    }

    #[test]
    fn storage_key_roundtrip() {
        let key = DepositKey::new(addr(1), 0x0102_0304);
        let raw = key.storage_key();
        assert_eq!(&raw[..32], addr(1).as_bytes());
        assert_eq!(DepositKey::from_storage_key(&raw), Some(key));
        assert_eq!(DepositKey::from_storage_key(&raw[..39]), None);
    }

    #[test]
    fn storage_keys_sort_by_salt() {
        let a = DepositKey::new(addr(1), 2).storage_key();
        let b = DepositKey::new(addr(1), 256).storage_key();
        assert!(a < b);
    }

    #[test]
    fn deposit_address_depends_on_salt() {
        let a = DepositKey::new(addr(1), 1);
        let b = DepositKey::new(addr(1), 2);
        assert_eq!(a.address(), a.address());
        assert_ne!(a.address(), b.address());
    }

    #[test]
    fn remaining_accounts_for_both_totals() {
        let mut d = sample(10);
        assert_eq!(d.remaining(), Ok(10));
        d.transferred_amount = 4;
        assert_eq!(d.remaining(), Ok(6));
        d.withdraw_amount = 6;
        assert_eq!(d.remaining(), Ok(0));
    }

    #[test]
    fn allow_list_bounds() {
        assert!(validate_allowed_list(&[]).is_ok());
        let five: Vec<_> = (0..5).map(addr).collect();
        assert!(validate_allowed_list(&five).is_ok());

        let six: Vec<_> = (0..6).map(addr).collect();
        assert_eq!(validate_allowed_list(&six), Err(EscrowError::ExceedAllowedListLimit));
        assert_eq!(
            validate_allowed_list(&[addr(1), addr(2), addr(1)]),
            Err(EscrowError::DuplicateAllowedReceiver)
        );
    }

    #[test]
    fn allowed_membership() {
        let d = sample(1);
        assert!(d.is_allowed(&addr(2)));
        assert!(!d.is_allowed(&addr(9)));
    }
}
