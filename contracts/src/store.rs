//! # Escrow Record Store
//!
//! The escrow service persists two record kinds and needs exactly three
//! primitives for them: read, create-if-absent and compare-and-swap.
//! [`EscrowStore`] names that contract; [`CaliberDB`] provides it.

use caliber_protocol::identity::Address;
use caliber_protocol::storage::{CaliberDB, Table};

use crate::deposit::{Deposit, DepositKey};
use crate::error::EscrowError;
use crate::vault::{Vault, VAULT_KEY};

/// Keyed storage for the vault singleton and deposit records.
///
/// `create_*` return `false` when the key is already taken; `swap_*` return
/// `false` when the stored record is no longer `old`. Neither writes in
/// that case.
pub trait EscrowStore: Send + Sync {
    fn load_vault(&self) -> Result<Option<Vault>, EscrowError>;
    fn create_vault(&self, vault: &Vault) -> Result<bool, EscrowError>;
    fn swap_vault(&self, old: &Vault, new: &Vault) -> Result<bool, EscrowError>;

    fn load_deposit(&self, key: &DepositKey) -> Result<Option<Deposit>, EscrowError>;
    fn create_deposit(&self, deposit: &Deposit) -> Result<bool, EscrowError>;
    fn swap_deposit(&self, old: &Deposit, new: &Deposit) -> Result<bool, EscrowError>;

    /// All deposits of `owner`, ascending by salt.
    fn deposits_of(&self, owner: &Address) -> Result<Vec<Deposit>, EscrowError>;
}

impl EscrowStore for CaliberDB {
    fn load_vault(&self) -> Result<Option<Vault>, EscrowError> {
        Ok(self.get(Table::Vault, VAULT_KEY)?)
    }

    fn create_vault(&self, vault: &Vault) -> Result<bool, EscrowError> {
        Ok(self.insert_if_absent(Table::Vault, VAULT_KEY, vault)?)
    }

    fn swap_vault(&self, old: &Vault, new: &Vault) -> Result<bool, EscrowError> {
        Ok(self.compare_and_swap(Table::Vault, VAULT_KEY, old, new)?)
    }

    fn load_deposit(&self, key: &DepositKey) -> Result<Option<Deposit>, EscrowError> {
        Ok(self.get(Table::Deposits, &key.storage_key())?)
    }

    fn create_deposit(&self, deposit: &Deposit) -> Result<bool, EscrowError> {
        Ok(self.insert_if_absent(Table::Deposits, &deposit.key().storage_key(), deposit)?)
    }

    fn swap_deposit(&self, old: &Deposit, new: &Deposit) -> Result<bool, EscrowError> {
        Ok(self.compare_and_swap(Table::Deposits, &old.key().storage_key(), old, new)?)
    }

    fn deposits_of(&self, owner: &Address) -> Result<Vec<Deposit>, EscrowError> {
        Ok(self
            .scan_prefix::<Deposit>(Table::Deposits, owner.as_bytes())?
            .into_iter()
            .map(|(_, d)| d)
            .collect())
    }
}

impl<T: EscrowStore + ?Sized> EscrowStore for std::sync::Arc<T> {
    fn load_vault(&self) -> Result<Option<Vault>, EscrowError> {
        (**self).load_vault()
    }
    fn create_vault(&self, vault: &Vault) -> Result<bool, EscrowError> {
        (**self).create_vault(vault)
    }
    fn swap_vault(&self, old: &Vault, new: &Vault) -> Result<bool, EscrowError> {
        (**self).swap_vault(old, new)
    }
    fn load_deposit(&self, key: &DepositKey) -> Result<Option<Deposit>, EscrowError> {
        (**self).load_deposit(key)
    }
    fn create_deposit(&self, deposit: &Deposit) -> Result<bool, EscrowError> {
        (**self).create_deposit(deposit)
    }
    fn swap_deposit(&self, old: &Deposit, new: &Deposit) -> Result<bool, EscrowError> {
        (**self).swap_deposit(old, new)
    }
    fn deposits_of(&self, owner: &Address) -> Result<Vec<Deposit>, EscrowError> {
        (**self).deposits_of(owner)
    }
}
