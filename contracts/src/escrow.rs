//! # Escrow Service
//!
//! [`Escrow`] ties the vault registry, deposit records, policy checks and
//! the asset ledger into the six operations callers actually invoke:
//!
//! | Operation          | Caller    | When                 |
//! |--------------------|-----------|----------------------|
//! | `initialize_vault` | anyone    | once                 |
//! | `add_operator`     | admin     | any time             |
//! | `remove_operator`  | admin     | any time             |
//! | `deposit`          | depositor | any time             |
//! | `disburse`         | operator  | `now <= boundary`    |
//! | `reclaim`          | depositor | `now > boundary`     |
//!
//! ## Atomicity
//!
//! Each operation either lands completely or leaves no trace. Funds and
//! records live in different places, so the service orders the two writes
//! and undoes the first if the second fails:
//!
//! - `deposit` moves funds into the pool, then creates the record.
//! - `disburse` and `reclaim` swap the record, then move funds out.
//!
//! ## Concurrency
//!
//! Vault mutations run under one registry lock. Deposit mutations run under
//! a per-deposit lock, so work on different deposits never contends. A
//! deposit's lock lives only while some call holds it; the table holds
//! in-flight keys, not every key ever named. Record writes are still
//! compare-and-swap, which catches writers outside this process.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{error, info, warn};

use caliber_protocol::asset::{Asset, AssetTransfer};
use caliber_protocol::clock::Clock;
use caliber_protocol::config::EscrowConfig;
use caliber_protocol::identity::Address;

use crate::deposit::{validate_allowed_list, Deposit, DepositKey};
use crate::error::EscrowError;
use crate::instruction::{Instruction, Outcome, Receipt};
use crate::policy::{self, DepositPhase};
use crate::store::EscrowStore;
use crate::vault::{pool_address, Vault};

fn rejected(op: &'static str, err: EscrowError) -> EscrowError {
    warn!(op, error = %err, "operation rejected");
    err
}

/// The escrow vault service.
pub struct Escrow<S, L, C> {
    store: S,
    ledger: L,
    clock: C,
    config: EscrowConfig,
    pool: Address,
    vault_lock: Mutex<()>,
    deposit_locks: DashMap<DepositKey, Arc<Mutex<()>>>,
}

impl<S: EscrowStore, L: AssetTransfer, C: Clock> Escrow<S, L, C> {
    pub fn new(store: S, ledger: L, clock: C, config: EscrowConfig) -> Self {
        Self {
            store,
            ledger,
            clock,
            config,
            pool: pool_address(),
            vault_lock: Mutex::new(()),
            deposit_locks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &EscrowConfig {
        &self.config
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Holder address of the pooled deposits.
    pub fn pool_address(&self) -> Address {
        self.pool
    }

    /// Runs `f` holding `key`'s lock, then drops the lock entry unless
    /// another call is waiting on it.
    fn with_deposit_lock<T>(&self, key: &DepositKey, f: impl FnOnce() -> T) -> T {
        let lock = self
            .deposit_locks
            .entry(*key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let result = {
            let _guard = lock.lock();
            f()
        };
        drop(lock);
        self.deposit_locks
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    // -- Vault registry ----------------------------------------------------

    /// Creates the vault. Succeeds exactly once per store.
    pub fn initialize_vault(
        &self,
        admin: &Address,
        operators: &[Address],
    ) -> Result<Vault, EscrowError> {
        let _guard = self.vault_lock.lock();
        let vault = self
            .try_initialize_vault(admin, operators)
            .map_err(|e| rejected("initialize_vault", e))?;
        info!(admin = %admin, operators = vault.operators.len(), "vault initialized");
        Ok(vault)
    }

    fn try_initialize_vault(
        &self,
        admin: &Address,
        operators: &[Address],
    ) -> Result<Vault, EscrowError> {
        if self.store.load_vault()?.is_some() {
            return Err(EscrowError::AlreadyInitialized);
        }
        let vault = Vault::new(*admin, operators)?;
        if !self.store.create_vault(&vault)? {
            return Err(EscrowError::AlreadyInitialized);
        }
        Ok(vault)
    }

    pub fn add_operator(&self, caller: &Address, operator: &Address) -> Result<(), EscrowError> {
        self.update_vault(|vault| vault.add_operator(caller, *operator))
            .map_err(|e| rejected("add_operator", e))?;
        info!(%operator, "operator added");
        Ok(())
    }

    pub fn remove_operator(&self, caller: &Address, operator: &Address) -> Result<(), EscrowError> {
        self.update_vault(|vault| vault.remove_operator(caller, operator))
            .map_err(|e| rejected("remove_operator", e))?;
        info!(%operator, "operator removed");
        Ok(())
    }

    fn update_vault<F>(&self, mutate: F) -> Result<(), EscrowError>
    where
        F: FnOnce(&mut Vault) -> Result<(), EscrowError>,
    {
        let _guard = self.vault_lock.lock();
        let current = self
            .store
            .load_vault()?
            .ok_or(EscrowError::VaultNotInitialized)?;
        let mut updated = current.clone();
        mutate(&mut updated)?;
        if !self.store.swap_vault(&current, &updated)? {
            return Err(EscrowError::Storage("vault changed concurrently".into()));
        }
        Ok(())
    }

    // -- Deposits ----------------------------------------------------------

    /// Escrows `amount` of `asset` from `caller` into the pool.
    pub fn deposit(
        &self,
        caller: &Address,
        salt: u64,
        amount: u64,
        asset: Asset,
        allowed_list: Vec<Address>,
    ) -> Result<DepositKey, EscrowError> {
        let key = DepositKey::new(*caller, salt);
        self.with_deposit_lock(&key, || {
            self.try_deposit(&key, amount, asset, allowed_list)
        })
        .map_err(|e| rejected("deposit", e))?;
        info!(owner = %caller, salt, amount, %asset, "deposit created");
        Ok(key)
    }

    fn try_deposit(
        &self,
        key: &DepositKey,
        amount: u64,
        asset: Asset,
        allowed_list: Vec<Address>,
    ) -> Result<(), EscrowError> {
        if self.store.load_vault()?.is_none() {
            return Err(EscrowError::VaultNotInitialized);
        }
        validate_allowed_list(&allowed_list)?;
        // Paying the pool would move nothing yet still count as disbursed.
        if allowed_list.contains(&self.pool) {
            return Err(EscrowError::InvalidAllowedReceiver);
        }

        if self.store.load_deposit(key)?.is_some() {
            return Err(EscrowError::DepositAlreadyExists);
        }

        let caller = &key.owner;
        let deposit = Deposit {
            owner: key.owner,
            salt: key.salt,
            amount,
            asset,
            allowed_list,
            deposited_at: self.clock.now(),
            transferred_amount: 0,
            withdraw_amount: 0,
        };

        self.ledger.transfer(&asset, caller, &self.pool, amount)?;
        match self.store.create_deposit(&deposit) {
            Ok(true) => Ok(()),
            Ok(false) => {
                self.undo_transfer(&asset, &self.pool, caller, amount);
                Err(EscrowError::DepositAlreadyExists)
            }
            Err(e) => {
                self.undo_transfer(&asset, &self.pool, caller, amount);
                Err(e)
            }
        }
    }

    /// Operator pays `amount` from the deposit to an allow-listed receiver.
    /// Returns the deposit's new `transferred_amount`.
    pub fn disburse(
        &self,
        caller: &Address,
        key: &DepositKey,
        receiver: &Address,
        amount: u64,
    ) -> Result<u64, EscrowError> {
        let transferred = self
            .with_deposit_lock(key, || self.try_disburse(caller, key, receiver, amount))
            .map_err(|e| rejected("disburse", e))?;
        info!(
            operator = %caller,
            owner = %key.owner,
            salt = key.salt,
            %receiver,
            amount,
            transferred,
            "disbursed"
        );
        Ok(transferred)
    }

    fn try_disburse(
        &self,
        caller: &Address,
        key: &DepositKey,
        receiver: &Address,
        amount: u64,
    ) -> Result<u64, EscrowError> {
        let vault = self
            .store
            .load_vault()?
            .ok_or(EscrowError::VaultNotInitialized)?;

        let current = self
            .store
            .load_deposit(key)?
            .ok_or(EscrowError::DepositNotFound)?;
        let now = self.clock.now();
        let transferred = policy::check_disburse(
            &vault,
            &current,
            caller,
            receiver,
            amount,
            now,
            self.config.transfer_window_secs,
        )?;

        let mut updated = current.clone();
        updated.transferred_amount = transferred;
        self.swap_deposit(&current, &updated)?;

        if let Err(e) = self.ledger.transfer(&current.asset, &self.pool, receiver, amount) {
            self.restore_deposit(&updated, &current);
            return Err(e.into());
        }
        Ok(transferred)
    }

    /// Owner takes back whatever operators did not disburse. Returns the
    /// amount paid out.
    pub fn reclaim(&self, caller: &Address, key: &DepositKey) -> Result<u64, EscrowError> {
        let amount = self
            .with_deposit_lock(key, || self.try_reclaim(caller, key))
            .map_err(|e| rejected("reclaim", e))?;
        info!(owner = %caller, salt = key.salt, amount, "reclaimed");
        Ok(amount)
    }

    fn try_reclaim(&self, caller: &Address, key: &DepositKey) -> Result<u64, EscrowError> {
        let current = self
            .store
            .load_deposit(key)?
            .ok_or(EscrowError::DepositNotFound)?;
        let now = self.clock.now();
        let remaining =
            policy::check_reclaim(&current, caller, now, self.config.transfer_window_secs)?;

        let mut updated = current.clone();
        updated.withdraw_amount = remaining;
        self.swap_deposit(&current, &updated)?;

        if let Err(e) = self.ledger.transfer(&current.asset, &self.pool, caller, remaining) {
            self.restore_deposit(&updated, &current);
            return Err(e.into());
        }
        Ok(remaining)
    }

    fn swap_deposit(&self, current: &Deposit, updated: &Deposit) -> Result<(), EscrowError> {
        if self.store.swap_deposit(current, updated)? {
            Ok(())
        } else {
            Err(EscrowError::Storage(format!(
                "deposit {} changed concurrently",
                current.key()
            )))
        }
    }

    /// Puts a record back after the fund movement that should have followed
    /// it failed.
    fn restore_deposit(&self, written: &Deposit, original: &Deposit) {
        match self.store.swap_deposit(written, original) {
            Ok(true) => {}
            Ok(false) => error!(key = %original.key(), "deposit changed before it could be restored"),
            Err(e) => error!(key = %original.key(), error = %e, "failed to restore deposit"),
        }
    }

    /// Returns funds moved by a step whose record write then failed.
    fn undo_transfer(&self, asset: &Asset, from: &Address, to: &Address, amount: u64) {
        if let Err(e) = self.ledger.transfer(asset, from, to, amount) {
            error!(%asset, %from, %to, amount, error = %e, "failed to undo transfer");
        }
    }

    // -- Queries -----------------------------------------------------------

    pub fn get_vault(&self) -> Result<Option<Vault>, EscrowError> {
        self.store.load_vault()
    }

    pub fn get_deposit(&self, key: &DepositKey) -> Result<Option<Deposit>, EscrowError> {
        self.store.load_deposit(key)
    }

    /// An owner's deposits, ascending by salt.
    pub fn list_deposits(&self, owner: &Address) -> Result<Vec<Deposit>, EscrowError> {
        self.store.deposits_of(owner)
    }

    /// Phase of `deposit` as of now.
    pub fn phase(&self, deposit: &Deposit) -> DepositPhase {
        policy::phase(deposit, self.clock.now(), self.config.transfer_window_secs)
    }

    /// Unix second at which `deposit`'s transfer window closes.
    pub fn window_end(&self, deposit: &Deposit) -> u64 {
        policy::window_end(deposit.deposited_at, self.config.transfer_window_secs)
    }

    // -- Dispatch ----------------------------------------------------------

    /// Runs `instruction` on behalf of an already-verified `caller`.
    pub fn execute(&self, caller: &Address, instruction: Instruction) -> Result<Receipt, EscrowError> {
        let name = instruction.name();
        let outcome = match instruction {
            Instruction::InitializeVault { operators } => {
                let vault = self.initialize_vault(caller, &operators)?;
                Outcome::VaultInitialized {
                    admin: vault.admin,
                    operators: vault.operators,
                }
            }
            Instruction::AddOperator { operator } => {
                self.add_operator(caller, &operator)?;
                Outcome::OperatorAdded { operator }
            }
            Instruction::RemoveOperator { operator } => {
                self.remove_operator(caller, &operator)?;
                Outcome::OperatorRemoved { operator }
            }
            Instruction::Deposit {
                salt,
                amount,
                asset,
                allowed_list,
            } => {
                let key = self.deposit(caller, salt, amount, asset, allowed_list)?;
                Outcome::Deposited { key, amount, asset }
            }
            Instruction::Disburse {
                owner,
                salt,
                receiver,
                amount,
            } => {
                let key = DepositKey::new(owner, salt);
                let transferred_amount = self.disburse(caller, &key, &receiver, amount)?;
                Outcome::Disbursed {
                    key,
                    receiver,
                    amount,
                    transferred_amount,
                }
            }
            Instruction::Reclaim { owner, salt } => {
                let key = DepositKey::new(owner, salt);
                let amount = self.reclaim(caller, &key)?;
                Outcome::Reclaimed { key, amount }
            }
        };
        Ok(Receipt::new(*caller, name, outcome))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
