//! # Vault Registry
//!
//! The vault is a singleton: one admin, set once, and up to
//! [`MAX_OPERATORS`] operators the admin can add and remove. Operators are
//! the only identities allowed to disburse deposited funds.
//!
//! The operator set is a plain `Vec` scanned linearly. At five entries a
//! hash set would cost more than it saves, and insertion order is kept.

use serde::{Deserialize, Serialize};

use caliber_protocol::config::{MAX_OPERATORS, VAULT_SEED};
use caliber_protocol::identity::Address;

use crate::error::EscrowError;

/// Storage key of the singleton vault record.
pub const VAULT_KEY: &[u8] = b"vault";

/// The holder address that custodies every deposited balance.
pub fn pool_address() -> Address {
    Address::derive(&[VAULT_SEED])
}

/// The singleton custody record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    /// Set at initialization, never changed.
    pub admin: Address,
    /// Distinct, at most [`MAX_OPERATORS`], in insertion order.
    pub operators: Vec<Address>,
}

impl Vault {
    /// Builds a vault, applying the same rules as [`Vault::add_operator`] to
    /// each initial operator in order.
    ///
    /// # Errors
    ///
    /// [`EscrowError::OperatorAlreadyExists`] on a repeated operator,
    /// [`EscrowError::ExceedOperatorLimit`] past the sixth.
    pub fn new(admin: Address, operators: &[Address]) -> Result<Self, EscrowError> {
        let mut vault = Self {
            admin,
            operators: Vec::with_capacity(operators.len().min(MAX_OPERATORS)),
        };
        for op in operators {
            vault.push_operator(*op)?;
        }
        Ok(vault)
    }

    pub fn is_admin(&self, who: &Address) -> bool {
        self.admin == *who
    }

    pub fn is_operator(&self, who: &Address) -> bool {
        self.operators.contains(who)
    }

    fn ensure_admin(&self, caller: &Address) -> Result<(), EscrowError> {
        if self.is_admin(caller) {
            Ok(())
        } else {
            Err(EscrowError::Unauthorized)
        }
    }

    fn push_operator(&mut self, operator: Address) -> Result<(), EscrowError> {
        if self.is_operator(&operator) {
            return Err(EscrowError::OperatorAlreadyExists);
        }
        if self.operators.len() >= MAX_OPERATORS {
            return Err(EscrowError::ExceedOperatorLimit);
        }
        self.operators.push(operator);
        Ok(())
    }

    /// Admin-only. Appends `operator`.
    pub fn add_operator(&mut self, caller: &Address, operator: Address) -> Result<(), EscrowError> {
        self.ensure_admin(caller)?;
        self.push_operator(operator)
    }

    /// Admin-only. Removes `operator`, keeping the order of the rest.
    pub fn remove_operator(
        &mut self,
        caller: &Address,
        operator: &Address,
    ) -> Result<(), EscrowError> {
        self.ensure_admin(caller)?;
        let idx = self
            .operators
            .iter()
            .position(|op| op == operator)
            .ok_or(EscrowError::OperatorNotExists)?;
        self.operators.remove(idx);
        Ok(())
    }
}
