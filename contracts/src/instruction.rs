//! # Instruction Set
//!
//! The six escrow operations as data. Clients serialize an [`Instruction`]
//! with bincode, sign the bytes, and submit the result as a
//! [`SignedCall`](caliber_protocol::identity::SignedCall). The node verifies
//! the signature and hands the instruction to
//! [`Escrow::execute`](crate::escrow::Escrow::execute) with the signer as
//! caller.
//!
//! Every accepted instruction produces a [`Receipt`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use caliber_protocol::asset::Asset;
use caliber_protocol::identity::Address;

use crate::deposit::DepositKey;

/// An escrow operation. The caller is never part of the instruction; it
/// comes from the verified signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Instruction {
    /// The caller becomes admin.
    InitializeVault { operators: Vec<Address> },
    AddOperator { operator: Address },
    RemoveOperator { operator: Address },
    /// The caller is the depositor.
    Deposit {
        salt: u64,
        amount: u64,
        asset: Asset,
        allowed_list: Vec<Address>,
    },
    Disburse {
        owner: Address,
        salt: u64,
        receiver: Address,
        amount: u64,
    },
    Reclaim { owner: Address, salt: u64 },
}

impl Instruction {
    /// Short, stable name. Used for logs and metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            Instruction::InitializeVault { .. } => "initialize_vault",
            Instruction::AddOperator { .. } => "add_operator",
            Instruction::RemoveOperator { .. } => "remove_operator",
            Instruction::Deposit { .. } => "deposit",
            Instruction::Disburse { .. } => "disburse",
            Instruction::Reclaim { .. } => "reclaim",
        }
    }

    /// The bytes a client signs.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

/// The effect of an accepted instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    VaultInitialized {
        admin: Address,
        operators: Vec<Address>,
    },
    OperatorAdded { operator: Address },
    OperatorRemoved { operator: Address },
    Deposited {
        key: DepositKey,
        amount: u64,
        asset: Asset,
    },
    Disbursed {
        key: DepositKey,
        receiver: Address,
        amount: u64,
        transferred_amount: u64,
    },
    Reclaimed { key: DepositKey, amount: u64 },
}

/// Proof of an accepted instruction, pushed to event subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub id: Uuid,
    pub caller: Address,
    pub instruction: String,
    pub outcome: Outcome,
    pub executed_at: DateTime<Utc>,
}

impl Receipt {
    pub fn new(caller: Address, instruction: &'static str, outcome: Outcome) -> Self {
        Self {
            id: Uuid::new_v4(),
            caller,
            instruction: instruction.to_string(),
            outcome,
            executed_at: Utc::now(),
        }
    }
}
