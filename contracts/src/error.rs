//! # Escrow Errors
//!
//! Every way an escrow operation can be turned down. All of them reject the
//! call with zero side effects: no balance moved, no record written.

use caliber_protocol::asset::TransferError;
use caliber_protocol::storage::DbError;
use thiserror::Error;

/// Errors that can occur during vault and deposit operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EscrowError {
    /// The caller is not the admin, not an operator, or not the depositor,
    /// whichever the operation requires.
    #[error("caller is not authorized for this operation")]
    Unauthorized,

    #[error("vault is already initialized")]
    AlreadyInitialized,

    #[error("vault has not been initialized")]
    VaultNotInitialized,

    #[error("operator is already registered")]
    OperatorAlreadyExists,

    #[error("operator limit reached")]
    ExceedOperatorLimit,

    #[error("operator is not registered")]
    OperatorNotExists,

    #[error("allowed receiver list is too long")]
    ExceedAllowedListLimit,

    #[error("allowed receiver list contains a duplicate")]
    DuplicateAllowedReceiver,

    #[error("a deposit with this owner and salt already exists")]
    DepositAlreadyExists,

    #[error("deposit not found")]
    DepositNotFound,

    /// Reclaim attempted while operators may still disburse.
    #[error("deposit is still within its transfer window")]
    InTransferTime,

    /// Disburse attempted after the transfer window closed.
    #[error("transfer window has expired")]
    ExpiredTransferTime,

    #[error("receiver is not on the deposit's allowed list")]
    InvalidAllowedReceiver,

    #[error("disbursement would exceed the deposited amount")]
    ExceedTransferAmount,

    /// A running total would not fit in a `u64`.
    ///
    /// Checked before any cap comparison, so a wrapped sum can never sneak
    /// under a limit.
    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    #[error("nothing left to withdraw")]
    NoWithdrawAmount,

    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: u64, requested: u64 },

    #[error("storage error: {0}")]
    Storage(String),
}

impl EscrowError {
    /// Stable identifier used in RPC error payloads and metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            EscrowError::Unauthorized => "Unauthorized",
            EscrowError::AlreadyInitialized => "AlreadyInitialized",
            EscrowError::VaultNotInitialized => "VaultNotInitialized",
            EscrowError::OperatorAlreadyExists => "OperatorAlreadyExists",
            EscrowError::ExceedOperatorLimit => "ExceedOperatorLimit",
            EscrowError::OperatorNotExists => "OperatorNotExists",
            EscrowError::ExceedAllowedListLimit => "ExceedAllowedListLimit",
            EscrowError::DuplicateAllowedReceiver => "DuplicateAllowedReceiver",
            EscrowError::DepositAlreadyExists => "DepositAlreadyExists",
            EscrowError::DepositNotFound => "DepositNotFound",
            EscrowError::InTransferTime => "InTransferTime",
            EscrowError::ExpiredTransferTime => "ExpiredTransferTime",
            EscrowError::InvalidAllowedReceiver => "InvalidAllowedReceiver",
            EscrowError::ExceedTransferAmount => "ExceedTransferAmount",
            EscrowError::ArithmeticOverflow => "ArithmeticOverflow",
            EscrowError::NoWithdrawAmount => "NoWithdrawAmount",
            EscrowError::InsufficientBalance { .. } => "InsufficientBalance",
            EscrowError::Storage(_) => "Storage",
        }
    }
}

impl From<DbError> for EscrowError {
    fn from(err: DbError) -> Self {
        EscrowError::Storage(err.to_string())
    }
}

impl From<TransferError> for EscrowError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::InsufficientBalance {
                available,
                requested,
            } => EscrowError::InsufficientBalance {
                available,
                requested,
            },
            TransferError::Overflow => EscrowError::ArithmeticOverflow,
            TransferError::Storage(msg) => EscrowError::Storage(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_errors_map_onto_escrow_errors() {
        let e: EscrowError = TransferError::InsufficientBalance {
            available: 1,
            requested: 2,
        }
        .into();
        assert_eq!(e.name(), "InsufficientBalance");
        assert_eq!(
            EscrowError::from(TransferError::Overflow),
            EscrowError::ArithmeticOverflow
        );
    }

    #[test]
    fn names_match_variants() {
        assert_eq!(EscrowError::NoWithdrawAmount.name(), "NoWithdrawAmount");
        assert_eq!(EscrowError::Storage("x".into()).name(), "Storage");
    }
}
