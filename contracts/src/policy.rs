//! # Disbursement Policy
//!
//! Pure checks. Nothing here reads a clock or touches storage; callers pass
//! in the record, the caller and the single `now` reading for the call.
//!
//! ## The Window
//!
//! Each deposit has one boundary, `deposited_at + window`:
//!
//! ```text
//!   deposited_at            boundary
//!        |-----------------------|------------------------->
//!        operators may disburse  | owner may reclaim
//!        (now <= boundary)       | (now > boundary)
//! ```
//!
//! The two gates never both open at the same instant, which is what makes
//! disburse and reclaim mutually exclusive on a record.

use serde::{Deserialize, Serialize};

use caliber_protocol::identity::Address;

use crate::deposit::Deposit;
use crate::error::EscrowError;
use crate::vault::Vault;

/// Derived, never stored. Recomputed from the record and `now` on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositPhase {
    /// Inside the window. Operators may disburse.
    Disbursing,
    /// Window closed with something left. The owner may reclaim.
    Reclaimable,
    /// Window closed with nothing left.
    Settled,
}

/// Last instant at which operators may still disburse.
pub fn window_end(deposited_at: u64, window_secs: u64) -> u64 {
    deposited_at.saturating_add(window_secs)
}

pub fn in_transfer_window(deposit: &Deposit, now: u64, window_secs: u64) -> bool {
    now <= window_end(deposit.deposited_at, window_secs)
}

pub fn phase(deposit: &Deposit, now: u64, window_secs: u64) -> DepositPhase {
    if in_transfer_window(deposit, now, window_secs) {
        DepositPhase::Disbursing
    } else if deposit.remaining().unwrap_or(0) == 0 {
        DepositPhase::Settled
    } else {
        DepositPhase::Reclaimable
    }
}

/// Validates an operator disbursement and returns the new
/// `transferred_amount`.
///
/// Checks run in a fixed order: operator, window, receiver, overflow, cap.
pub fn check_disburse(
    vault: &Vault,
    deposit: &Deposit,
    caller: &Address,
    receiver: &Address,
    amount: u64,
    now: u64,
    window_secs: u64,
) -> Result<u64, EscrowError> {
    if !vault.is_operator(caller) {
        return Err(EscrowError::Unauthorized);
    }
    if !in_transfer_window(deposit, now, window_secs) {
        return Err(EscrowError::ExpiredTransferTime);
    }
    if !deposit.is_allowed(receiver) {
        return Err(EscrowError::InvalidAllowedReceiver);
    }
    let total = deposit
        .transferred_amount
        .checked_add(amount)
        .ok_or(EscrowError::ArithmeticOverflow)?;
    if total > deposit.amount {
        return Err(EscrowError::ExceedTransferAmount);
    }
    Ok(total)
}

/// Validates an owner reclaim and returns the amount to pay out.
pub fn check_reclaim(
    deposit: &Deposit,
    caller: &Address,
    now: u64,
    window_secs: u64,
) -> Result<u64, EscrowError> {
    if deposit.owner != *caller {
        return Err(EscrowError::Unauthorized);
    }
    if in_transfer_window(deposit, now, window_secs) {
        return Err(EscrowError::InTransferTime);
    }
    match deposit.remaining()? {
        0 => Err(EscrowError::NoWithdrawAmount),
        remaining => Ok(remaining),
    }
}
