//! Balance transitions.
//!
//! Each ledger operation moves funds between three buckets of one account.
//! `BalanceChange` captures that movement as signed deltas and applies it to
//! an account snapshot, rejecting transitions that would leave a bucket
//! negative.

use boothpay_common::{now, Amount, LedgerError, Result};
use serde::{Deserialize, Serialize};

use crate::account::Account;
use crate::journal::TransactionKind;

/// Signed deltas an operation applies to an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChange {
    /// Operation that produced the change.
    pub kind: TransactionKind,
    /// Positive amount requested by the caller.
    pub requested: Amount,
    /// Delta applied to `balance`.
    pub balance_delta: Amount,
    /// Delta applied to `available`.
    pub available_delta: Amount,
    /// Delta applied to `held`.
    pub held_delta: Amount,
}

impl BalanceChange {
    /// Build the change for an operation. Fails on non-positive amounts.
    pub fn for_operation(kind: TransactionKind, requested: Amount) -> Result<Self> {
        let a = requested.ensure_positive()?;
        let z = Amount::ZERO;

        let (balance_delta, available_delta, held_delta) = match kind {
            TransactionKind::Deposit | TransactionKind::Refund => (a, a, z),
            TransactionKind::Withdrawal | TransactionKind::Payout => (-a, -a, z),
            TransactionKind::Hold => (z, -a, a),
            TransactionKind::Release => (z, a, -a),
            TransactionKind::Capture => (-a, z, -a),
        };

        Ok(Self {
            kind,
            requested: a,
            balance_delta,
            available_delta,
            held_delta,
        })
    }

    /// Compute the account state after this change.
    ///
    /// The input is left untouched; the caller publishes the returned state
    /// only after the matching transaction is durable.
    pub fn apply_to(&self, account: &Account) -> Result<Account> {
        if self.available_delta.is_negative() && account.available < self.requested {
            return Err(LedgerError::InsufficientAvailableFunds {
                account: account.account_id.clone(),
                requested: self.requested,
                available: account.available,
            });
        }
        if self.held_delta.is_negative() && account.held < self.requested {
            return Err(LedgerError::InsufficientHeldFunds {
                account: account.account_id.clone(),
                requested: self.requested,
                held: account.held,
            });
        }

        let mut next = account.clone();
        next.balance = account.balance.try_add(self.balance_delta)?;
        next.available = account.available.try_add(self.available_delta)?;
        next.held = account.held.try_add(self.held_delta)?;
        next.version = account
            .version
            .checked_add(1)
            .ok_or(LedgerError::AmountOverflow)?;
        next.updated_at = now();

        debug_assert!(next.is_consistent());
        Ok(next)
    }
}
