//! Wallet account state.

use boothpay_common::{now, AccountId, Amount, Timestamp};
use serde::{Deserialize, Serialize};

/// A wallet account: one per marketplace user.
///
/// `balance` is what the user owns; it is split into `available` (free to
/// withdraw or hold) and `held` (earmarked for a pending obligation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Owning user.
    pub account_id: AccountId,
    /// Total funds owned.
    pub balance: Amount,
    /// Funds free to withdraw or hold.
    pub available: Amount,
    /// Funds reserved against pending obligations.
    pub held: Amount,
    /// Number of transactions applied; sequence of the latest one.
    pub version: u64,
    /// When the account was first referenced.
    pub created_at: Timestamp,
    /// When the account was last mutated.
    pub updated_at: Timestamp,
}

impl Account {
    /// Create a zero-balance account.
    pub fn new(account_id: AccountId) -> Self {
        let now = now();
        Self {
            account_id,
            balance: Amount::ZERO,
            available: Amount::ZERO,
            held: Amount::ZERO,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// `balance == available + held`, neither part negative.
    pub fn is_consistent(&self) -> bool {
        !self.available.is_negative()
            && !self.held.is_negative()
            && self.available.checked_add(self.held) == Some(self.balance)
    }

    /// Whether any transaction has touched this account.
    pub fn is_pristine(&self) -> bool {
        self.version == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_account_is_zero() {
        let account = Account::new(AccountId::new("owner_1"));
        assert_eq!(account.balance, Amount::ZERO);
        assert_eq!(account.available, Amount::ZERO);
        assert_eq!(account.held, Amount::ZERO);
        assert!(account.is_consistent());
        assert!(account.is_pristine());
    }

    #[test]
    fn test_consistency_detects_drift() {
        let mut account = Account::new(AccountId::new("owner_1"));
        account.balance = Amount::from_minor(1000);
        account.available = Amount::from_minor(600);
        account.held = Amount::from_minor(400);
        assert!(account.is_consistent());

        account.held = Amount::from_minor(300);
        assert!(!account.is_consistent());

        account.available = Amount::from_minor(-100);
        account.held = Amount::from_minor(1100);
        assert!(!account.is_consistent());
    }
}
