//! In-memory store.

use async_trait::async_trait;
use boothpay_common::{AccountId, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{check_version, AccountRecord, LedgerStore};
use crate::account::Account;
use crate::journal::Transaction;

/// Volatile store backed by a concurrent map.
///
/// Nothing survives a restart; use it for tests and ephemeral ledgers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<AccountId, AccountRecord>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of accounts with persisted state.
    pub fn account_count(&self) -> usize {
        self.records.len()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn load_account(&self, account_id: &AccountId) -> Result<Option<Account>> {
        Ok(self.records.get(account_id).map(|r| r.account.clone()))
    }

    async fn open_account(&self, account: &Account) -> Result<()> {
        self.records
            .entry(account.account_id.clone())
            .or_insert_with(|| AccountRecord::new(account.clone()));
        Ok(())
    }

    async fn commit(&self, account: &Account, transaction: &Transaction) -> Result<()> {
        match self.records.entry(account.account_id.clone()) {
            Entry::Occupied(mut entry) => {
                check_version(account, entry.get().account.version)?;
                entry.get_mut().push(account, transaction);
            }
            Entry::Vacant(entry) => {
                check_version(account, 0)?;
                entry
                    .insert(AccountRecord::new(account.clone()))
                    .push(account, transaction);
            }
        }
        Ok(())
    }

    async fn list_for_account(&self, account_id: &AccountId, limit: usize) -> Result<Vec<Transaction>> {
        Ok(self
            .records
            .get(account_id)
            .map(|r| r.recent(limit))
            .unwrap_or_default())
    }

    async fn replay(&self, account_id: &AccountId) -> Result<Vec<Transaction>> {
        Ok(self
            .records
            .get(account_id)
            .map(|r| r.history.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::BalanceChange;
    use crate::journal::{TransactionDraft, TransactionKind, TransactionLog};
    use boothpay_common::{Amount, LedgerError};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_stale_snapshot_is_rejected() {
        let log = TransactionLog::new(Arc::new(MemoryStore::new()));
        let base = Account::new(AccountId::new("owner_1"));
        let change = BalanceChange::for_operation(TransactionKind::Deposit, Amount::from_minor(100)).unwrap();

        let first = change.apply_to(&base).unwrap();
        log.append(TransactionDraft::new(base.account_id.clone(), change), &first)
            .await
            .unwrap();

        // A second writer still holding the pristine snapshot.
        let stale = change.apply_to(&base).unwrap();
        let err = log
            .append(TransactionDraft::new(base.account_id.clone(), change), &stale)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::StorageFailure(_)));
        assert_eq!(log.replay(&base.account_id).await.unwrap().len(), 1);
    }
}
