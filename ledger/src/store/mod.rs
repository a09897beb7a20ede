//! Persistence backends for accounts and the transaction log.

mod file;
mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use file::FileStore;
pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStore;

use async_trait::async_trait;
use boothpay_common::{AccountId, LedgerError, Result};

use crate::account::Account;
use crate::journal::Transaction;

/// Durable storage for account snapshots and their transactions.
///
/// Implementations must make `commit` atomic and durable: after it returns
/// `Ok`, both the account snapshot and the transaction are visible to every
/// later read; after it returns `Err`, neither is.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Load an account snapshot, `None` if never persisted.
    async fn load_account(&self, account_id: &AccountId) -> Result<Option<Account>>;

    /// Persist a freshly provisioned account. No-op if it already exists.
    async fn open_account(&self, account: &Account) -> Result<()>;

    /// Persist a transaction together with the account state it produced.
    ///
    /// Fails with `StorageFailure` when `account` was not derived from the
    /// latest persisted snapshot (its version must be exactly one higher).
    async fn commit(&self, account: &Account, transaction: &Transaction) -> Result<()>;

    /// Most recent `limit` transactions, newest first.
    async fn list_for_account(&self, account_id: &AccountId, limit: usize) -> Result<Vec<Transaction>>;

    /// Every transaction for the account in creation order.
    async fn replay(&self, account_id: &AccountId) -> Result<Vec<Transaction>>;
}

/// In-memory view of one account: its latest snapshot and full history.
///
/// Kept under a single map entry so readers never observe a transaction
/// without its snapshot or the reverse.
#[derive(Debug, Clone)]
pub(crate) struct AccountRecord {
    pub account: Account,
    pub history: Vec<Transaction>,
}

impl AccountRecord {
    pub fn new(account: Account) -> Self {
        Self {
            account,
            history: Vec::new(),
        }
    }

    pub fn push(&mut self, account: &Account, transaction: &Transaction) {
        self.account = account.clone();
        self.history.push(transaction.clone());
    }

    pub fn recent(&self, limit: usize) -> Vec<Transaction> {
        self.history.iter().rev().take(limit).cloned().collect()
    }
}

/// Reject a commit built on a stale snapshot, e.g. after another writer
/// advanced the account.
pub(crate) fn check_version(account: &Account, stored: u64) -> Result<()> {
    if account.version == stored + 1 {
        Ok(())
    } else {
        Err(LedgerError::StorageFailure(format!(
            "version conflict on account {}: stored version {stored}, commit version {}",
            account.account_id, account.version
        )))
    }
}
