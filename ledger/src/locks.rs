//! Per-account mutual exclusion.

use std::sync::Arc;

use boothpay_common::AccountId;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::account::Account;

/// Cached account state guarded by its lock. `None` until first loaded.
pub type AccountSlot = Option<Account>;

/// Exclusive guard over one account.
pub type AccountGuard = OwnedMutexGuard<AccountSlot>;

/// Table of per-account async mutexes.
///
/// Each account gets its own lock, created on first use. Holding the guard
/// across "read, validate, persist, publish" serializes every mutation of
/// that account while leaving other accounts free to proceed in parallel.
#[derive(Default)]
pub struct AccountLocks {
    slots: DashMap<AccountId, Arc<Mutex<AccountSlot>>>,
}

impl AccountLocks {
    /// Create an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for an account, waiting for any in-flight mutation.
    pub async fn acquire(&self, account_id: &AccountId) -> AccountGuard {
        // Clone the Arc out first; the map shard must not stay locked
        // across the await.
        let slot = self
            .slots
            .entry(account_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();
        slot.lock_owned().await
    }

    /// Drop the lock of an account nobody holds or waits on and that has no
    /// cached state, so lookups of unknown ids do not accumulate.
    pub fn evict_idle(&self, account_id: &AccountId) {
        self.slots.remove_if(account_id, |_, slot| {
            // The map shard is write-locked here, so no new holder can
            // clone the Arc between the count check and the removal.
            Arc::strong_count(slot) == 1
                && slot.try_lock().map(|cached| cached.is_none()).unwrap_or(false)
        });
    }

    /// Number of accounts that have a lock allocated.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no lock has been allocated yet.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_account_is_exclusive() {
        let locks = Arc::new(AccountLocks::new());
        let id = AccountId::new("owner_1");

        let guard = locks.acquire(&id).await;

        let contender = {
            let locks = locks.clone();
            let id = id.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&id).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_accounts_do_not_block() {
        let locks = AccountLocks::new();
        let _a = locks.acquire(&AccountId::new("a")).await;
        let _b = tokio::time::timeout(Duration::from_secs(1), locks.acquire(&AccountId::new("b")))
            .await
            .expect("second account must not wait on the first");
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_evict_idle_only_drops_unused_empty_slots() {
        let locks = AccountLocks::new();
        let empty = AccountId::new("ghost");
        let cached = AccountId::new("owner_2");
        let held = AccountId::new("owner_3");

        drop(locks.acquire(&empty).await);
        *locks.acquire(&cached).await = Some(Account::new(cached.clone()));
        let guard = locks.acquire(&held).await;

        for id in [&empty, &cached, &held] {
            locks.evict_idle(id);
        }
        assert_eq!(locks.len(), 2);

        drop(guard);
        locks.evict_idle(&held);
        assert_eq!(locks.len(), 1);
    }
}
