//! Core ledger engine implementation.

use std::sync::Arc;

use boothpay_common::{AccountId, Amount, LedgerError, RelatedId, Result};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::account::Account;
use crate::balance::BalanceChange;
use crate::config::LedgerConfig;
use crate::journal::{AuditReport, Transaction, TransactionDraft, TransactionKind, TransactionLog};
use crate::locks::{AccountLocks, AccountSlot};
use crate::metrics::{LedgerMetrics, SharedLedgerMetrics};
use crate::store::LedgerStore;

/// Outcome of a successful mutation: the new account state and the log entry
/// that recorded it.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerReceipt {
    pub account: Account,
    pub transaction: Transaction,
}

/// The ledger engine: sole writer of account state.
///
/// Every mutation runs under the account's exclusive lock, validates against
/// the current balances, appends exactly one transaction and only then
/// publishes the new state. A failed call changes nothing.
pub struct LedgerEngine {
    store: Arc<dyn LedgerStore>,
    log: TransactionLog,
    locks: AccountLocks,
    config: LedgerConfig,
    metrics: SharedLedgerMetrics,
}

impl LedgerEngine {
    /// Create a new ledger engine over a store.
    pub fn new(store: Arc<dyn LedgerStore>, config: LedgerConfig) -> Self {
        Self::with_metrics(store, config, Arc::new(LedgerMetrics::new()))
    }

    /// Create a ledger engine reporting into shared metrics.
    pub fn with_metrics(
        store: Arc<dyn LedgerStore>,
        config: LedgerConfig,
        metrics: SharedLedgerMetrics,
    ) -> Self {
        Self {
            log: TransactionLog::new(store.clone()),
            store,
            locks: AccountLocks::new(),
            config,
            metrics,
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Operation counters.
    pub fn metrics(&self) -> &SharedLedgerMetrics {
        &self.metrics
    }

    /// Current account snapshot.
    ///
    /// Unknown accounts read as zero balances unless strict mode is on, in
    /// which case they fail with `AccountNotFound`.
    pub async fn get_balance(&self, account_id: &AccountId) -> Result<Account> {
        check_account_id(account_id)?;
        let result = {
            let mut slot = self.locks.acquire(account_id).await;
            self.resolve(&mut slot, account_id).await
        };
        self.locks.evict_idle(account_id);
        result
    }

    /// Recent transactions, newest first. `None` uses the configured default.
    pub async fn list_transactions(
        &self,
        account_id: &AccountId,
        limit: Option<usize>,
    ) -> Result<Vec<Transaction>> {
        check_account_id(account_id)?;
        if self.config.strict_accounts && self.store.load_account(account_id).await?.is_none() {
            return Err(LedgerError::AccountNotFound(account_id.clone()));
        }

        let limit = self
            .config
            .clamp_limit(limit.unwrap_or(self.config.default_list_limit));
        self.log.list_for_account(account_id, limit).await
    }

    /// Provision an account. Returns the existing one if already open.
    #[instrument(skip(self), fields(account = %account_id))]
    pub async fn open_account(&self, account_id: &AccountId) -> Result<Account> {
        check_account_id(account_id)?;
        let mut slot = self.locks.acquire(account_id).await;

        if let Some(account) = self.store.load_account(account_id).await? {
            *slot = Some(account.clone());
            return Ok(account);
        }

        let account = Account::new(account_id.clone());
        self.store.open_account(&account).await?;
        *slot = Some(account.clone());

        info!(account = %account_id, "Account opened");
        Ok(account)
    }

    /// Add funds from an external source.
    pub async fn deposit(
        &self,
        account_id: &AccountId,
        amount: Amount,
        note: Option<String>,
    ) -> Result<LedgerReceipt> {
        self.apply(account_id, TransactionKind::Deposit, amount, None, note)
            .await
    }

    /// Withdraw available funds.
    pub async fn withdraw(
        &self,
        account_id: &AccountId,
        amount: Amount,
        note: Option<String>,
    ) -> Result<LedgerReceipt> {
        self.apply(account_id, TransactionKind::Withdrawal, amount, None, note)
            .await
    }

    /// Reserve available funds against a pending obligation.
    pub async fn hold(
        &self,
        account_id: &AccountId,
        amount: Amount,
        related_id: Option<RelatedId>,
        note: Option<String>,
    ) -> Result<LedgerReceipt> {
        self.apply(account_id, TransactionKind::Hold, amount, related_id, note)
            .await
    }

    /// Cancel (part of) a hold, returning funds to available.
    pub async fn release(
        &self,
        account_id: &AccountId,
        amount: Amount,
        related_id: Option<RelatedId>,
        note: Option<String>,
    ) -> Result<LedgerReceipt> {
        self.apply(account_id, TransactionKind::Release, amount, related_id, note)
            .await
    }

    /// Finalize (part of) a hold, removing the funds from the account.
    pub async fn capture(
        &self,
        account_id: &AccountId,
        amount: Amount,
        related_id: Option<RelatedId>,
        note: Option<String>,
    ) -> Result<LedgerReceipt> {
        self.apply(account_id, TransactionKind::Capture, amount, related_id, note)
            .await
    }

    /// Pay available funds out to an external party.
    pub async fn payout(
        &self,
        account_id: &AccountId,
        amount: Amount,
        related_id: Option<RelatedId>,
        note: Option<String>,
    ) -> Result<LedgerReceipt> {
        self.apply(account_id, TransactionKind::Payout, amount, related_id, note)
            .await
    }

    /// Return funds to the account.
    pub async fn refund(
        &self,
        account_id: &AccountId,
        amount: Amount,
        related_id: Option<RelatedId>,
        note: Option<String>,
    ) -> Result<LedgerReceipt> {
        self.apply(account_id, TransactionKind::Refund, amount, related_id, note)
            .await
    }

    /// Replay the account's log and compare it with the live state.
    #[instrument(skip(self), fields(account = %account_id))]
    pub async fn verify_account(&self, account_id: &AccountId) -> Result<AuditReport> {
        check_account_id(account_id)?;
        let snapshot = {
            let mut slot = self.locks.acquire(account_id).await;
            match self.resolve(&mut slot, account_id).await {
                Ok(live) => self.log.replay(account_id).await.map(|history| (live, history)),
                Err(err) => Err(err),
            }
        };
        self.locks.evict_idle(account_id);
        let (live, history) = snapshot?;

        let report = AuditReport::build(&live, &history);
        if report.is_clean() {
            info!(
                account = %account_id,
                transactions = report.transactions,
                balance = %live.balance,
                "Account verified"
            );
        } else {
            warn!(
                account = %account_id,
                issues = ?report.issues,
                "Account history does not reproduce live state"
            );
        }
        Ok(report)
    }

    #[instrument(
        name = "ledger_operation",
        skip_all,
        fields(account = %account_id, kind = %kind, amount = %amount)
    )]
    async fn apply(
        &self,
        account_id: &AccountId,
        kind: TransactionKind,
        amount: Amount,
        related_id: Option<RelatedId>,
        note: Option<String>,
    ) -> Result<LedgerReceipt> {
        self.metrics.operation_started();

        let result = self
            .apply_locked(account_id, kind, amount, related_id, note)
            .await;
        self.locks.evict_idle(account_id);

        match &result {
            Ok(receipt) => {
                self.metrics.transaction_appended();
                info!(
                    account = %account_id,
                    kind = %kind,
                    transaction_id = %receipt.transaction.id,
                    balance = %receipt.account.balance,
                    available = %receipt.account.available,
                    held = %receipt.account.held,
                    "Ledger operation applied"
                );
            }
            Err(err @ LedgerError::StorageFailure(_)) => {
                self.metrics.operation_failed(err);
                error!(account = %account_id, kind = %kind, error = %err, "Ledger write failed");
            }
            Err(err) => {
                self.metrics.operation_failed(err);
                warn!(
                    account = %account_id,
                    kind = %kind,
                    code = err.error_code(),
                    error = %err,
                    "Ledger operation rejected"
                );
            }
        }

        result
    }

    async fn apply_locked(
        &self,
        account_id: &AccountId,
        kind: TransactionKind,
        amount: Amount,
        related_id: Option<RelatedId>,
        note: Option<String>,
    ) -> Result<LedgerReceipt> {
        check_account_id(account_id)?;
        let change = BalanceChange::for_operation(kind, amount)?;

        let mut slot = self.locks.acquire(account_id).await;
        let current = self.resolve(&mut slot, account_id).await?;
        let next = change.apply_to(&current)?;

        let draft = TransactionDraft::new(account_id.clone(), change)
            .with_related(related_id)
            .with_note(note);
        let transaction = match self.log.append(draft, &next).await {
            Ok(transaction) => transaction,
            Err(err) => {
                // Another writer may have moved the account; reload on next use.
                *slot = None;
                return Err(err);
            }
        };

        *slot = Some(next.clone());

        Ok(LedgerReceipt {
            account: next,
            transaction,
        })
    }

    /// Load the account into its slot on first use. Caller holds the lock.
    ///
    /// An account that was never persisted reads as zero (lazy mode) but is
    /// not cached, so lookups of unknown ids leave nothing behind.
    async fn resolve(&self, slot: &mut AccountSlot, account_id: &AccountId) -> Result<Account> {
        if let Some(account) = slot {
            return Ok(account.clone());
        }

        let account = match self.store.load_account(account_id).await? {
            Some(account) => account,
            None if self.config.strict_accounts => {
                return Err(LedgerError::AccountNotFound(account_id.clone()));
            }
            None => return Ok(Account::new(account_id.clone())),
        };

        *slot = Some(account.clone());
        Ok(account)
    }
}

fn check_account_id(account_id: &AccountId) -> Result<()> {
    if account_id.is_valid() {
        Ok(())
    } else {
        Err(LedgerError::InvalidAccountId(account_id.to_string()))
    }
}
