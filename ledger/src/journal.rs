//! Transaction log: the append-only history of balance mutations.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use boothpay_common::{now, AccountId, Amount, RelatedId, Result, Timestamp, TransactionId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::account::Account;
use crate::balance::BalanceChange;
use crate::store::LedgerStore;

/// Type of balance-affecting operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Funds added from an external source.
    Deposit,
    /// Funds withdrawn by the owner.
    Withdrawal,
    /// Available funds reserved for an obligation.
    Hold,
    /// Reserved funds returned to available.
    Release,
    /// Reserved funds removed from the account.
    Capture,
    /// Direct debit to an external party.
    Payout,
    /// Funds returned to the account.
    Refund,
}

impl TransactionKind {
    /// All kinds, in declaration order.
    pub const ALL: [TransactionKind; 7] = [
        TransactionKind::Deposit,
        TransactionKind::Withdrawal,
        TransactionKind::Hold,
        TransactionKind::Release,
        TransactionKind::Capture,
        TransactionKind::Payout,
        TransactionKind::Refund,
    ];

    /// Stable lowercase name, as persisted.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::Hold => "hold",
            TransactionKind::Release => "release",
            TransactionKind::Capture => "capture",
            TransactionKind::Payout => "payout",
            TransactionKind::Refund => "refund",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        TransactionKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown transaction kind: {s}"))
    }
}

/// A single immutable record in the transaction log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction ID.
    pub id: TransactionId,
    /// Account affected.
    pub account_id: AccountId,
    /// Position in the account's history, starting at 1.
    pub sequence: u64,
    /// Operation type.
    pub kind: TransactionKind,
    /// Signed delta applied to `balance`.
    pub amount: Amount,
    /// Positive amount the caller asked for.
    pub requested: Amount,
    /// Balance after this entry.
    pub balance_after: Amount,
    /// Available funds after this entry.
    pub available_after: Amount,
    /// Held funds after this entry.
    pub held_after: Amount,
    /// Business workflow reference.
    pub related_id: Option<RelatedId>,
    /// Free-text description.
    pub note: Option<String>,
    /// When this entry was created.
    pub created_at: Timestamp,
}

impl Transaction {
    /// Rebuild the account snapshot recorded by this entry.
    pub fn account_after(&self, created_at: Timestamp) -> Account {
        Account {
            account_id: self.account_id.clone(),
            balance: self.balance_after,
            available: self.available_after,
            held: self.held_after,
            version: self.sequence,
            created_at,
            updated_at: self.created_at,
        }
    }
}

/// A transaction that has not been appended yet.
///
/// `id` and `created_at` are assigned by [`TransactionLog::append`] when left
/// empty.
#[derive(Debug, Clone)]
pub struct TransactionDraft {
    pub id: Option<TransactionId>,
    pub created_at: Option<Timestamp>,
    pub account_id: AccountId,
    pub change: BalanceChange,
    pub related_id: Option<RelatedId>,
    pub note: Option<String>,
}

impl TransactionDraft {
    /// Create a draft for a balance change.
    pub fn new(account_id: AccountId, change: BalanceChange) -> Self {
        Self {
            id: None,
            created_at: None,
            account_id,
            change,
            related_id: None,
            note: None,
        }
    }

    /// Attach a workflow reference.
    pub fn with_related(mut self, related_id: Option<RelatedId>) -> Self {
        self.related_id = related_id;
        self
    }

    /// Attach a note.
    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note;
        self
    }

    fn finalize(self, account: &Account) -> Transaction {
        Transaction {
            id: self.id.unwrap_or_default(),
            account_id: self.account_id,
            sequence: account.version,
            kind: self.change.kind,
            amount: self.change.balance_delta,
            requested: self.change.requested,
            balance_after: account.balance,
            available_after: account.available,
            held_after: account.held,
            related_id: self.related_id,
            note: self.note,
            created_at: self.created_at.unwrap_or_else(now),
        }
    }
}

/// Append-only log of ledger transactions.
///
/// Every entry is persisted together with the account snapshot it produced,
/// so an account's state and its history can never diverge.
#[derive(Clone)]
pub struct TransactionLog {
    store: Arc<dyn LedgerStore>,
}

impl TransactionLog {
    /// Create a log over a store.
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Durably append a transaction and the account state it produced.
    pub async fn append(&self, draft: TransactionDraft, account: &Account) -> Result<Transaction> {
        debug_assert_eq!(draft.account_id, account.account_id);

        let transaction = draft.finalize(account);
        self.store.commit(account, &transaction).await?;

        debug!(
            transaction_id = %transaction.id,
            account = %transaction.account_id,
            sequence = transaction.sequence,
            kind = %transaction.kind,
            "Transaction appended"
        );

        Ok(transaction)
    }

    /// Most recent `limit` transactions, newest first.
    pub async fn list_for_account(&self, account_id: &AccountId, limit: usize) -> Result<Vec<Transaction>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.store.list_for_account(account_id, limit).await
    }

    /// Full history in creation order.
    pub async fn replay(&self, account_id: &AccountId) -> Result<Vec<Transaction>> {
        self.store.replay(account_id).await
    }
}

/// Problem found while auditing an account's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum AuditIssue {
    /// Sequence numbers are not contiguous.
    SequenceGap { expected: u64, found: u64 },
    /// Recorded `balance_after` disagrees with the replayed balance.
    BalanceMismatch { sequence: u64, replayed: Amount, recorded: Amount },
    /// Recorded snapshot breaks `balance == available + held`.
    InconsistentSnapshot { sequence: u64 },
    /// Live account state differs from the end of the log.
    LiveStateMismatch { replayed: Amount, live: Amount },
}

/// Result of replaying an account's log against its live state.
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub account_id: AccountId,
    pub transactions: usize,
    pub replayed_balance: Amount,
    pub live: Account,
    pub issues: Vec<AuditIssue>,
}

impl AuditReport {
    /// Replay `history` (creation order) from zero and compare with `live`.
    pub fn build(live: &Account, history: &[Transaction]) -> Self {
        let mut issues = Vec::new();
        let mut balance = Amount::ZERO;
        let mut expected_sequence = 1;

        for tx in history {
            if tx.sequence != expected_sequence {
                issues.push(AuditIssue::SequenceGap {
                    expected: expected_sequence,
                    found: tx.sequence,
                });
            }
            expected_sequence = tx.sequence + 1;

            balance = match balance.checked_add(tx.amount) {
                Some(b) => b,
                None => {
                    issues.push(AuditIssue::BalanceMismatch {
                        sequence: tx.sequence,
                        replayed: balance,
                        recorded: tx.balance_after,
                    });
                    tx.balance_after
                }
            };
            if balance != tx.balance_after {
                issues.push(AuditIssue::BalanceMismatch {
                    sequence: tx.sequence,
                    replayed: balance,
                    recorded: tx.balance_after,
                });
            }
            if !tx.account_after(live.created_at).is_consistent() {
                issues.push(AuditIssue::InconsistentSnapshot { sequence: tx.sequence });
            }
        }

        if balance != live.balance {
            issues.push(AuditIssue::LiveStateMismatch {
                replayed: balance,
                live: live.balance,
            });
        }
        if !live.is_consistent() {
            issues.push(AuditIssue::InconsistentSnapshot { sequence: live.version });
        }

        Self {
            account_id: live.account_id.clone(),
            transactions: history.len(),
            replayed_balance: balance,
            live: live.clone(),
            issues,
        }
    }

    /// True when replay reproduced the live state exactly.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn apply(account: &Account, kind: TransactionKind, amount: i64) -> (Account, TransactionDraft) {
        let change = BalanceChange::for_operation(kind, Amount::from_minor(amount)).unwrap();
        let next = change.apply_to(account).unwrap();
        (next, TransactionDraft::new(account.account_id.clone(), change))
    }

    #[tokio::test]
    async fn test_append_assigns_id_and_snapshot() {
        let log = TransactionLog::new(Arc::new(MemoryStore::new()));
        let account = Account::new(AccountId::new("owner_1"));

        let (next, draft) = apply(&account, TransactionKind::Deposit, 500);
        let tx = log.append(draft.with_note(Some("top-up".into())), &next).await.unwrap();

        assert_eq!(tx.sequence, 1);
        assert_eq!(tx.kind, TransactionKind::Deposit);
        assert_eq!(tx.amount.minor(), 500);
        assert_eq!(tx.balance_after.minor(), 500);
        assert_eq!(tx.note.as_deref(), Some("top-up"));
    }

    #[tokio::test]
    async fn test_append_keeps_preassigned_id() {
        let log = TransactionLog::new(Arc::new(MemoryStore::new()));
        let account = Account::new(AccountId::new("owner_1"));
        let id = TransactionId::new();
        let stamp = now();

        let (next, mut draft) = apply(&account, TransactionKind::Deposit, 10);
        draft.id = Some(id);
        draft.created_at = Some(stamp);
        let tx = log.append(draft, &next).await.unwrap();

        assert_eq!(tx.id, id);
        assert_eq!(tx.created_at, stamp);
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_limited() {
        let log = TransactionLog::new(Arc::new(MemoryStore::new()));
        let mut account = Account::new(AccountId::new("owner_1"));

        for amount in [100, 200, 300] {
            let (next, draft) = apply(&account, TransactionKind::Deposit, amount);
            log.append(draft, &next).await.unwrap();
            account = next;
        }

        let recent = log.list_for_account(&account.account_id, 2).await.unwrap();
        let sequences: Vec<u64> = recent.iter().map(|t| t.sequence).collect();
        assert_eq!(sequences, vec![3, 2]);

        assert!(log.list_for_account(&account.account_id, 0).await.unwrap().is_empty());
    }

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in TransactionKind::ALL {
            assert_eq!(kind.as_str().parse::<TransactionKind>().unwrap(), kind);
        }
        assert!("chargeback".parse::<TransactionKind>().is_err());
    }

    #[test]
    fn test_audit_detects_tampered_history() {
        let account = Account::new(AccountId::new("owner_1"));
        let (after_deposit, draft) = apply(&account, TransactionKind::Deposit, 500);
        let mut tx = draft.finalize(&after_deposit);

        assert!(AuditReport::build(&after_deposit, std::slice::from_ref(&tx)).is_clean());

        tx.amount = Amount::from_minor(400);
        let report = AuditReport::build(&after_deposit, &[tx]);
        assert!(!report.is_clean());
        assert!(report
            .issues
            .iter()
            .any(|i| matches!(i, AuditIssue::LiveStateMismatch { .. })));
    }
}
