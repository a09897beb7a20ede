//! Ledger operation counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use boothpay_common::LedgerError;

/// Ledger metrics.
#[derive(Debug, Default)]
pub struct LedgerMetrics {
    /// Mutating operations attempted.
    pub operations_total: AtomicU64,
    /// Transactions durably appended.
    pub transactions_appended: AtomicU64,
    /// Calls rejected for a non-positive or overflowing amount.
    pub rejected_invalid_amount: AtomicU64,
    /// Calls rejected for insufficient available or held funds.
    pub rejected_insufficient_funds: AtomicU64,
    /// Calls rejected because the account is unknown (strict mode).
    pub rejected_unknown_account: AtomicU64,
    /// Storage writes or reads that failed.
    pub storage_failures: AtomicU64,
}

impl LedgerMetrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment operations attempted.
    pub fn operation_started(&self) {
        self.operations_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful append.
    pub fn transaction_appended(&self) {
        self.transactions_appended.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed operation under the matching counter.
    pub fn operation_failed(&self, err: &LedgerError) {
        let counter = match err {
            LedgerError::InvalidAmount(_) | LedgerError::AmountOverflow => &self.rejected_invalid_amount,
            LedgerError::InsufficientAvailableFunds { .. } | LedgerError::InsufficientHeldFunds { .. } => {
                &self.rejected_insufficient_funds
            }
            LedgerError::AccountNotFound(_) | LedgerError::InvalidAccountId(_) => {
                &self.rejected_unknown_account
            }
            LedgerError::StorageFailure(_) => &self.storage_failures,
            LedgerError::InvalidPrecision { .. } | LedgerError::ConfigurationError(_) => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> LedgerMetricsSnapshot {
        LedgerMetricsSnapshot {
            operations_total: self.operations_total.load(Ordering::Relaxed),
            transactions_appended: self.transactions_appended.load(Ordering::Relaxed),
            rejected_invalid_amount: self.rejected_invalid_amount.load(Ordering::Relaxed),
            rejected_insufficient_funds: self.rejected_insufficient_funds.load(Ordering::Relaxed),
            rejected_unknown_account: self.rejected_unknown_account.load(Ordering::Relaxed),
            storage_failures: self.storage_failures.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            r#"# HELP boothpay_ledger_operations_total Mutating ledger operations attempted
# TYPE boothpay_ledger_operations_total counter
boothpay_ledger_operations_total {}

# HELP boothpay_ledger_transactions_appended Transactions durably appended
# TYPE boothpay_ledger_transactions_appended counter
boothpay_ledger_transactions_appended {}

# HELP boothpay_ledger_rejected_invalid_amount Operations rejected for an invalid amount
# TYPE boothpay_ledger_rejected_invalid_amount counter
boothpay_ledger_rejected_invalid_amount {}

# HELP boothpay_ledger_rejected_insufficient_funds Operations rejected for insufficient funds
# TYPE boothpay_ledger_rejected_insufficient_funds counter
boothpay_ledger_rejected_insufficient_funds {}

# HELP boothpay_ledger_rejected_unknown_account Operations rejected for an unknown account
# TYPE boothpay_ledger_rejected_unknown_account counter
boothpay_ledger_rejected_unknown_account {}

# HELP boothpay_ledger_storage_failures Storage failures
# TYPE boothpay_ledger_storage_failures counter
boothpay_ledger_storage_failures {}
"#,
            snapshot.operations_total,
            snapshot.transactions_appended,
            snapshot.rejected_invalid_amount,
            snapshot.rejected_insufficient_funds,
            snapshot.rejected_unknown_account,
            snapshot.storage_failures,
        )
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerMetricsSnapshot {
    pub operations_total: u64,
    pub transactions_appended: u64,
    pub rejected_invalid_amount: u64,
    pub rejected_insufficient_funds: u64,
    pub rejected_unknown_account: u64,
    pub storage_failures: u64,
}

/// Shared metrics instance.
pub type SharedLedgerMetrics = Arc<LedgerMetrics>;
