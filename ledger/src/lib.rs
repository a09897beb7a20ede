//! BoothPay Wallet Ledger
//!
//! Per-user balances with escrow holds and an append-only transaction log.
//! Mutations are serialized per account and every successful one is recorded
//! exactly once.

pub mod account;
pub mod balance;
pub mod config;
pub mod engine;
pub mod journal;
pub mod locks;
pub mod metrics;
pub mod store;

pub use account::Account;
pub use balance::BalanceChange;
pub use config::LedgerConfig;
pub use engine::{LedgerEngine, LedgerReceipt};
pub use journal::{AuditIssue, AuditReport, Transaction, TransactionDraft, TransactionKind, TransactionLog};
pub use metrics::{LedgerMetrics, LedgerMetricsSnapshot, SharedLedgerMetrics};
pub use store::{FileStore, LedgerStore, MemoryStore};
#[cfg(feature = "postgres")]
pub use store::PgStore;
