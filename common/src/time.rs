//! Time utilities for the wallet ledger.

use chrono::{DateTime, Utc};

/// A timestamp with timezone (always UTC).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Ledger defaults.
pub mod constants {
    /// Default page size for transaction history.
    pub const DEFAULT_LIST_LIMIT: usize = 50;

    /// Upper bound on a single history page.
    pub const MAX_LIST_LIMIT: usize = 1_000;
}
