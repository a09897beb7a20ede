//! Error types for ledger operations.

use crate::{AccountId, Amount, Currency};
use thiserror::Error;

/// Main error type for wallet ledger operations.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Amount must be strictly positive.
    #[error("Invalid amount: {0} (must be greater than zero)")]
    InvalidAmount(Amount),

    /// Amount arithmetic left the representable range.
    #[error("Amount overflow")]
    AmountOverflow,

    /// Decimal value cannot be represented in the currency's minor units.
    #[error("Invalid precision for {currency}: {value}")]
    InvalidPrecision { value: String, currency: Currency },

    /// Not enough available funds for a withdraw, hold or payout.
    #[error("Insufficient available funds in {account}: requested {requested}, available {available}")]
    InsufficientAvailableFunds {
        account: AccountId,
        requested: Amount,
        available: Amount,
    },

    /// Not enough held funds for a release or capture.
    #[error("Insufficient held funds in {account}: requested {requested}, held {held}")]
    InsufficientHeldFunds {
        account: AccountId,
        requested: Amount,
        held: Amount,
    },

    /// Account has not been provisioned (strict mode only).
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// Malformed account identifier.
    #[error("Invalid account id: {0:?}")]
    InvalidAccountId(String),

    /// Durable write or read failed. Nothing was applied.
    #[error("Storage failure: {0}")]
    StorageFailure(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl LedgerError {
    /// Check if this error is a funds shortfall the user can fix by adding money.
    pub fn is_insufficient_funds(&self) -> bool {
        matches!(
            self,
            LedgerError::InsufficientAvailableFunds { .. } | LedgerError::InsufficientHeldFunds { .. }
        )
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::StorageFailure(_))
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            LedgerError::InvalidAmount(_) => "INVALID_AMOUNT",
            LedgerError::AmountOverflow => "AMOUNT_OVERFLOW",
            LedgerError::InvalidPrecision { .. } => "INVALID_PRECISION",
            LedgerError::InsufficientAvailableFunds { .. } => "INSUFFICIENT_AVAILABLE_FUNDS",
            LedgerError::InsufficientHeldFunds { .. } => "INSUFFICIENT_HELD_FUNDS",
            LedgerError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            LedgerError::InvalidAccountId(_) => "INVALID_ACCOUNT_ID",
            LedgerError::StorageFailure(_) => "STORAGE_FAILURE",
            LedgerError::ConfigurationError(_) => "CONFIGURATION_ERROR",
        }
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::StorageFailure(err.to_string())
    }
}

/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
