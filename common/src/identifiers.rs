//! Identifier types for ledger entities.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{LedgerError, Result};

/// Maximum length of an external account identifier.
pub const MAX_ACCOUNT_ID_LEN: usize = 128;

/// Identifier of a wallet account.
///
/// Opaque to the ledger; in practice the marketplace user id of a business
/// owner, event host or contractor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Create an account ID without validation.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse and validate an account ID.
    pub fn parse(id: impl Into<String>) -> Result<Self> {
        let id = Self(id.into());
        if !id.is_valid() {
            return Err(LedgerError::InvalidAccountId(id.0));
        }
        Ok(id)
    }

    /// Get the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Non-empty, bounded, no whitespace or control characters.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= MAX_ACCOUNT_ID_LEN
            && !self.0.chars().any(|c| c.is_whitespace() || c.is_control())
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Unique identifier for a ledger transaction.
/// Uses UUID v7 for time-ordered identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Create a new transaction ID.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse from string.
    pub fn parse(s: &str) -> std::result::Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-supplied reference tying ledger entries to a business workflow,
/// e.g. an event escrow id. Never interpreted by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelatedId(String);

impl RelatedId {
    /// Create a new related ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelatedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RelatedId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for RelatedId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_id_creation() {
        let id1 = TransactionId::new();
        let id2 = TransactionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_transaction_id_parse() {
        let uuid_str = "019456ab-1234-7def-8901-234567890abc";
        let id = TransactionId::parse(uuid_str).unwrap();
        assert_eq!(id.to_string(), uuid_str);
    }

    #[test]
    fn test_account_id_validation() {
        assert!(AccountId::parse("host_42").is_ok());
        assert!(AccountId::parse("c0ntractor-9f3a").is_ok());
        assert!(matches!(
            AccountId::parse(""),
            Err(LedgerError::InvalidAccountId(_))
        ));
        assert!(AccountId::parse("has space").is_err());
        assert!(AccountId::parse("x".repeat(MAX_ACCOUNT_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_account_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&AccountId::new("owner_1")).unwrap();
        assert_eq!(json, "\"owner_1\"");
    }
}
