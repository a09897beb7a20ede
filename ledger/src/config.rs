//! Ledger engine configuration.

use boothpay_common::constants::{DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};
use boothpay_common::{LedgerError, Result};

/// Ledger engine configuration.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Require accounts to be opened before use instead of creating them
    /// lazily on first reference.
    pub strict_accounts: bool,
    /// History page size when the caller does not give one.
    pub default_list_limit: usize,
    /// Largest history page served.
    pub max_list_limit: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            strict_accounts: false,
            default_list_limit: DEFAULT_LIST_LIMIT,
            max_list_limit: MAX_LIST_LIMIT,
        }
    }
}

impl LedgerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(strict) = std::env::var("LEDGER_STRICT_ACCOUNTS") {
            config.strict_accounts = matches!(strict.as_str(), "1" | "true" | "yes");
        }

        if let Ok(limit) = std::env::var("LEDGER_DEFAULT_LIST_LIMIT") {
            if let Ok(limit) = limit.parse() {
                config.default_list_limit = limit;
            }
        }

        if let Ok(limit) = std::env::var("LEDGER_MAX_LIST_LIMIT") {
            if let Ok(limit) = limit.parse() {
                config.max_list_limit = limit;
            }
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.max_list_limit == 0 {
            return Err(LedgerError::ConfigurationError(
                "Max list limit cannot be 0".to_string(),
            ));
        }

        if self.default_list_limit > self.max_list_limit {
            return Err(LedgerError::ConfigurationError(
                "Default list limit cannot exceed max list limit".to_string(),
            ));
        }

        Ok(())
    }

    /// Clamp a requested page size.
    pub fn clamp_limit(&self, limit: usize) -> usize {
        limit.min(self.max_list_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LedgerConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.strict_accounts);
        assert_eq!(config.default_list_limit, 50);
    }

    #[test]
    fn test_invalid_config() {
        let mut config = LedgerConfig::default();
        config.default_list_limit = config.max_list_limit + 1;
        assert!(config.validate().is_err());

        config.max_list_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_clamp_limit() {
        let config = LedgerConfig {
            max_list_limit: 10,
            ..LedgerConfig::default()
        };
        assert_eq!(config.clamp_limit(3), 3);
        assert_eq!(config.clamp_limit(500), 10);
    }
}
